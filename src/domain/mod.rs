//! Domain layer for the deployment agent
//!
//! This module contains jobs, progress events, and the ports the services
//! depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    ClusterError, ClusterResult, ControlPlaneError, ControlPlaneResult, ReadinessError,
    ReconcileError, ReconcileResult,
};
