//! Infrastructure layer module
//!
//! This module contains the adapters behind the domain ports:
//! - Cluster access and label watchers (kube)
//! - Control plane HTTP client (reqwest)
//! - Configuration management
//! - Logging infrastructure
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod cluster;
pub mod config;
pub mod http;
pub mod logging;
