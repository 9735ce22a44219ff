//! ci-agent - cluster-resident deployment agent
//!
//! The agent pulls deployment jobs from a CI control plane, applies them to
//! the Kubernetes cluster it runs in and reports progress back.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the `ClusterApi`,
//!   `ControlPlane` and `Observer` ports
//! - **Service Layer** (`services`): Job puller, reconciler, event broadcaster
//!   and observers
//! - **Infrastructure Layer** (`infrastructure`): `kube` and `reqwest` adapters,
//!   configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ci_agent::services::{default_observers, EventBroadcaster, JobPuller, ResourceReconciler};
//!
//! let events = Arc::new(EventBroadcaster::new(default_observers(&control_plane, "agent-1")));
//! let reconciler = Arc::new(ResourceReconciler::new(cluster, Arc::clone(&events), config.reconcile));
//! JobPuller::new(control_plane, reconciler, events, &config.puller).run(shutdown).await;
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ClusterError, ControlPlaneError, ReadinessError, ReconcileError};
pub use domain::models::{Config, EventKind, Job, LoggingConfig, ProgressEvent, WorkloadKind};
pub use domain::ports::{ClusterApi, ControlPlane, Observer};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EventBroadcaster, JobPuller, ResourceReconciler};
