//! Cluster adapters built on `kube`

pub mod client;
pub mod watch;

pub use client::{connect, KubeCluster};
pub use watch::{spawn_label_watchers, ObservedChange, WatchedObject};
