//! Port trait definitions (Hexagonal Architecture)
//!
//! - `ClusterApi`: dynamic cluster object access
//! - `ControlPlane`: job pulls and upstream reports
//! - `Observer`: progress event sinks

pub mod cluster;
pub mod control_plane;
pub mod observer;

pub use cluster::{ClusterApi, DiscoveredResource, ResourceTarget};
pub use control_plane::{ControlPlane, Endpoint};
pub use observer::Observer;
