//! Observers that report progress events to the control plane.

pub mod life_cycle_observer;
pub mod log_observer;
pub mod process_observer;

use std::sync::Arc;

use crate::domain::ports::{ControlPlane, Observer};

pub use life_cycle_observer::LifeCycleObserver;
pub use log_observer::LogObserver;
pub use process_observer::ProcessObserver;

/// The standard observer set, all reporting to `control_plane`.
pub fn default_observers(
    control_plane: &Arc<dyn ControlPlane>,
    agent_name: &str,
) -> Vec<Arc<dyn Observer>> {
    vec![
        Arc::new(LogObserver::new(Arc::clone(control_plane))),
        Arc::new(ProcessObserver::new(Arc::clone(control_plane))),
        Arc::new(LifeCycleObserver::new(Arc::clone(control_plane), agent_name)),
    ]
}
