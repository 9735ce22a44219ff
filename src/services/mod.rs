//! Service layer: job intake, reconciliation and progress reporting.

pub mod event_broadcaster;
pub mod job_puller;
pub mod kube_events;
pub mod observers;
pub mod reconciler;
pub mod registration;

pub use event_broadcaster::EventBroadcaster;
pub use job_puller::JobPuller;
pub use kube_events::{ChangeTracker, ClassifiedChange, KubeEventPublisher};
pub use observers::{default_observers, LifeCycleObserver, LogObserver, ProcessObserver};
pub use reconciler::ResourceReconciler;
pub use registration::register_agent;
