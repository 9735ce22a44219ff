//! Progress event consumer port.

use async_trait::async_trait;

use crate::domain::models::ProgressEvent;

/// Consumer of progress events.
///
/// Observers are sinks: they report problems through logging and never
/// return errors to the broadcaster.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Short name used in log fields
    fn name(&self) -> &'static str;

    async fn listen(&self, event: &ProgressEvent);
}
