//! Outbound delivery capability.

use async_trait::async_trait;

/// Delivery collaborator the core hands rendered digests to.
///
/// Fire-and-forget from the core's perspective: failures are logged by the
/// caller, never retried here.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, destination: &str, text: &str) -> anyhow::Result<()>;
}
