use anyhow::Result;
use async_trait::async_trait;

/// Sends one named value to the remote collector.
///
/// Publishing is fire-and-forget from the reporter's point of view: an
/// error is logged by the caller and the remaining fields of the cycle are
/// still sent. Calls are made strictly one at a time from the control loop.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `value` on the topic for `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects or cannot queue the message.
    async fn publish(&self, field: &str, value: &str) -> Result<()>;

    /// Releases the underlying transport. Called once when the reporter stops.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
