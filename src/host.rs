//! Host application seam
//!
//! The host page surface is opaque to the core: each planning round gets a
//! JSON snapshot of it, and the history matcher fingerprints the query text
//! it currently shows. Both reads can fail (page not ready, surface gone);
//! callers decide how to degrade.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait HostStateProvider: Send + Sync {
    /// Opaque snapshot passed to the planner each round.
    async fn snapshot(&self) -> Result<serde_json::Value>;

    /// Query text currently shown by the host surface, used as the history
    /// fingerprint.
    async fn current_query(&self) -> Result<String>;
}
