//! Wireless network link capability.

use crate::error::Result;
use async_trait::async_trait;
use std::net::IpAddr;

/// The wireless link the agent rides on. Implementations hold their own
/// credentials; `connect` resolves once the link is associated or fails
/// with [`crate::error::AgentError::NetworkUnavailable`] /
/// [`crate::error::AgentError::ConnectTimeout`].
#[async_trait]
pub trait NetworkLink: Send {
    /// Attempt one association with the configured access point.
    async fn connect(&mut self) -> Result<()>;

    /// Whether the link currently reports associated.
    fn is_connected(&self) -> bool;

    /// Local address, for diagnostics only.
    fn local_addr(&self) -> Option<IpAddr>;
}
