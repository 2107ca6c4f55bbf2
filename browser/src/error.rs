use shared::WireError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// No valid response arrived within the overall time budget.
    #[error("no valid response within the time budget")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("no target address set")]
    NoTarget,

    #[error("could not resolve {0}")]
    Resolve(String),

    /// The remote echoed a client token other than the one we sent.
    #[error("client token mismatch: sent {sent}, received {received}")]
    TokenMismatch { sent: i32, received: i32 },

    #[error("none of the master servers could be resolved")]
    NoMasterServers,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BrowserError {
    /// True for failures caused by a remote peer rather than by local resources.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout
                | BrowserError::Wire(_)
                | BrowserError::TokenMismatch { .. }
                | BrowserError::Resolve(_)
        )
    }
}
