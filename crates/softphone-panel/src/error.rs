//! Error types for the softphone panel and its runtime

use softphone_call_core::CallError;
use thiserror::Error;

/// Result type for panel operations
pub type PanelResult<T> = Result<T, PanelError>;

/// Errors raised while configuring or running the softphone
#[derive(Debug, Error)]
pub enum PanelError {
    /// Error from the call session layer
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Invalid panel configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Logging could not be initialized
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// The call history collaborator failed
    #[error("Call history error: {0}")]
    History(String),

    /// The runtime task is gone
    #[error("Softphone runtime stopped")]
    RuntimeStopped,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PanelError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn history(message: impl Into<String>) -> Self {
        Self::History(message.into())
    }

    /// Whether the runtime can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Call(e) => e.is_recoverable(),
            Self::History(_) => true,
            _ => false,
        }
    }
}
