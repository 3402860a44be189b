//! Error types for the call session manager
//!
//! Errors in this crate never cross the [`CallSessionManager`](crate::CallSessionManager)
//! boundary as `Err` during call handling: transport and audio failures are
//! translated into [`CallNotification::Error`](crate::CallNotification::Error).
//! `CallError` is what collaborators return and what configuration loading
//! reports.

use thiserror::Error;

/// Result type for call-core operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors that can occur while driving a call session
#[derive(Debug, Error)]
pub enum CallError {
    /// A configuration field failed validation
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// A keypad key that cannot be sent as DTMF
    #[error("Invalid DTMF digit: {digit:?}")]
    InvalidDtmf { digit: char },

    /// The transport refused or failed to dispatch a command
    #[error("Transport failure: {reason}")]
    TransportFailure { reason: String },

    /// Microphone access was denied by the user or the platform
    #[error("Microphone access denied")]
    MicrophoneDenied,

    /// The audio device could not play a tone or attach a stream
    #[error("Audio device error: {message}")]
    AudioDevice { message: String },

    /// The contacts collaborator failed to answer a lookup
    #[error("Contact lookup failed: {reason}")]
    ContactLookup { reason: String },

    /// No tokio runtime was available to schedule simulated replies
    #[error("No async runtime available: {message}")]
    RuntimeUnavailable { message: String },

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing a configuration document failed
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CallError {
    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport failure
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportFailure {
            reason: reason.into(),
        }
    }

    /// Create an audio device error
    pub fn audio_device(message: impl Into<String>) -> Self {
        Self::AudioDevice {
            message: message.into(),
        }
    }

    /// Create a contact lookup error
    pub fn contact_lookup(reason: impl Into<String>) -> Self {
        Self::ContactLookup {
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are worth retrying after a delay (connectivity,
    /// a flaky lookup). Everything the user must fix is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TransportFailure { .. } | Self::ContactLookup { .. } | Self::Io(_) => true,

            Self::InvalidConfiguration { .. }
            | Self::InvalidDtmf { .. }
            | Self::MicrophoneDenied
            | Self::AudioDevice { .. }
            | Self::RuntimeUnavailable { .. }
            | Self::Parse(_) => false,
        }
    }

    /// Short category name used as a structured logging field
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } | Self::Io(_) | Self::Parse(_) => "configuration",
            Self::InvalidDtmf { .. } => "input",
            Self::TransportFailure { .. } => "transport",
            Self::MicrophoneDenied | Self::AudioDevice { .. } => "audio",
            Self::ContactLookup { .. } => "contacts",
            Self::RuntimeUnavailable { .. } => "internal",
        }
    }
}
