//! # Softphone Call Core
//!
//! The transport-call state machine of a softphone. It owns exactly one call
//! session and drives it through `NoCall → Ringing → Ongoing` (with the
//! `Canceling` and `Rejecting` detours) in response to user commands and
//! signalling events.
//!
//! - [`CallSessionManager`]: the state machine
//! - [`CallTransport`]: outbound seam to the signalling client, with a
//!   [`SimulatedTransport`] for demo mode
//! - [`AudioDevice`]: speaker, microphone and tone player, released through
//!   RAII guards held by the session
//! - [`ContactDirectory`]: reverse lookup of callers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use softphone_call_core::{
//!     CallConfig, CallSessionManager, InMemoryContacts, NullAudioDevice, SimulatedTransport,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CallConfig::new().with_demo_mode(Duration::from_millis(500));
//!     let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//!     let transport = SimulatedTransport::new(events_tx, config.demo_delay())?;
//!
//!     let (mut manager, mut notifications) = CallSessionManager::new(
//!         config,
//!         Arc::new(transport),
//!         Arc::new(NullAudioDevice),
//!         Arc::new(InMemoryContacts::default()),
//!     );
//!
//!     manager.make_call("+1 555 0100");
//!     if let Some(event) = events_rx.recv().await {
//!         manager.handle_transport_event(event).await;
//!     }
//!     while let Some(notification) = notifications.try_next() {
//!         println!("{:?}", notification);
//!     }
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod config;
pub mod contacts;
pub mod error;
pub mod events;
pub mod manager;
pub mod number;
pub mod recovery;
pub mod session;
pub mod simulated;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
pub mod transport;

// Re-export main types
pub use audio::{AudioDevice, NullAudioDevice, StreamGuard, Tone, ToneGuard};
pub use config::{CallConfig, TransferMode, TransportMode};
pub use contacts::{resolve_contact, Contact, ContactDirectory, InMemoryContacts};
pub use error::{CallError, CallResult};
pub use events::{
    CallCommand, CallNotification, ErrorKind, NotificationStream, TransportEvent, UserNotice,
};
pub use manager::CallSessionManager;
pub use number::{normalize_number, DtmfDigit, NumberPattern};
pub use recovery::{BackoffStrategy, RegistrationBackoff, RetryConfig};
pub use session::{CallDirection, CallId, CallSession, CallState, CallSummary, RemoteContact};
pub use simulated::SimulatedTransport;
pub use transport::{CallTransport, RejectReason};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
