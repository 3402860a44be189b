//! # Softphone Panel
//!
//! Presentation layer of the softphone and the runtime that drives it.
//!
//! - [`PanelStateMachine`]: pure `(state, input) → effects` model of the panel
//! - [`Softphone`]: tokio runtime wiring the panel to a
//!   [`CallSessionManager`](softphone_call_core::CallSessionManager)
//! - [`CallHistory`]: call log collaborator fed by the panel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use softphone_call_core::CallConfig;
//! use softphone_panel::{PrimaryButton, Softphone, SoftphoneConfig, UserInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SoftphoneConfig::new()
//!         .with_call(CallConfig::new().with_demo_mode(Duration::from_millis(300)));
//!     let phone = Softphone::builder(config).start()?;
//!
//!     phone.send(UserInput::CallFromTab { number: "+1 555 0100".into() })?;
//!     let state = phone
//!         .wait_for(|state| state.primary_button == PrimaryButton::Hangup)
//!         .await?;
//!     println!("calling {:?}", state.call);
//!
//!     phone.send(UserInput::Hangup)?;
//!     phone.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod machine;
pub mod runtime;
pub mod state;

// Re-export main types
pub use config::{PanelConfig, SoftphoneConfig};
pub use error::{PanelError, PanelResult};
pub use history::{CallHistory, HistoryEntry, HistoryStatus, HistoryUpdate, InMemoryCallHistory};
pub use logging::{setup_logging, LoggingConfig};
pub use machine::{PanelEffect, PanelStateMachine, UserInput};
pub use runtime::{PanelSignal, Softphone, SoftphoneBuilder};
pub use state::{CallView, Overlay, PanelState, PrimaryButton, Tab, Visibility};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
