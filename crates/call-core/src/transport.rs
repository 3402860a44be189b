//! Signalling transport seam
//!
//! The manager talks to the network only through [`CallTransport`]. Commands
//! dispatch and return immediately; their outcome comes back later as a
//! [`TransportEvent`](crate::TransportEvent). The application picks one
//! implementation at construction: a real signalling client, or
//! [`SimulatedTransport`](crate::simulated::SimulatedTransport) in demo mode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TransferMode;
use crate::error::CallResult;
use crate::number::DtmfDigit;
use crate::session::CallId;

/// Why we refuse an inbound invite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// The user declined the call (603)
    Declined,
    /// Another call is in progress (486)
    Busy,
    /// The microphone could not be used (488)
    MediaUnavailable,
}

impl RejectReason {
    /// SIP status code sent with the rejection
    pub fn status_code(self) -> u16 {
        match self {
            Self::Declined => 603,
            Self::Busy => 486,
            Self::MediaUnavailable => 488,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declined => write!(f, "declined ({})", self.status_code()),
            Self::Busy => write!(f, "busy ({})", self.status_code()),
            Self::MediaUnavailable => write!(f, "media unavailable ({})", self.status_code()),
        }
    }
}

/// Outbound commands to the signalling client
pub trait CallTransport: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Register the user agent with the server
    fn register(&self) -> CallResult<()>;

    /// Send an invite for a new outbound call
    fn invite(&self, call_id: CallId, number: &str) -> CallResult<()>;

    /// Cancel an outbound invite that has not been answered
    fn cancel(&self, call_id: CallId) -> CallResult<()>;

    /// Answer an inbound invite
    fn accept(&self, call_id: CallId) -> CallResult<()>;

    /// Refuse an inbound invite
    fn reject(&self, call_id: CallId, reason: RejectReason) -> CallResult<()>;

    /// End an established call
    fn bye(&self, call_id: CallId) -> CallResult<()>;

    /// Send one keypad tone on an established call
    fn send_dtmf(&self, call_id: CallId, digit: DtmfDigit) -> CallResult<()>;

    /// Hand an established call to another number
    fn transfer(&self, call_id: CallId, target: &str, mode: TransferMode) -> CallResult<()>;
}
