//! The call session owned by the transport-call state machine

use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::{StreamGuard, ToneGuard};

/// Identifier of one call attempt
pub type CallId = Uuid;

/// Lifecycle state of the call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No call; the session is fresh
    NoCall,
    /// An invite was sent or received and has not been answered
    Ringing,
    /// The call is established
    Ongoing,
    /// A cancel was sent and awaits confirmation
    Canceling,
    /// A reject was sent and awaits confirmation
    Rejecting,
}

impl CallState {
    /// Whether a call currently occupies the session
    pub fn is_in_call(self) -> bool {
        self != Self::NoCall
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoCall => "no-call",
            Self::Ringing => "ringing",
            Self::Ongoing => "ongoing",
            Self::Canceling => "canceling",
            Self::Rejecting => "rejecting",
        };
        f.write_str(name)
    }
}

/// Who placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// A contact resolved for the remote party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContact {
    pub id: i64,
    pub display_name: String,
}

/// State of the single telephony session
///
/// Audio guards live here so that replacing the session with
/// [`CallSession::idle`] releases speaker and microphone.
#[derive(Debug)]
pub struct CallSession {
    id: CallId,
    state: CallState,
    direction: CallDirection,
    remote_number: String,
    remote_contact: Option<RemoteContact>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    muted: bool,
    transferred: bool,
    tone: Option<ToneGuard>,
    stream: Option<StreamGuard>,
}

impl CallSession {
    /// A fresh session in `NoCall`
    pub fn idle() -> Self {
        Self::with_id(Uuid::nil(), CallDirection::Outbound, String::new(), CallState::NoCall)
    }

    /// A session created by an invite, sent or received
    pub fn ringing(id: CallId, direction: CallDirection, remote_number: String) -> Self {
        Self::with_id(id, direction, remote_number, CallState::Ringing)
    }

    fn with_id(
        id: CallId,
        direction: CallDirection,
        remote_number: String,
        state: CallState,
    ) -> Self {
        Self {
            id,
            state,
            direction,
            remote_number,
            remote_contact: None,
            started_at: None,
            ended_at: None,
            muted: false,
            transferred: false,
            tone: None,
            stream: None,
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn remote_number(&self) -> &str {
        &self.remote_number
    }

    pub fn remote_contact(&self) -> Option<&RemoteContact> {
        self.remote_contact.as_ref()
    }

    pub fn remote_contact_id(&self) -> Option<i64> {
        self.remote_contact.as_ref().map(|contact| contact.id)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn was_transferred(&self) -> bool {
        self.transferred
    }

    /// Whether an audio stream is attached
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether this session is the one a call-scoped event refers to
    pub fn matches(&self, call_id: CallId) -> bool {
        self.state.is_in_call() && self.id == call_id
    }

    pub(crate) fn set_state(&mut self, state: CallState) {
        self.state = state;
    }

    /// Record the resolved contact; only the first assignment sticks
    pub(crate) fn assign_contact(&mut self, contact: RemoteContact) -> bool {
        if self.remote_contact.is_some() {
            return false;
        }
        self.remote_contact = Some(contact);
        true
    }

    pub(crate) fn set_tone(&mut self, tone: Option<ToneGuard>) {
        self.tone = tone;
    }

    pub(crate) fn stop_tone(&mut self) {
        self.tone = None;
    }

    pub(crate) fn set_stream(&mut self, stream: StreamGuard) {
        self.stream = Some(stream);
    }

    pub(crate) fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_transferred(&mut self) {
        self.transferred = true;
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        if let Some(stream) = &self.stream {
            stream.set_microphone_enabled(!muted);
        }
        self.muted = muted;
    }

    /// Release audio and stamp the end time, returning what happened
    pub(crate) fn finish(&mut self) -> CallSummary {
        self.tone = None;
        self.stream = None;
        let ended_at = Utc::now();
        self.ended_at = Some(ended_at);
        CallSummary {
            call_id: self.id,
            direction: self.direction,
            remote_number: self.remote_number.clone(),
            remote_contact: self.remote_contact.clone(),
            started_at: self.started_at,
            ended_at,
        }
    }
}

/// Record of a finished call handed to the panel and call history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub remote_number: String,
    pub remote_contact: Option<RemoteContact>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
}

impl CallSummary {
    /// Talk time; zero for calls that never connected
    pub fn duration(&self) -> ChronoDuration {
        self.started_at
            .map(|started| self.ended_at - started)
            .unwrap_or_else(ChronoDuration::zero)
    }
}
