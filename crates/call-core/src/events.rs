//! Typed messages crossing the call-core boundary
//!
//! - [`TransportEvent`]: what the signalling client reports
//! - [`CallNotification`]: what the manager tells the panel
//! - [`CallCommand`]: what the panel asks the manager to do
//!
//! Notifications are delivered through a [`NotificationStream`], an unbounded
//! channel drained by the composition root after every turn.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::number::DtmfDigit;
use crate::session::{CallDirection, CallId, CallState, CallSummary, RemoteContact};

/// Events raised by the signalling transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEvent {
    /// A remote party proposes a new call
    InviteReceived {
        call_id: CallId,
        number: String,
        display_name: Option<String>,
    },
    /// Provisional response to our invite
    Progress { call_id: CallId, status_code: u16 },
    /// The remote party answered our invite
    Accepted { call_id: CallId },
    /// The remote party refused our invite
    Rejected { call_id: CallId, status_code: u16 },
    /// The established call was ended remotely
    Bye { call_id: CallId },
    /// The caller gave up before we answered
    Cancel { call_id: CallId },
    /// Our cancel went through
    CancelConfirmed { call_id: CallId },
    /// Our reject went through
    RejectConfirmed { call_id: CallId },
    /// Registration with the server succeeded
    Registered,
    /// Registration failed; `recoverable` failures are retried with backoff
    RegistrationFailed { reason: String, recoverable: bool },
    /// Outcome of the microphone permission prompt
    MicrophonePermission { granted: bool },
    /// Unrecoverable transport error, optionally tied to a call
    TransportError { call_id: Option<CallId>, message: String },
}

impl TransportEvent {
    /// Call the event refers to, for call-scoped events
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            Self::InviteReceived { call_id, .. }
            | Self::Progress { call_id, .. }
            | Self::Accepted { call_id }
            | Self::Rejected { call_id, .. }
            | Self::Bye { call_id }
            | Self::Cancel { call_id }
            | Self::CancelConfirmed { call_id }
            | Self::RejectConfirmed { call_id } => Some(*call_id),
            Self::TransportError { call_id, .. } => *call_id,
            Self::Registered
            | Self::RegistrationFailed { .. }
            | Self::MicrophonePermission { .. } => None,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::InviteReceived { .. } => "invite-received",
            Self::Progress { .. } => "progress",
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Bye { .. } => "bye",
            Self::Cancel { .. } => "cancel",
            Self::CancelConfirmed { .. } => "cancel-confirmed",
            Self::RejectConfirmed { .. } => "reject-confirmed",
            Self::Registered => "registered",
            Self::RegistrationFailed { .. } => "registration-failed",
            Self::MicrophonePermission { .. } => "microphone-permission",
            Self::TransportError { .. } => "transport-error",
        }
    }
}

/// How a blocking error overlay behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Informational while (re)connecting; clears on success
    Connecting,
    /// The user dismisses it
    Temporary,
    /// Stays until the condition is resolved externally
    Persistent,
}

/// Transient, toast-style messages for misuse of user commands
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserNotice {
    /// A call was requested while another one is in progress
    AlreadyInCall,
    /// A call was requested without a number
    EmptyNumber,
    /// The microphone permission was refused
    MicrophoneDenied,
    /// An in-call action was requested without an established call
    NotInCall,
    /// A keypad key that is not a DTMF tone
    InvalidKey(char),
    /// A transfer was requested while one is already under way
    TransferPending,
}

impl UserNotice {
    /// Text shown to the user
    pub fn message(&self) -> String {
        match self {
            Self::AlreadyInCall => "You are already in a call".to_string(),
            Self::EmptyNumber => "The phone number is missing".to_string(),
            Self::MicrophoneDenied => "Access to the microphone was denied".to_string(),
            Self::NotInCall => "There is no call in progress".to_string(),
            Self::InvalidKey(key) => format!("{:?} cannot be sent as a tone", key),
            Self::TransferPending => "The call is already being transferred".to_string(),
        }
    }
}

/// Notifications emitted by the manager for the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallNotification {
    /// An inbound call is ringing
    IncomingCall {
        call_id: CallId,
        number: String,
        contact: Option<RemoteContact>,
    },
    /// The session moved from one state to another
    ChangeStatus {
        call_id: CallId,
        previous: CallState,
        current: CallState,
        direction: CallDirection,
        remote_number: String,
    },
    /// Provisional progress on our outbound invite
    Progress { call_id: CallId, status_code: u16 },
    /// The call is established
    Accepted { call_id: CallId, direction: CallDirection },
    /// The established call ended
    Bye { summary: CallSummary, initiated_locally: bool },
    /// An inbound call ended before being answered (missed)
    CancelIncoming { summary: CallSummary },
    /// Our outbound call was canceled before being answered
    CancelOutgoing { summary: CallSummary },
    /// The callee is busy or unreachable
    CustomerUnavailable { summary: CallSummary, status_code: u16 },
    /// The call was rejected (by the remote party or by us)
    Rejected { summary: CallSummary, status_code: Option<u16> },
    /// A blocking error for the overlay
    Error { message: String, kind: ErrorKind },
    /// The condition behind the last error went away
    ErrorResolved,
    /// The call was handed to another number
    Transferred { call_id: CallId, target: String, automatic: bool },
    /// Microphone track toggled
    MuteChanged { call_id: CallId, muted: bool },
    /// Transient toast
    Notice(UserNotice),
}

/// Commands the panel routes to the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallCommand {
    MakeCall { number: String },
    AcceptIncoming,
    RejectIncoming,
    Hangup,
    SendDtmf(DtmfDigit),
    Transfer { number: String },
    Mute,
    Unmute,
}

/// Receiving end of the manager's notifications
#[derive(Debug)]
pub struct NotificationStream {
    rx: mpsc::UnboundedReceiver<CallNotification>,
}

impl NotificationStream {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<CallNotification>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next notification, waiting if none is queued
    pub async fn recv(&mut self) -> Option<CallNotification> {
        self.rx.recv().await
    }

    /// Next queued notification without waiting
    pub fn try_next(&mut self) -> Option<CallNotification> {
        self.rx.try_recv().ok()
    }

    /// All queued notifications
    pub fn drain(&mut self) -> Vec<CallNotification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            drained.push(notification);
        }
        drained
    }
}

impl Stream for NotificationStream {
    type Item = CallNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
