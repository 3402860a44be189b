//! Transport-call state machine
//!
//! [`CallSessionManager`] owns the single [`CallSession`] and is the only
//! place its state changes. It accepts two kinds of input:
//!
//! - user commands (`make_call`, `hangup`, ...), usually routed from the panel
//!   as [`CallCommand`]s
//! - [`TransportEvent`]s reported by the signalling client
//!
//! and reports every outcome as a [`CallNotification`].
//!
//! # State graph
//!
//! ```text
//!            make_call / invite received
//!   NoCall ─────────────────────────────► Ringing
//!     ▲                                    │  │  │
//!     │  bye / hangup        accepted      │  │  │ hangup (outbound)
//!     ├────────────── Ongoing ◄────────────┘  │  ▼
//!     │                                        │  Canceling ──confirmed──► NoCall
//!     │  rejected / caller cancel              │
//!     ├────────────────────────────────────────┘ reject (inbound)
//!     │                                           ▼
//!     └────────────── confirmed ────────────── Rejecting
//! ```
//!
//! Every handler checks the current state (and, for call-scoped events, the
//! call id) before acting. Events that do not apply are dropped, which makes
//! late or duplicated transport callbacks harmless.
//!
//! Transport and audio failures never surface as `Err`: they end the call and
//! become a [`CallNotification::Error`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{AudioDevice, StreamGuard, Tone, ToneGuard};
use crate::config::CallConfig;
use crate::contacts::{resolve_contact, ContactDirectory};
use crate::error::CallError;
use crate::events::{
    CallCommand, CallNotification, ErrorKind, NotificationStream, TransportEvent, UserNotice,
};
use crate::number::{normalize_number, DtmfDigit};
use crate::recovery::RegistrationBackoff;
use crate::session::{CallDirection, CallId, CallSession, CallState, CallSummary};
use crate::transport::{CallTransport, RejectReason};

/// Status codes reported as "customer unavailable" rather than "rejected"
const UNAVAILABLE_STATUS_CODES: [u16; 3] = [480, 486, 600];

/// Owner of the call session and its transitions
pub struct CallSessionManager {
    config: CallConfig,
    transport: Arc<dyn CallTransport>,
    audio: Arc<dyn AudioDevice>,
    contacts: Arc<dyn ContactDirectory>,
    session: CallSession,
    registration: RegistrationBackoff,
    connection_error_shown: bool,
    last_error: Option<String>,
    notifications: mpsc::UnboundedSender<CallNotification>,
}

impl CallSessionManager {
    /// Build a manager around injected collaborators
    ///
    /// Returns the manager and the stream its notifications are delivered on.
    pub fn new(
        config: CallConfig,
        transport: Arc<dyn CallTransport>,
        audio: Arc<dyn AudioDevice>,
        contacts: Arc<dyn ContactDirectory>,
    ) -> (Self, NotificationStream) {
        let (notifications, stream) = NotificationStream::channel();
        info!(transport = transport.name(), "Call session manager created");
        let manager = Self {
            registration: RegistrationBackoff::new(config.registration_retry.clone()),
            config,
            transport,
            audio,
            contacts,
            session: CallSession::idle(),
            connection_error_shown: false,
            last_error: None,
            notifications,
        };
        (manager, stream)
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Read-only view of the current session
    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn state(&self) -> CallState {
        self.session.state()
    }

    /// Message of the error that last ended a call or connection, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Delay before the next registration attempt, if a failure asked for one
    pub fn take_registration_retry(&mut self) -> Option<Duration> {
        self.registration.take_pending_retry()
    }

    /// Whether registration is failing and a scheduled retry should still run
    pub fn is_retrying_registration(&self) -> bool {
        self.registration.is_retrying()
    }

    /// Route a panel command to the matching operation
    pub fn apply(&mut self, command: CallCommand) {
        match command {
            CallCommand::MakeCall { number } => self.make_call(&number),
            CallCommand::AcceptIncoming => self.accept_incoming_call(),
            CallCommand::RejectIncoming => self.reject_incoming_call(),
            CallCommand::Hangup => self.hangup(),
            CallCommand::SendDtmf(digit) => self.send_dtmf(digit),
            CallCommand::Transfer { number } => self.transfer(&number),
            CallCommand::Mute => self.mute(),
            CallCommand::Unmute => self.unmute(),
        }
    }

    // ===== USER COMMANDS =====

    /// Register with the signalling server
    pub fn register(&mut self) {
        if let Err(e) = self.transport.register() {
            self.on_registration_failed(e.to_string(), e.is_recoverable());
        }
    }

    /// Place an outbound call
    pub fn make_call(&mut self, number: &str) {
        if self.session.state().is_in_call() {
            info!(state = %self.session.state(), "Refusing to call while a call is in progress");
            self.notify(CallNotification::Notice(UserNotice::AlreadyInCall));
            return;
        }
        let number = normalize_number(number);
        if number.is_empty() {
            self.notify(CallNotification::Notice(UserNotice::EmptyNumber));
            return;
        }

        let call_id = Uuid::new_v4();
        info!(%call_id, number = %number, "Placing outbound call");
        self.last_error = None;
        self.session = CallSession::ringing(call_id, CallDirection::Outbound, number.clone());
        self.emit_status(CallState::NoCall);

        if let Err(e) = self.transport.invite(call_id, &number) {
            self.fail_call(e);
            return;
        }
        self.session.set_tone(ToneGuard::start(&self.audio, Tone::Ringback));
    }

    /// Answer the ringing inbound call
    pub fn accept_incoming_call(&mut self) {
        if !self.is_ringing(CallDirection::Inbound) {
            debug!(state = %self.session.state(), "No inbound call to accept");
            return;
        }
        let call_id = self.session.id();
        self.session.stop_tone();
        if let Err(e) = self.transport.accept(call_id) {
            self.fail_call(e);
            return;
        }
        self.establish();
    }

    /// Decline the ringing inbound call
    pub fn reject_incoming_call(&mut self) {
        if !self.is_ringing(CallDirection::Inbound) {
            debug!(state = %self.session.state(), "No inbound call to reject");
            return;
        }
        let call_id = self.session.id();
        self.session.stop_tone();
        if let Err(e) = self.transport.reject(call_id, RejectReason::Declined) {
            self.fail_call(e);
            return;
        }
        self.transition(CallState::Rejecting);
    }

    /// End, cancel or decline whatever call is in progress
    ///
    /// Idempotent: while a cancel or reject is awaiting confirmation, or with
    /// no call at all, nothing happens.
    pub fn hangup(&mut self) {
        match (self.session.state(), self.session.direction()) {
            (CallState::Ringing, CallDirection::Outbound) => {
                let call_id = self.session.id();
                self.session.stop_tone();
                if let Err(e) = self.transport.cancel(call_id) {
                    self.fail_call(e);
                    return;
                }
                self.transition(CallState::Canceling);
            }
            (CallState::Ringing, CallDirection::Inbound) => self.reject_incoming_call(),
            (CallState::Ongoing, _) => {
                let call_id = self.session.id();
                if let Err(e) = self.transport.bye(call_id) {
                    warn!(%call_id, error = %e, "Failed to send bye, ending the call locally");
                }
                self.close_session(|summary| {
                    Some(CallNotification::Bye {
                        summary,
                        initiated_locally: true,
                    })
                });
            }
            (state, _) => debug!(%state, "Hangup ignored"),
        }
    }

    /// Send one keypad tone on the established call
    pub fn send_dtmf(&mut self, digit: DtmfDigit) {
        if self.session.state() != CallState::Ongoing {
            debug!(
                %digit,
                state = %self.session.state(),
                "DTMF ignored outside an established call"
            );
            return;
        }
        if let Err(e) = self.transport.send_dtmf(self.session.id(), digit) {
            warn!(%digit, error = %e, "Failed to send DTMF");
            self.report_error(e.to_string(), ErrorKind::Temporary);
        }
    }

    /// Hand the established call to another number
    pub fn transfer(&mut self, number: &str) {
        if self.session.state() != CallState::Ongoing {
            debug!(state = %self.session.state(), "Transfer ignored outside an established call");
            return;
        }
        let target = normalize_number(number);
        if target.is_empty() {
            self.notify(CallNotification::Notice(UserNotice::EmptyNumber));
            return;
        }
        if self.session.was_transferred() {
            self.notify(CallNotification::Notice(UserNotice::TransferPending));
            return;
        }
        self.dispatch_transfer(target, false);
    }

    pub fn mute(&mut self) {
        self.set_muted(true);
    }

    pub fn unmute(&mut self) {
        self.set_muted(false);
    }

    fn set_muted(&mut self, muted: bool) {
        if self.session.state() != CallState::Ongoing || self.session.is_muted() == muted {
            return;
        }
        self.session.set_muted(muted);
        self.notify(CallNotification::MuteChanged {
            call_id: self.session.id(),
            muted,
        });
    }

    // ===== TRANSPORT EVENTS =====

    /// Apply one event reported by the transport
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        debug!(event = event.name(), state = %self.session.state(), "Transport event");
        match event {
            TransportEvent::InviteReceived {
                call_id,
                number,
                display_name,
            } => self.on_invite(call_id, number, display_name).await,

            TransportEvent::Progress { call_id, status_code }
                if self.is_current(call_id, CallState::Ringing, Some(CallDirection::Outbound)) =>
            {
                self.notify(CallNotification::Progress { call_id, status_code });
            }

            TransportEvent::Accepted { call_id }
                if self.is_current(call_id, CallState::Ringing, Some(CallDirection::Outbound)) =>
            {
                if self.establish() {
                    self.apply_always_transfer();
                }
            }

            TransportEvent::Rejected { call_id, status_code }
                if self.is_current(call_id, CallState::Ringing, Some(CallDirection::Outbound)) =>
            {
                info!(%call_id, status_code, "Outbound call refused");
                self.close_session(|summary| {
                    Some(if UNAVAILABLE_STATUS_CODES.contains(&status_code) {
                        CallNotification::CustomerUnavailable { summary, status_code }
                    } else {
                        CallNotification::Rejected {
                            summary,
                            status_code: Some(status_code),
                        }
                    })
                });
            }

            TransportEvent::Bye { call_id }
                if self.is_current(call_id, CallState::Ongoing, None) =>
            {
                info!(%call_id, "Call ended by the remote party");
                self.close_session(|summary| {
                    Some(CallNotification::Bye {
                        summary,
                        initiated_locally: false,
                    })
                });
            }

            TransportEvent::Cancel { call_id }
                if self.is_current(call_id, CallState::Ringing, Some(CallDirection::Inbound)) =>
            {
                info!(%call_id, "Caller canceled before answer");
                self.session.stop_tone();
                self.transition(CallState::Canceling);
                self.close_session(|summary| Some(CallNotification::CancelIncoming { summary }));
            }

            TransportEvent::CancelConfirmed { call_id }
                if self.is_current(call_id, CallState::Canceling, None) =>
            {
                self.close_session(|summary| {
                    Some(match summary.direction {
                        CallDirection::Outbound => CallNotification::CancelOutgoing { summary },
                        CallDirection::Inbound => CallNotification::CancelIncoming { summary },
                    })
                });
            }

            TransportEvent::RejectConfirmed { call_id }
                if self.is_current(call_id, CallState::Rejecting, None) =>
            {
                self.close_session(|summary| {
                    Some(CallNotification::Rejected {
                        summary,
                        status_code: Some(RejectReason::Declined.status_code()),
                    })
                });
            }

            TransportEvent::Registered => {
                info!("Registered with the signalling server");
                self.registration.reset();
                if std::mem::take(&mut self.connection_error_shown) {
                    self.last_error = None;
                    self.notify(CallNotification::ErrorResolved);
                }
            }

            TransportEvent::RegistrationFailed { reason, recoverable } => {
                self.on_registration_failed(reason, recoverable);
            }

            TransportEvent::MicrophonePermission { granted: true } => {
                debug!("Microphone access granted");
            }

            TransportEvent::MicrophonePermission { granted: false } => self.on_microphone_denied(),

            TransportEvent::TransportError { call_id, message } => {
                self.on_transport_error(call_id, message)
            }

            other => {
                debug!(
                    event = other.name(),
                    call_id = ?other.call_id(),
                    state = %self.session.state(),
                    "Dropping event that does not apply to the current call"
                );
            }
        }
    }

    async fn on_invite(&mut self, call_id: CallId, number: String, display_name: Option<String>) {
        let number = normalize_number(&number);
        if self.session.state().is_in_call() {
            info!(%call_id, number = %number, "Busy, rejecting concurrent invite");
            if let Err(e) = self.transport.reject(call_id, RejectReason::Busy) {
                warn!(%call_id, error = %e, "Failed to reject concurrent invite");
            }
            return;
        }

        let contact = resolve_contact(
            self.contacts.as_ref(),
            &number,
            self.config.country_code.as_deref(),
        )
        .await;
        info!(
            %call_id,
            number = %number,
            display_name = ?display_name,
            contact_id = ?contact.as_ref().map(|c| c.id),
            "Incoming call"
        );

        self.last_error = None;
        self.session = CallSession::ringing(call_id, CallDirection::Inbound, number.clone());
        if let Some(contact) = contact {
            self.session.assign_contact(contact);
        }
        self.emit_status(CallState::NoCall);
        self.session.set_tone(ToneGuard::start(&self.audio, Tone::IncomingRing));
        self.notify(CallNotification::IncomingCall {
            call_id,
            number,
            contact: self.session.remote_contact().cloned(),
        });
    }

    fn on_registration_failed(&mut self, reason: String, recoverable: bool) {
        self.connection_error_shown = true;
        if recoverable {
            let delay = self.registration.record_failure();
            self.report_error(
                format!(
                    "Trying to connect to the server ({}), next attempt in {}s",
                    reason,
                    delay.as_secs()
                ),
                ErrorKind::Connecting,
            );
        } else {
            error!(%reason, "Registration failed permanently");
            self.registration.abandon();
            self.report_error(format!("Registration failed: {}", reason), ErrorKind::Persistent);
        }
    }

    fn on_microphone_denied(&mut self) {
        warn!(state = %self.session.state(), "Microphone access denied");
        let call_id = self.session.id();
        let dispatched = match (self.session.state(), self.session.direction()) {
            (CallState::Ringing, CallDirection::Inbound) => {
                Some(self.transport.reject(call_id, RejectReason::MediaUnavailable))
            }
            (CallState::Ringing, CallDirection::Outbound) => Some(self.transport.cancel(call_id)),
            (CallState::Ongoing, _) => Some(self.transport.bye(call_id)),
            // Cancel or reject already sent; its confirmation will be stale
            (CallState::Canceling | CallState::Rejecting, _) => Some(Ok(())),
            (CallState::NoCall, _) => None,
        };

        self.notify(CallNotification::Notice(UserNotice::MicrophoneDenied));
        let Some(result) = dispatched else {
            return;
        };
        if let Err(e) = result {
            warn!(%call_id, error = %e, "Failed to end call after microphone denial");
        }
        self.close_session(|_| None);
        self.report_error(CallError::MicrophoneDenied.to_string(), ErrorKind::Temporary);
    }

    fn on_transport_error(&mut self, call_id: Option<CallId>, message: String) {
        match call_id {
            Some(id) if !self.session.matches(id) => {
                debug!(call_id = %id, "Dropping transport error for a call that is gone");
            }
            Some(_) => self.fail_call(CallError::transport(message)),
            None => {
                error!(%message, "Transport error");
                if self.session.state().is_in_call() {
                    self.close_session(|_| None);
                }
                self.connection_error_shown = true;
                self.report_error(message, ErrorKind::Persistent);
            }
        }
    }

    // ===== HELPERS =====

    fn is_ringing(&self, direction: CallDirection) -> bool {
        self.session.state() == CallState::Ringing && self.session.direction() == direction
    }

    fn is_current(
        &self,
        call_id: CallId,
        state: CallState,
        direction: Option<CallDirection>,
    ) -> bool {
        self.session.matches(call_id)
            && self.session.state() == state
            && direction.map_or(true, |d| self.session.direction() == d)
    }

    /// Move a ringing call to Ongoing; returns false if the call had to be dropped
    fn establish(&mut self) -> bool {
        let call_id = self.session.id();
        self.session.stop_tone();
        match StreamGuard::attach(&self.audio, call_id) {
            Ok(stream) => self.session.set_stream(stream),
            Err(e) => {
                if let Err(bye_error) = self.transport.bye(call_id) {
                    warn!(%call_id, error = %bye_error, "Failed to send bye after audio failure");
                }
                self.fail_call(e);
                return false;
            }
        }
        self.session.mark_started();
        self.transition(CallState::Ongoing);
        self.notify(CallNotification::Accepted {
            call_id,
            direction: self.session.direction(),
        });
        true
    }

    fn apply_always_transfer(&mut self) {
        if self.session.direction() != CallDirection::Outbound || self.session.was_transferred() {
            return;
        }
        if let Some(target) = self.config.always_transfer_target() {
            info!(
                call_id = %self.session.id(),
                target = %target,
                "Forwarding answered call to external device"
            );
            self.dispatch_transfer(target, true);
        }
    }

    fn dispatch_transfer(&mut self, target: String, automatic: bool) {
        let call_id = self.session.id();
        if let Err(e) = self.transport.transfer(call_id, &target, self.config.transfer_mode) {
            warn!(%call_id, error = %e, "Transfer failed");
            self.report_error(e.to_string(), ErrorKind::Temporary);
            return;
        }
        self.session.mark_transferred();
        self.notify(CallNotification::Transferred {
            call_id,
            target,
            automatic,
        });
    }

    fn transition(&mut self, to: CallState) {
        let from = self.session.state();
        self.session.set_state(to);
        self.emit_status(from);
    }

    fn emit_status(&self, previous: CallState) {
        let current = self.session.state();
        info!(call_id = %self.session.id(), from = %previous, to = %current, "Call state changed");
        self.notify(CallNotification::ChangeStatus {
            call_id: self.session.id(),
            previous,
            current,
            direction: self.session.direction(),
            remote_number: self.session.remote_number().to_string(),
        });
    }

    /// Release the session's audio, reset to NoCall and report the outcome
    ///
    /// `terminal` builds the notification describing how the call ended; it
    /// is emitted before the final status change.
    fn close_session<F>(&mut self, terminal: F)
    where
        F: FnOnce(CallSummary) -> Option<CallNotification>,
    {
        let previous = self.session.state();
        let summary = self.session.finish();
        self.session = CallSession::idle();
        info!(
            call_id = %summary.call_id,
            from = %previous,
            duration_secs = summary.duration().num_seconds(),
            "Call session closed"
        );

        let status = CallNotification::ChangeStatus {
            call_id: summary.call_id,
            previous,
            current: CallState::NoCall,
            direction: summary.direction,
            remote_number: summary.remote_number.clone(),
        };
        if let Some(notification) = terminal(summary) {
            self.notify(notification);
        }
        self.notify(status);
    }

    /// End the current call because of an unrecoverable error
    fn fail_call(&mut self, error: CallError) {
        error!(
            call_id = %self.session.id(),
            state = %self.session.state(),
            error = %error,
            category = error.category(),
            "Call failed"
        );
        if self.session.state().is_in_call() {
            self.close_session(|_| None);
        }
        self.report_error(error.to_string(), ErrorKind::Temporary);
    }

    fn report_error(&mut self, message: String, kind: ErrorKind) {
        self.last_error = Some(message.clone());
        self.notify(CallNotification::Error { message, kind });
    }

    fn notify(&self, notification: CallNotification) {
        if self.notifications.send(notification).is_err() {
            debug!("Notification stream dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferMode;
    use crate::contacts::{Contact, InMemoryContacts};
    use crate::test_support::{RecordingAudio, RecordingTransport, TransportCall};
    use tracing_test::traced_test;

    struct Harness {
        manager: CallSessionManager,
        stream: NotificationStream,
        transport: RecordingTransport,
        audio: RecordingAudio,
    }

    fn harness_with(config: CallConfig, contacts: Vec<Contact>) -> Harness {
        let transport = RecordingTransport::new();
        let audio = RecordingAudio::new();
        let (manager, stream) = CallSessionManager::new(
            config,
            Arc::new(transport.clone()),
            Arc::new(audio.clone()),
            Arc::new(InMemoryContacts::new(contacts)),
        );
        Harness {
            manager,
            stream,
            transport,
            audio,
        }
    }

    fn harness() -> Harness {
        harness_with(CallConfig::default(), Vec::new())
    }

    impl Harness {
        async fn ongoing_outbound(&mut self) -> CallId {
            self.manager.make_call("101");
            let call_id = self.manager.session().id();
            self.manager
                .handle_transport_event(TransportEvent::Accepted { call_id })
                .await;
            assert_eq!(self.manager.state(), CallState::Ongoing);
            self.stream.drain();
            self.transport.clear();
            call_id
        }
    }

    #[test]
    fn test_make_call_normalizes_and_rings() {
        let mut h = harness();
        h.manager.make_call("+1 555-0100");

        assert_eq!(h.manager.state(), CallState::Ringing);
        assert_eq!(h.manager.session().remote_number(), "+15550100");
        assert_eq!(h.manager.session().direction(), CallDirection::Outbound);
        assert!(h.audio.is_playing(Tone::Ringback));
        assert_eq!(
            h.transport.calls(),
            vec![TransportCall::Invite {
                call_id: h.manager.session().id(),
                number: "+15550100".into()
            }]
        );
    }

    #[test]
    fn test_make_call_while_busy_only_notifies() {
        let mut h = harness();
        h.manager.make_call("101");
        let call_id = h.manager.session().id();
        h.stream.drain();

        h.manager.make_call("102");

        assert_eq!(h.manager.state(), CallState::Ringing);
        assert_eq!(h.manager.session().id(), call_id);
        assert_eq!(h.stream.drain(), vec![CallNotification::Notice(UserNotice::AlreadyInCall)]);
        assert_eq!(h.transport.calls().len(), 1);
    }

    #[test]
    fn test_empty_number_is_refused() {
        let mut h = harness();
        h.manager.make_call(" - / ");
        assert_eq!(h.manager.state(), CallState::NoCall);
        assert_eq!(h.stream.drain(), vec![CallNotification::Notice(UserNotice::EmptyNumber)]);
        assert!(h.transport.calls().is_empty());
    }

    #[test]
    fn test_failed_invite_ends_with_error() {
        let mut h = harness();
        h.transport.fail_with("socket closed");
        h.manager.make_call("101");

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.audio.is_released());
        assert_eq!(h.manager.last_error(), Some("Transport failure: socket closed"));
        let notifications = h.stream.drain();
        assert!(matches!(
            notifications.last(),
            Some(CallNotification::Error { kind: ErrorKind::Temporary, .. })
        ));
    }

    #[tokio::test]
    async fn test_hangup_from_ongoing_releases_audio_once() {
        let mut h = harness();
        let call_id = h.ongoing_outbound().await;
        assert_eq!(h.audio.active_streams(), 1);

        h.manager.hangup();
        h.manager.hangup();

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.audio.is_released());
        assert_eq!(h.transport.calls(), vec![TransportCall::Bye { call_id }]);
        let byes = h
            .stream
            .drain()
            .into_iter()
            .filter(|n| matches!(n, CallNotification::Bye { .. }))
            .count();
        assert_eq!(byes, 1);
    }

    #[tokio::test]
    async fn test_outbound_cancel_waits_for_confirmation() {
        let mut h = harness();
        h.manager.make_call("101");
        let call_id = h.manager.session().id();
        h.stream.drain();

        h.manager.hangup();
        assert_eq!(h.manager.state(), CallState::Canceling);
        assert!(!h.audio.is_playing(Tone::Ringback));

        h.manager.hangup();
        let cancels = h
            .transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::Cancel { .. }))
            .count();
        assert_eq!(cancels, 1);

        h.manager
            .handle_transport_event(TransportEvent::CancelConfirmed { call_id })
            .await;
        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h
            .stream
            .drain()
            .iter()
            .any(|n| matches!(n, CallNotification::CancelOutgoing { .. })));
    }

    #[tokio::test]
    async fn test_remote_rejection_classification() {
        let mut h = harness();
        h.manager.make_call("101");
        let call_id = h.manager.session().id();
        h.manager
            .handle_transport_event(TransportEvent::Rejected { call_id, status_code: 486 })
            .await;
        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h
            .stream
            .drain()
            .iter()
            .any(|n| matches!(n, CallNotification::CustomerUnavailable { status_code: 486, .. })));

        h.manager.make_call("102");
        let call_id = h.manager.session().id();
        h.manager
            .handle_transport_event(TransportEvent::Rejected { call_id, status_code: 404 })
            .await;
        assert!(h.stream.drain().iter().any(|n| matches!(
            n,
            CallNotification::Rejected { status_code: Some(404), .. }
        )));
        assert!(h.audio.is_released());
    }

    #[tokio::test]
    async fn test_inbound_invite_resolves_contact_and_rings() {
        let mut h = harness_with(
            CallConfig::new().with_country_code("32"),
            vec![Contact::new(12, "Lotte", vec!["+32 455 12 34 56".into()])],
        );
        let call_id = Uuid::new_v4();
        h.manager
            .handle_transport_event(TransportEvent::InviteReceived {
                call_id,
                number: "0032 455 12 34 56".into(),
                display_name: None,
            })
            .await;

        assert_eq!(h.manager.state(), CallState::Ringing);
        assert_eq!(h.manager.session().direction(), CallDirection::Inbound);
        assert_eq!(h.manager.session().remote_contact_id(), Some(12));
        assert!(h.audio.is_playing(Tone::IncomingRing));
        let notifications = h.stream.drain();
        assert!(notifications.iter().any(|n| matches!(
            n,
            CallNotification::IncomingCall { number, contact: Some(c), .. }
                if number == "0032455123456" && c.id == 12
        )));
    }

    #[tokio::test]
    async fn test_concurrent_invite_is_rejected_busy() {
        let mut h = harness();
        let first = h.ongoing_outbound().await;
        let second = Uuid::new_v4();

        h.manager
            .handle_transport_event(TransportEvent::InviteReceived {
                call_id: second,
                number: "202".into(),
                display_name: None,
            })
            .await;

        assert_eq!(h.manager.session().id(), first);
        assert_eq!(h.manager.state(), CallState::Ongoing);
        assert_eq!(
            h.transport.calls(),
            vec![TransportCall::Reject {
                call_id: second,
                reason: RejectReason::Busy
            }]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stale_events_are_dropped() {
        let mut h = harness();
        let call_id = h.ongoing_outbound().await;
        h.manager.handle_transport_event(TransportEvent::Bye { call_id }).await;
        h.stream.drain();

        h.manager
            .handle_transport_event(TransportEvent::Rejected { call_id, status_code: 603 })
            .await;
        h.manager.handle_transport_event(TransportEvent::Accepted { call_id }).await;
        h.manager.handle_transport_event(TransportEvent::Bye { call_id }).await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.stream.drain().is_empty());
        assert!(logs_contain("Dropping event that does not apply to the current call"));
    }

    #[tokio::test]
    async fn test_events_for_another_call_are_ignored() {
        let mut h = harness();
        h.manager.make_call("101");
        h.stream.drain();

        h.manager
            .handle_transport_event(TransportEvent::Accepted { call_id: Uuid::new_v4() })
            .await;

        assert_eq!(h.manager.state(), CallState::Ringing);
        assert!(h.stream.drain().is_empty());
    }

    #[test]
    fn test_in_call_commands_are_noops_outside_ongoing() {
        let mut h = harness();
        h.manager.send_dtmf(DtmfDigit::try_from('5').unwrap());
        h.manager.mute();
        h.manager.transfer("200");
        h.manager.accept_incoming_call();
        h.manager.reject_incoming_call();
        h.manager.hangup();

        assert!(h.transport.calls().is_empty());
        assert!(h.stream.drain().is_empty());
        assert_eq!(h.manager.state(), CallState::NoCall);
    }

    #[tokio::test]
    async fn test_mute_toggles_track_without_transition() {
        let mut h = harness();
        let call_id = h.ongoing_outbound().await;

        h.manager.mute();
        assert_eq!(h.audio.microphone_enabled(), Some(false));
        assert!(h.manager.session().is_muted());
        h.manager.mute();
        h.manager.unmute();
        assert_eq!(h.audio.microphone_enabled(), Some(true));

        assert_eq!(h.manager.state(), CallState::Ongoing);
        assert_eq!(
            h.stream.drain(),
            vec![
                CallNotification::MuteChanged { call_id, muted: true },
                CallNotification::MuteChanged { call_id, muted: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_single_manual_transfer_per_call() {
        let config = CallConfig::new().with_transfer_mode(TransferMode::Bridge);
        let mut h = harness_with(config, Vec::new());
        let call_id = h.ongoing_outbound().await;

        h.manager.transfer("2 00");
        h.manager.transfer("300");

        assert_eq!(
            h.transport.calls(),
            vec![TransportCall::Transfer {
                call_id,
                target: "200".into(),
                mode: TransferMode::Bridge
            }]
        );
        let notifications = h.stream.drain();
        assert!(notifications.contains(&CallNotification::Notice(UserNotice::TransferPending)));
    }

    #[tokio::test]
    async fn test_always_transfer_fires_once_on_answer() {
        let mut h = harness_with(CallConfig::new().with_always_transfer("+1 555 0199"), Vec::new());
        h.manager.make_call("101");
        let call_id = h.manager.session().id();

        h.manager.handle_transport_event(TransportEvent::Accepted { call_id }).await;

        assert!(h.transport.calls().contains(&TransportCall::Transfer {
            call_id,
            target: "+15550199".into(),
            mode: h.manager.config().transfer_mode,
        }));
        assert!(h.stream.drain().iter().any(|n| matches!(
            n,
            CallNotification::Transferred { automatic: true, .. }
        )));

        h.manager.transfer("300");
        assert_eq!(h.stream.drain(), vec![CallNotification::Notice(UserNotice::TransferPending)]);
    }

    #[tokio::test]
    async fn test_audio_failure_on_answer_drops_the_call() {
        let mut h = harness();
        h.audio.fail_streams();
        h.manager.make_call("101");
        let call_id = h.manager.session().id();

        h.manager.handle_transport_event(TransportEvent::Accepted { call_id }).await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.transport.calls().contains(&TransportCall::Bye { call_id }));
        assert!(h.audio.is_released());
        assert!(h.manager.last_error().is_some());
    }

    #[tokio::test]
    async fn test_microphone_denied_rejects_inbound_call() {
        let mut h = harness();
        let call_id = Uuid::new_v4();
        h.manager
            .handle_transport_event(TransportEvent::InviteReceived {
                call_id,
                number: "101".into(),
                display_name: Some("Front desk".into()),
            })
            .await;
        h.stream.drain();

        h.manager
            .handle_transport_event(TransportEvent::MicrophonePermission { granted: false })
            .await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.audio.is_released());
        assert_eq!(
            h.transport.last_call(),
            Some(TransportCall::Reject {
                call_id,
                reason: RejectReason::MediaUnavailable
            })
        );
        let notifications = h.stream.drain();
        assert_eq!(notifications[0], CallNotification::Notice(UserNotice::MicrophoneDenied));
        assert!(matches!(
            notifications.last(),
            Some(CallNotification::Error { kind: ErrorKind::Temporary, .. })
        ));
    }

    #[tokio::test]
    async fn test_microphone_denied_cancels_outbound_call() {
        let mut h = harness();
        h.manager.make_call("101");
        let call_id = h.manager.session().id();
        h.stream.drain();

        h.manager
            .handle_transport_event(TransportEvent::MicrophonePermission { granted: false })
            .await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.audio.is_released());
        assert_eq!(h.transport.last_call(), Some(TransportCall::Cancel { call_id }));
    }

    #[tokio::test]
    async fn test_microphone_denied_ends_ongoing_call() {
        let mut h = harness();
        let call_id = h.ongoing_outbound().await;

        h.manager
            .handle_transport_event(TransportEvent::MicrophonePermission { granted: false })
            .await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.audio.is_released());
        assert_eq!(h.transport.calls(), vec![TransportCall::Bye { call_id }]);
        let notifications = h.stream.drain();
        assert!(notifications.contains(&CallNotification::Notice(UserNotice::MicrophoneDenied)));
        assert!(!notifications.iter().any(|n| matches!(n, CallNotification::Bye { .. })));
    }

    #[tokio::test]
    async fn test_microphone_denied_while_canceling_closes_the_session() {
        let mut h = harness();
        h.manager.make_call("101");
        let call_id = h.manager.session().id();
        h.manager.hangup();
        assert_eq!(h.manager.state(), CallState::Canceling);
        h.transport.clear();
        h.stream.drain();

        h.manager
            .handle_transport_event(TransportEvent::MicrophonePermission { granted: false })
            .await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.transport.calls().is_empty());
        assert!(matches!(
            h.stream.drain().last(),
            Some(CallNotification::Error { kind: ErrorKind::Temporary, .. })
        ));

        h.manager
            .handle_transport_event(TransportEvent::CancelConfirmed { call_id })
            .await;
        assert!(h.stream.drain().is_empty());
    }

    #[tokio::test]
    async fn test_microphone_denied_without_a_call_only_notifies() {
        let mut h = harness();
        h.manager
            .handle_transport_event(TransportEvent::MicrophonePermission { granted: false })
            .await;

        assert_eq!(h.manager.state(), CallState::NoCall);
        assert_eq!(
            h.stream.drain(),
            vec![CallNotification::Notice(UserNotice::MicrophoneDenied)]
        );
        assert_eq!(h.manager.last_error(), None);
    }

    #[tokio::test]
    async fn test_registration_errors_resolve_on_success() {
        let mut h = harness();
        h.manager
            .handle_transport_event(TransportEvent::RegistrationFailed {
                reason: "timeout".into(),
                recoverable: true,
            })
            .await;
        assert_eq!(h.manager.take_registration_retry(), Some(Duration::from_millis(1_000)));
        assert!(matches!(
            h.stream.try_next(),
            Some(CallNotification::Error { kind: ErrorKind::Connecting, .. })
        ));

        assert!(h.manager.is_retrying_registration());

        h.manager.handle_transport_event(TransportEvent::Registered).await;
        assert_eq!(h.stream.drain(), vec![CallNotification::ErrorResolved]);
        assert_eq!(h.manager.last_error(), None);
        assert!(!h.manager.is_retrying_registration());

        h.manager.handle_transport_event(TransportEvent::Registered).await;
        assert!(h.stream.drain().is_empty());
    }

    #[tokio::test]
    async fn test_unrecoverable_registration_failure_is_persistent() {
        let mut h = harness();
        h.manager
            .handle_transport_event(TransportEvent::RegistrationFailed {
                reason: "403 Forbidden".into(),
                recoverable: false,
            })
            .await;
        assert_eq!(h.manager.take_registration_retry(), None);
        assert!(matches!(
            h.stream.try_next(),
            Some(CallNotification::Error { kind: ErrorKind::Persistent, .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_error_for_current_call_ends_it() {
        let mut h = harness();
        let call_id = h.ongoing_outbound().await;

        h.manager
            .handle_transport_event(TransportEvent::TransportError {
                call_id: Some(Uuid::new_v4()),
                message: "stale".into(),
            })
            .await;
        assert_eq!(h.manager.state(), CallState::Ongoing);

        h.manager
            .handle_transport_event(TransportEvent::TransportError {
                call_id: Some(call_id),
                message: "malformed response".into(),
            })
            .await;
        assert_eq!(h.manager.state(), CallState::NoCall);
        assert!(h.audio.is_released());
    }
}
