//! End-to-end call lifecycles driven through the public API
//!
//! Needs the recording fakes: `cargo test --features test-utils`.
#![cfg(feature = "test-utils")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use softphone_call_core::test_support::{RecordingAudio, RecordingTransport, TransportCall};
use softphone_call_core::{
    BackoffStrategy, CallCommand, CallConfig, CallDirection, CallNotification, CallResult,
    CallSessionManager, CallState, Contact, ContactDirectory, DtmfDigit, ErrorKind,
    InMemoryContacts, NotificationStream, NumberPattern, RejectReason, RetryConfig,
    TransportEvent, UserNotice,
};
use uuid::Uuid;

/// Directory that remembers every pattern list it was asked about
#[derive(Default)]
struct LoggingDirectory {
    inner: InMemoryContacts,
    lookups: Mutex<Vec<Vec<NumberPattern>>>,
}

#[async_trait]
impl ContactDirectory for LoggingDirectory {
    async fn find_by_number(&self, patterns: &[NumberPattern]) -> CallResult<Option<Contact>> {
        self.lookups.lock().unwrap().push(patterns.to_vec());
        self.inner.find_by_number(patterns).await
    }
}

type Setup = (
    CallSessionManager,
    NotificationStream,
    RecordingTransport,
    RecordingAudio,
);

fn setup(config: CallConfig) -> Setup {
    let transport = RecordingTransport::new();
    let audio = RecordingAudio::new();
    let (manager, stream) = CallSessionManager::new(
        config,
        Arc::new(transport.clone()),
        Arc::new(audio.clone()),
        Arc::new(InMemoryContacts::default()),
    );
    (manager, stream, transport, audio)
}

fn invite(number: &str) -> (Uuid, TransportEvent) {
    let call_id = Uuid::new_v4();
    (
        call_id,
        TransportEvent::InviteReceived {
            call_id,
            number: number.to_string(),
            display_name: None,
        },
    )
}

fn statuses(notifications: &[CallNotification]) -> Vec<CallState> {
    notifications
        .iter()
        .filter_map(|n| match n {
            CallNotification::ChangeStatus { current, .. } => Some(*current),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn outbound_call_normalizes_number_and_rings() {
    let (mut manager, mut stream, transport, _audio) = setup(CallConfig::default());

    manager.make_call("+1 555-0100");

    assert_eq!(manager.state(), CallState::Ringing);
    assert_eq!(manager.session().remote_number(), "+15550100");
    assert!(matches!(
        transport.last_call(),
        Some(TransportCall::Invite { number, .. }) if number == "+15550100"
    ));
    assert_eq!(statuses(&stream.drain()), vec![CallState::Ringing]);
}

#[tokio::test]
async fn full_outbound_call_releases_audio_on_hangup() {
    let (mut manager, mut stream, transport, audio) = setup(CallConfig::default());

    manager.make_call("101");
    let call_id = manager.session().id();
    manager
        .handle_transport_event(TransportEvent::Progress { call_id, status_code: 180 })
        .await;
    manager.handle_transport_event(TransportEvent::Accepted { call_id }).await;
    assert_eq!(manager.state(), CallState::Ongoing);
    assert!(manager.session().started_at().is_some());
    assert_eq!(audio.active_streams(), 1);

    manager.hangup();
    manager.hangup();

    assert_eq!(manager.state(), CallState::NoCall);
    assert!(audio.is_released());
    let notifications = stream.drain();
    assert!(notifications.contains(&CallNotification::Progress { call_id, status_code: 180 }));
    let byes: Vec<_> = notifications
        .iter()
        .filter(|n| matches!(n, CallNotification::Bye { initiated_locally: true, .. }))
        .collect();
    assert_eq!(byes.len(), 1);
    assert_eq!(
        statuses(&notifications),
        vec![CallState::Ringing, CallState::Ongoing, CallState::NoCall]
    );
    assert_eq!(
        transport
            .calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Bye { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn inbound_lookup_tries_international_form() {
    let directory = Arc::new(LoggingDirectory::default());
    let transport = RecordingTransport::new();
    let (mut manager, _stream) = CallSessionManager::new(
        CallConfig::new().with_country_code("32"),
        Arc::new(transport),
        Arc::new(RecordingAudio::new()),
        directory.clone(),
    );

    let (_, event) = invite("0455123456");
    manager.handle_transport_event(event).await;

    let lookups = directory.lookups.lock().unwrap();
    assert!(lookups[0].contains(&NumberPattern::Exact("0455123456".into())));
    assert!(lookups[0].contains(&NumberPattern::Exact("+32455123456".into())));
    assert_eq!(lookups[1], vec![NumberPattern::EndsWith("123456".into())]);
}

#[tokio::test]
async fn rejecting_incoming_call_waits_for_confirmation() {
    let (mut manager, mut stream, transport, audio) = setup(CallConfig::default());
    let (call_id, event) = invite("101");
    manager.handle_transport_event(event).await;

    manager.reject_incoming_call();
    assert_eq!(manager.state(), CallState::Rejecting);
    assert!(audio.is_released());
    assert_eq!(
        transport.last_call(),
        Some(TransportCall::Reject {
            call_id,
            reason: RejectReason::Declined
        })
    );

    manager
        .handle_transport_event(TransportEvent::RejectConfirmed { call_id })
        .await;
    assert_eq!(manager.state(), CallState::NoCall);
    let notifications = stream.drain();
    assert!(notifications
        .iter()
        .any(|n| matches!(n, CallNotification::Rejected { .. })));
    assert_eq!(
        statuses(&notifications),
        vec![CallState::Ringing, CallState::Rejecting, CallState::NoCall]
    );
}

#[tokio::test]
async fn caller_cancel_is_a_missed_call() {
    let (mut manager, mut stream, _transport, audio) = setup(CallConfig::default());
    let (call_id, event) = invite("101");
    manager.handle_transport_event(event).await;

    manager.handle_transport_event(TransportEvent::Cancel { call_id }).await;

    assert_eq!(manager.state(), CallState::NoCall);
    assert!(audio.is_released());
    let notifications = stream.drain();
    assert!(notifications.iter().any(|n| matches!(
        n,
        CallNotification::CancelIncoming { summary } if summary.direction == CallDirection::Inbound
    )));
    assert!(!notifications
        .iter()
        .any(|n| matches!(n, CallNotification::Accepted { .. })));
}

#[tokio::test]
async fn answering_attaches_audio_and_mute_only_toggles_track() {
    let (mut manager, mut stream, transport, audio) = setup(CallConfig::default());
    let (call_id, event) = invite("101");
    manager.handle_transport_event(event).await;

    manager.apply(CallCommand::AcceptIncoming);
    assert_eq!(manager.state(), CallState::Ongoing);
    assert!(transport.calls().contains(&TransportCall::Accept { call_id }));
    stream.drain();

    manager.apply(CallCommand::Mute);
    assert_eq!(manager.state(), CallState::Ongoing);
    assert_eq!(audio.microphone_enabled(), Some(false));
    manager.apply(CallCommand::Unmute);
    assert_eq!(manager.state(), CallState::Ongoing);
    assert_eq!(audio.microphone_enabled(), Some(true));

    assert!(statuses(&stream.drain()).is_empty());
}

#[tokio::test]
async fn dtmf_only_reaches_transport_while_ongoing() {
    let (mut manager, _stream, transport, _audio) = setup(CallConfig::default());
    let digit = DtmfDigit::try_from('#').unwrap();

    manager.send_dtmf(digit);
    manager.make_call("101");
    manager.send_dtmf(digit);
    assert!(!transport
        .calls()
        .iter()
        .any(|c| matches!(c, TransportCall::SendDtmf { .. })));

    let call_id = manager.session().id();
    manager.handle_transport_event(TransportEvent::Accepted { call_id }).await;
    manager.apply(CallCommand::SendDtmf(digit));
    assert_eq!(transport.last_call(), Some(TransportCall::SendDtmf { call_id, digit }));
}

#[tokio::test]
async fn registration_backoff_is_linear_and_capped() {
    let retry = RetryConfig {
        initial_delay_ms: 1_000,
        max_delay_ms: 2_500,
        strategy: BackoffStrategy::Linear,
    };
    let (mut manager, mut stream, _transport, _audio) =
        setup(CallConfig::new().with_registration_retry(retry));

    let mut delays = Vec::new();
    for _ in 0..4 {
        manager
            .handle_transport_event(TransportEvent::RegistrationFailed {
                reason: "timeout".into(),
                recoverable: true,
            })
            .await;
        delays.push(manager.take_registration_retry());
    }

    assert_eq!(
        delays,
        vec![
            Some(Duration::from_millis(1_000)),
            Some(Duration::from_millis(2_000)),
            Some(Duration::from_millis(2_500)),
            Some(Duration::from_millis(2_500)),
        ]
    );
    assert!(stream
        .drain()
        .iter()
        .all(|n| matches!(n, CallNotification::Error { kind: ErrorKind::Connecting, .. })));
}

#[tokio::test]
async fn failed_register_dispatch_schedules_retry() {
    let (mut manager, mut stream, transport, _audio) = setup(CallConfig::default());
    transport.fail_with("network unreachable");

    manager.register();

    assert_eq!(manager.take_registration_retry(), Some(Duration::from_millis(1_000)));
    assert!(matches!(
        stream.try_next(),
        Some(CallNotification::Error { kind: ErrorKind::Connecting, .. })
    ));
}

#[tokio::test]
async fn busy_invite_leaves_current_call_alone() {
    let (mut manager, mut stream, transport, _audio) = setup(CallConfig::default());
    manager.make_call("101");
    let current = manager.session().id();
    stream.drain();

    let (second, event) = invite("202");
    manager.handle_transport_event(event).await;

    assert_eq!(manager.session().id(), current);
    assert_eq!(manager.state(), CallState::Ringing);
    assert_eq!(
        transport.last_call(),
        Some(TransportCall::Reject {
            call_id: second,
            reason: RejectReason::Busy
        })
    );
    assert!(stream.drain().is_empty());
}

#[tokio::test]
async fn late_events_from_finished_call_are_dropped() {
    let (mut manager, mut stream, _transport, _audio) = setup(CallConfig::default());
    manager.make_call("101");
    let old = manager.session().id();
    manager.hangup();
    manager
        .handle_transport_event(TransportEvent::CancelConfirmed { call_id: old })
        .await;
    manager.make_call("102");
    stream.drain();

    manager.handle_transport_event(TransportEvent::Accepted { call_id: old }).await;
    manager
        .handle_transport_event(TransportEvent::CancelConfirmed { call_id: old })
        .await;

    assert_eq!(manager.state(), CallState::Ringing);
    assert_eq!(manager.session().remote_number(), "102");
    assert!(stream.drain().is_empty());
}

#[tokio::test]
async fn connection_error_clears_on_registration() {
    let (mut manager, mut stream, _transport, _audio) = setup(CallConfig::default());

    manager
        .handle_transport_event(TransportEvent::TransportError {
            call_id: None,
            message: "websocket closed".into(),
        })
        .await;
    assert_eq!(manager.last_error(), Some("websocket closed"));
    assert_eq!(
        stream.drain(),
        vec![CallNotification::Error {
            message: "websocket closed".into(),
            kind: ErrorKind::Persistent
        }]
    );

    manager.handle_transport_event(TransportEvent::Registered).await;
    assert_eq!(stream.drain(), vec![CallNotification::ErrorResolved]);
}

#[tokio::test]
async fn refused_calls_never_leave_audio_behind() {
    let (mut manager, mut stream, _transport, audio) = setup(CallConfig::default());

    manager.apply(CallCommand::MakeCall { number: "101".into() });
    let call_id = manager.session().id();
    manager
        .handle_transport_event(TransportEvent::Rejected { call_id, status_code: 600 })
        .await;

    assert!(audio.is_released());
    assert!(stream
        .drain()
        .iter()
        .any(|n| matches!(n, CallNotification::CustomerUnavailable { status_code: 600, .. })));

    manager.apply(CallCommand::MakeCall { number: String::new() });
    assert_eq!(stream.drain(), vec![CallNotification::Notice(UserNotice::EmptyNumber)]);
}
