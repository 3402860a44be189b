//! Recording collaborators for tests
//!
//! In-memory transport and audio device that remember every call made on
//! them, so tests (in this crate and in crates built on it) can assert on
//! side effects without a network or a sound card.
//!
//! Built for this crate's unit tests and, for other crates, behind the
//! `test-utils` feature.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::{AudioDevice, Tone};
use crate::config::TransferMode;
use crate::error::{CallError, CallResult};
use crate::number::DtmfDigit;
use crate::session::CallId;
use crate::transport::{CallTransport, RejectReason};

/// One command received by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Register,
    Invite { call_id: CallId, number: String },
    Cancel { call_id: CallId },
    Accept { call_id: CallId },
    Reject { call_id: CallId, reason: RejectReason },
    Bye { call_id: CallId },
    SendDtmf { call_id: CallId, digit: DtmfDigit },
    Transfer { call_id: CallId, target: String, mode: TransferMode },
}

#[derive(Debug, Default)]
struct TransportLog {
    calls: Vec<TransportCall>,
    failure: Option<String>,
}

/// Transport that records commands instead of sending them
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransportLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following command fail with a transport error
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.lock().failure = Some(reason.into());
    }

    /// Commands received so far
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn last_call(&self) -> Option<TransportCall> {
        self.lock().calls.last().cloned()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: TransportCall) -> CallResult<()> {
        let mut log = self.lock();
        if let Some(reason) = &log.failure {
            return Err(CallError::transport(reason.clone()));
        }
        log.calls.push(call);
        Ok(())
    }
}

impl CallTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn register(&self) -> CallResult<()> {
        self.record(TransportCall::Register)
    }

    fn invite(&self, call_id: CallId, number: &str) -> CallResult<()> {
        self.record(TransportCall::Invite {
            call_id,
            number: number.to_string(),
        })
    }

    fn cancel(&self, call_id: CallId) -> CallResult<()> {
        self.record(TransportCall::Cancel { call_id })
    }

    fn accept(&self, call_id: CallId) -> CallResult<()> {
        self.record(TransportCall::Accept { call_id })
    }

    fn reject(&self, call_id: CallId, reason: RejectReason) -> CallResult<()> {
        self.record(TransportCall::Reject { call_id, reason })
    }

    fn bye(&self, call_id: CallId) -> CallResult<()> {
        self.record(TransportCall::Bye { call_id })
    }

    fn send_dtmf(&self, call_id: CallId, digit: DtmfDigit) -> CallResult<()> {
        self.record(TransportCall::SendDtmf { call_id, digit })
    }

    fn transfer(&self, call_id: CallId, target: &str, mode: TransferMode) -> CallResult<()> {
        self.record(TransportCall::Transfer {
            call_id,
            target: target.to_string(),
            mode,
        })
    }
}

#[derive(Debug, Default)]
struct AudioLog {
    tones: HashSet<Tone>,
    streams: HashSet<CallId>,
    microphone_enabled: Option<bool>,
    fail_streams: bool,
}

/// Audio device that tracks what is currently playing or attached
#[derive(Debug, Clone, Default)]
pub struct RecordingAudio {
    state: Arc<Mutex<AudioLog>>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AudioLog> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make stream attachment fail, as when the microphone is unavailable
    pub fn fail_streams(&self) {
        self.lock().fail_streams = true;
    }

    pub fn is_playing(&self, tone: Tone) -> bool {
        self.lock().tones.contains(&tone)
    }

    pub fn active_streams(&self) -> usize {
        self.lock().streams.len()
    }

    /// Whether nothing holds speaker or microphone
    pub fn is_released(&self) -> bool {
        let state = self.lock();
        state.tones.is_empty() && state.streams.is_empty()
    }

    /// Last value set on the microphone track
    pub fn microphone_enabled(&self) -> Option<bool> {
        self.lock().microphone_enabled
    }
}

impl AudioDevice for RecordingAudio {
    fn play_tone(&self, tone: Tone) -> CallResult<()> {
        self.lock().tones.insert(tone);
        Ok(())
    }

    fn stop_tone(&self, tone: Tone) {
        self.lock().tones.remove(&tone);
    }

    fn attach_stream(&self, call_id: CallId) -> CallResult<()> {
        let mut state = self.lock();
        if state.fail_streams {
            return Err(CallError::audio_device("microphone unavailable"));
        }
        state.streams.insert(call_id);
        Ok(())
    }

    fn detach_stream(&self, call_id: CallId) {
        self.lock().streams.remove(&call_id);
    }

    fn set_microphone_enabled(&self, _call_id: CallId, enabled: bool) {
        self.lock().microphone_enabled = Some(enabled);
    }
}
