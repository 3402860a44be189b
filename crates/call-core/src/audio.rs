//! Audio device seam and scoped audio resources
//!
//! The speaker and microphone belong to the active call for its lifetime. The
//! manager never calls the stop/detach side of [`AudioDevice`] by hand: it
//! holds a [`ToneGuard`] or [`StreamGuard`] inside the call session and the
//! guard releases the resource when dropped, so every path back to `NoCall`
//! releases audio.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CallResult;
use crate::session::CallId;

/// Tones played while a call is being set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tone {
    /// Heard by the caller while the remote phone rings
    Ringback,
    /// Heard by the callee while an inbound call is waiting
    IncomingRing,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ringback => write!(f, "ringback"),
            Self::IncomingRing => write!(f, "incoming-ring"),
        }
    }
}

/// Platform audio (speaker, microphone, tone player)
pub trait AudioDevice: Send + Sync {
    /// Start looping a tone
    fn play_tone(&self, tone: Tone) -> CallResult<()>;

    /// Stop a tone started with [`play_tone`](Self::play_tone)
    fn stop_tone(&self, tone: Tone);

    /// Connect the call's media stream to speaker and microphone
    fn attach_stream(&self, call_id: CallId) -> CallResult<()>;

    /// Disconnect the call's media stream
    fn detach_stream(&self, call_id: CallId);

    /// Enable or disable the outgoing microphone track
    fn set_microphone_enabled(&self, call_id: CallId, enabled: bool);
}

/// A playing tone, stopped on drop
pub struct ToneGuard {
    device: Arc<dyn AudioDevice>,
    tone: Tone,
}

impl ToneGuard {
    /// Start `tone`; a device that cannot play it yields `None` and the call
    /// proceeds silently
    pub fn start(device: &Arc<dyn AudioDevice>, tone: Tone) -> Option<Self> {
        match device.play_tone(tone) {
            Ok(()) => Some(Self {
                device: Arc::clone(device),
                tone,
            }),
            Err(e) => {
                warn!(%tone, error = %e, "Could not play tone");
                None
            }
        }
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }
}

impl Drop for ToneGuard {
    fn drop(&mut self) {
        debug!(tone = %self.tone, "Stopping tone");
        self.device.stop_tone(self.tone);
    }
}

impl fmt::Debug for ToneGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToneGuard").field("tone", &self.tone).finish()
    }
}

/// An attached media stream, detached on drop
pub struct StreamGuard {
    device: Arc<dyn AudioDevice>,
    call_id: CallId,
}

impl StreamGuard {
    pub fn attach(device: &Arc<dyn AudioDevice>, call_id: CallId) -> CallResult<Self> {
        device.attach_stream(call_id)?;
        Ok(Self {
            device: Arc::clone(device),
            call_id,
        })
    }

    pub fn set_microphone_enabled(&self, enabled: bool) {
        self.device.set_microphone_enabled(self.call_id, enabled);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!(call_id = %self.call_id, "Detaching media stream");
        self.device.detach_stream(self.call_id);
    }
}

impl fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGuard").field("call_id", &self.call_id).finish()
    }
}

/// Audio device that only logs; used by the demo runtime and headless setups
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioDevice;

impl AudioDevice for NullAudioDevice {
    fn play_tone(&self, tone: Tone) -> CallResult<()> {
        debug!(%tone, "play tone (null device)");
        Ok(())
    }

    fn stop_tone(&self, tone: Tone) {
        debug!(%tone, "stop tone (null device)");
    }

    fn attach_stream(&self, call_id: CallId) -> CallResult<()> {
        debug!(%call_id, "attach stream (null device)");
        Ok(())
    }

    fn detach_stream(&self, call_id: CallId) {
        debug!(%call_id, "detach stream (null device)");
    }

    fn set_microphone_enabled(&self, call_id: CallId, enabled: bool) {
        debug!(%call_id, enabled, "microphone (null device)");
    }
}
