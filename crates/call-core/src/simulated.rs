//! Demo-mode transport
//!
//! Replaces every network round-trip with a fixed delay and replies on the
//! same event channel a real signalling client would use, so the state graph
//! is identical in demo and live mode.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::TransferMode;
use crate::error::{CallError, CallResult};
use crate::events::TransportEvent;
use crate::number::DtmfDigit;
use crate::session::CallId;
use crate::transport::{CallTransport, RejectReason};

/// Transport that answers itself after `delay`
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    delay: Duration,
    runtime: Handle,
}

impl SimulatedTransport {
    /// Create a simulated transport bound to the current tokio runtime
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>, delay: Duration) -> CallResult<Self> {
        let runtime = Handle::try_current().map_err(|e| CallError::RuntimeUnavailable {
            message: e.to_string(),
        })?;
        Ok(Self {
            events,
            delay,
            runtime,
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn reply_later(&self, event: TransportEvent) {
        let events = self.events.clone();
        let delay = self.delay;
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(event = event.name(), "Simulated transport reply");
            // The runtime may have shut down; nothing left to notify then.
            let _ = events.send(event);
        });
    }

    fn reply_now(&self, event: TransportEvent) -> CallResult<()> {
        self.events
            .send(event)
            .map_err(|_| CallError::transport("simulated event channel closed"))
    }

    /// Pretend a remote party is calling `number`'s owner
    pub fn simulate_incoming_call(&self, number: &str) -> CallResult<CallId> {
        let call_id = Uuid::new_v4();
        info!(%call_id, number, "Simulating incoming call");
        self.reply_now(TransportEvent::InviteReceived {
            call_id,
            number: number.to_string(),
            display_name: None,
        })?;
        Ok(call_id)
    }

    /// Pretend the remote party hung up
    pub fn simulate_remote_bye(&self, call_id: CallId) -> CallResult<()> {
        self.reply_now(TransportEvent::Bye { call_id })
    }

    /// Pretend the caller gave up before we answered
    pub fn simulate_remote_cancel(&self, call_id: CallId) -> CallResult<()> {
        self.reply_now(TransportEvent::Cancel { call_id })
    }
}

impl CallTransport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn register(&self) -> CallResult<()> {
        self.reply_later(TransportEvent::Registered);
        Ok(())
    }

    fn invite(&self, call_id: CallId, number: &str) -> CallResult<()> {
        debug!(%call_id, number, "Simulated invite");
        self.reply_later(TransportEvent::Accepted { call_id });
        Ok(())
    }

    fn cancel(&self, call_id: CallId) -> CallResult<()> {
        self.reply_later(TransportEvent::CancelConfirmed { call_id });
        Ok(())
    }

    fn accept(&self, call_id: CallId) -> CallResult<()> {
        debug!(%call_id, "Simulated accept");
        Ok(())
    }

    fn reject(&self, call_id: CallId, reason: RejectReason) -> CallResult<()> {
        debug!(%call_id, %reason, "Simulated reject");
        self.reply_later(TransportEvent::RejectConfirmed { call_id });
        Ok(())
    }

    fn bye(&self, call_id: CallId) -> CallResult<()> {
        debug!(%call_id, "Simulated bye");
        Ok(())
    }

    fn send_dtmf(&self, call_id: CallId, digit: DtmfDigit) -> CallResult<()> {
        debug!(%call_id, %digit, "Simulated DTMF");
        Ok(())
    }

    fn transfer(&self, call_id: CallId, target: &str, mode: TransferMode) -> CallResult<()> {
        debug!(%call_id, target, ?mode, "Simulated transfer");
        if mode == TransferMode::Replace {
            self.reply_later(TransportEvent::Bye { call_id });
        }
        Ok(())
    }
}
