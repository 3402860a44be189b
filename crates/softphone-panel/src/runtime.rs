//! Softphone runtime
//!
//! [`Softphone`] is the composition root. One tokio task owns the
//! [`CallSessionManager`] and the [`PanelStateMachine`] and serializes every
//! transition between them. The task selects over:
//!
//! - transport events
//! - user input and control messages
//! - the registration retry timer
//!
//! After each turn it feeds manager notifications to the panel, routes the
//! panel's commands back into the manager until nothing is left, records
//! history updates and publishes a [`PanelState`] snapshot on a watch channel.

use std::pin::Pin;
use std::sync::Arc;

use softphone_call_core::{
    AudioDevice, CallError, CallId, CallSessionManager, CallTransport, ContactDirectory,
    InMemoryContacts, NotificationStream, NullAudioDevice, SimulatedTransport, TransportEvent,
    TransportMode, UserNotice,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::config::SoftphoneConfig;
use crate::error::{PanelError, PanelResult};
use crate::history::{CallHistory, InMemoryCallHistory};
use crate::machine::{PanelEffect, PanelStateMachine, UserInput};
use crate::state::{PanelState, Tab};

/// Output of the panel meant for the UI rather than the call layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelSignal {
    /// Show a transient toast
    Notice(UserNotice),
    /// Reload the data of a tab
    RefreshTab(Tab),
}

#[derive(Debug)]
enum Control {
    Input(UserInput),
    Register,
    Shutdown,
}

/// Assembles a [`Softphone`]
///
/// In demo mode the transport is built internally. In live mode one must be
/// supplied with [`with_transport`](Self::with_transport), wired to
/// [`event_sender`](Self::event_sender).
pub struct SoftphoneBuilder {
    config: SoftphoneConfig,
    transport: Option<Arc<dyn CallTransport>>,
    audio: Arc<dyn AudioDevice>,
    contacts: Arc<dyn ContactDirectory>,
    history: Arc<dyn CallHistory>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SoftphoneBuilder {
    pub fn new(config: SoftphoneConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport: None,
            audio: Arc::new(NullAudioDevice),
            contacts: Arc::new(InMemoryContacts::default()),
            history: Arc::new(InMemoryCallHistory::new()),
            events_tx,
            events_rx,
        }
    }

    /// Channel a live transport reports its events on
    pub fn event_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.events_tx.clone()
    }

    pub fn with_transport(mut self, transport: Arc<dyn CallTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioDevice>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_contacts(mut self, contacts: Arc<dyn ContactDirectory>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn CallHistory>) -> Self {
        self.history = history;
        self
    }

    /// Spawn the runtime task on the current tokio runtime
    pub fn start(self) -> PanelResult<Softphone> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|e| CallError::RuntimeUnavailable {
            message: e.to_string(),
        })?;

        let (transport, simulated): (Arc<dyn CallTransport>, Option<SimulatedTransport>) =
            match (self.config.call.mode, self.transport) {
                (TransportMode::Demo, _) => {
                    let simulated = SimulatedTransport::new(
                        self.events_tx.clone(),
                        self.config.call.demo_delay(),
                    )?;
                    (Arc::new(simulated.clone()), Some(simulated))
                }
                (TransportMode::Live, Some(transport)) => (transport, None),
                (TransportMode::Live, None) => {
                    return Err(PanelError::config("live mode needs a transport"));
                }
            };

        info!(
            transport = transport.name(),
            mode = ?self.config.call.mode,
            "Starting softphone runtime"
        );

        let (manager, notifications) =
            CallSessionManager::new(self.config.call.clone(), transport, self.audio, self.contacts);
        let panel = PanelStateMachine::new(self.config.panel.initial_state());
        let (state_tx, state_rx) = watch::channel(panel.state().clone());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();

        let task = SoftphoneTask {
            manager,
            notifications,
            panel,
            history: self.history,
            state_tx,
            signals_tx,
        };
        let handle = runtime.spawn(task.run(self.events_rx, control_rx));

        Ok(Softphone {
            control: control_tx,
            events: self.events_tx,
            state: state_rx,
            signals: signals_rx,
            simulated,
            task: handle,
        })
    }
}

/// Handle to a running softphone
pub struct Softphone {
    control: mpsc::UnboundedSender<Control>,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: watch::Receiver<PanelState>,
    signals: mpsc::UnboundedReceiver<PanelSignal>,
    simulated: Option<SimulatedTransport>,
    task: JoinHandle<()>,
}

impl Softphone {
    pub fn builder(config: SoftphoneConfig) -> SoftphoneBuilder {
        SoftphoneBuilder::new(config)
    }

    /// Forward one user action to the panel
    pub fn send(&self, input: UserInput) -> PanelResult<()> {
        self.control
            .send(Control::Input(input))
            .map_err(|_| PanelError::RuntimeStopped)
    }

    /// Retry registration now
    pub fn register(&self) -> PanelResult<()> {
        self.control.send(Control::Register).map_err(|_| PanelError::RuntimeStopped)
    }

    /// Inject a transport event, as a live transport would
    pub fn inject_event(&self, event: TransportEvent) -> PanelResult<()> {
        self.events.send(event).map_err(|_| PanelError::RuntimeStopped)
    }

    /// Latest published panel state
    pub fn state(&self) -> PanelState {
        self.state.borrow().clone()
    }

    /// Receiver of every published panel state
    pub fn subscribe(&self) -> watch::Receiver<PanelState> {
        self.state.clone()
    }

    /// Wait until a published state satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> PanelResult<PanelState>
    where
        F: FnMut(&PanelState) -> bool,
    {
        let mut state = self.subscribe();
        let found = state.wait_for(predicate).await.map_err(|_| PanelError::RuntimeStopped)?;
        Ok(found.clone())
    }

    /// Next toast or tab refresh, waiting if none is queued
    pub async fn next_signal(&mut self) -> Option<PanelSignal> {
        self.signals.recv().await
    }

    /// Queued toasts and tab refreshes
    pub fn drain_signals(&mut self) -> Vec<PanelSignal> {
        let mut drained = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            drained.push(signal);
        }
        drained
    }

    fn simulated(&self) -> PanelResult<&SimulatedTransport> {
        self.simulated
            .as_ref()
            .ok_or_else(|| PanelError::config("simulation is only available in demo mode"))
    }

    /// Demo mode: have a remote party call us
    pub fn simulate_incoming_call(&self, number: &str) -> PanelResult<CallId> {
        Ok(self.simulated()?.simulate_incoming_call(number)?)
    }

    /// Demo mode: have the remote party hang up
    pub fn simulate_remote_bye(&self, call_id: CallId) -> PanelResult<()> {
        Ok(self.simulated()?.simulate_remote_bye(call_id)?)
    }

    /// Demo mode: have the caller give up before we answer
    pub fn simulate_remote_cancel(&self, call_id: CallId) -> PanelResult<()> {
        Ok(self.simulated()?.simulate_remote_cancel(call_id)?)
    }

    /// Stop the runtime task and wait for it
    pub async fn shutdown(self) -> PanelResult<()> {
        if self.control.send(Control::Shutdown).is_err() {
            debug!("Softphone runtime already stopped");
        }
        self.task.await.map_err(|e| {
            warn!(error = %e, "Softphone runtime task failed");
            PanelError::RuntimeStopped
        })
    }
}

struct SoftphoneTask {
    manager: CallSessionManager,
    notifications: NotificationStream,
    panel: PanelStateMachine,
    history: Arc<dyn CallHistory>,
    state_tx: watch::Sender<PanelState>,
    signals_tx: mpsc::UnboundedSender<PanelSignal>,
}

impl SoftphoneTask {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        self.manager.register();
        self.settle().await;

        let mut retry: Option<Pin<Box<Sleep>>> = None;
        loop {
            if let Some(delay) = self.manager.take_registration_retry() {
                debug!(delay_ms = delay.as_millis() as u64, "Registration retry scheduled");
                retry = Some(Box::pin(tokio::time::sleep(delay)));
            }

            tokio::select! {
                Some(event) = events.recv() => {
                    self.manager.handle_transport_event(event).await;
                    if retry.is_some() && !self.manager.is_retrying_registration() {
                        debug!("Registration settled, dropping scheduled retry");
                        retry = None;
                    }
                }
                message = control.recv() => match message {
                    Some(Control::Input(input)) => {
                        debug!(?input, "User input");
                        let effects = self.panel.handle_input(input);
                        self.apply_effects(effects).await;
                    }
                    Some(Control::Register) => {
                        retry = None;
                        self.manager.register();
                    }
                    Some(Control::Shutdown) | None => break,
                },
                _ = async {
                    if let Some(sleep) = retry.as_mut() {
                        sleep.await;
                    }
                }, if retry.is_some() => {
                    retry = None;
                    info!("Retrying registration");
                    self.manager.register();
                }
            }

            self.settle().await;
        }

        info!("Softphone runtime stopped");
    }

    /// Feed notifications to the panel until neither side has anything left
    async fn settle(&mut self) {
        loop {
            let notifications = self.notifications.drain();
            if notifications.is_empty() {
                break;
            }
            for notification in notifications {
                let effects = self.panel.handle_notification(&notification);
                self.apply_effects(effects).await;
            }
        }
        self.state_tx.send_replace(self.panel.state().clone());
    }

    async fn apply_effects(&mut self, effects: Vec<PanelEffect>) {
        for effect in effects {
            match effect {
                PanelEffect::Command(command) => {
                    debug!(?command, "Panel command");
                    self.manager.apply(command);
                }
                PanelEffect::Notice(notice) => self.signal(PanelSignal::Notice(notice)),
                PanelEffect::RefreshTab(tab) => self.signal(PanelSignal::RefreshTab(tab)),
                PanelEffect::History(update) => {
                    if let Err(e) = self.history.record(update).await {
                        warn!(error = %e, "Failed to record call history");
                    }
                }
            }
        }
    }

    fn signal(&self, signal: PanelSignal) {
        if self.signals_tx.send(signal).is_err() {
            debug!("Panel signal receiver dropped");
        }
    }
}
