//! # Panel state machine
//!
//! Pure presentation model of the softphone panel:
//!
//! ```text
//! PanelState × (CallNotification | UserInput) → (PanelState, Vec<PanelEffect>)
//! ```
//!
//! The machine never talks to the transport or the call session. Anything it
//! wants done is returned as a [`PanelEffect`] and executed by the runtime:
//!
//! - [`PanelEffect::Command`]: routed to the call session manager
//! - [`PanelEffect::Notice`]: a transient toast
//! - [`PanelEffect::RefreshTab`]: reload the tab's data
//! - [`PanelEffect::History`]: written to the call log

use serde::{Deserialize, Serialize};
use softphone_call_core::{
    CallCommand, CallDirection, CallId, CallNotification, CallState, DtmfDigit, UserNotice,
};
use tracing::{debug, info};

use crate::history::HistoryUpdate;
use crate::state::{CallView, Overlay, PanelState, PrimaryButton, Tab, Visibility};

/// Something the user did on the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserInput {
    /// Show or hide the panel
    ToggleDisplay,
    /// Fold or unfold the tab area
    ToggleFold,
    SwitchTab(Tab),
    /// Call button next to a contact or activity
    CallFromTab { number: String },
    /// Main call button
    Dial,
    Accept,
    Reject,
    Hangup,
    /// Hang up and keep the follow-up open
    Postpone,
    ToggleMute,
    /// Keypad key
    PressKey(char),
    ToggleKeypad,
    SetSearchInput(String),
    Transfer { number: String },
    DismissOverlay,
}

/// Side effect requested by the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PanelEffect {
    Command(CallCommand),
    Notice(UserNotice),
    RefreshTab(Tab),
    History(HistoryUpdate),
}

/// Owner of the [`PanelState`]
#[derive(Debug, Clone)]
pub struct PanelStateMachine {
    state: PanelState,
    /// Call whose history record is still open
    open_record: Option<CallId>,
}

impl PanelStateMachine {
    pub fn new(state: PanelState) -> Self {
        Self {
            state,
            open_record: None,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    // ===== NOTIFICATIONS =====

    /// React to a notification from the call session manager
    pub fn handle_notification(&mut self, notification: &CallNotification) -> Vec<PanelEffect> {
        let mut effects = Vec::new();
        match notification {
            CallNotification::IncomingCall {
                call_id,
                number,
                contact,
            } => {
                self.state.visibility = Visibility::Shown;
                self.state.folded = false;
                self.state.active_tab = Tab::Recent;
                self.state.incoming_controls = true;
                self.state.primary_button = PrimaryButton::Hidden;
                if let Some(call) =
                    self.state.call.as_mut().filter(|call| call.call_id == *call_id)
                {
                    call.contact = contact.clone();
                }
                self.open_record = Some(*call_id);
                effects.push(PanelEffect::History(HistoryUpdate::StartIncoming {
                    call_id: *call_id,
                    number: number.clone(),
                    contact: contact.clone(),
                }));
                effects.push(PanelEffect::RefreshTab(Tab::Recent));
            }

            CallNotification::ChangeStatus {
                call_id,
                previous,
                current,
                direction,
                remote_number,
            } => self.on_status(
                *call_id,
                *previous,
                *current,
                *direction,
                remote_number,
                &mut effects,
            ),

            CallNotification::Progress { call_id, status_code } => {
                debug!(%call_id, status_code, "Call progress");
            }

            CallNotification::Accepted { call_id, .. } => {
                self.state.primary_button = PrimaryButton::Hangup;
                self.state.incoming_controls = false;
                effects.push(PanelEffect::History(HistoryUpdate::Accepted { call_id: *call_id }));
            }

            CallNotification::Bye { summary, .. } => {
                let done = !self.state.pending_postpone;
                self.state.pending_postpone = false;
                self.state.primary_button = PrimaryButton::Call;
                self.state.muted = false;
                self.close_record(summary.call_id);
                effects.push(PanelEffect::History(HistoryUpdate::Finalize {
                    summary: summary.clone(),
                    done,
                }));
                effects.push(PanelEffect::RefreshTab(self.state.active_tab));
            }

            CallNotification::CancelIncoming { summary } => {
                self.end_unanswered(summary.call_id);
                effects.push(PanelEffect::History(HistoryUpdate::Missed {
                    summary: summary.clone(),
                }));
            }

            CallNotification::CancelOutgoing { summary } => {
                self.end_unanswered(summary.call_id);
                effects.push(PanelEffect::History(HistoryUpdate::Canceled {
                    summary: summary.clone(),
                }));
            }

            CallNotification::Rejected { summary, .. }
            | CallNotification::CustomerUnavailable { summary, .. } => {
                self.end_unanswered(summary.call_id);
                effects.push(PanelEffect::History(HistoryUpdate::Rejected {
                    summary: summary.clone(),
                }));
            }

            CallNotification::Error { message, kind } => {
                info!(%message, ?kind, "Showing error overlay");
                self.state.overlay = Some(Overlay::new(message.clone(), *kind));
            }

            CallNotification::ErrorResolved => {
                self.state.overlay = None;
            }

            CallNotification::Transferred { target, automatic, .. } => {
                debug!(%target, automatic, "Call transferred");
            }

            CallNotification::MuteChanged { muted, .. } => {
                self.state.muted = *muted;
            }

            CallNotification::Notice(notice) => effects.push(PanelEffect::Notice(notice.clone())),
        }
        effects
    }

    fn on_status(
        &mut self,
        call_id: CallId,
        previous: CallState,
        current: CallState,
        direction: CallDirection,
        remote_number: &str,
        effects: &mut Vec<PanelEffect>,
    ) {
        debug!(%call_id, from = %previous, to = %current, "Panel sees call status");

        if current == CallState::NoCall {
            if self.open_record.take() == Some(call_id) {
                effects.push(PanelEffect::History(HistoryUpdate::Abandoned { call_id }));
            }
            self.state.clear_call();
            return;
        }

        let contact = self
            .state
            .call
            .as_ref()
            .filter(|call| call.call_id == call_id)
            .and_then(|call| call.contact.clone());
        self.state.call = Some(CallView {
            call_id,
            state: current,
            direction,
            remote_number: remote_number.to_string(),
            contact,
        });
        self.state.primary_button = match (current, direction) {
            (CallState::Ringing, CallDirection::Inbound) => PrimaryButton::Hidden,
            (CallState::Ringing, CallDirection::Outbound) | (CallState::Ongoing, _) => {
                PrimaryButton::Hangup
            }
            _ => PrimaryButton::Hidden,
        };
        if current != CallState::Ringing {
            self.state.incoming_controls = false;
        }

        if current == CallState::Ringing
            && direction == CallDirection::Outbound
            && previous == CallState::NoCall
        {
            self.open_record = Some(call_id);
            effects.push(PanelEffect::History(HistoryUpdate::StartOutgoing {
                call_id,
                number: remote_number.to_string(),
            }));
        }
    }

    fn end_unanswered(&mut self, call_id: CallId) {
        self.state.primary_button = PrimaryButton::Call;
        self.state.incoming_controls = false;
        self.close_record(call_id);
    }

    fn close_record(&mut self, call_id: CallId) {
        if self.open_record == Some(call_id) {
            self.open_record = None;
        }
    }

    // ===== USER INPUT =====

    /// React to user input
    ///
    /// Inputs that make no sense in the current state turn into notices or
    /// nothing at all.
    pub fn handle_input(&mut self, input: UserInput) -> Vec<PanelEffect> {
        let mut effects = Vec::new();
        match input {
            UserInput::ToggleDisplay => {
                self.state.visibility = match self.state.visibility {
                    Visibility::Hidden => Visibility::Shown,
                    Visibility::Shown => Visibility::Hidden,
                };
                if self.state.visibility == Visibility::Shown
                    && !self.state.folded
                    && !self.is_ongoing()
                {
                    effects.push(PanelEffect::RefreshTab(self.state.active_tab));
                }
            }

            UserInput::ToggleFold => {
                self.state.folded = !self.state.folded;
                if !self.state.folded && !self.is_ongoing() {
                    effects.push(PanelEffect::RefreshTab(self.state.active_tab));
                }
            }

            UserInput::SwitchTab(tab) => {
                self.state.active_tab = tab;
                effects.push(PanelEffect::RefreshTab(tab));
            }

            UserInput::CallFromTab { number } => self.dial(number, &mut effects),

            UserInput::Dial => {
                let number = self.state.dial_input().to_string();
                self.dial(number, &mut effects);
            }

            UserInput::Accept => {
                if self.state.incoming_controls {
                    effects.push(PanelEffect::Command(CallCommand::AcceptIncoming));
                }
            }

            UserInput::Reject => {
                if self.state.incoming_controls {
                    effects.push(PanelEffect::Command(CallCommand::RejectIncoming));
                }
            }

            UserInput::Hangup => {
                if self.state.is_in_call() {
                    effects.push(PanelEffect::Command(CallCommand::Hangup));
                } else {
                    effects.push(PanelEffect::Notice(UserNotice::NotInCall));
                }
            }

            UserInput::Postpone => {
                if self.is_ongoing() {
                    self.state.pending_postpone = true;
                    effects.push(PanelEffect::Command(CallCommand::Hangup));
                } else {
                    effects.push(PanelEffect::Notice(UserNotice::NotInCall));
                }
            }

            UserInput::ToggleMute => {
                if self.is_ongoing() {
                    let command = if self.state.muted {
                        CallCommand::Unmute
                    } else {
                        CallCommand::Mute
                    };
                    effects.push(PanelEffect::Command(command));
                } else {
                    effects.push(PanelEffect::Notice(UserNotice::NotInCall));
                }
            }

            UserInput::PressKey(key) => self.press_key(key, &mut effects),

            UserInput::ToggleKeypad => {
                self.state.keypad_open = !self.state.keypad_open;
                if self.state.keypad_open && !self.is_ongoing() {
                    self.state.keypad_input = self.state.search_input.clone();
                }
            }

            UserInput::SetSearchInput(text) => self.state.search_input = text,

            UserInput::Transfer { number } => {
                if self.is_ongoing() {
                    effects.push(PanelEffect::Command(CallCommand::Transfer { number }));
                } else {
                    effects.push(PanelEffect::Notice(UserNotice::NotInCall));
                }
            }

            UserInput::DismissOverlay => {
                if self.state.overlay.as_ref().is_some_and(Overlay::is_dismissible) {
                    self.state.overlay = None;
                }
            }
        }
        effects
    }

    fn is_ongoing(&self) -> bool {
        self.state.call_state() == CallState::Ongoing
    }

    fn dial(&mut self, number: String, effects: &mut Vec<PanelEffect>) {
        if self.state.is_in_call() {
            effects.push(PanelEffect::Notice(UserNotice::AlreadyInCall));
            return;
        }
        if number.trim().is_empty() {
            effects.push(PanelEffect::Notice(UserNotice::EmptyNumber));
            return;
        }
        self.state.visibility = Visibility::Shown;
        effects.push(PanelEffect::Command(CallCommand::MakeCall { number }));
    }

    fn press_key(&mut self, key: char, effects: &mut Vec<PanelEffect>) {
        if self.is_ongoing() {
            match DtmfDigit::try_from(key) {
                Ok(digit) => effects.push(PanelEffect::Command(CallCommand::SendDtmf(digit))),
                Err(_) => effects.push(PanelEffect::Notice(UserNotice::InvalidKey(key))),
            }
            return;
        }
        if key == '+' || DtmfDigit::try_from(key).is_ok() {
            self.state.keypad_input.push(key);
        } else {
            effects.push(PanelEffect::Notice(UserNotice::InvalidKey(key)));
        }
    }
}

impl Default for PanelStateMachine {
    fn default() -> Self {
        Self::new(PanelState::default())
    }
}
