//! Presentation state of the softphone panel

use serde::{Deserialize, Serialize};
use softphone_call_core::{CallDirection, CallId, CallState, ErrorKind, RemoteContact};

/// Whether the panel is on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Hidden,
    Shown,
}

/// Tabs of the folded-out panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Contacts,
    Activities,
    Recent,
}

/// What the main call button does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryButton {
    /// Dial the number typed in the search or keypad input
    Call,
    /// End or cancel the current call
    Hangup,
    /// Hidden while accept/reject are shown or a cancel/reject is pending
    Hidden,
}

/// Blocking message covering the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub message: String,
    pub kind: ErrorKind,
}

impl Overlay {
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Only temporary errors can be closed by the user
    pub fn is_dismissible(&self) -> bool {
        self.kind == ErrorKind::Temporary
    }
}

/// Read-only view of the call session as the panel last saw it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallView {
    pub call_id: CallId,
    pub state: CallState,
    pub direction: CallDirection,
    pub remote_number: String,
    pub contact: Option<RemoteContact>,
}

/// Everything the panel renders
///
/// Owned by [`PanelStateMachine`](crate::PanelStateMachine); the runtime
/// publishes clones of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    pub visibility: Visibility,
    pub folded: bool,
    pub active_tab: Tab,
    /// The user asked to hang up and follow up later
    pub pending_postpone: bool,
    pub keypad_open: bool,
    pub primary_button: PrimaryButton,
    /// Accept and reject buttons
    pub incoming_controls: bool,
    pub overlay: Option<Overlay>,
    pub search_input: String,
    pub keypad_input: String,
    pub call: Option<CallView>,
    pub muted: bool,
}

impl PanelState {
    pub fn new(visibility: Visibility, active_tab: Tab) -> Self {
        Self {
            visibility,
            folded: false,
            active_tab,
            pending_postpone: false,
            keypad_open: false,
            primary_button: PrimaryButton::Call,
            incoming_controls: false,
            overlay: None,
            search_input: String::new(),
            keypad_input: String::new(),
            call: None,
            muted: false,
        }
    }

    /// State of the call as last reported, `NoCall` when there is none
    pub fn call_state(&self) -> CallState {
        self.call.as_ref().map_or(CallState::NoCall, |call| call.state)
    }

    pub fn is_in_call(&self) -> bool {
        self.call_state().is_in_call()
    }

    /// Number the call button dials: keypad input when the keypad is open,
    /// search input otherwise
    pub fn dial_input(&self) -> &str {
        if self.keypad_open {
            &self.keypad_input
        } else {
            &self.search_input
        }
    }

    /// Drop everything tied to the finished call
    pub(crate) fn clear_call(&mut self) {
        self.call = None;
        self.primary_button = PrimaryButton::Call;
        self.incoming_controls = false;
        self.pending_postpone = false;
        self.muted = false;
    }
}

impl Default for PanelState {
    fn default() -> Self {
        Self::new(Visibility::Hidden, Tab::Recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_input_follows_keypad() {
        let mut state = PanelState::default();
        state.search_input = "101".into();
        state.keypad_input = "202".into();
        assert_eq!(state.dial_input(), "101");
        state.keypad_open = true;
        assert_eq!(state.dial_input(), "202");
    }

    #[test]
    fn test_only_temporary_overlays_are_dismissible() {
        assert!(Overlay::new("x", ErrorKind::Temporary).is_dismissible());
        assert!(!Overlay::new("x", ErrorKind::Connecting).is_dismissible());
        assert!(!Overlay::new("x", ErrorKind::Persistent).is_dismissible());
    }
}
