//! Softphone configuration
//!
//! Loaded from JSON, then adjusted by `SOFTPHONE_*` environment variables.
//!
//! ```json
//! {
//!   "call": { "country_code": "32", "mode": "demo", "demo_delay_ms": 500 },
//!   "panel": { "start_visible": true, "default_tab": "contacts" },
//!   "logging": { "level": "debug" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use softphone_call_core::CallConfig;

use crate::error::{PanelError, PanelResult};
use crate::logging::{parse_log_level, LoggingConfig};
use crate::state::{PanelState, Tab, Visibility};

/// Initial presentation of the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Show the panel on startup
    pub start_visible: bool,
    /// Tab selected on startup
    pub default_tab: Tab,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            start_visible: false,
            default_tab: Tab::Recent,
        }
    }
}

impl PanelConfig {
    /// Panel state matching this configuration
    pub fn initial_state(&self) -> PanelState {
        let visibility = if self.start_visible {
            Visibility::Shown
        } else {
            Visibility::Hidden
        };
        PanelState::new(visibility, self.default_tab)
    }
}

/// Full configuration of a softphone instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftphoneConfig {
    pub call: CallConfig,
    pub panel: PanelConfig,
    pub logging: LoggingConfig,
}

impl SoftphoneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call(mut self, call: CallConfig) -> Self {
        self.call = call;
        self
    }

    pub fn with_panel(mut self, panel: PanelConfig) -> Self {
        self.panel = panel;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn from_json_str(json: &str) -> PanelResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file and apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> PanelResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.call = config.call.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PanelResult<()> {
        self.call.validate()?;
        parse_log_level(&self.logging.level)?;
        if self.logging.app_name.trim().is_empty() {
            return Err(PanelError::config("logging.app_name must not be empty"));
        }
        Ok(())
    }
}
