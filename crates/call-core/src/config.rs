//! Call session configuration
//!
//! `CallConfig` is a plain serde structure with a builder-style API. Every
//! field has a default so a partial JSON document is enough:
//!
//! ```rust
//! use softphone_call_core::config::{CallConfig, TransferMode, TransportMode};
//!
//! let config = CallConfig::from_json_str(r#"{ "country_code": "32", "mode": "demo" }"#).unwrap();
//! assert_eq!(config.country_code.as_deref(), Some("32"));
//! assert_eq!(config.mode, TransportMode::Demo);
//! assert_eq!(config.transfer_mode, TransferMode::Replace);
//!
//! let config = CallConfig::new()
//!     .with_country_code("1")
//!     .with_always_transfer("+15550199");
//! assert!(config.always_transfer);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CallError, CallResult};
use crate::number::normalize_number;
use crate::recovery::RetryConfig;

/// Environment variable prefix read by [`CallConfig::with_env_overrides`]
pub const ENV_PREFIX: &str = "SOFTPHONE_";

/// What a transfer does with the current call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Keep the current leg and bridge the new target into it
    Bridge,
    /// Hand the remote party over to the new target
    Replace,
}

/// Which transport implementation the composition root builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Real signalling client supplied by the application
    Live,
    /// Simulated replies after a fixed delay
    Demo,
}

/// Configuration of the transport-call state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Country calling code used to derive international number forms
    pub country_code: Option<String>,
    /// Effect of `transfer()` on the current leg
    pub transfer_mode: TransferMode,
    /// External phone used by always-transfer
    pub external_device_number: Option<String>,
    /// Transfer every outgoing call to `external_device_number` once answered
    pub always_transfer: bool,
    /// Registration retry behaviour
    pub registration_retry: RetryConfig,
    /// Live or simulated transport
    pub mode: TransportMode,
    /// Reply delay of the simulated transport
    pub demo_delay_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            country_code: None,
            transfer_mode: TransferMode::Replace,
            external_device_number: None,
            always_transfer: false,
            registration_retry: RetryConfig::default(),
            mode: TransportMode::Live,
            demo_delay_ms: 1_000,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the country calling code (a leading `+` is accepted)
    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into().trim_start_matches('+').to_string());
        self
    }

    pub fn with_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    /// Forward every answered outgoing call to an external phone
    pub fn with_always_transfer(mut self, external_number: impl Into<String>) -> Self {
        self.external_device_number = Some(external_number.into());
        self.always_transfer = true;
        self
    }

    pub fn with_registration_retry(mut self, retry: RetryConfig) -> Self {
        self.registration_retry = retry;
        self
    }

    /// Switch to the simulated transport with the given reply delay
    pub fn with_demo_mode(mut self, delay: Duration) -> Self {
        self.mode = TransportMode::Demo;
        self.demo_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn demo_delay(&self) -> Duration {
        Duration::from_millis(self.demo_delay_ms)
    }

    /// Normalized external number when always-transfer is active
    pub fn always_transfer_target(&self) -> Option<String> {
        if !self.always_transfer {
            return None;
        }
        self.external_device_number
            .as_deref()
            .map(normalize_number)
            .filter(|number| !number.is_empty())
    }

    /// Check field consistency
    pub fn validate(&self) -> CallResult<()> {
        if let Some(code) = &self.country_code {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(CallError::config(
                    "country_code",
                    format!("{:?} is not a numeric calling code", code),
                ));
            }
        }
        if self.always_transfer && self.always_transfer_target().is_none() {
            return Err(CallError::config(
                "external_device_number",
                "always_transfer requires an external device number",
            ));
        }
        let retry = &self.registration_retry;
        if retry.initial_delay_ms == 0 {
            return Err(CallError::config(
                "registration_retry.initial_delay_ms",
                "must be greater than zero",
            ));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(CallError::config(
                "registration_retry.max_delay_ms",
                "must not be lower than initial_delay_ms",
            ));
        }
        if self.mode == TransportMode::Demo && self.demo_delay_ms == 0 {
            return Err(CallError::config(
                "demo_delay_ms",
                "must be greater than zero in demo mode",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> CallResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> CallResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Overlay `SOFTPHONE_*` environment variables on top of `self`
    ///
    /// Recognised: `SOFTPHONE_COUNTRY_CODE`, `SOFTPHONE_MODE` (`live`/`demo`),
    /// `SOFTPHONE_DEMO_DELAY_MS`, `SOFTPHONE_EXTERNAL_DEVICE_NUMBER`,
    /// `SOFTPHONE_ALWAYS_TRANSFER` (`true`/`false`).
    pub fn with_env_overrides(mut self) -> CallResult<Self> {
        let var = |name: &str| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok();

        if let Some(code) = var("COUNTRY_CODE") {
            self = self.with_country_code(code);
        }
        if let Some(mode) = var("MODE") {
            self.mode = match mode.to_ascii_lowercase().as_str() {
                "live" => TransportMode::Live,
                "demo" => TransportMode::Demo,
                other => {
                    return Err(CallError::config(
                        "mode",
                        format!("unknown transport mode {:?}", other),
                    ))
                }
            };
        }
        if let Some(delay) = var("DEMO_DELAY_MS") {
            self.demo_delay_ms = delay.parse().map_err(|_| {
                CallError::config("demo_delay_ms", format!("{:?} is not a number", delay))
            })?;
        }
        if let Some(number) = var("EXTERNAL_DEVICE_NUMBER") {
            self.external_device_number = Some(number);
        }
        if let Some(flag) = var("ALWAYS_TRANSFER") {
            self.always_transfer = flag.parse().map_err(|_| {
                CallError::config("always_transfer", format!("{:?} is not a boolean", flag))
            })?;
        }

        self.validate()?;
        Ok(self)
    }
}
