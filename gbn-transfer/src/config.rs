//! Transfer parameters.
//!
//! A [`Config`] value is built once (defaults, optionally a TOML file, then
//! command-line overrides) and handed to every task.  Nothing in the
//! protocol engine reads global settings.
//!
//! ```toml
//! window_size = 4
//! max_payload = 256
//! timeout_ms = 500
//! cumulative_acks = true
//!
//! [sender]
//! loss_percent = 10
//! corrupt_percent = 5
//!
//! [receiver]
//! loss_percent = 10
//! corrupt_percent = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::frame::{DATA_HEADER_LEN, DEFAULT_BUFFER_SIZE, MAX_PAYLOAD_LEN};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// UDP port the receiver listens on by default.
pub const DEFAULT_PORT: u16 = 65000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_MAX_PAYLOAD: usize = 500;
pub const DEFAULT_WINDOW_SIZE: usize = 7;
pub const DEFAULT_ERROR_PERCENT: u8 = 25;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("max payload must be at least 1 byte")]
    ZeroPayload,
    #[error("max payload of {0} bytes exceeds the 65523-byte frame limit")]
    PayloadTooLarge(usize),
    #[error("{field} must be a percentage in 0..=100, got {value}")]
    PercentOutOfRange { field: &'static str, value: u8 },
    #[error("receive buffer of {0} bytes cannot hold a frame header")]
    BufferTooSmall(usize),
    #[error("frames of up to {frame} bytes do not fit the {buffer}-byte receive buffer")]
    PayloadExceedsBuffer { frame: usize, buffer: usize },
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Fault settings
// ---------------------------------------------------------------------------

/// Loss and corruption probabilities applied by one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultConfig {
    /// Chance, in percent, that an inbound unit is treated as lost.
    pub loss_percent: u8,
    /// Chance, in percent, that an outbound unit carries a bad checksum flag.
    pub corrupt_percent: u8,
}

impl FaultConfig {
    /// No simulated faults.
    pub const NONE: FaultConfig = FaultConfig {
        loss_percent: 0,
        corrupt_percent: 0,
    };

    /// The same percentage for both loss and corruption.
    pub fn uniform(percent: u8) -> Self {
        Self {
            loss_percent: percent,
            corrupt_percent: percent,
        }
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::uniform(DEFAULT_ERROR_PERCENT)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Largest payload carried by one data frame.
    pub max_payload: usize,
    /// How long the acknowledgment task waits before retransmitting.
    pub timeout: Duration,
    /// Window capacity W.
    pub window_size: usize,
    /// Faults simulated by the sending endpoint.
    pub sender: FaultConfig,
    /// Faults simulated by the receiving endpoint.
    pub receiver: FaultConfig,
    /// Accept an acknowledgment above the awaited one as covering everything
    /// before it.
    pub cumulative_acks: bool,
    /// Capacity of each receive buffer.
    pub recv_buffer_size: usize,
    /// Pause after each newly sent frame.
    pub send_delay: Duration,
    /// Upper bound on one wait for window room before capacity is checked
    /// again.  Zero waits for the acknowledgment task's wake-up alone.
    pub window_full_pause: Duration,
    /// Give up after this many timeouts in a row without the window moving.
    pub max_consecutive_timeouts: Option<u32>,
    /// Seed for the fault injectors.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            timeout: DEFAULT_TIMEOUT,
            window_size: DEFAULT_WINDOW_SIZE,
            sender: FaultConfig::default(),
            receiver: FaultConfig::default(),
            cumulative_acks: false,
            recv_buffer_size: DEFAULT_BUFFER_SIZE,
            send_delay: Duration::ZERO,
            window_full_pause: Duration::ZERO,
            max_consecutive_timeouts: None,
            seed: None,
        }
    }
}

impl Config {
    /// Check every parameter the protocol depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_payload == 0 {
            return Err(ConfigError::ZeroPayload);
        }
        if self.max_payload > MAX_PAYLOAD_LEN {
            return Err(ConfigError::PayloadTooLarge(self.max_payload));
        }
        if self.recv_buffer_size < DATA_HEADER_LEN {
            return Err(ConfigError::BufferTooSmall(self.recv_buffer_size));
        }
        for (field, value) in [
            ("sender.loss_percent", self.sender.loss_percent),
            ("sender.corrupt_percent", self.sender.corrupt_percent),
            ("receiver.loss_percent", self.receiver.loss_percent),
            ("receiver.corrupt_percent", self.receiver.corrupt_percent),
        ] {
            if value > 100 {
                return Err(ConfigError::PercentOutOfRange { field, value });
            }
        }
        let frame = self.max_payload + DATA_HEADER_LEN;
        if frame > self.recv_buffer_size {
            return Err(ConfigError::PayloadExceedsBuffer {
                frame,
                buffer: self.recv_buffer_size,
            });
        }
        Ok(())
    }

    /// Defaults overridden by the contents of a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let overrides: ConfigOverride = toml::from_str(text)?;
        let mut config = Config::default();
        overrides.apply_to(&mut config);
        Ok(config)
    }

    /// Defaults overridden by a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

// ---------------------------------------------------------------------------
// File overrides
// ---------------------------------------------------------------------------

/// Optional overrides as they appear in a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverride {
    pub max_payload: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub window_size: Option<usize>,
    pub sender: Option<FaultOverride>,
    pub receiver: Option<FaultOverride>,
    pub cumulative_acks: Option<bool>,
    pub recv_buffer_size: Option<usize>,
    pub send_delay_ms: Option<u64>,
    pub window_full_pause_ms: Option<u64>,
    pub max_consecutive_timeouts: Option<u32>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultOverride {
    pub loss_percent: Option<u8>,
    pub corrupt_percent: Option<u8>,
}

impl FaultOverride {
    fn apply_to(&self, faults: &mut FaultConfig) {
        if let Some(v) = self.loss_percent {
            faults.loss_percent = v;
        }
        if let Some(v) = self.corrupt_percent {
            faults.corrupt_percent = v;
        }
    }
}

impl ConfigOverride {
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(v) = self.max_payload {
            config.max_payload = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = &self.sender {
            v.apply_to(&mut config.sender);
        }
        if let Some(v) = &self.receiver {
            v.apply_to(&mut config.receiver);
        }
        if let Some(v) = self.cumulative_acks {
            config.cumulative_acks = v;
        }
        if let Some(v) = self.recv_buffer_size {
            config.recv_buffer_size = v;
        }
        if let Some(v) = self.send_delay_ms {
            config.send_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.window_full_pause_ms {
            config.window_full_pause = Duration::from_millis(v);
        }
        if let Some(v) = self.max_consecutive_timeouts {
            config.max_consecutive_timeouts = Some(v);
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
    }
}
