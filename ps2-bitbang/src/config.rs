//! Configuration management for ps2-bitbang.
//!
//! Protocol timings are fixed in [`crate::ps2::timing`] and cannot be
//! configured. What can be configured is the one policy the protocol leaves
//! open (how long a read waits for the device to begin a frame) and, for the
//! probe binary, the simulated device it talks to.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::ps2::timing;
use crate::sim::{MouseConfig, MAX_HALF_PERIOD_US, MIN_HALF_PERIOD_US};

/// Environment variable naming a JSON config file for the probe.
pub const CONFIG_ENV: &str = "PS2_PROBE_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Transport configuration
    pub transport: TransportConfig,

    /// Simulated device the probe runs against
    pub simulation: MouseConfig,

    /// Packets to poll after a successful handshake
    pub polls: u32,
}

/// Transport configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub first_clock_wait: FirstClockWait,
}

/// How long a read waits for the device to pull the clock low the first
/// time.
///
/// A device answering a reset runs its self-test first, which can take far
/// longer than the per-bit budget; such setups need a larger bound or
/// `Unbounded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FirstClockWait {
    /// Spin until the device starts. Hangs if it never does.
    Unbounded,
    /// Give up after this many microseconds.
    Bounded { timeout_us: u64 },
}

impl Default for FirstClockWait {
    fn default() -> Self {
        FirstClockWait::Bounded {
            timeout_us: timing::TIMEOUT.as_micros() as u64,
        }
    }
}

impl FirstClockWait {
    pub fn budget(&self) -> Option<Duration> {
        match self {
            FirstClockWait::Unbounded => None,
            FirstClockWait::Bounded { timeout_us } => Some(Duration::from_micros(*timeout_us)),
        }
    }
}

impl Config {
    /// Load from the file named by `PS2_PROBE_CONFIG`, or use defaults if
    /// it is unset.
    pub fn load() -> anyhow::Result<Self> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific JSON file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let half_period_us = self.simulation.half_period_us;
        if !(MIN_HALF_PERIOD_US..=MAX_HALF_PERIOD_US).contains(&half_period_us) {
            bail!(
                "simulation.half_period_us {} is outside {}..={}",
                half_period_us,
                MIN_HALF_PERIOD_US,
                MAX_HALF_PERIOD_US
            );
        }
        Ok(())
    }
}
