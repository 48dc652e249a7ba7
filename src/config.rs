use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::channel::RestorePolicy;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Doppler factor applied to the listener at init
    pub doppler_scale: f32,

    /// Pause between two passes of the refill thread
    pub refill_interval_ms: u64,

    /// Polling interval of the refill thread while the world is inactive
    pub inactive_poll_ms: u64,

    /// Treat the world as inactive while the owning window is hidden
    pub mute_when_hidden: bool,

    /// Run the background refill thread. Without it streams are only
    /// refilled by `on_update`.
    pub background_refill: bool,

    /// How long shutdown waits for the refill thread to exit
    pub shutdown_timeout_ms: u64,

    /// Restore attempts for a lost buffer before giving up
    pub restore_attempts: u32,

    pub restore_sleep_ms: u64,

    pub channels_2d: usize,

    pub channels_3d: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            doppler_scale: 1.0,
            refill_interval_ms: 10,
            inactive_poll_ms: 100,
            mute_when_hidden: false,
            background_refill: true,
            shutdown_timeout_ms: 200,
            restore_attempts: 100,
            restore_sleep_ms: 2,
            channels_2d: 32,
            channels_3d: 16,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.refill_interval_ms > 0, "refill_interval_ms must be positive");
        ensure!(self.inactive_poll_ms > 0, "inactive_poll_ms must be positive");
        ensure!(
            self.doppler_scale.is_finite() && self.doppler_scale >= 0.0,
            "doppler_scale must be a non-negative number"
        );
        Ok(())
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    pub fn inactive_poll(&self) -> Duration {
        Duration::from_millis(self.inactive_poll_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn restore_policy(&self) -> RestorePolicy {
        RestorePolicy {
            attempts: self.restore_attempts,
            sleep: Duration::from_millis(self.restore_sleep_ms),
        }
    }
}

pub fn load(path: impl AsRef<Path>) -> Result<AudioConfig> {
    let path = path.as_ref();
    let config = read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let config: AudioConfig =
        toml::from_str(&config).with_context(|| format!("Could not parse {}", path.display()))?;
    config.validate()?;

    Ok(config)
}

/// Like [`load`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<AudioConfig> {
    let path = path.as_ref();
    match std::fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No config at {}, using defaults", path.display());
            Ok(AudioConfig::default())
        }
        _ => load(path),
    }
}
