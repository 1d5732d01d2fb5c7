//! Keybinding settings

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use keyroute_keyboard::OperatingSystem;

use crate::error::Result;

/// Prefix of environment variables that override settings, e.g.
/// `KEYROUTE_CHORD_TIMEOUT_MS=3000`
pub const ENV_PREFIX: &str = "KEYROUTE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindingSettings {
    /// Time to wait for the second key of a chord
    pub chord_timeout_ms: u64,
    pub chord_poll_interval_ms: u64,
    /// Overrides the host operating system
    pub os: Option<OperatingSystem>,
    /// Dispatch numpad keys on the reported key code so NumLock is honored
    pub dispatch_on_numpad_key_code: bool,
}

impl KeybindingSettings {
    pub fn new() -> Self {
        KeybindingSettings {
            chord_timeout_ms: 5000,
            chord_poll_interval_ms: 500,
            os: None,
            dispatch_on_numpad_key_code: true,
        }
    }

    /// Load settings from an optional TOML or JSON file, then from the
    /// environment. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn os(&self) -> OperatingSystem {
        self.os.unwrap_or_else(OperatingSystem::current)
    }

    pub fn chord_timeout(&self) -> Duration {
        Duration::from_millis(self.chord_timeout_ms)
    }

    pub fn chord_poll_interval(&self) -> Duration {
        Duration::from_millis(self.chord_poll_interval_ms.max(1))
    }
}

impl Default for KeybindingSettings {
    fn default() -> Self {
        Self::new()
    }
}
