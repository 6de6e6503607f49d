//! Common types shared across hardware device implementations.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Card reader information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "PN532").
    pub name: String,

    /// Firmware version as `(version, revision)`.
    pub firmware: Option<(u8, u8)>,

    /// List of supported protocols (e.g., ["ISO14443A"]).
    pub protocols: Vec<String>,
}

impl ReaderInfo {
    /// Create a new ReaderInfo.
    pub fn new(name: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            firmware: None,
            protocols,
        }
    }

    /// Set the firmware version.
    pub fn with_firmware(mut self, version: u8, revision: u8) -> Self {
        self.firmware = Some((version, revision));
        self
    }

    /// Firmware as `"<version>.<revision>"`, if known.
    pub fn firmware_string(&self) -> Option<String> {
        self.firmware.map(|(v, r)| format!("{v}.{r}"))
    }
}

/// Audible feedback patterns played on the buzzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Short high chirp: action accepted.
    Success,

    /// Long low tone: action refused or failed.
    Failure,

    /// Sustained low tone while the door lock is released.
    DoorOpen,
}

impl Tone {
    /// Tone frequency in hertz.
    pub fn frequency_hz(&self) -> u32 {
        match self {
            Tone::Success => 850,
            Tone::Failure | Tone::DoorOpen => 300,
        }
    }

    /// How long the tone sounds.
    pub fn duration(&self) -> Duration {
        match self {
            Tone::Success => Duration::from_millis(60),
            Tone::Failure => Duration::from_millis(300),
            Tone::DoorOpen => Duration::from_secs(4),
        }
    }

    /// PWM duty cycle on a 16-bit scale.
    pub fn duty_cycle(&self) -> u16 {
        match self {
            Tone::Success | Tone::Failure => 1 << 15,
            Tone::DoorOpen => 1 << 14,
        }
    }
}
