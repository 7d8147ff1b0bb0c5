//! Common types shared across the reader service crates.
//!
//! This module defines the adapter and screen state enums, the opaque tag
//! handle, and the tag technology enumeration with its per-technology
//! transceive limits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the reader adapter.
///
/// The state is only ever mutated by the serialized adapter worker. Every
/// enable/disable/boot task starts in `Off` or `On` and must leave the state
/// in `Off` or `On`; the `Turning*` states are visible to other threads only
/// while a task is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AdapterState {
    /// Controller is powered down.
    Off = 0,

    /// An enable task is bringing the controller up.
    TurningOn = 1,

    /// Controller is initialized and ready.
    On = 2,

    /// A disable task is shutting the controller down.
    TurningOff = 3,
}

impl AdapterState {
    /// `true` while an enable or disable task is in flight.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::TurningOn | Self::TurningOff)
    }

    /// Decode a state previously stored via `as u8`.
    ///
    /// Returns `None` for values outside the enum range.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::TurningOn),
            2 => Some(Self::On),
            3 => Some(Self::TurningOff),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterState::Off => "off",
            AdapterState::TurningOn => "turning on",
            AdapterState::On => "on",
            AdapterState::TurningOff => "turning off",
        };
        write!(f, "{}", s)
    }
}

/// Screen and lock state reported by the platform.
///
/// The variants form a total order (`Unknown < Off < OnLocked < OnUnlocked`);
/// the routing policy compares the current state against a configured
/// threshold with `>=` to decide whether discovery polling may run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ScreenState {
    /// State not yet reported.
    Unknown = 0,

    /// Screen is off.
    Off = 1,

    /// Screen is on with the keyguard engaged.
    OnLocked = 2,

    /// Screen is on and unlocked.
    OnUnlocked = 3,
}

impl fmt::Display for ScreenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScreenState::Unknown => "UNKNOWN",
            ScreenState::Off => "OFF",
            ScreenState::OnLocked => "ON_LOCKED",
            ScreenState::OnUnlocked => "ON_UNLOCKED",
        };
        write!(f, "{}", s)
    }
}

/// Opaque identifier for one live tag session.
///
/// Handles are assigned by the driver layer when a target is discovered and
/// are unique among currently registered sessions; a handle is never reused
/// while its session is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagHandle(u32);

impl TagHandle {
    /// Wrap a raw driver-assigned handle value.
    pub fn new(raw: u32) -> Self {
        TagHandle(raw)
    }

    /// Get the raw handle value.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TagHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag technology identification.
///
/// Identifies the RF technology a discovered target speaks. The connected
/// technology bounds the payload size of a single raw exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TagTechnology {
    /// ISO 14443-A.
    NfcA,

    /// ISO 14443-B.
    NfcB,

    /// JIS X 6319-4 (FeliCa).
    NfcF,

    /// ISO 15693 (vicinity).
    NfcV,

    /// ISO-DEP (ISO 14443-4) half-duplex block protocol.
    IsoDep,

    /// Mifare Classic.
    MifareClassic,

    /// Mifare Ultralight.
    MifareUltralight,
}

impl TagTechnology {
    /// Get a human-readable name for the technology.
    pub fn name(&self) -> &str {
        match self {
            Self::NfcA => "NFC-A",
            Self::NfcB => "NFC-B",
            Self::NfcF => "NFC-F",
            Self::NfcV => "NFC-V",
            Self::IsoDep => "ISO-DEP",
            Self::MifareClassic => "Mifare Classic",
            Self::MifareUltralight => "Mifare Ultralight",
        }
    }

    /// Maximum transceive payload in bytes for this technology.
    ///
    /// The limits come from the controller's RF buffer: 255 bytes, minus CRC
    /// for A/V/Mifare, minus start-of-data and CRC for F. Raw NFC-B exchange
    /// is not supported by the controller, so its limit is zero. ISO-DEP
    /// frames up to 261 bytes are split across two RF frames automatically.
    #[must_use]
    pub fn max_transceive_length(self) -> usize {
        match self {
            Self::NfcA | Self::MifareClassic | Self::MifareUltralight => 253,
            Self::NfcB => 0,
            Self::NfcV => 253,
            Self::IsoDep => 261,
            Self::NfcF => 252,
        }
    }
}

impl fmt::Display for TagTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
