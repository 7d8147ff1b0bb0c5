//! Data carriers exchanged between the driver and the service.

use nearfield_core::constants::MAX_UID_LENGTH;
use nearfield_core::{Error, Result, TagHandle, TagTechnology};

/// Identifier observed in the RF field.
///
/// Produced by the driver whenever it can see a target: on discovery and on
/// every subsequent observation request. The poll bytes carry the
/// technology-specific activation payload (for NFC-F the 8-byte PMm followed
/// by the 2-byte system code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// Target unique identifier.
    pub uid: Vec<u8>,

    /// Technology the target was activated with.
    pub technology: TagTechnology,

    /// Technology-specific activation bytes.
    pub poll_bytes: Vec<u8>,
}

impl TargetInfo {
    /// Create a new observation with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID is empty or longer than
    /// [`MAX_UID_LENGTH`] bytes.
    pub fn new(uid: Vec<u8>, technology: TagTechnology, poll_bytes: Vec<u8>) -> Result<Self> {
        if uid.is_empty() {
            return Err(Error::InvalidTarget("UID cannot be empty".to_string()));
        }
        if uid.len() > MAX_UID_LENGTH {
            return Err(Error::InvalidTarget(format!(
                "UID length must be at most {} bytes, got {}",
                MAX_UID_LENGTH,
                uid.len()
            )));
        }
        Ok(Self {
            uid,
            technology,
            poll_bytes,
        })
    }

    /// Get the UID as a hexadecimal string.
    pub fn uid_hex(&self) -> String {
        self.uid
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Event emitted by the radio driver.
///
/// The service consumes these through a single dispatch loop; the driver
/// never calls back into the service directly.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DriverEvent {
    /// A target entered the field while discovery was active.
    TargetDiscovered {
        /// Driver-assigned session handle, unique while the session lives.
        handle: TagHandle,

        /// Observation the target was discovered with.
        target: TargetInfo,
    },

    /// The remote reader deselected us as a target.
    TargetDeselected,

    /// An external RF field was detected.
    FieldActivated,

    /// The external RF field went away.
    FieldDeactivated,

    /// A peer-to-peer link came up.
    LinkActivated,

    /// A peer-to-peer link went down.
    LinkDeactivated,
}
