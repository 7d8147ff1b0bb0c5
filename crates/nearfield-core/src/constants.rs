//! Core constants for the reader service.
//!
//! Timing values are inherited from the controller integration the service
//! was written against; changing them changes the failure-recovery behavior
//! of the watchdogs, so adjust with care.

use crate::types::ScreenState;

// ============================================================================
// Routing
// ============================================================================

/// Minimum screen state that enables discovery polling.
pub const POLLING_THRESHOLD: ScreenState = ScreenState::OnUnlocked;

// ============================================================================
// Watchdogs
// ============================================================================

/// Interval between presence probes of a connected tag, in milliseconds.
pub const PRESENCE_CHECK_INTERVAL_MS: u64 = 125;

/// Consecutive failed presence probes before a tag is considered lost.
pub const PRESENCE_CHECK_MAX_MISSES: u32 = 3;

/// How long a deinitialize call may block before the controller is aborted,
/// in milliseconds.
pub const DEINIT_WATCHDOG_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Transceive
// ============================================================================

/// Timeout attached to a single raw exchange with a tag, in milliseconds.
pub const TRANSCEIVE_TIMEOUT_MS: u64 = 12_000;

// ============================================================================
// Identifiers
// ============================================================================

/// Maximum UID length in bytes accepted from the driver.
pub const MAX_UID_LENGTH: usize = 10;
