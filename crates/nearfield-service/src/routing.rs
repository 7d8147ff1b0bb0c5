//! Discovery routing policy.
//!
//! Decides whether discovery polling should run, as a pure function of the
//! adapter state, the screen state, the current polling flag, and the force
//! override. The adapter worker applies the decision; this module never
//! touches the driver.

use nearfield_core::constants::POLLING_THRESHOLD;
use nearfield_core::{AdapterState, ScreenState};

/// What the adapter worker must do to converge on the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingChange {
    /// Nothing to do.
    None,

    /// Enable discovery polling.
    StartPolling,

    /// Disable discovery polling; connected tags stay connected.
    StopPolling,

    /// Disable discovery polling AND disconnect every registered tag.
    ///
    /// Polling must stop before the disconnects, otherwise a disconnecting
    /// tag can be rediscovered mid-teardown.
    StopPollingAndDisconnect,
}

/// Screen-state driven polling policy.
#[derive(Debug, Clone, Copy)]
pub struct RoutingPolicy {
    threshold: ScreenState,
}

impl RoutingPolicy {
    /// Create a policy with a custom polling threshold.
    pub fn new(threshold: ScreenState) -> Self {
        Self { threshold }
    }

    /// Decide the routing change for the current inputs.
    ///
    /// `force` rewrites the polling state even when the computed state
    /// matches the current one. This redundancy is intentional: forcing the
    /// driver through a fresh enable/disable resynchronizes it after paths
    /// (deselect, adapter enable) where its internal state may have drifted.
    pub fn decide(
        &self,
        adapter: AdapterState,
        screen: ScreenState,
        polling_enabled: bool,
        force: bool,
    ) -> RoutingChange {
        if adapter != AdapterState::On {
            return RoutingChange::None;
        }

        if screen == ScreenState::Off {
            if self.threshold > ScreenState::Off && (force || polling_enabled) {
                return RoutingChange::StopPollingAndDisconnect;
            }
            return RoutingChange::None;
        }

        if screen >= self.threshold {
            if force || !polling_enabled {
                RoutingChange::StartPolling
            } else {
                RoutingChange::None
            }
        } else if force || polling_enabled {
            RoutingChange::StopPolling
        } else {
            RoutingChange::None
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::new(POLLING_THRESHOLD)
    }
}
