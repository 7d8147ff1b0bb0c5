//! Radio controller trait definition.
//!
//! This trait is the contract between the reader service and the low-level
//! radio controller. It exposes the handful of primitives the service needs:
//! lifecycle (initialize/deinitialize/abort), discovery polling, target
//! observation, byte-level exchange, and a presence probe.
//!
//! The trait uses native `async fn` methods (Edition 2024 RPITIT), so it is
//! not object-safe; use [`AnyRadioDriver`](crate::devices::AnyRadioDriver)
//! where dynamic dispatch is needed.

#![allow(async_fn_in_trait)]

use crate::types::{DriverEvent, TargetInfo};
use nearfield_core::Result;
use std::time::Duration;

/// Low-level radio controller abstraction.
///
/// All methods take `&self`: the driver is shared between the adapter
/// worker, the dispatch loop, and per-tag watchdog tasks, and must manage
/// its own interior state.
///
/// # Blocking behavior
///
/// `initialize` and `deinitialize` may block for a long time on unresponsive
/// hardware. Callers must never invoke them from a time-sensitive task; the
/// service runs them on its serialized worker and guards `deinitialize` with
/// an abort watchdog that calls [`abort`](RadioDriver::abort).
pub trait RadioDriver: Send + Sync {
    /// Bring the controller up.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot be initialized; the service
    /// treats this as a recoverable failure and falls back to the off state.
    async fn initialize(&self) -> Result<()>;

    /// Shut the controller down.
    ///
    /// May block indefinitely on unresponsive hardware; see the trait-level
    /// note on the abort watchdog.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown failed. The service completes its
    /// disable path regardless of the outcome.
    async fn deinitialize(&self) -> Result<()>;

    /// Force the controller out of whatever it is blocked on.
    ///
    /// Called by the abort watchdog when `deinitialize` does not return in
    /// time. Must cause any in-flight controller call to fail promptly.
    async fn abort(&self);

    /// Start discovery polling for targets in the field.
    ///
    /// # Errors
    ///
    /// Returns an error on controller communication failure.
    async fn enable_discovery(&self) -> Result<()>;

    /// Stop discovery polling.
    ///
    /// # Errors
    ///
    /// Returns an error on controller communication failure.
    async fn disable_discovery(&self) -> Result<()>;

    /// Identifier currently observed in the field, if any.
    async fn observe_target(&self) -> Option<TargetInfo>;

    /// Exchange raw bytes with the target currently in the field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TagLost`](nearfield_core::Error::TagLost) when the
    /// target left the field mid-exchange,
    /// [`Error::Timeout`](nearfield_core::Error::Timeout) when the exchange
    /// did not complete within `timeout`, and a driver error otherwise.
    async fn transceive(&self, data: &[u8], raw: bool, timeout: Duration) -> Result<Vec<u8>>;

    /// Probe whether the target is still in the field.
    ///
    /// # Errors
    ///
    /// `Ok(true)` means present, `Ok(false)` a transient miss, and
    /// [`Error::TagLost`](nearfield_core::Error::TagLost) a definitive loss
    /// signal from the controller.
    async fn check_presence(&self) -> Result<bool>;

    /// Receive the next driver event.
    ///
    /// Returns `None` when the driver has shut down and no further events
    /// will be produced. Intended to be consumed by a single dispatch loop.
    async fn next_event(&self) -> Option<DriverEvent>;
}
