//! Enum wrapper for radio driver dispatch.
//!
//! Native `async fn` in traits (RPITIT) are not object-safe, so the service
//! cannot hold a `Box<dyn RadioDriver>`. This enum provides concrete-type
//! dispatch at compile time instead, with zero-cost abstraction and a clear
//! path to real hardware back ends behind feature flags.

use crate::mock::MockRadio;
use crate::traits::RadioDriver;
use crate::types::{DriverEvent, TargetInfo};
use nearfield_core::Result;
use std::time::Duration;

/// Enum wrapper for radio driver dispatch.
///
/// # Examples
///
/// ```
/// use nearfield_driver::{AnyRadioDriver, MockRadio, RadioDriver};
///
/// #[tokio::main]
/// async fn main() -> nearfield_core::Result<()> {
///     let (radio, _handle) = MockRadio::new();
///     let driver = AnyRadioDriver::Mock(radio);
///
///     driver.initialize().await?;
///     driver.enable_discovery().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyRadioDriver {
    /// Mock controller for development and testing.
    Mock(MockRadio),
    // Planned variants behind the hardware-* feature flags:
    // - Pcsc(PcscRadio) - PC/SC contactless readers
    // - Usb(UsbRadio) - direct USB controller access
}

impl RadioDriver for AnyRadioDriver {
    async fn initialize(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.initialize().await,
        }
    }

    async fn deinitialize(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.deinitialize().await,
        }
    }

    async fn abort(&self) {
        match self {
            Self::Mock(driver) => driver.abort().await,
        }
    }

    async fn enable_discovery(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.enable_discovery().await,
        }
    }

    async fn disable_discovery(&self) -> Result<()> {
        match self {
            Self::Mock(driver) => driver.disable_discovery().await,
        }
    }

    async fn observe_target(&self) -> Option<TargetInfo> {
        match self {
            Self::Mock(driver) => driver.observe_target().await,
        }
    }

    async fn transceive(&self, data: &[u8], raw: bool, timeout: Duration) -> Result<Vec<u8>> {
        match self {
            Self::Mock(driver) => driver.transceive(data, raw, timeout).await,
        }
    }

    async fn check_presence(&self) -> Result<bool> {
        match self {
            Self::Mock(driver) => driver.check_presence().await,
        }
    }

    async fn next_event(&self) -> Option<DriverEvent> {
        match self {
            Self::Mock(driver) => driver.next_event().await,
        }
    }
}
