//! Radio controller abstraction layer for the reader service.
//!
//! This crate defines the trait boundary between the reader service and the
//! low-level radio controller: bring-up and teardown of the controller,
//! discovery polling, target observation, and byte-level exchange with a tag
//! in the field. A controllable mock implementation is provided for
//! development and testing without physical hardware.
//!
//! # Design Philosophy
//!
//! - **Async-first**: all controller operations are asynchronous using native
//!   `async fn` in traits (Edition 2024 RPITIT).
//! - **Shared access**: the driver is shared between the adapter worker, the
//!   dispatch loop, and per-tag watchdog tasks, so all trait methods take
//!   `&self`; implementations manage their own interior state.
//! - **Enum dispatch**: native async traits are not object-safe, so the
//!   [`AnyRadioDriver`] wrapper provides concrete-type dispatch (see the
//!   [`devices`] module).

pub mod devices;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::AnyRadioDriver;
pub use mock::{MockRadio, MockRadioHandle};
pub use traits::RadioDriver;
pub use types::{DriverEvent, TargetInfo};
