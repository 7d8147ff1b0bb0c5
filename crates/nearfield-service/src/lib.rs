//! Proximity reader lifecycle service.
//!
//! This crate owns the software state machine around a proximity radio
//! controller: turning the reader on and off, deciding when discovery
//! polling runs, tracking which discovered tags are alive, and running the
//! safety nets (watchdogs) that keep misbehaving hardware or hung calls
//! from freezing the controlling process.
//!
//! # Architecture
//!
//! ```text
//!                 ┌─────────────────────┐
//!  enable/disable │ AdapterStateMachine │  single serialized worker:
//!  screen events ─► (task queue)        │  lifecycle + routing
//!                 └────────┬────────────┘
//!                          │ RoutingPolicy
//!                 ┌────────▼────────┐        ┌──────────────┐
//!  driver events ─►  DispatchLoop   ├───────►│ TagDispatcher │ (collaborator)
//!                 └────────┬────────┘        └──────────────┘
//!                          │ register/unregister
//!                 ┌────────▼────────┐
//!                 │   TagRegistry   │  handle → TagSession
//!                 └────────┬────────┘
//!                          │
//!                 ┌────────▼────────┐
//!                 │   TagSession    │  presence watchdog per session
//!                 └─────────────────┘
//! ```
//!
//! Three execution contexts exist: the serialized adapter worker (the only
//! place the adapter state is mutated, and the only place that may block on
//! driver lifecycle calls), one presence-watchdog task per connected
//! session, and the single-threaded dispatch loop.
//!
//! # Watchdogs
//!
//! Two independent safety nets guarantee forward progress:
//! [`AbortWatchdog`] bounds a hung `deinitialize`, and each session's
//! presence watchdog notices tags that silently left the field and triggers
//! cleanup plus a polling restart.

pub mod adapter;
mod dispatch;
pub mod dispatcher;
pub mod prefs;
pub mod registry;
pub mod routing;
pub mod service;
pub mod session;
pub mod sounds;
pub mod watchdog;

// Re-export commonly used types for convenience
pub use adapter::{AdapterConfig, AdapterStateMachine};
pub use dispatcher::{DiscoveredTag, LogDispatcher, TagDispatcher};
pub use prefs::PreferenceStore;
pub use registry::TagRegistry;
pub use routing::{RoutingChange, RoutingPolicy};
pub use service::{ReaderService, ServiceConfig, ServiceNotification};
pub use session::{SessionConfig, TagSession};
pub use sounds::{NoopSounds, SoundCue, SoundEffects};
pub use watchdog::AbortWatchdog;
