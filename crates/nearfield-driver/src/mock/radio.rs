//! Mock radio controller implementation.
//!
//! The mock simulates the controller by keeping the RF field state (a single
//! optional target) behind a lock and emitting driver events over a channel.
//! A [`MockRadioHandle`] controls the simulation: presenting and removing
//! targets, injecting failures, and inspecting call counters.

use crate::traits::RadioDriver;
use crate::types::{DriverEvent, TargetInfo};
use nearfield_core::{Error, Result, TagHandle, TagTechnology};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

/// Call counters kept by the mock for test assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub initialize: u32,
    pub deinitialize: u32,
    pub abort: u32,
    pub enable_discovery: u32,
    pub disable_discovery: u32,
    pub presence_checks: u32,
    pub transceives: u32,
}

#[derive(Debug, Default)]
struct MockState {
    initialized: bool,
    discovery_enabled: bool,
    target: Option<TargetInfo>,
    next_handle: u32,

    fail_initialize: bool,
    fail_deinitialize: bool,
    deinit_delay: Option<Duration>,
    definitive_loss: bool,

    transceive_responses: VecDeque<Vec<u8>>,
    transceive_delay: Option<Duration>,

    counters: MockCounters,
    // Controller calls in invocation order, for ordering assertions.
    operations: Vec<&'static str>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    event_tx: mpsc::UnboundedSender<DriverEvent>,
    event_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DriverEvent>>,
    abort_notify: Notify,
}

/// Mock radio controller.
///
/// Create with [`MockRadio::new`], which also returns the control handle.
///
/// # Examples
///
/// ```
/// use nearfield_driver::{MockRadio, RadioDriver};
/// use nearfield_core::TagTechnology;
///
/// #[tokio::main]
/// async fn main() -> nearfield_core::Result<()> {
///     let (radio, handle) = MockRadio::new();
///
///     radio.initialize().await?;
///     radio.enable_discovery().await?;
///
///     let tag = handle.present_target(vec![0x01, 0x02], TagTechnology::NfcF);
///     assert!(tag.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockRadio {
    shared: Arc<Shared>,
}

impl MockRadio {
    /// Create a new mock controller and its control handle.
    pub fn new() -> (Self, MockRadioHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState {
                next_handle: 1,
                ..MockState::default()
            }),
            event_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
            abort_notify: Notify::new(),
        });

        let radio = Self {
            shared: Arc::clone(&shared),
        };
        let handle = MockRadioHandle { shared };

        (radio, handle)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.shared.state.lock().unwrap();
        f(&mut state)
    }
}

impl RadioDriver for MockRadio {
    async fn initialize(&self) -> Result<()> {
        self.with_state(|s| {
            s.operations.push("initialize");
            s.counters.initialize += 1;
            if s.fail_initialize {
                s.fail_initialize = false;
                Err(Error::InitializationFailed(
                    "mock initialize failure".to_string(),
                ))
            } else {
                s.initialized = true;
                Ok(())
            }
        })
    }

    async fn deinitialize(&self) -> Result<()> {
        let (delay, fail) = self.with_state(|s| {
            s.operations.push("deinitialize");
            s.counters.deinitialize += 1;
            (s.deinit_delay, s.fail_deinitialize)
        });

        // Simulate a hung controller: block until the delay elapses or the
        // abort watchdog kicks us loose.
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shared.abort_notify.notified() => {}
            }
        }

        self.with_state(|s| {
            s.initialized = false;
            s.discovery_enabled = false;
        });

        if fail {
            Err(Error::Driver("mock deinitialize failure".to_string()))
        } else {
            Ok(())
        }
    }

    async fn abort(&self) {
        self.with_state(|s| {
            s.operations.push("abort");
            s.counters.abort += 1;
        });
        self.shared.abort_notify.notify_one();
    }

    async fn enable_discovery(&self) -> Result<()> {
        self.with_state(|s| {
            s.operations.push("enable_discovery");
            s.counters.enable_discovery += 1;
            s.discovery_enabled = true;
        });
        Ok(())
    }

    async fn disable_discovery(&self) -> Result<()> {
        self.with_state(|s| {
            s.operations.push("disable_discovery");
            s.counters.disable_discovery += 1;
            s.discovery_enabled = false;
        });
        Ok(())
    }

    async fn observe_target(&self) -> Option<TargetInfo> {
        self.with_state(|s| s.target.clone())
    }

    async fn transceive(&self, data: &[u8], _raw: bool, timeout: Duration) -> Result<Vec<u8>> {
        let (present, delay, queued) = self.with_state(|s| {
            s.counters.transceives += 1;
            (
                s.target.is_some(),
                s.transceive_delay,
                s.transceive_responses.pop_front(),
            )
        });

        if !present {
            return Err(Error::TagLost);
        }

        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(Error::Timeout(timeout.as_millis() as u64));
            }
            tokio::time::sleep(delay).await;
        }

        // Without a programmed response the mock echoes the payload.
        Ok(queued.unwrap_or_else(|| data.to_vec()))
    }

    async fn check_presence(&self) -> Result<bool> {
        self.with_state(|s| {
            s.counters.presence_checks += 1;
            if s.definitive_loss {
                Err(Error::TagLost)
            } else {
                Ok(s.target.is_some())
            }
        })
    }

    async fn next_event(&self) -> Option<DriverEvent> {
        let mut rx = self.shared.event_rx.lock().await;
        rx.recv().await
    }
}

/// Handle for controlling a [`MockRadio`].
///
/// The handle shares state with its controller, so it can be cloned freely
/// and used from test code while the driver is owned by the service.
#[derive(Debug, Clone)]
pub struct MockRadioHandle {
    shared: Arc<Shared>,
}

impl MockRadioHandle {
    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.shared.state.lock().unwrap();
        f(&mut state)
    }

    /// Put a target into the RF field.
    ///
    /// When discovery polling is active, a discovery event is emitted and
    /// the assigned handle returned. Otherwise the target just sits in the
    /// field (visible to `observe_target`/`check_presence`) and `None` is
    /// returned; present it again once polling is running to discover it.
    pub fn present_target(&self, uid: Vec<u8>, technology: TagTechnology) -> Option<TagHandle> {
        self.present_target_with(uid, technology, Vec::new())
    }

    /// Like [`present_target`](Self::present_target) with explicit
    /// activation bytes.
    pub fn present_target_with(
        &self,
        uid: Vec<u8>,
        technology: TagTechnology,
        poll_bytes: Vec<u8>,
    ) -> Option<TagHandle> {
        let target = TargetInfo {
            uid,
            technology,
            poll_bytes,
        };
        let (discovered, event) = self.with_state(|s| {
            s.target = Some(target.clone());
            s.definitive_loss = false;
            if s.initialized && s.discovery_enabled {
                let handle = TagHandle::new(s.next_handle);
                s.next_handle += 1;
                (
                    Some(handle),
                    Some(DriverEvent::TargetDiscovered {
                        handle,
                        target,
                    }),
                )
            } else {
                (None, None)
            }
        });
        if let Some(event) = event {
            let _ = self.shared.event_tx.send(event);
        }
        discovered
    }

    /// Take the current target out of the field.
    ///
    /// Subsequent presence probes miss; no event is emitted (the service
    /// notices through its presence watchdog).
    pub fn remove_target(&self) {
        self.with_state(|s| s.target = None);
    }

    /// Make the next presence probes report a definitive loss instead of a
    /// transient miss.
    pub fn set_definitive_loss(&self) {
        self.with_state(|s| {
            s.target = None;
            s.definitive_loss = true;
        });
    }

    /// Emit a target-deselected event.
    pub fn deselect_target(&self) {
        let _ = self.shared.event_tx.send(DriverEvent::TargetDeselected);
    }

    /// Emit a field activation/deactivation event.
    pub fn set_field(&self, active: bool) {
        let event = if active {
            DriverEvent::FieldActivated
        } else {
            DriverEvent::FieldDeactivated
        };
        let _ = self.shared.event_tx.send(event);
    }

    /// Emit a link activation/deactivation event.
    pub fn set_link(&self, active: bool) {
        let event = if active {
            DriverEvent::LinkActivated
        } else {
            DriverEvent::LinkDeactivated
        };
        let _ = self.shared.event_tx.send(event);
    }

    /// Make the next `initialize` call fail once.
    pub fn fail_next_initialize(&self) {
        self.with_state(|s| s.fail_initialize = true);
    }

    /// Make every `deinitialize` call return an error.
    pub fn fail_deinitialize(&self, fail: bool) {
        self.with_state(|s| s.fail_deinitialize = fail);
    }

    /// Make `deinitialize` block for `delay` unless aborted first.
    pub fn set_deinit_delay(&self, delay: Duration) {
        self.with_state(|s| s.deinit_delay = Some(delay));
    }

    /// Queue a canned transceive response; responses are consumed in FIFO
    /// order, after which the mock goes back to echoing.
    pub fn queue_transceive_response(&self, response: Vec<u8>) {
        self.with_state(|s| s.transceive_responses.push_back(response));
    }

    /// Delay every transceive by `delay` (exchanges longer than the attached
    /// timeout fail with a timeout error).
    pub fn set_transceive_delay(&self, delay: Duration) {
        self.with_state(|s| s.transceive_delay = Some(delay));
    }

    /// Whether the controller is currently initialized.
    pub fn is_initialized(&self) -> bool {
        self.with_state(|s| s.initialized)
    }

    /// Whether discovery polling is currently active.
    pub fn is_discovery_enabled(&self) -> bool {
        self.with_state(|s| s.discovery_enabled)
    }

    /// Snapshot of the call counters.
    pub fn counters(&self) -> MockCounters {
        self.with_state(|s| s.counters.clone())
    }

    /// Controller calls in invocation order.
    pub fn operations(&self) -> Vec<&'static str> {
        self.with_state(|s| s.operations.clone())
    }
}
