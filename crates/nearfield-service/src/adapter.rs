//! Adapter lifecycle state machine.
//!
//! All work that can turn the controller on or off goes through one
//! single-worker task queue: enqueue never blocks the caller, execution is
//! strictly FIFO and never concurrent. Each lifecycle task may transition
//! the state through `TurningOn`/`TurningOff` but must exit in `On` or
//! `Off`, so every task is guaranteed to start from a settled state.
//!
//! Screen-state changes and routing requests ride the same queue, which is
//! what keeps two rapid screen events from racing each other's polling
//! toggles.

use crate::dispatcher::TagDispatcher;
use crate::prefs::PreferenceStore;
use crate::registry::TagRegistry;
use crate::routing::{RoutingChange, RoutingPolicy};
use crate::service::ServiceNotification;
use crate::sounds::SoundEffects;
use crate::watchdog::AbortWatchdog;
use nearfield_core::constants::{DEINIT_WATCHDOG_TIMEOUT_MS, POLLING_THRESHOLD};
use nearfield_core::{AdapterState, Error, Result, ScreenState};
use nearfield_driver::{AnyRadioDriver, RadioDriver};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the adapter state machine.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Minimum screen state that enables discovery polling.
    pub polling_threshold: ScreenState,

    /// How long `deinitialize` may block before the controller is aborted.
    pub deinit_watchdog_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            polling_threshold: POLLING_THRESHOLD,
            deinit_watchdog_timeout: Duration::from_millis(DEINIT_WATCHDOG_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LifecycleKind {
    Enable,
    Disable,
    Boot,
}

#[derive(Debug)]
enum AdapterTask {
    Lifecycle {
        kind: LifecycleKind,
        ack: oneshot::Sender<Result<()>>,
    },
    SetScreenState {
        screen: ScreenState,
        ack: oneshot::Sender<()>,
    },
    ApplyRouting {
        force: bool,
        ack: oneshot::Sender<()>,
    },
}

/// Serialized owner of the reader's on/off lifecycle.
#[derive(Debug)]
pub struct AdapterStateMachine {
    task_tx: mpsc::UnboundedSender<AdapterTask>,
    state: Arc<AtomicU8>,
    worker: JoinHandle<()>,
}

impl AdapterStateMachine {
    /// Create the state machine and spawn its worker task.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: Arc<AnyRadioDriver>,
        registry: Arc<TagRegistry>,
        prefs: Arc<PreferenceStore>,
        dispatcher: Arc<dyn TagDispatcher>,
        sounds: Arc<dyn SoundEffects>,
        notifications: broadcast::Sender<ServiceNotification>,
        config: AdapterConfig,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(AdapterState::Off as u8));
        let worker = AdapterWorker {
            driver,
            registry,
            prefs,
            dispatcher,
            sounds,
            notifications,
            routing: RoutingPolicy::new(config.polling_threshold),
            deinit_watchdog_timeout: config.deinit_watchdog_timeout,
            state: Arc::clone(&state),
            screen: ScreenState::Unknown,
            polling_enabled: false,
        };
        let worker = tokio::spawn(worker.run(task_rx));
        Self {
            task_tx,
            state,
            worker,
        }
    }

    /// Current adapter state (lock-free snapshot).
    pub fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::SeqCst)).unwrap_or(AdapterState::Off)
    }

    /// Whether the adapter is fully on.
    pub fn is_enabled(&self) -> bool {
        self.state() == AdapterState::On
    }

    /// Enable the adapter.
    ///
    /// The task is queued immediately; awaiting the returned future waits
    /// for the serialized worker to finish it.
    pub async fn enable(&self) -> Result<()> {
        self.submit_lifecycle(LifecycleKind::Enable).await
    }

    /// Disable the adapter.
    pub async fn disable(&self) -> Result<()> {
        self.submit_lifecycle(LifecycleKind::Disable).await
    }

    /// Enable the adapter and run the one-time first-boot work.
    pub async fn boot(&self) -> Result<()> {
        self.submit_lifecycle(LifecycleKind::Boot).await
    }

    /// Queue a boot without waiting for it; used at service startup.
    pub(crate) fn enqueue_boot(&self) {
        let (ack, _discarded) = oneshot::channel();
        let _ = self.task_tx.send(AdapterTask::Lifecycle {
            kind: LifecycleKind::Boot,
            ack,
        });
    }

    /// Record a new screen state and reapply routing.
    pub async fn set_screen_state(&self, screen: ScreenState) {
        let (ack, rx) = oneshot::channel();
        if self
            .task_tx
            .send(AdapterTask::SetScreenState { screen, ack })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Reapply the routing policy, optionally forcing the polling state to
    /// be rewritten even when unchanged.
    pub async fn apply_routing(&self, force: bool) {
        let (ack, rx) = oneshot::channel();
        if self
            .task_tx
            .send(AdapterTask::ApplyRouting { force, ack })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub(crate) fn shutdown(&self) {
        self.worker.abort();
    }

    async fn submit_lifecycle(&self, kind: LifecycleKind) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.task_tx
            .send(AdapterTask::Lifecycle { kind, ack })
            .map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }
}

struct AdapterWorker {
    driver: Arc<AnyRadioDriver>,
    registry: Arc<TagRegistry>,
    prefs: Arc<PreferenceStore>,
    dispatcher: Arc<dyn TagDispatcher>,
    sounds: Arc<dyn SoundEffects>,
    notifications: broadcast::Sender<ServiceNotification>,
    routing: RoutingPolicy,
    deinit_watchdog_timeout: Duration,
    state: Arc<AtomicU8>,
    screen: ScreenState,
    polling_enabled: bool,
}

impl AdapterWorker {
    async fn run(mut self, mut tasks: mpsc::UnboundedReceiver<AdapterTask>) {
        while let Some(task) = tasks.recv().await {
            match task {
                AdapterTask::Lifecycle { kind, ack } => {
                    let _ = ack.send(self.run_lifecycle(kind).await);
                }
                AdapterTask::SetScreenState { screen, ack } => {
                    debug!(screen = %screen, "screen state changed");
                    self.screen = screen;
                    self.apply_routing(false).await;
                    let _ = ack.send(());
                }
                AdapterTask::ApplyRouting { force, ack } => {
                    self.apply_routing(force).await;
                    let _ = ack.send(());
                }
            }
        }
        debug!("adapter worker stopped");
    }

    async fn run_lifecycle(&mut self, kind: LifecycleKind) -> Result<()> {
        // Sanity check: tasks are serialized, so a transitional state at
        // entry means a call ordering bug upstream, not something to
        // recover from here.
        let state = self.current_state();
        if state.is_transitional() {
            error!(%state, ?kind, "processing lifecycle task from bad state");
            return Err(Error::AdapterBusy(state));
        }

        match kind {
            LifecycleKind::Enable => self.enable_internal().await,
            LifecycleKind::Disable => self.disable_internal().await,
            LifecycleKind::Boot => self.boot_internal().await,
        }
    }

    /// Enable the controller. Does not touch preferences.
    async fn enable_internal(&mut self) -> Result<()> {
        if self.current_state() == AdapterState::On {
            return Ok(());
        }
        info!("enabling reader");
        self.update_state(AdapterState::TurningOn);

        if let Err(e) = self.driver.initialize().await {
            warn!("error enabling reader: {e}");
            self.update_state(AdapterState::Off);
            return Err(e);
        }

        // Sessions from a previous power cycle are stale.
        self.registry.clear();
        self.update_state(AdapterState::On);

        self.sounds.acquire();

        // Start the polling loop if the screen state permits.
        self.apply_routing(true).await;
        Ok(())
    }

    /// Disable the controller. Does not touch preferences.
    async fn disable_internal(&mut self) -> Result<()> {
        if self.current_state() == AdapterState::Off {
            return Ok(());
        }
        info!("disabling reader");
        self.update_state(AdapterState::TurningOff);

        // deinitialize() sometimes hangs on a wedged controller; the
        // watchdog aborts it so this path always completes.
        let watchdog = AbortWatchdog::arm(Arc::clone(&self.driver), self.deinit_watchdog_timeout);

        // Stop polling before disconnecting, so a disconnecting tag is not
        // rediscovered mid-teardown. This also winds down every presence
        // watchdog before the controller goes away under it.
        if self.polling_enabled {
            self.polling_enabled = false;
            if let Err(e) = self.driver.disable_discovery().await {
                warn!("disable discovery failed: {e}");
            }
        }
        self.registry.disconnect_all().await;

        self.dispatcher.clear_foreground_dispatch();

        let result = self.driver.deinitialize().await;
        debug!(ok = result.is_ok(), "deinitialize returned");
        watchdog.disarm().await;

        self.update_state(AdapterState::Off);

        self.sounds.release();

        result
    }

    /// Enable, then run the first-boot work exactly once, ever.
    async fn boot_internal(&mut self) -> Result<()> {
        let result = self.enable_internal().await;
        if !self.prefs.first_boot_done() {
            info!("first boot");
            if let Err(e) = self.prefs.set_first_boot_done() {
                warn!("could not persist first boot flag: {e}");
            }
        }
        result
    }

    fn current_state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::SeqCst)).unwrap_or(AdapterState::Off)
    }

    fn update_state(&mut self, new: AdapterState) {
        let old = self.current_state();
        if new == old {
            return;
        }
        // Only this worker mutates the state, so the store and the
        // notification cannot interleave with another state change.
        self.state.store(new as u8, Ordering::SeqCst);
        info!(old = %old, new = %new, "adapter state changed");
        let _ = self
            .notifications
            .send(ServiceNotification::AdapterStateChanged { old, new });
    }

    async fn apply_routing(&mut self, force: bool) {
        let change = self
            .routing
            .decide(self.current_state(), self.screen, self.polling_enabled, force);
        match change {
            RoutingChange::None => {}
            RoutingChange::StartPolling => {
                debug!("discovery on");
                self.polling_enabled = true;
                if let Err(e) = self.driver.enable_discovery().await {
                    warn!("enable discovery failed: {e}");
                }
            }
            RoutingChange::StopPolling => {
                debug!("discovery off");
                self.polling_enabled = false;
                if let Err(e) = self.driver.disable_discovery().await {
                    warn!("disable discovery failed: {e}");
                }
            }
            RoutingChange::StopPollingAndDisconnect => {
                debug!("discovery off, disconnecting");
                self.polling_enabled = false;
                if let Err(e) = self.driver.disable_discovery().await {
                    warn!("disable discovery failed: {e}");
                }
                self.registry.disconnect_all().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::LogDispatcher;
    use crate::sounds::NoopSounds;
    use nearfield_driver::{MockRadio, MockRadioHandle};

    fn machine() -> (Arc<AdapterStateMachine>, MockRadioHandle) {
        let (radio, mock) = MockRadio::new();
        let (notifications, _) = broadcast::channel(16);
        let adapter = Arc::new(AdapterStateMachine::new(
            Arc::new(AnyRadioDriver::Mock(radio)),
            Arc::new(TagRegistry::new()),
            Arc::new(PreferenceStore::in_memory()),
            Arc::new(LogDispatcher),
            Arc::new(NoopSounds),
            notifications,
            AdapterConfig::default(),
        ));
        (adapter, mock)
    }

    #[tokio::test]
    async fn test_enable_turns_on_and_polls_when_unlocked() {
        let (adapter, mock) = machine();
        adapter.set_screen_state(ScreenState::OnUnlocked).await;

        adapter.enable().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::On);
        assert!(mock.is_discovery_enabled());
    }

    #[tokio::test]
    async fn test_enable_does_not_poll_below_threshold() {
        let (adapter, mock) = machine();
        adapter.set_screen_state(ScreenState::OnLocked).await;

        adapter.enable().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::On);
        assert!(!mock.is_discovery_enabled());
    }

    #[tokio::test]
    async fn test_enable_twice_is_noop() {
        let (adapter, mock) = machine();
        adapter.enable().await.unwrap();
        adapter.enable().await.unwrap();
        assert_eq!(mock.counters().initialize, 1);
    }

    #[tokio::test]
    async fn test_enable_failure_falls_back_to_off() {
        let (adapter, mock) = machine();
        mock.fail_next_initialize();

        let result = adapter.enable().await;
        assert!(result.is_err());
        assert_eq!(adapter.state(), AdapterState::Off);

        // The failure is not sticky.
        adapter.enable().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::On);
    }

    #[tokio::test]
    async fn test_disable_reaches_off_even_when_deinit_fails() {
        let (adapter, mock) = machine();
        adapter.enable().await.unwrap();

        mock.fail_deinitialize(true);
        let result = adapter.disable().await;
        assert!(result.is_err());
        assert_eq!(adapter.state(), AdapterState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_aborts_hung_deinitialize() {
        let (adapter, mock) = machine();
        adapter.enable().await.unwrap();

        // Hang longer than the 10s watchdog.
        mock.set_deinit_delay(Duration::from_secs(60));
        adapter.disable().await.unwrap();

        assert_eq!(adapter.state(), AdapterState::Off);
        assert_eq!(mock.counters().abort, 1);
    }

    #[tokio::test]
    async fn test_screen_events_toggle_polling() {
        let (adapter, mock) = machine();
        adapter.set_screen_state(ScreenState::OnUnlocked).await;
        adapter.enable().await.unwrap();
        assert!(mock.is_discovery_enabled());

        adapter.set_screen_state(ScreenState::OnLocked).await;
        assert!(!mock.is_discovery_enabled());

        adapter.set_screen_state(ScreenState::OnUnlocked).await;
        assert!(mock.is_discovery_enabled());

        adapter.set_screen_state(ScreenState::Off).await;
        assert!(!mock.is_discovery_enabled());
    }

    #[tokio::test]
    async fn test_lifecycle_tasks_serialize() {
        let (adapter, mock) = machine();
        adapter.set_screen_state(ScreenState::OnUnlocked).await;

        // Fire a burst of interleaved tasks; the worker runs them FIFO and
        // none of them may observe a transitional state at entry (which
        // would surface as AdapterBusy).
        let mut handles = Vec::new();
        for _ in 0..5 {
            let a = Arc::clone(&adapter);
            handles.push(tokio::spawn(async move { a.enable().await }));
            let a = Arc::clone(&adapter);
            handles.push(tokio::spawn(async move { a.disable().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = adapter.state();
        assert!(state == AdapterState::On || state == AdapterState::Off);
        let counters = mock.counters();
        assert!(counters.initialize >= 1);
        assert!(counters.deinitialize >= 1);
    }

    #[tokio::test]
    async fn test_boot_runs_first_boot_once() {
        let (radio, _mock) = MockRadio::new();
        let prefs = Arc::new(PreferenceStore::in_memory());
        let (notifications, _) = broadcast::channel(16);
        let adapter = AdapterStateMachine::new(
            Arc::new(AnyRadioDriver::Mock(radio)),
            Arc::new(TagRegistry::new()),
            Arc::clone(&prefs),
            Arc::new(LogDispatcher),
            Arc::new(NoopSounds),
            notifications,
            AdapterConfig::default(),
        );

        assert!(!prefs.first_boot_done());
        adapter.boot().await.unwrap();
        assert!(prefs.first_boot_done());
        assert_eq!(adapter.state(), AdapterState::On);

        // A second boot is an enable no-op and does not undo the flag.
        adapter.boot().await.unwrap();
        assert!(prefs.first_boot_done());
    }

    #[tokio::test]
    async fn test_state_change_notifications() {
        let (radio, _mock) = MockRadio::new();
        let (notifications, mut rx) = broadcast::channel(16);
        let adapter = AdapterStateMachine::new(
            Arc::new(AnyRadioDriver::Mock(radio)),
            Arc::new(TagRegistry::new()),
            Arc::new(PreferenceStore::in_memory()),
            Arc::new(LogDispatcher),
            Arc::new(NoopSounds),
            notifications,
            AdapterConfig::default(),
        );

        adapter.enable().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            ServiceNotification::AdapterStateChanged {
                old: AdapterState::Off,
                new: AdapterState::TurningOn,
            }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            ServiceNotification::AdapterStateChanged {
                old: AdapterState::TurningOn,
                new: AdapterState::On,
            }
        ));
    }
}
