//! Reader service facade.
//!
//! Wires the driver, the adapter state machine, the registry, and the
//! dispatch loop together behind one explicitly constructed handle. There
//! is no ambient global: whoever starts the service owns it and passes it
//! down.

use crate::adapter::{AdapterConfig, AdapterStateMachine};
use crate::dispatch::DispatchLoop;
use crate::dispatcher::TagDispatcher;
use crate::prefs::PreferenceStore;
use crate::registry::TagRegistry;
use crate::session::{SessionConfig, TagSession};
use crate::sounds::SoundEffects;
use nearfield_core::constants::{
    DEINIT_WATCHDOG_TIMEOUT_MS, POLLING_THRESHOLD, PRESENCE_CHECK_INTERVAL_MS,
    TRANSCEIVE_TIMEOUT_MS,
};
use nearfield_core::{AdapterState, Error, Result, ScreenState, TagHandle, TagTechnology};
use nearfield_driver::AnyRadioDriver;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Service-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Minimum screen state that enables discovery polling.
    pub polling_threshold: ScreenState,

    /// How long `deinitialize` may block before the controller is aborted.
    pub deinit_watchdog_timeout: Duration,

    /// Interval between presence probes of a connected tag.
    pub presence_check_interval: Duration,

    /// Timeout attached to a single transceive exchange.
    pub transceive_timeout: Duration,

    /// Preference file location; `None` keeps preferences in memory.
    pub prefs_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            polling_threshold: POLLING_THRESHOLD,
            deinit_watchdog_timeout: Duration::from_millis(DEINIT_WATCHDOG_TIMEOUT_MS),
            presence_check_interval: Duration::from_millis(PRESENCE_CHECK_INTERVAL_MS),
            transceive_timeout: Duration::from_millis(TRANSCEIVE_TIMEOUT_MS),
            prefs_path: None,
        }
    }
}

/// Notification published to service listeners.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServiceNotification {
    /// The adapter state changed.
    AdapterStateChanged {
        old: AdapterState,
        new: AdapterState,
    },

    /// A tag was discovered and registered.
    TagDiscovered {
        handle: TagHandle,
        uid: Vec<u8>,
        tech_list: Vec<TagTechnology>,
    },

    /// A tag left the field and its session was cleaned up.
    TagLost { handle: TagHandle },

    /// An external RF field was detected.
    FieldActivated,

    /// The external RF field went away.
    FieldDeactivated,

    /// A peer-to-peer link came up.
    LinkActivated,

    /// A peer-to-peer link went down.
    LinkDeactivated,
}

/// The reader service.
///
/// # Examples
///
/// ```no_run
/// use nearfield_driver::{AnyRadioDriver, MockRadio};
/// use nearfield_service::{LogDispatcher, NoopSounds, ReaderService, ServiceConfig};
/// use nearfield_core::ScreenState;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> nearfield_core::Result<()> {
///     let (radio, _handle) = MockRadio::new();
///     let service = ReaderService::start(
///         AnyRadioDriver::Mock(radio),
///         Arc::new(LogDispatcher),
///         Arc::new(NoopSounds),
///         ServiceConfig::default(),
///     )?;
///
///     service.enable().await?;
///     service.set_screen_state(ScreenState::OnUnlocked).await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ReaderService {
    registry: Arc<TagRegistry>,
    adapter: Arc<AdapterStateMachine>,
    prefs: Arc<PreferenceStore>,
    notifications: broadcast::Sender<ServiceNotification>,
    dispatch: JoinHandle<()>,
}

impl ReaderService {
    /// Start the service: load preferences, spawn the adapter worker and
    /// the dispatch loop, and queue a boot when the persisted preference
    /// says the adapter should be on.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when the preference file exists but cannot be read.
    pub fn start(
        driver: AnyRadioDriver,
        dispatcher: Arc<dyn TagDispatcher>,
        sounds: Arc<dyn SoundEffects>,
        config: ServiceConfig,
    ) -> Result<Self> {
        info!("starting reader service");
        let driver = Arc::new(driver);
        let prefs = Arc::new(PreferenceStore::load(config.prefs_path.clone())?);
        let registry = Arc::new(TagRegistry::new());
        let (notifications, _) = broadcast::channel(64);

        let adapter = Arc::new(AdapterStateMachine::new(
            Arc::clone(&driver),
            Arc::clone(&registry),
            Arc::clone(&prefs),
            Arc::clone(&dispatcher),
            Arc::clone(&sounds),
            notifications.clone(),
            AdapterConfig {
                polling_threshold: config.polling_threshold,
                deinit_watchdog_timeout: config.deinit_watchdog_timeout,
            },
        ));

        let dispatch = tokio::spawn(
            DispatchLoop::new(
                Arc::clone(&driver),
                Arc::clone(&registry),
                Arc::clone(&adapter),
                dispatcher,
                sounds,
                notifications.clone(),
                SessionConfig {
                    presence_check_interval: config.presence_check_interval,
                    transceive_timeout: config.transceive_timeout,
                },
            )
            .run(),
        );

        if prefs.adapter_on() {
            adapter.enqueue_boot();
        }

        Ok(Self {
            registry,
            adapter,
            prefs,
            notifications,
            dispatch,
        })
    }

    /// Enable the adapter and persist the choice.
    pub async fn enable(&self) -> Result<()> {
        self.prefs.set_adapter_on(true)?;
        self.adapter.enable().await
    }

    /// Disable the adapter and persist the choice.
    pub async fn disable(&self) -> Result<()> {
        self.prefs.set_adapter_on(false)?;
        self.adapter.disable().await
    }

    /// Current adapter state.
    pub fn state(&self) -> AdapterState {
        self.adapter.state()
    }

    /// Whether the adapter is fully on.
    pub fn is_enabled(&self) -> bool {
        self.adapter.is_enabled()
    }

    /// Subscribe to service notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceNotification> {
        self.notifications.subscribe()
    }

    /// Report a new screen/lock state; routing is reapplied serially.
    pub async fn set_screen_state(&self, screen: ScreenState) {
        self.adapter.set_screen_state(screen).await;
    }

    /// Number of currently registered tag sessions.
    pub fn active_tags(&self) -> usize {
        self.registry.len()
    }

    /// Whether the tag behind `handle` is still in the field.
    ///
    /// Stale or unknown handles report `false`, never an error.
    pub fn is_present(&self, handle: TagHandle) -> bool {
        if !self.adapter.is_enabled() {
            return false;
        }
        self.registry
            .find(handle)
            .map(|session| session.is_present())
            .unwrap_or(false)
    }

    /// Technologies the tag behind `handle` supports.
    pub fn tech_list(&self, handle: TagHandle) -> Result<Vec<TagTechnology>> {
        Ok(self.session(handle)?.tech_list())
    }

    /// UID of the tag behind `handle`.
    pub fn uid(&self, handle: TagHandle) -> Result<Vec<u8>> {
        Ok(self.session(handle)?.uid())
    }

    /// Connect the session to one of the tag's technologies.
    ///
    /// # Errors
    ///
    /// Raw NFC-B exchange is not supported by the controller, so connecting
    /// NFC-B is rejected outright.
    pub async fn connect(&self, handle: TagHandle, technology: TagTechnology) -> Result<()> {
        if technology == TagTechnology::NfcB {
            return Err(Error::TechnologyNotSupported(technology));
        }
        self.session(handle)?.connect(technology).await
    }

    /// Re-validate the session against the target currently in the field.
    pub async fn reconnect(&self, handle: TagHandle) -> Result<()> {
        self.session(handle)?.reconnect().await
    }

    /// Exchange raw bytes with the tag behind `handle`.
    pub async fn transceive(&self, handle: TagHandle, data: &[u8], raw: bool) -> Result<Vec<u8>> {
        self.session(handle)?.transceive(data, raw).await
    }

    /// Change the presence check interval of one session.
    pub fn set_presence_check_timeout(&self, handle: TagHandle, timeout: Duration) -> Result<()> {
        self.session(handle)?.set_presence_check_timeout(timeout);
        Ok(())
    }

    /// Close the session behind `handle`.
    ///
    /// # Errors
    ///
    /// On a stale handle the polling loop is force-restarted (so a confused
    /// caller cannot leave discovery stopped) and
    /// [`Error::HandleNotFound`] is returned.
    pub async fn close(&self, handle: TagHandle) -> Result<()> {
        if !self.adapter.is_enabled() {
            return Err(Error::NotEnabled);
        }
        match self.registry.unregister(handle) {
            Some(session) => {
                session.disconnect().await;
                Ok(())
            }
            None => {
                self.adapter.apply_routing(true).await;
                Err(Error::HandleNotFound(handle))
            }
        }
    }

    /// Maximum transceive payload for a technology.
    pub fn max_transceive_length(&self, technology: TagTechnology) -> usize {
        technology.max_transceive_length()
    }

    /// Disable the adapter and stop the background tasks.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down reader service");
        let result = self.adapter.disable().await;
        self.dispatch.abort();
        self.adapter.shutdown();
        result
    }

    fn session(&self, handle: TagHandle) -> Result<Arc<TagSession>> {
        if !self.adapter.is_enabled() {
            return Err(Error::NotEnabled);
        }
        self.registry
            .find(handle)
            .ok_or(Error::HandleNotFound(handle))
    }
}
