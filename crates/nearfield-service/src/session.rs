//! Per-tag session and its presence watchdog.
//!
//! A [`TagSession`] wraps one physical tag from discovery to loss: the
//! cached identifier, the connected technology, and the background presence
//! check that notices when the tag leaves the field.
//!
//! The watchdog is a plain task driven by an explicit signal channel
//! (pause, resume, stop, retimeout). Pausing it around a transceive keeps a
//! presence probe from colliding with the in-flight exchange on shared
//! hardware.

use nearfield_core::constants::{
    PRESENCE_CHECK_INTERVAL_MS, PRESENCE_CHECK_MAX_MISSES, TRANSCEIVE_TIMEOUT_MS,
};
use nearfield_core::{Error, Result, TagHandle, TagTechnology};
use nearfield_driver::{AnyRadioDriver, RadioDriver, TargetInfo};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Timing knobs for tag sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Interval between presence probes.
    pub presence_check_interval: Duration,

    /// Timeout attached to a single transceive exchange.
    pub transceive_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            presence_check_interval: Duration::from_millis(PRESENCE_CHECK_INTERVAL_MS),
            transceive_timeout: Duration::from_millis(TRANSCEIVE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    uid: Vec<u8>,
    tech_list: Vec<TagTechnology>,
    poll_bytes: Vec<u8>,
    // Index into tech_list; None once disconnected.
    connected_tech: Option<usize>,
    present: bool,
}

/// One physical tag's connection state.
///
/// Sessions are created by the dispatch loop on discovery, already bound to
/// the discovery observation, and live in the
/// [`TagRegistry`](crate::registry::TagRegistry) until closed, drained, or
/// lost.
#[derive(Debug)]
pub struct TagSession {
    handle: TagHandle,
    driver: Arc<AnyRadioDriver>,
    state: Mutex<SessionState>,
    watchdog: Mutex<Option<PresenceWatchdog>>,
    lost_tx: mpsc::UnboundedSender<TagHandle>,
    config: SessionConfig,
}

impl TagSession {
    pub(crate) fn new(
        handle: TagHandle,
        target: TargetInfo,
        driver: Arc<AnyRadioDriver>,
        lost_tx: mpsc::UnboundedSender<TagHandle>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            handle,
            driver,
            state: Mutex::new(SessionState {
                uid: target.uid,
                tech_list: vec![target.technology],
                poll_bytes: target.poll_bytes,
                connected_tech: Some(0),
                present: false,
            }),
            watchdog: Mutex::new(None),
            lost_tx,
            config,
        })
    }

    /// Handle callers use to address this session.
    pub fn handle(&self) -> TagHandle {
        self.handle
    }

    /// Cached target identifier.
    pub fn uid(&self) -> Vec<u8> {
        self.state.lock().unwrap().uid.clone()
    }

    /// Technologies this tag supports.
    pub fn tech_list(&self) -> Vec<TagTechnology> {
        self.state.lock().unwrap().tech_list.clone()
    }

    /// Technology-specific activation bytes from discovery.
    pub fn activation_bytes(&self) -> Vec<u8> {
        self.state.lock().unwrap().poll_bytes.clone()
    }

    /// Whether the tag is still in the field, to the best of our knowledge.
    pub fn is_present(&self) -> bool {
        self.state.lock().unwrap().present
    }

    /// Technology the upper layer is connected to.
    pub fn connected_technology(&self) -> Option<TagTechnology> {
        let state = self.state.lock().unwrap();
        state.connected_tech.and_then(|i| state.tech_list.get(i).copied())
    }

    /// Connect to one of the tag's technologies.
    ///
    /// Valid only while the hardware currently observes a matching
    /// identifier type; an unsupported technology fails without side
    /// effects.
    ///
    /// # Errors
    ///
    /// [`Error::TechnologyNotSupported`] when the technology is not in the
    /// tag's list or does not match the current observation,
    /// [`Error::NoTarget`] when nothing is observed in the field.
    pub async fn connect(&self, technology: TagTechnology) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if !state.tech_list.contains(&technology) {
                return Err(Error::TechnologyNotSupported(technology));
            }
        }
        let observed = self.driver.observe_target().await.ok_or(Error::NoTarget)?;
        if observed.technology != technology {
            return Err(Error::TechnologyNotSupported(technology));
        }
        self.apply_observation(observed);
        Ok(())
    }

    /// Re-validate the session against whatever is observed in the field.
    ///
    /// The same identifier means the tag never left: success without side
    /// effects. A different identifier rebuilds the session metadata from
    /// the new observation.
    ///
    /// # Errors
    ///
    /// [`Error::NoTarget`] when nothing is observed.
    pub async fn reconnect(&self) -> Result<()> {
        let observed = self.driver.observe_target().await.ok_or(Error::NoTarget)?;
        self.apply_observation(observed);
        Ok(())
    }

    fn apply_observation(&self, observed: TargetInfo) {
        let mut state = self.state.lock().unwrap();
        if state.uid == observed.uid {
            trace!(handle = %self.handle, "reconnect: same target");
            return;
        }
        debug!(handle = %self.handle, uid = %observed.uid_hex(), "reconnect: new target");
        state.uid = observed.uid;
        state.poll_bytes = observed.poll_bytes;
        state.tech_list = vec![observed.technology];
        state.connected_tech = Some(0);
    }

    /// Exchange raw bytes with the tag.
    ///
    /// The presence watchdog is paused for the duration of the exchange and
    /// resumed afterwards; a resumed watchdog waits one full interval before
    /// probing again.
    ///
    /// # Errors
    ///
    /// [`Error::ExceededLength`] when the payload exceeds the connected
    /// technology's limit (the hardware is not touched),
    /// [`Error::TagLost`] when the tag left mid-exchange,
    /// [`Error::Timeout`] when the exchange did not complete in time.
    pub async fn transceive(&self, data: &[u8], raw: bool) -> Result<Vec<u8>> {
        let tech = self.connected_technology().ok_or(Error::NoTarget)?;
        let max = tech.max_transceive_length();
        if data.len() > max {
            return Err(Error::ExceededLength {
                tech,
                max,
                len: data.len(),
            });
        }

        self.pause_watchdog();
        let result = self
            .driver
            .transceive(data, raw, self.config.transceive_timeout)
            .await;
        self.resume_watchdog();
        result
    }

    /// Begin background presence checking.
    ///
    /// From this point on the tag is reported present until the watchdog
    /// observes it gone. Idempotent: a second call while the watchdog runs
    /// does nothing.
    pub fn start_presence_check(self: &Arc<Self>) {
        debug!(handle = %self.handle, "start presence checking");
        self.state.lock().unwrap().present = true;
        let mut watchdog = self.watchdog.lock().unwrap();
        if watchdog.is_none() {
            *watchdog = Some(PresenceWatchdog::spawn(
                Arc::clone(self),
                self.config.presence_check_interval,
            ));
        }
    }

    /// Change the presence check interval.
    ///
    /// Takes effect only after the current wait completes.
    pub fn set_presence_check_timeout(&self, timeout: Duration) {
        if let Some(watchdog) = &*self.watchdog.lock().unwrap() {
            watchdog.set_timeout(timeout);
        }
    }

    /// Tear the session down.
    ///
    /// Idempotent. Stops and joins the watchdog if one is running, then
    /// clears the connected technology and presence flag.
    pub async fn disconnect(&self) {
        debug!(handle = %self.handle, "disconnect");
        let watchdog = self.watchdog.lock().unwrap().take();
        if let Some(watchdog) = watchdog {
            watchdog.stop();
            watchdog.join().await;
        }
        let mut state = self.state.lock().unwrap();
        state.present = false;
        state.connected_tech = None;
    }

    fn pause_watchdog(&self) {
        if let Some(watchdog) = &*self.watchdog.lock().unwrap() {
            watchdog.pause();
        }
    }

    fn resume_watchdog(&self) {
        if let Some(watchdog) = &*self.watchdog.lock().unwrap() {
            watchdog.resume();
        }
    }

    fn mark_lost(&self) {
        let mut state = self.state.lock().unwrap();
        state.present = false;
        state.connected_tech = None;
    }

    async fn probe(&self) -> ProbeOutcome {
        match self.driver.check_presence().await {
            Ok(true) => ProbeOutcome::Present,
            Ok(false) => ProbeOutcome::Miss,
            Err(Error::TagLost) => ProbeOutcome::Lost,
            Err(_) => ProbeOutcome::Miss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Present,
    Miss,
    Lost,
}

#[derive(Debug)]
enum WatchdogSignal {
    Pause,
    Resume,
    Stop,
    SetTimeout(Duration),
}

/// Control handle of the background presence checker.
///
/// Owned exclusively by its session; never shared.
#[derive(Debug)]
struct PresenceWatchdog {
    signal_tx: mpsc::UnboundedSender<WatchdogSignal>,
    task: JoinHandle<()>,
}

impl PresenceWatchdog {
    fn spawn(session: Arc<TagSession>, interval: Duration) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(watchdog_loop(session, interval, signal_rx));
        Self { signal_tx, task }
    }

    fn pause(&self) {
        let _ = self.signal_tx.send(WatchdogSignal::Pause);
    }

    fn resume(&self) {
        let _ = self.signal_tx.send(WatchdogSignal::Resume);
    }

    fn stop(&self) {
        let _ = self.signal_tx.send(WatchdogSignal::Stop);
    }

    fn set_timeout(&self, timeout: Duration) {
        let _ = self.signal_tx.send(WatchdogSignal::SetTimeout(timeout));
    }

    async fn join(self) {
        let _ = self.task.await;
    }
}

async fn watchdog_loop(
    session: Arc<TagSession>,
    mut interval: Duration,
    mut signals: mpsc::UnboundedReceiver<WatchdogSignal>,
) {
    trace!(handle = %session.handle, "starting background presence check");
    let mut paused = false;
    let mut misses = 0u32;

    loop {
        match tokio::time::timeout(interval, signals.recv()).await {
            Ok(Some(WatchdogSignal::Pause)) => paused = true,
            Ok(Some(WatchdogSignal::Resume)) => {
                // Not probing right away: the next probe happens only after
                // one more full interval, so it cannot race the exchange
                // that just finished.
                paused = false;
            }
            Ok(Some(WatchdogSignal::SetTimeout(new_interval))) => {
                // Applies from the next wait on.
                interval = new_interval;
            }
            Ok(Some(WatchdogSignal::Stop)) | Ok(None) => {
                trace!(handle = %session.handle, "stopping background presence check");
                return;
            }
            Err(_elapsed) => {
                if paused {
                    continue;
                }
                match session.probe().await {
                    ProbeOutcome::Present => misses = 0,
                    ProbeOutcome::Miss => {
                        misses += 1;
                        if misses >= PRESENCE_CHECK_MAX_MISSES {
                            break;
                        }
                    }
                    ProbeOutcome::Lost => break,
                }
            }
        }
    }

    debug!(handle = %session.handle, "tag lost, restarting polling loop");
    session.mark_lost();
    let _ = session.lost_tx.send(session.handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearfield_driver::{MockRadio, MockRadioHandle};

    fn session_with_mock(
        interval_ms: u64,
    ) -> (Arc<TagSession>, MockRadioHandle, mpsc::UnboundedReceiver<TagHandle>) {
        let (radio, mock) = MockRadio::new();
        let driver = Arc::new(AnyRadioDriver::Mock(radio));
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let target =
            TargetInfo::new(vec![0x01, 0x02], TagTechnology::NfcF, vec![0xAA; 10]).unwrap();
        mock.present_target_with(vec![0x01, 0x02], TagTechnology::NfcF, vec![0xAA; 10]);
        let session = TagSession::new(
            TagHandle::new(1),
            target,
            driver,
            lost_tx,
            SessionConfig {
                presence_check_interval: Duration::from_millis(interval_ms),
                transceive_timeout: Duration::from_secs(1),
            },
        );
        (session, mock, lost_rx)
    }

    #[tokio::test]
    async fn test_reconnect_same_target_is_noop() {
        let (session, _mock, _lost_rx) = session_with_mock(125);
        let uid_before = session.uid();
        session.reconnect().await.unwrap();
        assert_eq!(session.uid(), uid_before);
    }

    #[tokio::test]
    async fn test_reconnect_new_target_rebuilds() {
        let (session, mock, _lost_rx) = session_with_mock(125);
        mock.present_target(vec![0x05, 0x06], TagTechnology::NfcA);

        session.reconnect().await.unwrap();
        assert_eq!(session.uid(), vec![0x05, 0x06]);
        assert_eq!(session.tech_list(), vec![TagTechnology::NfcA]);
        assert_eq!(session.connected_technology(), Some(TagTechnology::NfcA));
        // Activation bytes were rebuilt from the new observation too.
        assert!(session.activation_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_without_observation_fails() {
        let (session, mock, _lost_rx) = session_with_mock(125);
        mock.remove_target();
        assert!(matches!(session.reconnect().await, Err(Error::NoTarget)));
    }

    #[tokio::test]
    async fn test_connect_unsupported_technology() {
        let (session, _mock, _lost_rx) = session_with_mock(125);
        let result = session.connect(TagTechnology::IsoDep).await;
        assert!(matches!(
            result,
            Err(Error::TechnologyNotSupported(TagTechnology::IsoDep))
        ));
        // No side effects.
        assert_eq!(session.connected_technology(), Some(TagTechnology::NfcF));
    }

    #[tokio::test]
    async fn test_connect_matching_technology() {
        let (session, _mock, _lost_rx) = session_with_mock(125);
        session.connect(TagTechnology::NfcF).await.unwrap();
    }

    #[tokio::test]
    async fn test_transceive_exceeded_length_skips_hardware() {
        let (session, mock, _lost_rx) = session_with_mock(125);
        let oversized = vec![0u8; TagTechnology::NfcF.max_transceive_length() + 1];

        let result = session.transceive(&oversized, false).await;
        assert!(matches!(result, Err(Error::ExceededLength { .. })));
        assert_eq!(mock.counters().transceives, 0);
    }

    #[tokio::test]
    async fn test_transceive_echoes() {
        let (session, _mock, _lost_rx) = session_with_mock(125);
        let response = session.transceive(&[0x06, 0x00], false).await.unwrap();
        assert_eq!(response, vec![0x06, 0x00]);
    }

    #[tokio::test]
    async fn test_transceive_tag_lost() {
        let (session, mock, _lost_rx) = session_with_mock(125);
        mock.remove_target();
        let result = session.transceive(&[0x00], false).await;
        assert!(matches!(result, Err(Error::TagLost)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_marks_lost_after_three_misses() {
        let (session, mock, mut lost_rx) = session_with_mock(125);
        session.start_presence_check();
        assert!(session.is_present());

        mock.remove_target();

        let lost = tokio::time::timeout(Duration::from_secs(5), lost_rx.recv())
            .await
            .expect("watchdog should give up")
            .unwrap();
        assert_eq!(lost, session.handle());
        assert!(!session.is_present());
        // Three consecutive misses, not fewer.
        assert!(mock.counters().presence_checks >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_definitive_loss_is_immediate() {
        let (session, mock, mut lost_rx) = session_with_mock(125);
        session.start_presence_check();
        mock.set_definitive_loss();

        tokio::time::timeout(Duration::from_millis(400), lost_rx.recv())
            .await
            .expect("one probe should be enough")
            .unwrap();
        assert_eq!(mock.counters().presence_checks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_paused_during_transceive() {
        let (session, mock, _lost_rx) = session_with_mock(125);
        session.start_presence_check();

        // Let a couple of probes happen first.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let before = mock.counters().presence_checks;
        assert!(before > 0);

        // A slow exchange spanning many intervals: the paused watchdog must
        // not probe in between.
        mock.set_transceive_delay(Duration::from_millis(900));
        session.transceive(&[0x01], false).await.unwrap();
        let after = mock.counters().presence_checks;
        assert_eq!(before, after);

        // After resume the probes come back, but only after one more full
        // interval has elapsed.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mock.counters().presence_checks, after);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(mock.counters().presence_checks > after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_retimeout_applies_after_current_wait() {
        let (session, mock, _lost_rx) = session_with_mock(100);
        session.start_presence_check();

        session.set_presence_check_timeout(Duration::from_secs(60));
        // The retimeout signal wakes the current wait without probing; from
        // then on probes are a minute apart.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(mock.counters().presence_checks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent_and_stops_watchdog() {
        let (session, mock, _lost_rx) = session_with_mock(125);
        session.start_presence_check();
        tokio::time::sleep(Duration::from_millis(300)).await;

        session.disconnect().await;
        assert!(!session.is_present());
        assert_eq!(session.connected_technology(), None);

        let probes = mock.counters().presence_checks;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(mock.counters().presence_checks, probes);

        // Second disconnect is a no-op.
        session.disconnect().await;
    }
}
