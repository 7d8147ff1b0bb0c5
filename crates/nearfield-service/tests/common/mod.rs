//! Shared helpers for service integration tests.

#![allow(dead_code)]

use nearfield_driver::{AnyRadioDriver, MockRadio, MockRadioHandle};
use nearfield_service::{
    DiscoveredTag, NoopSounds, ReaderService, ServiceConfig, ServiceNotification, TagDispatcher,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Dispatcher that records every hand-off for later assertions.
#[derive(Debug)]
pub struct RecordingDispatcher {
    accept: AtomicBool,
    dispatched: Mutex<Vec<DiscoveredTag>>,
    cleared: AtomicU32,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accept: AtomicBool::new(true),
            dispatched: Mutex::new(Vec::new()),
            cleared: AtomicU32::new(0),
        })
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<DiscoveredTag> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn cleared_count(&self) -> u32 {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl TagDispatcher for RecordingDispatcher {
    fn dispatch_tag(&self, tag: &DiscoveredTag) -> bool {
        self.dispatched.lock().unwrap().push(tag.clone());
        self.accept.load(Ordering::SeqCst)
    }

    fn clear_foreground_dispatch(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

/// Start a service over a fresh mock driver.
pub fn start_service(
    config: ServiceConfig,
) -> (ReaderService, MockRadioHandle, Arc<RecordingDispatcher>) {
    let (radio, mock) = MockRadio::new();
    let dispatcher = RecordingDispatcher::new();
    let service = ReaderService::start(
        AnyRadioDriver::Mock(radio),
        Arc::clone(&dispatcher) as Arc<dyn TagDispatcher>,
        Arc::new(NoopSounds),
        config,
    )
    .unwrap();
    (service, mock, dispatcher)
}

/// Wait for the next notification matching `pred`.
pub async fn next_matching(
    rx: &mut broadcast::Receiver<ServiceNotification>,
    pred: impl Fn(&ServiceNotification) -> bool,
) -> ServiceNotification {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let notification = rx.recv().await.expect("notification channel closed");
            if pred(&notification) {
                return notification;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

/// Poll `cond` until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
