//! Event dispatch loop.
//!
//! A single task consumes driver events (discovery, field, link, deselect)
//! and lost-tag notifications from presence watchdogs, one at a time. It
//! never performs long blocking hardware calls itself; those stay behind
//! the session methods and the serialized adapter worker.

use crate::adapter::AdapterStateMachine;
use crate::dispatcher::{DiscoveredTag, TagDispatcher};
use crate::registry::TagRegistry;
use crate::service::ServiceNotification;
use crate::session::{SessionConfig, TagSession};
use crate::sounds::{SoundCue, SoundEffects};
use nearfield_core::TagHandle;
use nearfield_driver::{AnyRadioDriver, DriverEvent, RadioDriver, TargetInfo};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

pub(crate) struct DispatchLoop {
    driver: Arc<AnyRadioDriver>,
    registry: Arc<TagRegistry>,
    adapter: Arc<AdapterStateMachine>,
    dispatcher: Arc<dyn TagDispatcher>,
    sounds: Arc<dyn SoundEffects>,
    notifications: broadcast::Sender<ServiceNotification>,
    lost_tx: mpsc::UnboundedSender<TagHandle>,
    lost_rx: mpsc::UnboundedReceiver<TagHandle>,
    session_config: SessionConfig,
}

impl DispatchLoop {
    pub(crate) fn new(
        driver: Arc<AnyRadioDriver>,
        registry: Arc<TagRegistry>,
        adapter: Arc<AdapterStateMachine>,
        dispatcher: Arc<dyn TagDispatcher>,
        sounds: Arc<dyn SoundEffects>,
        notifications: broadcast::Sender<ServiceNotification>,
        session_config: SessionConfig,
    ) -> Self {
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        Self {
            driver,
            registry,
            adapter,
            dispatcher,
            sounds,
            notifications,
            lost_tx,
            lost_rx,
            session_config,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.driver.next_event() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                Some(handle) = self.lost_rx.recv() => self.handle_lost(handle).await,
            }
        }
        debug!("dispatch loop stopped");
    }

    async fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::TargetDiscovered { handle, target } => {
                self.handle_discovered(handle, target).await;
            }
            DriverEvent::TargetDeselected => {
                debug!("target deselected");
                self.adapter.apply_routing(true).await;
            }
            DriverEvent::FieldActivated => {
                debug!("rf field activated");
                let _ = self.notifications.send(ServiceNotification::FieldActivated);
            }
            DriverEvent::FieldDeactivated => {
                debug!("rf field deactivated");
                let _ = self
                    .notifications
                    .send(ServiceNotification::FieldDeactivated);
            }
            DriverEvent::LinkActivated => {
                debug!("link activated");
                let _ = self.notifications.send(ServiceNotification::LinkActivated);
            }
            DriverEvent::LinkDeactivated => {
                debug!("link deactivated");
                let _ = self
                    .notifications
                    .send(ServiceNotification::LinkDeactivated);
            }
            _ => {}
        }
    }

    async fn handle_discovered(&mut self, handle: TagHandle, target: TargetInfo) {
        if !self.adapter.is_enabled() {
            debug!(%handle, "dropping discovery while adapter is off");
            return;
        }
        debug!(%handle, uid = %target.uid_hex(), "tag detected, notifying applications");
        self.sounds.play(SoundCue::Start);

        let tag = DiscoveredTag::new(handle, &target);
        let session = TagSession::new(
            handle,
            target,
            Arc::clone(&self.driver),
            self.lost_tx.clone(),
            self.session_config,
        );

        // The session becomes visible to callers only after it is fully
        // initialized and its watchdog is running.
        session.start_presence_check();
        self.registry.register(Arc::clone(&session));

        let _ = self.notifications.send(ServiceNotification::TagDiscovered {
            handle,
            uid: tag.uid.clone(),
            tech_list: tag.tech_list.clone(),
        });

        if self.dispatcher.dispatch_tag(&tag) {
            self.sounds.play(SoundCue::End);
        } else {
            self.registry.unregister(handle);
            self.sounds.play(SoundCue::Error);
        }
    }

    async fn handle_lost(&mut self, handle: TagHandle) {
        info!(%handle, "tag lost, restarting polling");
        if let Some(session) = self.registry.unregister(handle) {
            session.disconnect().await;
        }
        let _ = self
            .notifications
            .send(ServiceNotification::TagLost { handle });
        self.adapter.apply_routing(true).await;
    }
}
