//! Demo binary: drives the reader service against the mock radio.
//!
//! Walks one full lifecycle: boot, unlock the screen, tap a tag, exchange a
//! couple of bytes with it, pull the tag away, and shut down.

use anyhow::Context;
use nearfield_core::{ScreenState, TagTechnology};
use nearfield_driver::{AnyRadioDriver, MockRadio};
use nearfield_service::{
    LogDispatcher, NoopSounds, ReaderService, ServiceConfig, ServiceNotification,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let (radio, field) = MockRadio::new();
    let service = ReaderService::start(
        AnyRadioDriver::Mock(radio),
        Arc::new(LogDispatcher),
        Arc::new(NoopSounds),
        ServiceConfig::default(),
    )?;
    let mut notifications = service.subscribe();

    service.enable().await?;
    service.set_screen_state(ScreenState::OnUnlocked).await;

    // Tap a tag against the reader.
    field
        .present_target_with(
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
            TagTechnology::NfcF,
            vec![0xFF; 10],
        )
        .context("discovery is not running")?;

    let handle = loop {
        let notification = timeout(Duration::from_secs(5), notifications.recv())
            .await
            .context("no discovery notification")??;
        if let ServiceNotification::TagDiscovered { handle, .. } = notification {
            break handle;
        }
    };

    let uid = service.uid(handle)?;
    info!(%handle, ?uid, "tag in field");

    field.queue_transceive_response(vec![0x07, 0x01]);
    let response = service.transceive(handle, &[0x06, 0x00], false).await?;
    info!(?response, "transceive round trip");

    // Pull the tag away; the presence watchdog notices and cleans up.
    field.remove_target();
    loop {
        let notification = timeout(Duration::from_secs(5), notifications.recv())
            .await
            .context("no loss notification")??;
        if matches!(notification, ServiceNotification::TagLost { .. }) {
            break;
        }
    }
    info!("tag gone, shutting down");

    service.disable().await?;
    service.shutdown().await?;
    Ok(())
}
