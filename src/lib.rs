//! emokiosk - interaction engine for an emotion-mirror kiosk
//!
//! Drives a kiosk display that cycles between an idle face animation,
//! emotion-snapshot presentation, lip-synced audio playback, and fullscreen
//! video interludes, steered by polling a remote emotion-detection backend.

use std::sync::Arc;
use std::time::Duration;

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod face;
pub mod media;
pub mod poller;
pub mod render_loop;
pub mod special;

use coordinator::state::{SnapshotImage, ViewState};
use coordinator::Driver;
use media::{AmplitudeSensor, KioskPlayer, MediaPlayer};
use poller::StatusPoller;
use render_loop::{DisplaySink, RenderLoop};

/// Handles to the running kiosk tasks.
pub struct Kiosk {
    pub driver: tokio::task::JoinHandle<()>,
    pub poller: tokio::task::JoinHandle<()>,
    pub render: tokio::task::JoinHandle<()>,
}

/// Wire up and spawn all kiosk tasks against the given display sink.
///
/// Returns once everything is running; the caller decides how long to live
/// (the binary waits for ctrl-c).
pub fn start<S: DisplaySink + 'static>(cfg: &config::Config, sink: S) -> anyhow::Result<Kiosk> {
    let client =
        backend::DetectionClient::with_config(&cfg.backend.base_url, cfg.backend.request_timeout_secs)?;

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let (view_tx, view_rx) = tokio::sync::watch::channel(ViewState::default());
    let (snapshot_tx, snapshot_rx) = tokio::sync::watch::channel(SnapshotImage::None);

    let sensor = AmplitudeSensor::new();
    let player = Arc::new(KioskPlayer::new(
        client.clone(),
        cfg.player.clone(),
        sensor.clone(),
        events_tx.clone(),
    ));

    let driver = Driver::new(
        client.clone(),
        player as Arc<dyn MediaPlayer>,
        &cfg.interaction,
        &cfg.special,
        events_tx.clone(),
        view_tx,
        snapshot_tx,
    );
    let driver = tokio::spawn(driver.run(events_rx));

    let poller = StatusPoller::new(
        client,
        Duration::from_millis(cfg.backend.poll_interval_ms),
        events_tx,
    );
    let poller = tokio::spawn(poller.run());

    let render = RenderLoop::new(sink, view_rx, snapshot_rx, sensor, cfg.render.fps);
    let render = tokio::spawn(render.run());

    Ok(Kiosk {
        driver,
        poller,
        render,
    })
}
