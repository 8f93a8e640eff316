//! Coordinator runtime driver
//!
//! The single consumer of the event channel. Feeds each event through the
//! transition machine, executes the returned commands against the backend
//! client, the media player, and the timer tasks, then publishes the updated
//! view state for the render loop. Because only this task touches the
//! machine, transitions need no locking.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

use crate::backend::DetectionClient;
use crate::config::{InteractionConfig, SpecialEventConfig};
use crate::coordinator::machine::{Command, Coordinator, Event};
use crate::coordinator::state::{InteractionMode, SnapshotImage, ViewState};
use crate::media::MediaPlayer;
use crate::special::SpecialEventTimer;

pub struct Driver {
    machine: Coordinator,
    client: DetectionClient,
    player: Arc<dyn MediaPlayer>,
    timer: SpecialEventTimer,
    snapshot_hold: Duration,
    special_asset: String,
    notify_special: bool,
    events_tx: UnboundedSender<Event>,
    view_tx: watch::Sender<ViewState>,
    snapshot_tx: watch::Sender<SnapshotImage>,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: DetectionClient,
        player: Arc<dyn MediaPlayer>,
        interaction: &InteractionConfig,
        special: &SpecialEventConfig,
        events_tx: UnboundedSender<Event>,
        view_tx: watch::Sender<ViewState>,
        snapshot_tx: watch::Sender<SnapshotImage>,
    ) -> Self {
        Self {
            machine: Coordinator::new(),
            client,
            player,
            timer: SpecialEventTimer::new(special),
            snapshot_hold: Duration::from_millis(interaction.snapshot_hold_ms),
            special_asset: special.asset.clone(),
            notify_special: special.notify_backend,
            events_tx,
            view_tx,
            snapshot_tx,
        }
    }

    /// Consume events until the channel closes.
    pub async fn run(mut self, mut events_rx: UnboundedReceiver<Event>) {
        // Arm the first special-event window.
        self.schedule_special(false);
        tracing::info!("coordinator driver started");

        while let Some(event) = events_rx.recv().await {
            self.process(event);
        }
        tracing::info!("event channel closed, driver exiting");
    }

    /// Run one event through the machine and execute its commands.
    pub fn process(&mut self, event: Event) {
        for command in self.machine.handle(event) {
            self.execute(command);
        }

        let state = self.machine.state();
        let view = ViewState {
            mode: state.mode,
            emotion: state.current_emotion,
        };
        // send_if_modified avoids waking the render loop on no-op events
        self.view_tx.send_if_modified(|current| {
            if *current != view {
                *current = view;
                true
            } else {
                false
            }
        });

        // A published snapshot image is only meaningful while it is held.
        if view.mode != InteractionMode::SnapshotDisplay {
            self.snapshot_tx.send_if_modified(|image| image.take().is_some());
        }
    }

    fn execute(&mut self, command: Command) {
        tracing::debug!("executing {:?}", command);
        match command {
            Command::ShowSnapshot { emotion } => {
                // Fetch the frozen frame and publish it for the presenter;
                // the face overlay comes from the renderer.
                let client = self.client.clone();
                let tx = self.snapshot_tx.clone();
                tokio::spawn(async move {
                    match client.snapshot().await {
                        Ok(bytes) => {
                            tracing::debug!(
                                "snapshot ready for {} ({} bytes)",
                                emotion,
                                bytes.len()
                            );
                            let _ = tx.send(Some(Arc::new(bytes)));
                        }
                        Err(e) => tracing::warn!("snapshot fetch failed: {}", e),
                    }
                });
            }
            Command::ScheduleSnapshotHold { generation } => {
                let tx = self.events_tx.clone();
                let hold = self.snapshot_hold;
                tokio::spawn(async move {
                    tokio::time::sleep(hold).await;
                    let _ = tx.send(Event::SnapshotHoldElapsed { generation });
                });
            }
            Command::SelectAudio { generation, bucket } => {
                let client = self.client.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let url = match client.random_audio(bucket).await {
                        Ok(url) => url,
                        Err(e) => {
                            tracing::warn!("audio selection failed: {}", e);
                            None
                        }
                    };
                    let _ = tx.send(Event::AudioSelected { generation, url });
                });
            }
            Command::PlayAudio { handle, url } => {
                self.player.start_audio(handle, url);
            }
            Command::SelectVideo { generation } => {
                let client = self.client.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let url = match client.random_video().await {
                        Ok(url) => url,
                        Err(e) => {
                            tracing::warn!("video selection failed: {}", e);
                            None
                        }
                    };
                    let _ = tx.send(Event::VideoSelected { generation, url });
                });
            }
            Command::PlayVideo { handle, url } => {
                self.player.start_video(handle, url);
            }
            Command::PlaySpecial { handle } => {
                self.player.start_video(handle, self.special_asset.clone());
            }
            Command::StopAudio => self.player.stop_audio(),
            Command::StopVideo => self.player.stop_video(),
            Command::NotifySpecialStart => {
                if self.notify_special {
                    let client = self.client.clone();
                    tokio::spawn(async move {
                        if let Err(e) = client.trigger_special_event().await {
                            tracing::warn!("special event notification failed: {}", e);
                        }
                    });
                }
            }
            Command::NotifyRestart => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.restart().await {
                        tracing::warn!("backend restart notification failed: {}", e);
                    }
                });
            }
            Command::ScheduleSpecial { backoff } => self.schedule_special(backoff),
        }
    }

    fn schedule_special(&self, backoff: bool) {
        let delay = if backoff {
            self.timer.backoff_delay()
        } else {
            self.timer.next_delay()
        };
        tracing::debug!("next special event in {:?} (backoff: {})", delay, backoff);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::SpecialTimerFired);
        });
    }
}
