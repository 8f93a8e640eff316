//! Media playback adapter
//!
//! Owns the two playback resources the coordinator arbitrates over: a rodio
//! sink on a dedicated audio thread, and an external fullscreen video player
//! process. All `start_*`/`stop_*` calls are fire-and-forget; exactly one
//! terminal [`Event::MediaFinished`] is delivered per started handle, and
//! stops are idempotent. Stale terminal events are the coordinator's problem
//! to filter, not ours.

use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::backend::DetectionClient;
use crate::config::PlayerConfig;
use crate::coordinator::machine::Event;
use crate::coordinator::state::{HandleId, MediaKind, PlaybackOutcome};
use crate::media::amplitude::{AmplitudeSensor, MeteredSource};

/// Poll interval for sink drain and child-process exit checks
const WAIT_POLL_MS: u64 = 100;

/// Playback control surface the coordinator driver talks to.
///
/// The driver guarantees it never starts a second handle of a kind while one
/// is active, so implementations may assume one resource per kind.
pub trait MediaPlayer: Send + Sync {
    /// Begin audio playback of the given asset. Fire-and-forget.
    fn start_audio(&self, handle: HandleId, url: String);
    /// Begin fullscreen video playback of the given asset. Fire-and-forget.
    fn start_video(&self, handle: HandleId, url: String);
    /// Stop audio if any is playing. Idempotent.
    fn stop_audio(&self);
    /// Stop video if any is playing. Idempotent.
    fn stop_video(&self);
}

/// Command sent to the dedicated audio thread
enum AudioCmd {
    Play { handle: HandleId, bytes: Vec<u8> },
    Stop,
}

struct ActiveVideo {
    handle: HandleId,
    child: tokio::process::Child,
}

/// Production media player: rodio audio thread + external video process.
pub struct KioskPlayer {
    audio_tx: crossbeam_channel::Sender<AudioCmd>,
    events: UnboundedSender<Event>,
    client: DetectionClient,
    sensor: AmplitudeSensor,
    player_config: PlayerConfig,
    active_video: Arc<Mutex<Option<ActiveVideo>>>,
}

impl KioskPlayer {
    /// Spawn the audio thread and return the player.
    ///
    /// If no audio output device exists the player still works: every audio
    /// start is answered with an `Errored` terminal event, which the
    /// coordinator absorbs by skipping to the video phase.
    pub fn new(
        client: DetectionClient,
        player_config: PlayerConfig,
        sensor: AmplitudeSensor,
        events: UnboundedSender<Event>,
    ) -> Self {
        let (audio_tx, audio_rx) = crossbeam_channel::unbounded::<AudioCmd>();

        let thread_sensor = sensor.clone();
        let thread_events = events.clone();
        std::thread::Builder::new()
            .name("kiosk-audio".to_string())
            .spawn(move || audio_thread(audio_rx, thread_sensor, thread_events))
            .ok();

        Self {
            audio_tx,
            events,
            client,
            sensor,
            player_config,
            active_video: Arc::new(Mutex::new(None)),
        }
    }

    fn emit_errored(&self, kind: MediaKind, handle: HandleId) {
        let _ = self.events.send(Event::MediaFinished {
            kind,
            handle,
            outcome: PlaybackOutcome::Errored,
        });
    }
}

impl MediaPlayer for KioskPlayer {
    fn start_audio(&self, handle: HandleId, url: String) {
        let client = self.client.clone();
        let tx = self.audio_tx.clone();
        let events = self.events.clone();

        // Fetch on the runtime, hand the decoded bytes to the audio thread.
        tokio::spawn(async move {
            match client.fetch_asset(&url).await {
                Ok(bytes) => {
                    tracing::debug!("audio asset fetched ({} bytes): {}", bytes.len(), url);
                    if tx.send(AudioCmd::Play { handle, bytes }).is_err() {
                        tracing::error!("audio thread gone, failing playback {}", handle);
                        let _ = events.send(Event::MediaFinished {
                            kind: MediaKind::Audio,
                            handle,
                            outcome: PlaybackOutcome::Errored,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("audio fetch failed for {}: {}", url, e);
                    let _ = events.send(Event::MediaFinished {
                        kind: MediaKind::Audio,
                        handle,
                        outcome: PlaybackOutcome::Errored,
                    });
                }
            }
        });
    }

    fn start_video(&self, handle: HandleId, url: String) {
        let resolved = match self.client.resolve_asset(&url) {
            Ok(u) => u.to_string(),
            Err(e) => {
                tracing::warn!("unresolvable video asset {}: {}", url, e);
                self.emit_errored(MediaKind::Video, handle);
                return;
            }
        };

        let mut command = tokio::process::Command::new(&self.player_config.video_command);
        command
            .args(&self.player_config.video_args)
            .arg(&resolved)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    "failed to launch video player '{}': {}",
                    self.player_config.video_command,
                    e
                );
                self.emit_errored(MediaKind::Video, handle);
                return;
            }
        };

        tracing::info!("video playback {} started: {}", handle, resolved);
        *self.active_video.lock() = Some(ActiveVideo { handle, child });

        // Waiter task: polls for exit so a stop (which takes the slot) cancels
        // the terminal event naturally.
        let active = Arc::clone(&self.active_video);
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS)).await;
                let mut guard = active.lock();
                let current = match guard.as_mut() {
                    Some(v) if v.handle == handle => v,
                    // Replaced or stopped; someone else owns the slot now.
                    _ => return,
                };
                match current.child.try_wait() {
                    Ok(Some(status)) => {
                        let outcome = if status.success() {
                            PlaybackOutcome::Ended
                        } else {
                            PlaybackOutcome::Errored
                        };
                        *guard = None;
                        drop(guard);
                        tracing::debug!("video playback {} exited: {}", handle, status);
                        let _ = events.send(Event::MediaFinished {
                            kind: MediaKind::Video,
                            handle,
                            outcome,
                        });
                        return;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        *guard = None;
                        drop(guard);
                        tracing::warn!("video playback {} wait failed: {}", handle, e);
                        let _ = events.send(Event::MediaFinished {
                            kind: MediaKind::Video,
                            handle,
                            outcome: PlaybackOutcome::Errored,
                        });
                        return;
                    }
                }
            }
        });
    }

    fn stop_audio(&self) {
        let _ = self.audio_tx.send(AudioCmd::Stop);
        self.sensor.set_active(false);
    }

    fn stop_video(&self) {
        let mut guard = self.active_video.lock();
        if let Some(mut video) = guard.take() {
            tracing::debug!("stopping video playback {}", video.handle);
            if let Err(e) = video.child.start_kill() {
                tracing::warn!("failed to kill video player: {}", e);
            }
        }
    }
}

/// Dedicated audio thread: owns the output stream and the single sink.
///
/// `OutputStream` is not `Send`, so it must live on the thread that created
/// it. The thread blocks on commands with a short timeout so it can detect
/// sink drain between messages.
fn audio_thread(
    rx: crossbeam_channel::Receiver<AudioCmd>,
    sensor: AmplitudeSensor,
    events: UnboundedSender<Event>,
) {
    let stream = match OutputStream::try_default() {
        Ok(pair) => Some(pair),
        Err(e) => {
            tracing::error!("no audio output device, running muted: {}", e);
            None
        }
    };

    let mut playing: Option<(HandleId, Sink)> = None;

    loop {
        match rx.recv_timeout(Duration::from_millis(WAIT_POLL_MS)) {
            Ok(AudioCmd::Play { handle, bytes }) => {
                // A new start replaces whatever is in the sink.
                if let Some((old, sink)) = playing.take() {
                    tracing::debug!("audio playback {} superseded", old);
                    sink.stop();
                }
                sensor.set_active(false);

                let Some((_, ref handle_ref)) = stream else {
                    let _ = events.send(Event::MediaFinished {
                        kind: MediaKind::Audio,
                        handle,
                        outcome: PlaybackOutcome::Errored,
                    });
                    continue;
                };

                match start_sink(handle_ref, bytes, &sensor) {
                    Ok(sink) => {
                        tracing::info!("audio playback {} started", handle);
                        sensor.set_active(true);
                        playing = Some((handle, sink));
                    }
                    Err(e) => {
                        tracing::warn!("audio playback {} failed to start: {}", handle, e);
                        let _ = events.send(Event::MediaFinished {
                            kind: MediaKind::Audio,
                            handle,
                            outcome: PlaybackOutcome::Errored,
                        });
                    }
                }
            }
            Ok(AudioCmd::Stop) => {
                if let Some((handle, sink)) = playing.take() {
                    tracing::debug!("audio playback {} stopped", handle);
                    sink.stop();
                }
                sensor.set_active(false);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // Drain check: an empty sink means playback finished.
                if let Some((handle, sink)) = playing.take() {
                    if sink.empty() {
                        sensor.set_active(false);
                        tracing::debug!("audio playback {} drained", handle);
                        let _ = events.send(Event::MediaFinished {
                            kind: MediaKind::Audio,
                            handle,
                            outcome: PlaybackOutcome::Ended,
                        });
                    } else {
                        playing = Some((handle, sink));
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                tracing::debug!("audio command channel closed, thread exiting");
                return;
            }
        }
    }
}

fn start_sink(
    stream_handle: &rodio::OutputStreamHandle,
    bytes: Vec<u8>,
    sensor: &AmplitudeSensor,
) -> anyhow::Result<Sink> {
    let decoder = Decoder::new(Cursor::new(bytes))?;
    let sink = Sink::try_new(stream_handle)?;
    let metered = MeteredSource::new(decoder.convert_samples::<f32>(), sensor.clone());
    sink.append(metered);
    sink.play();
    Ok(sink)
}
