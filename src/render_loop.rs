//! Continuous face rendering
//!
//! One task ticking at the configured frame rate. It reads the published
//! view state, forwards the frozen snapshot image when one arrives, samples
//! the amplitude sensor, and hands the resulting frame to a [`DisplaySink`].
//! Video modes present a clear instead of a face. Nothing here can fail:
//! sink backpressure and zero-sized surfaces are dropped frames, not errors.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::coordinator::state::{InteractionMode, SnapshotImage, ViewState};
use crate::face::{self, FaceFrame};
use crate::media::AmplitudeSensor;

/// Opaque presentation capability the render loop draws into.
pub trait DisplaySink: Send {
    /// Current drawable surface size in pixels.
    fn surface_size(&self) -> (f32, f32);
    /// Present one face frame. Dropping it under backpressure is fine.
    fn present(&self, frame: FaceFrame);
    /// Present the frozen detection snapshot behind the face.
    fn present_snapshot(&self, image: Arc<Vec<u8>>);
    /// Clear the surface (video modes own the screen).
    fn clear(&self);
}

/// What the presenter receives from a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayFrame {
    /// A rendered face
    Face(FaceFrame),
    /// The frozen detection snapshot image bytes
    Snapshot(Arc<Vec<u8>>),
    /// A video element owns the screen
    Clear,
}

/// A sink that forwards frames over a bounded channel to a presenter.
///
/// `try_send` keeps the render loop from ever blocking on a slow consumer;
/// the presenter only ever wants the freshest frame anyway.
pub struct ChannelSink {
    frames: crossbeam_channel::Sender<DisplayFrame>,
    width: f32,
    height: f32,
}

impl ChannelSink {
    /// Create the sink and the receiving end for the presenter.
    pub fn new(width: f32, height: f32) -> (Self, crossbeam_channel::Receiver<DisplayFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(2);
        (
            Self {
                frames: tx,
                width,
                height,
            },
            rx,
        )
    }
}

impl DisplaySink for ChannelSink {
    fn surface_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn present(&self, frame: FaceFrame) {
        // Full channel means the presenter is behind; drop the frame.
        let _ = self.frames.try_send(DisplayFrame::Face(frame));
    }

    fn present_snapshot(&self, image: Arc<Vec<u8>>) {
        let _ = self.frames.try_send(DisplayFrame::Snapshot(image));
    }

    fn clear(&self) {
        let _ = self.frames.try_send(DisplayFrame::Clear);
    }
}

/// Compute the frame for one tick, or `None` for a clear.
pub fn frame_for(view: ViewState, amplitude: f32, t: f32, w: f32, h: f32) -> Option<FaceFrame> {
    match view.mode {
        InteractionMode::Idle => Some(face::talking_face(0.0, t, w, h)),
        InteractionMode::SnapshotDisplay => Some(face::static_face(view.emotion, w, h)),
        InteractionMode::AudioPlayback => Some(face::talking_face(amplitude, t, w, h)),
        // A video element owns the screen
        InteractionMode::RandomVideo
        | InteractionMode::ForcedVideo
        | InteractionMode::SpecialEvent => None,
    }
}

/// Render loop task
pub struct RenderLoop<S: DisplaySink> {
    sink: S,
    view: watch::Receiver<ViewState>,
    snapshot: watch::Receiver<SnapshotImage>,
    sensor: AmplitudeSensor,
    fps: u32,
}

impl<S: DisplaySink> RenderLoop<S> {
    pub fn new(
        sink: S,
        view: watch::Receiver<ViewState>,
        snapshot: watch::Receiver<SnapshotImage>,
        sensor: AmplitudeSensor,
        fps: u32,
    ) -> Self {
        Self {
            sink,
            view,
            snapshot,
            sensor,
            fps: fps.max(1),
        }
    }

    /// Run until the view channel closes.
    pub async fn run(mut self) {
        let frame_time = std::time::Duration::from_secs_f64(1.0 / f64::from(self.fps));
        let mut ticker = tokio::time::interval(frame_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        tracing::info!("render loop started at {} fps", self.fps);

        loop {
            ticker.tick().await;
            if self.view.has_changed().is_err() {
                tracing::debug!("view channel closed, render loop exiting");
                return;
            }

            // Forward a freshly fetched snapshot image once.
            if self.snapshot.has_changed().unwrap_or(false) {
                let image = self.snapshot.borrow_and_update().clone();
                if let Some(image) = image {
                    self.sink.present_snapshot(image);
                }
            }

            let view = *self.view.borrow();
            let (w, h) = self.sink.surface_size();
            let amplitude = self.sensor.sample();
            let t = started.elapsed().as_secs_f32();

            match frame_for(view, amplitude, t, w, h) {
                Some(frame) if !frame.is_empty() => self.sink.present(frame),
                Some(_) => {} // zero-sized surface, nothing to draw
                None => self.sink.clear(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::state::EmotionLabel;

    fn view(mode: InteractionMode, emotion: EmotionLabel) -> ViewState {
        ViewState { mode, emotion }
    }

    #[test]
    fn test_idle_renders_quiet_talking_face() {
        let frame = frame_for(
            view(InteractionMode::Idle, EmotionLabel::Neutral),
            // Amplitude is ignored in idle
            0.9,
            0.0,
            800.0,
            600.0,
        )
        .unwrap();
        assert_eq!(frame, face::talking_face(0.0, 0.0, 800.0, 600.0));
    }

    #[test]
    fn test_snapshot_display_renders_static_emotion() {
        let frame = frame_for(
            view(InteractionMode::SnapshotDisplay, EmotionLabel::Angry),
            0.0,
            3.0,
            800.0,
            600.0,
        )
        .unwrap();
        assert_eq!(frame, face::static_face(EmotionLabel::Angry, 800.0, 600.0));
    }

    #[test]
    fn test_audio_playback_uses_amplitude() {
        let quiet = frame_for(
            view(InteractionMode::AudioPlayback, EmotionLabel::Happy),
            0.0,
            0.0,
            800.0,
            600.0,
        );
        let loud = frame_for(
            view(InteractionMode::AudioPlayback, EmotionLabel::Happy),
            1.0,
            0.0,
            800.0,
            600.0,
        );
        assert_ne!(quiet, loud);
    }

    #[test]
    fn test_video_modes_clear() {
        for mode in [
            InteractionMode::RandomVideo,
            InteractionMode::ForcedVideo,
            InteractionMode::SpecialEvent,
        ] {
            assert!(frame_for(view(mode, EmotionLabel::Neutral), 0.5, 0.0, 800.0, 600.0).is_none());
        }
    }

    #[test]
    fn test_channel_sink_drops_under_backpressure() {
        let (sink, rx) = ChannelSink::new(800.0, 600.0);
        let frame = face::static_face(EmotionLabel::Happy, 800.0, 600.0);

        // Capacity is 2; extra frames are dropped, never blocking.
        for _ in 0..10 {
            sink.present(frame.clone());
        }
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_channel_sink_clear_frame() {
        let (sink, rx) = ChannelSink::new(800.0, 600.0);
        sink.clear();
        assert_eq!(rx.recv().unwrap(), DisplayFrame::Clear);
    }

    #[test]
    fn test_channel_sink_forwards_snapshot_bytes() {
        let (sink, rx) = ChannelSink::new(800.0, 600.0);
        let image = Arc::new(vec![0xFF, 0xD8, 0xFF, 0xE0]);
        sink.present_snapshot(Arc::clone(&image));

        match rx.recv().unwrap() {
            DisplayFrame::Snapshot(bytes) => assert_eq!(bytes, image),
            other => panic!("expected snapshot frame, got {:?}", other),
        }
    }
}
