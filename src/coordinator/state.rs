//! Core data model for the interaction coordinator
//!
//! Defines the presentation modes, the per-poll detection snapshot, and the
//! mutable coordinator state that the transition machine owns exclusively.

use serde::{Deserialize, Serialize};

/// Emotion labels reported by the detection backend.
///
/// Unknown or empty labels decode as `Neutral` so a misbehaving backend can
/// never wedge the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Surprise,
    Fear,
    Disgust,
    #[default]
    Neutral,
    NoFace,
}

impl EmotionLabel {
    /// Parse a backend label, falling back to `Neutral` for anything unknown.
    pub fn parse(label: &str) -> Self {
        match label {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "surprise" => Self::Surprise,
            "fear" => Self::Fear,
            "disgust" => Self::Disgust,
            "neutral" => Self::Neutral,
            "no_face" => Self::NoFace,
            _ => Self::Neutral,
        }
    }

    /// The wire name of this label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprise => "surprise",
            Self::Fear => "fear",
            Self::Disgust => "disgust",
            Self::Neutral => "neutral",
            Self::NoFace => "no_face",
        }
    }

    /// The audio bucket used when selecting a voice line for this emotion.
    ///
    /// Disgust and no-face have no recorded audio and borrow the neutral
    /// bucket.
    pub fn audio_bucket(&self) -> Self {
        match self {
            Self::Disgust | Self::NoFace => Self::Neutral,
            other => *other,
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single active presentation mode of the kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Idle face animation, waiting for a detection
    #[default]
    Idle,
    /// Frozen snapshot and static emotion face shown for a short hold
    SnapshotDisplay,
    /// Voice line playing with the lip-sync animation
    AudioPlayback,
    /// Randomly selected interlude video is fullscreen
    RandomVideo,
    /// Backend-mandated video is fullscreen
    ForcedVideo,
    /// Rare ambient interlude owns the screen
    SpecialEvent,
}

impl InteractionMode {
    /// Whether the drawn face is the foreground surface in this mode.
    pub fn is_face_foreground(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::SnapshotDisplay | Self::AudioPlayback
        )
    }

    /// Whether a video element currently owns the screen.
    pub fn is_video_active(&self) -> bool {
        matches!(
            self,
            Self::RandomVideo | Self::ForcedVideo | Self::SpecialEvent
        )
    }
}

/// Normalized detection state for one poll cycle.
///
/// Built by the poller from `/detection_status` plus `/get_video_loop_state`,
/// folded into coordinator state and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSnapshot {
    /// A stable emotion detection has completed server-side
    pub detected: bool,
    /// The detected emotion (meaningful when `detected` is true)
    pub emotion: EmotionLabel,
    /// Asset the backend mandates play immediately, if any
    pub forced_video: Option<String>,
    /// Operator requested a full client reset
    pub restart_requested: bool,
    /// Backend is in video-loop mode
    pub loop_active: bool,
}

impl DetectionSnapshot {
    /// A quiet snapshot with nothing detected and no commands pending.
    pub fn quiet() -> Self {
        Self {
            detected: false,
            emotion: EmotionLabel::Neutral,
            forced_video: None,
            restart_requested: false,
            loop_active: false,
        }
    }
}

/// Opaque identifier for one playback start.
///
/// Issued by the coordinator, echoed back on the terminal event; a mismatch
/// marks the event as stale and it is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which playback resource a terminal event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// How a playback handle terminated.
///
/// The coordinator treats both identically; `Errored` only changes the log
/// level, never the transition taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Ended,
    Errored,
}

/// Mutable coordinator state, owned by the transition machine.
///
/// Mutated only inside transition handlers; the poller and render loop never
/// touch it directly.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    /// Current presentation mode
    pub mode: InteractionMode,
    /// Last forced-video identifier processed, for deduplication
    pub forced_token: Option<String>,
    /// Emotion captured when the current interaction began
    pub current_emotion: EmotionLabel,
    /// An audio handle is live
    pub audio_playing: bool,
    /// Last reported video-loop flag
    pub loop_active: bool,
}

/// Snapshot of coordinator state published to the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ViewState {
    pub mode: InteractionMode,
    pub emotion: EmotionLabel,
}

/// Frozen detection-snapshot image published for presentation.
///
/// `None` outside snapshot display, or while the fetch is still in flight.
pub type SnapshotImage = Option<std::sync::Arc<Vec<u8>>>;
