//! Audio and video playback

pub mod amplitude;
pub mod player;

pub use amplitude::AmplitudeSensor;
pub use player::{KioskPlayer, MediaPlayer};
