//! Interaction coordination
//!
//! The transition machine ([`machine::Coordinator`]) holds the rules; the
//! [`driver::Driver`] wires it to the runtime.

pub mod driver;
pub mod machine;
pub mod state;

pub use driver::Driver;
pub use machine::{Command, Coordinator, Event};
pub use state::{DetectionSnapshot, EmotionLabel, InteractionMode, ViewState};
