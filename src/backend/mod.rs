//! Detection backend integration

pub mod client;

pub use client::{BackendError, DetectionClient};
