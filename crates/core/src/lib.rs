//! TOEFL Core Library
//!
//! Data model, durable local storage, countdown and playback state machines,
//! exam timing rules and client configuration for the TOEFL prep client.

pub mod config;
pub mod countdown;
pub mod error;
pub mod exam;
pub mod invariants;
pub mod models;
pub mod playback;
pub mod storage;

pub use config::ClientConfig;
pub use countdown::{format_clock, CountdownPhase, CountdownTimer, Tick, Urgency};
pub use error::{Error, Result};
pub use models::*;
pub use playback::{AudioPlayer, AutoplayOutcome, MediaElement, MediaEvent, PlaybackState};
pub use storage::{Database, KeyValueStore, LocalStore};
