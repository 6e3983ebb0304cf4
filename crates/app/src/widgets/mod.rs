//! Widgets that own a background subscription
//!
//! Each widget spawns one task when created and aborts it when dropped, so a
//! torn-down page never leaves a callback mutating state behind it.

pub mod media;
pub mod timer;

pub use media::{HeadlessElement, MediaWidget};
pub use timer::{TimerSnapshot, TimerWidget};
