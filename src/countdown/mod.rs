//! Countdown timers and their registry.

pub mod format;
pub mod registry;
pub mod timer;
