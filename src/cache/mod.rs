//! Persistent snapshot cache.

pub mod file;
