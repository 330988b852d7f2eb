//! Sale lifecycle rules and urgency classification.

pub mod lifecycle;
pub mod urgency;
