//! Flash-price resolution.

pub mod resolver;
