//! Sale data model and catalog.

pub mod catalog;
pub mod models;
