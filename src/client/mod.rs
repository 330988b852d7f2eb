//! Sales API client.

pub mod http;
