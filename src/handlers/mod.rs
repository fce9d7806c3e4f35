//! HTTP handlers for the status endpoint

pub mod status;

pub use status::{get_status, health_check};
