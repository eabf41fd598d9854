//! Authenticated access to the WHOOP developer API: OAuth token lifecycle and
//! paginated retrieval of recovery, sleep, cycle and workout records.

pub mod api;
pub mod auth;
pub mod config;
