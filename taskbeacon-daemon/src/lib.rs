//! taskbeacon daemon library
//!
//! This module exports the internal components of the daemon for testing purposes.

pub mod api;
pub mod config;
pub mod flow;
pub mod manager;
pub mod platform;
pub mod poller;
