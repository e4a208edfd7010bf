//! Inbound interfaces of the taskbeacon daemon.
//!
//! The JSON-RPC API exposes flows, entries, options and sensors over TCP;
//! the callback view receives OAuth redirects from the browser.

pub mod callback;
pub mod handlers;
pub mod server;

pub use callback::{start_callback_server, CallbackServer};
pub use server::start_server;
