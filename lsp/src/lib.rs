//! Protocol client for a formatter running as a language server.
//!
//! Covers the connection lifecycle only: spawn, `initialize` handshake,
//! graceful `shutdown`/`exit`, and forced release.

pub mod codec;

pub(crate) mod protocol;

mod client;

pub use client::{ClientOptions, LspClient};
