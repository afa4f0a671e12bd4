//! Client runtime for the Canopy protocol.
//!
//! A [`Client`] owns one connection to a server and presents a
//! single-threaded, typed command surface over it. Connections are opened
//! lazily, handshake included; if the transport dies before a request is
//! fully written, the client reconnects and retries that request exactly
//! once. Failures after the request may have reached the server are
//! surfaced, never silently replayed.
//!
//! Server-resident trees are manipulated through [`Tree`] values, which
//! remember the session they belong to; using one after its session is
//! gone fails cleanly on first use.

pub mod client;
pub mod error;
pub mod tree;

pub use client::{Client, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use tree::Tree;
