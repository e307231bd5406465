//! Room-based chat relay over plain TCP.
//!
//! The server partitions connections into named rooms and fans chat text
//! and file payloads out to the other members of the sender's room. Each
//! module covers one concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`frame`] applies the wire framing: newline-terminated command lines,
//!   undelimited chat text, and `<EOF>`-terminated binary payloads.
//! - [`registry`] owns room membership behind a single lock.
//! - [`session`] is the per-connection state machine classifying inbound
//!   frames and driving uploads.
//! - [`relay`] fans parsed frames out to the right room members without
//!   letting one slow recipient stall the rest.
//! - [`server`] accepts connections and guarantees per-session cleanup.
//! - [`client`] is the client-side protocol state machine plus a terminal
//!   frontend.
//! - [`error`] is the error taxonomy shared by the layers above.
//!
//! Integration tests use this crate directly to exercise the relay over
//! real TCP connections and through the CLI binary.

pub mod cli;
pub mod client;
pub mod error;
pub mod frame;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
