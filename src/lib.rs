//! # world-link
//!
//! Network core for a multi-process world server: a central broker, login
//! front-ends and world/channel servers.
//!
//! - [`core`]: little-endian packet buffer and length-prefixed framing
//! - [`protocol`]: opcodes, session state and two-phase packet event dispatch
//! - [`interop`]: one-in-flight request/reply channels between processes
//! - [`login`], [`world`], [`central`]: the migration of a client from login
//!   to a channel, negotiated through central
//! - [`process`]: wiring a role onto listeners

pub mod central;
pub mod config;
pub mod core;
pub mod error;
pub mod interop;
pub mod login;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod storage;
pub mod transport;
pub mod utils;
pub mod world;

pub use config::NetworkConfig;
pub use error::{ProtocolError, Result};
pub use process::ProcessContext;
