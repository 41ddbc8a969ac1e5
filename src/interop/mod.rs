//! # Interoperability
//!
//! Synchronous request/reply calls between server processes over persistent
//! TCP sockets.
//!
//! ## Components
//! - **Message**: interoperation kinds and their typed payloads
//! - **Channel**: the calling side; one request in flight per socket
//! - **Server**: the serving side; kind → handler routing
//!
//! ## Wire Format
//! ```text
//! request: [Length(4)] [Kind(1)] [Payload]
//! reply:   [Length(4)] [Payload]
//! ```
//! A reply is matched to its request only by being the next frame on the same
//! socket.

pub mod channel;
pub mod message;
pub mod server;

pub use channel::RpcChannel;
pub use message::{InteropRequest, Interoperation};
pub use server::{InteropHandler, InteropRouter};
