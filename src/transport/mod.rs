//! # Transport Layer
//!
//! TCP accept loops with graceful shutdown, and the per-connection client
//! loop that feeds decoded frames to a [`crate::protocol::Dispatcher`].

pub mod connection;
pub mod server;

pub use server::{accept_loop, ServerOptions};
