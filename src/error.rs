//! # Error Types
//!
//! Error handling for the packet codec, event dispatch, interoperability
//! channels and session migration.
//!
//! ## Error Categories
//! - **Framing Errors**: truncated reads, oversized or malformed frames
//! - **Trust Violations**: credential, ownership and address checks that fail hard
//! - **RPC Errors**: timeouts, disconnects and channel resets on interoperability sockets
//! - **Registry Errors**: duplicate registrations and poisoned locks
//! - **Configuration / Storage Errors**: surfaced from collaborators
//!
//! Expected rejections are not errors: a `validate` stage reports them through
//! [`crate::protocol::event::Validation`]. Anything that reaches this type is
//! either a protocol violation or a fault.
//!
//! ## Example Usage
//! ```rust
//! use world_link::core::packet::Packet;
//! use world_link::error::{ProtocolError, Result};
//!
//! fn read_character_id(packet: &mut Packet) -> Result<u32> {
//!     packet.read::<u32>()
//! }
//!
//! let mut packet = Packet::from(vec![0x01, 0x02]);
//! assert!(matches!(
//!     read_character_id(&mut packet),
//!     Err(ProtocolError::OutOfRange { needed: 4, remaining: 2 })
//! ));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry errors
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on registry";
    pub const ERR_TOPOLOGY_LOCK: &str = "Failed to acquire lock on topology";
    pub const ERR_DIRECTORY_LOCK: &str = "Failed to acquire lock on login directory";
    pub const ERR_STORAGE_LOCK: &str = "Failed to acquire lock on storage";
    pub const ERR_WORLD_LINKS_LOCK: &str = "Failed to acquire lock on world links";

    /// Framing errors
    pub const ERR_MISSING_OPCODE: &str = "Frame too short to carry an opcode";
    pub const ERR_MISSING_INTEROP_KIND: &str = "Interoperation frame carries no kind tag";

    /// Trust violations
    pub const ERR_SESSION_HIJACK: &str = "Possible remote hack: account address does not match connection";
    pub const ERR_FOREIGN_CHARACTER: &str = "Character does not belong to this world";

    /// Interoperability errors
    pub const ERR_CENTRAL_UNCONFIGURED: &str = "No central interoperability channel configured";
}

/// Primary error type for all operations in this crate.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Read past end of packet: needed {needed} bytes, {remaining} remaining")]
    OutOfRange { needed: usize, remaining: usize },

    #[error("Invalid frame header: {0}")]
    InvalidHeader(&'static str),

    #[error("Frame too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Interoperability channel was reset while the call was queued")]
    ChannelReset,

    #[error("Unknown interoperation kind: {0}")]
    UnknownInteroperation(u8),

    #[error("Interoperation unavailable: {0}")]
    Unavailable(String),

    #[error("Trust violation: {0}")]
    TrustViolation(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error came from reading or framing bytes rather than from
    /// a trust decision or a server-side fault.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::OutOfRange { .. }
                | ProtocolError::InvalidHeader(_)
                | ProtocolError::OversizedPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
