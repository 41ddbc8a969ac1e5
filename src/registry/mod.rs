//! # Registries
//!
//! Process-owned shared state, created at process start and passed by handle
//! to every component that reads or mutates it.
//!
//! ## Components
//! - **Sessions**: account → connection and character → user maps
//! - **Topology**: world → channel → address and user-count snapshot
//! - **Directory**: central-only view of clients connected to login front-ends

pub mod directory;
pub mod sessions;
pub mod topology;

pub use directory::{DirectoryEntry, LoginDirectory};
pub use sessions::{ConnectionId, FieldState, Released, SessionRegistry, UserEntry};
pub use topology::{ChannelEntry, ChannelSnapshot, Topology};
