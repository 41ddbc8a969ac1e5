//! # Client Protocol
//!
//! Opcodes, per-connection session state and the two-phase packet event
//! dispatch every inbound client frame goes through.
//!
//! ## Components
//! - **Opcode**: inbound and outbound `u16` frame identifiers
//! - **Event**: the validate/apply capability each opcode implements
//! - **Dispatcher**: immutable opcode → event table built at startup
//! - **Session**: connection-owned state and the migration stage machine

pub mod dispatcher;
pub mod event;
pub mod opcode;
pub mod session;

pub use dispatcher::{Dispatcher, DispatcherBuilder, Outcome};
pub use event::{EventContext, PacketEvent, Validation};
pub use opcode::{RecvOp, SendOp};
pub use session::{ClientSession, LoginStatus, SecondaryPassword, Stage};
