//! Two-phase packet events.
//!
//! Each inbound opcode is handled by a fresh [`PacketEvent`]. The dispatcher
//! calls [`PacketEvent::validate`] first; it parses the packet into the
//! event's own fields and makes every trust decision without mutating shared
//! state. Only when it returns [`Validation::Accept`] does
//! [`PacketEvent::apply`] run and perform mutations, replies and
//! interoperability calls.
//!
//! ```text
//! validate ──Accept──▶ apply ──Ok──▶ continue
//!    │  └──Drop──▶ continue (packet ignored)
//!    │  └──Deny(reply)──▶ send reply, end attempt
//!    └──Err──▶ on_fault ──▶ best-effort reply, tear down
//! ```

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::process::ProcessContext;
use crate::protocol::session::ClientSession;
use async_trait::async_trait;

/// Result of a validate stage that did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Run `apply`
    Accept,
    /// Ignore the packet silently; the session continues
    Drop,
    /// Expected rejection: send the coded failure frame and end the attempt
    Deny(Packet),
}

/// What a running event can see and touch.
///
/// `validate` receives it by shared reference, so it cannot change the
/// session. Registries stay reachable through `process` behind their own
/// locks; `validate` only reads them and leaves every write to `apply`.
pub struct EventContext<'a> {
    pub session: &'a mut ClientSession,
    pub process: &'a ProcessContext,
    outbound: Vec<Packet>,
    close: bool,
}

impl<'a> EventContext<'a> {
    pub fn new(session: &'a mut ClientSession, process: &'a ProcessContext) -> Self {
        Self {
            session,
            process,
            outbound: Vec::new(),
            close: false,
        }
    }

    /// Queue a frame for the client. Frames are flushed in order once the
    /// current event finishes.
    pub fn write(&mut self, packet: Packet) {
        self.outbound.push(packet);
    }

    /// Close the connection after the queued frames are flushed.
    pub fn close(&mut self) {
        self.close = true;
    }

    pub fn is_closing(&self) -> bool {
        self.close
    }

    pub fn take_outbound(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbound)
    }

    pub fn outbound(&self) -> &[Packet] {
        &self.outbound
    }
}

#[async_trait]
pub trait PacketEvent: Send {
    /// Parse `packet` (already positioned after the opcode) and decide whether
    /// to accept it. Must read only its own fields and must not call any
    /// registry or storage method that writes.
    fn validate(&mut self, packet: &mut Packet, ctx: &EventContext<'_>) -> Result<Validation>;

    /// Perform the effects of an accepted packet.
    async fn apply(&mut self, ctx: &mut EventContext<'_>) -> Result<()>;

    /// Frame to send before the connection is torn down after `error`.
    fn on_fault(&mut self, error: &ProtocolError, session: &ClientSession) -> Option<Packet> {
        let _ = (error, session);
        None
    }
}
