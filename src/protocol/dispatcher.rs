use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::event::{EventContext, PacketEvent, Validation};
use crate::protocol::opcode::RecvOp;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Creates a fresh event for one inbound packet.
pub type EventFactory = fn() -> Box<dyn PacketEvent>;

/// What happened to one dispatched frame.
#[derive(Debug)]
pub enum Outcome {
    Applied,
    Dropped,
    Denied,
    /// No event registered for this opcode; the frame was ignored
    Unhandled(u16),
    /// Validate or apply failed; the connection must be torn down
    Faulted(ProtocolError),
}

impl Outcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::Denied | Outcome::Faulted(_))
    }
}

/// Collects opcode → event registrations before the table is frozen.
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<u16, EventFactory>,
}

impl DispatcherBuilder {
    pub fn register(mut self, opcode: RecvOp, factory: EventFactory) -> Result<Self> {
        if self.handlers.insert(opcode.code(), factory).is_some() {
            return Err(ProtocolError::ConfigError(format!(
                "Opcode {opcode} registered twice"
            )));
        }
        Ok(self)
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}

/// Immutable opcode → event table. Built once at startup and shared by every
/// connection of the process.
pub struct Dispatcher {
    handlers: HashMap<u16, EventFactory>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn handles(&self, opcode: RecvOp) -> bool {
        self.handlers.contains_key(&opcode.code())
    }

    /// Run one client frame through validate and apply.
    ///
    /// Denials and faults mark the context for closing; replies they produce
    /// are queued on the context like any other outbound frame.
    pub async fn dispatch(&self, mut packet: Packet, ctx: &mut EventContext<'_>) -> Outcome {
        let process = ctx.process;
        let metrics = &process.metrics;
        metrics.packet_received();

        let opcode = match packet.read::<u16>() {
            Ok(opcode) => opcode,
            Err(_) => {
                // Not even an opcode: there is no event boundary to recover at
                ctx.close();
                metrics.packet_faulted();
                return Outcome::Faulted(ProtocolError::InvalidHeader(
                    constants::ERR_MISSING_OPCODE,
                ));
            }
        };

        let Some(factory) = self.handlers.get(&opcode) else {
            debug!(connection = ctx.session.id, opcode, "Unhandled opcode");
            return Outcome::Unhandled(opcode);
        };

        let mut event = factory();

        let verdict = event.validate(&mut packet, ctx);
        match verdict {
            Ok(Validation::Accept) => {
                if packet.remaining() > 0 {
                    trace!(
                        connection = ctx.session.id,
                        opcode,
                        trailing = packet.remaining(),
                        "Ignoring trailing bytes"
                    );
                }
            }
            Ok(Validation::Drop) => {
                trace!(connection = ctx.session.id, opcode, "Packet dropped by validation");
                metrics.packet_dropped();
                return Outcome::Dropped;
            }
            Ok(Validation::Deny(reply)) => {
                debug!(connection = ctx.session.id, opcode, stage = ?ctx.session.stage, "Packet denied");
                metrics.packet_denied();
                ctx.write(reply);
                ctx.session.deny();
                ctx.close();
                return Outcome::Denied;
            }
            Err(e) => return Self::fault(event.as_mut(), opcode, e, ctx),
        }

        match event.apply(ctx).await {
            Ok(()) => Outcome::Applied,
            Err(e) => Self::fault(event.as_mut(), opcode, e, ctx),
        }
    }

    fn fault(
        event: &mut dyn PacketEvent,
        opcode: u16,
        error: ProtocolError,
        ctx: &mut EventContext<'_>,
    ) -> Outcome {
        warn!(
            connection = ctx.session.id,
            remote = %ctx.session.remote,
            opcode,
            error = %error,
            framing = error.is_framing(),
            "Packet event faulted"
        );
        ctx.process.metrics.packet_faulted();
        if let Some(reply) = event.on_fault(&error, ctx.session) {
            ctx.write(reply);
        }
        ctx.close();
        Outcome::Faulted(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::process::ProcessContext;
    use crate::protocol::opcode::SendOp;
    use crate::protocol::session::{ClientSession, Stage};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::Arc;

    const DENY: u8 = 0xFF;
    const REJECT: u8 = 0xFE;
    const FAIL_APPLY: u8 = 0xFD;

    /// Reads one step byte; apply adds it to the session's channel id.
    #[derive(Default)]
    struct Counter {
        step: u8,
    }

    #[async_trait]
    impl PacketEvent for Counter {
        fn validate(&mut self, packet: &mut Packet, _ctx: &EventContext<'_>) -> Result<Validation> {
            self.step = packet.read::<u8>()?;
            match self.step {
                0 => Ok(Validation::Drop),
                DENY => Ok(Validation::Deny(Packet::with_opcode(SendOp::CheckPasswordResult.code()))),
                REJECT => Err(ProtocolError::TrustViolation("rejected".into())),
                _ => Ok(Validation::Accept),
            }
        }

        async fn apply(&mut self, ctx: &mut EventContext<'_>) -> Result<()> {
            if self.step == FAIL_APPLY {
                return Err(ProtocolError::Custom("apply failed".into()));
            }
            let current = ctx.session.channel_id.unwrap_or(0);
            ctx.session.channel_id = Some(current + self.step);
            Ok(())
        }

        fn on_fault(&mut self, _error: &ProtocolError, _session: &ClientSession) -> Option<Packet> {
            Some(Packet::with_opcode(SendOp::BroadcastMsg.code()))
        }
    }

    fn counter() -> Box<dyn PacketEvent> {
        Box::new(Counter::default())
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder()
            .register(RecvOp::CheckPassword, counter)
            .unwrap()
            .build()
    }

    fn process() -> ProcessContext {
        ProcessContext::new(NetworkConfig::default(), Arc::new(MemoryStorage::new()))
    }

    fn session() -> ClientSession {
        ClientSession::new(1, "10.0.0.5:40000".parse().unwrap())
    }

    fn frame(step: u8) -> Packet {
        let mut packet = Packet::with_opcode(RecvOp::CheckPassword.code());
        packet.write(step);
        packet
    }

    fn opcode_of(packet: &Packet) -> u16 {
        u16::from_le_bytes([packet.as_bytes()[0], packet.as_bytes()[1]])
    }

    #[tokio::test]
    async fn repeated_validation_mutates_once() {
        let process = process();
        let mut direct = session();
        let mut ctx = EventContext::new(&mut direct, &process);

        let mut event = Counter::default();
        for _ in 0..5 {
            let mut body = Packet::new();
            body.write(3u8);
            assert_eq!(event.validate(&mut body, &ctx).unwrap(), Validation::Accept);
        }
        assert_eq!(ctx.session.channel_id, None);

        event.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.session.channel_id, Some(3));

        let mut fresh = session();
        let mut dispatched = EventContext::new(&mut fresh, &process);
        let outcome = dispatcher().dispatch(frame(3), &mut dispatched).await;
        assert!(matches!(outcome, Outcome::Applied));
        assert_eq!(dispatched.session.channel_id, Some(3));
        assert!(!dispatched.is_closing());
    }

    #[tokio::test]
    async fn short_frame_faults_without_mutation() {
        let process = process();
        let mut session = session();
        let mut ctx = EventContext::new(&mut session, &process);

        let outcome = dispatcher().dispatch(Packet::from(vec![0x01]), &mut ctx).await;
        assert!(matches!(outcome, Outcome::Faulted(ProtocolError::InvalidHeader(_))));
        assert!(outcome.is_fatal());
        assert!(ctx.is_closing());
        assert!(ctx.outbound().is_empty());
        assert_eq!(ctx.session.channel_id, None);
        assert_eq!(process.metrics.snapshot().packets_faulted, 1);
    }

    #[tokio::test]
    async fn deny_queues_reply_and_closes() {
        let process = process();
        let mut session = session();
        let mut ctx = EventContext::new(&mut session, &process);

        let outcome = dispatcher().dispatch(frame(DENY), &mut ctx).await;
        assert!(matches!(outcome, Outcome::Denied));
        assert!(ctx.is_closing());
        assert_eq!(ctx.outbound().len(), 1);
        assert_eq!(opcode_of(&ctx.outbound()[0]), SendOp::CheckPasswordResult.code());
        assert_eq!(ctx.session.stage, Stage::MigrationDenied);
        assert_eq!(ctx.session.channel_id, None);
        assert_eq!(process.metrics.snapshot().packets_denied, 1);
    }

    #[tokio::test]
    async fn validate_fault_sends_fault_reply() {
        let process = process();
        let mut session = session();
        let mut ctx = EventContext::new(&mut session, &process);

        let outcome = dispatcher().dispatch(frame(REJECT), &mut ctx).await;
        assert!(matches!(outcome, Outcome::Faulted(ProtocolError::TrustViolation(_))));
        assert!(ctx.is_closing());
        assert_eq!(ctx.outbound().len(), 1);
        assert_eq!(opcode_of(&ctx.outbound()[0]), SendOp::BroadcastMsg.code());
        assert_eq!(ctx.session.channel_id, None);
        assert_eq!(process.metrics.snapshot().packets_faulted, 1);
    }

    #[tokio::test]
    async fn apply_fault_sends_fault_reply() {
        let process = process();
        let mut session = session();
        let mut ctx = EventContext::new(&mut session, &process);

        let outcome = dispatcher().dispatch(frame(FAIL_APPLY), &mut ctx).await;
        assert!(matches!(outcome, Outcome::Faulted(ProtocolError::Custom(_))));
        assert!(ctx.is_closing());
        assert_eq!(ctx.outbound().len(), 1);
        assert_eq!(opcode_of(&ctx.outbound()[0]), SendOp::BroadcastMsg.code());
        assert_eq!(ctx.session.channel_id, None);
    }

    #[tokio::test]
    async fn truncated_body_is_a_validate_fault() {
        let process = process();
        let mut session = session();
        let mut ctx = EventContext::new(&mut session, &process);

        let outcome = dispatcher()
            .dispatch(Packet::with_opcode(RecvOp::CheckPassword.code()), &mut ctx)
            .await;
        assert!(matches!(outcome, Outcome::Faulted(ProtocolError::OutOfRange { .. })));
        assert!(ctx.is_closing());
    }

    #[tokio::test]
    async fn drop_and_unhandled_keep_connection_open() {
        let process = process();
        let mut session = session();
        let mut ctx = EventContext::new(&mut session, &process);
        let dispatcher = dispatcher();

        assert!(matches!(dispatcher.dispatch(frame(0), &mut ctx).await, Outcome::Dropped));
        let unknown = dispatcher
            .dispatch(Packet::with_opcode(0x7777), &mut ctx)
            .await;
        assert!(matches!(unknown, Outcome::Unhandled(0x7777)));
        assert!(!unknown.is_fatal());
        assert!(!ctx.is_closing());
        assert!(ctx.outbound().is_empty());

        let snapshot = process.metrics.snapshot();
        assert_eq!(snapshot.packets_received, 2);
        assert_eq!(snapshot.packets_dropped, 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let duplicate = Dispatcher::builder()
            .register(RecvOp::CheckPassword, counter)
            .unwrap()
            .register(RecvOp::CheckPassword, counter);
        assert!(duplicate.is_err());
        assert!(dispatcher().handles(RecvOp::CheckPassword));
        assert!(!dispatcher().handles(RecvOp::SelectWorld));
    }
}
