//! Per-connection client loop.
//!
//! Frames from one socket are dispatched strictly in arrival order on the
//! connection's own task. Replies an event queues are flushed before the next
//! frame is read, and a close request from the dispatcher ends the loop once
//! they are out.

use crate::core::codec::FrameCodec;
use crate::interop::message::ClientAuth;
use crate::process::ProcessContext;
use crate::protocol::dispatcher::{Dispatcher, Outcome};
use crate::protocol::event::EventContext;
use crate::protocol::session::{ClientSession, LoginStatus};
use crate::utils::timeout::with_optional_timeout;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

#[instrument(skip(stream, dispatcher, process), fields(remote = %remote))]
pub async fn handle_client(
    stream: TcpStream,
    remote: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    process: Arc<ProcessContext>,
) {
    let id = process.sessions.next_connection_id();
    let mut session = ClientSession::new(id, remote);
    let mut framed = Framed::new(
        stream,
        FrameCodec::new(process.config.transport.max_frame_size),
    );
    let idle_timeout = process.config.transport.idle_timeout;

    process.metrics.connection_opened();
    info!(connection = id, "Client connected");

    loop {
        let next = with_optional_timeout(async { Ok(framed.next().await) }, idle_timeout).await;
        let packet = match next {
            Ok(Some(Ok(packet))) => packet,
            Ok(Some(Err(e))) => {
                warn!(connection = id, error = %e, "Client framing error");
                break;
            }
            Ok(None) => {
                debug!(connection = id, "Client closed the connection");
                break;
            }
            Err(_) => {
                debug!(connection = id, "Client idle timeout");
                break;
            }
        };

        let (outbound, closing) = {
            let mut ctx = EventContext::new(&mut session, &process);
            let outcome = dispatcher.dispatch(packet, &mut ctx).await;
            if let Outcome::Faulted(e) = &outcome {
                debug!(connection = id, error = %e, "Tearing down after fault");
            }
            (ctx.take_outbound(), ctx.is_closing())
        };

        let mut write_failed = false;
        for frame in outbound {
            if let Err(e) = framed.feed(frame).await {
                warn!(connection = id, error = %e, "Failed to queue frame");
                write_failed = true;
                break;
            }
            process.metrics.packet_sent();
        }
        if !write_failed {
            if let Err(e) = framed.flush().await {
                warn!(connection = id, error = %e, "Failed to flush frames");
                write_failed = true;
            }
        }

        if closing || write_failed {
            break;
        }
    }

    teardown(&session, &process);
    process.metrics.connection_closed();
    info!(connection = id, stage = ?session.stage, "Client disconnected");
}

/// Release everything this connection owns. Safe to call more than once.
pub fn teardown(session: &ClientSession, process: &Arc<ProcessContext>) {
    if let Err(e) = process.sessions.release(session.id) {
        warn!(connection = session.id, error = %e, "Failed to release session entries");
    }

    // A client on its way to a channel keeps its directory entry
    if session.login_status == LoginStatus::Migrating {
        return;
    }
    let Some(update) = ClientAuth::for_session(session, LoginStatus::Offline) else {
        return;
    };
    if process.central.is_some() {
        let process = process.clone();
        tokio::spawn(async move { process.report_client(update).await });
    }
}
