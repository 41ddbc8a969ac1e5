#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge cases of the client connection loop: malformed frames, events out of
//! order, denials and idle connections.

use futures::{SinkExt, StreamExt};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use world_link::config::NetworkConfig;
use world_link::core::codec::FrameCodec;
use world_link::core::packet::Packet;
use world_link::error::ProtocolError;
use world_link::process::{serve_login, ProcessContext};
use world_link::protocol::opcode::{RecvOp, SendOp};
use world_link::storage::{AccountRow, MemoryStorage};

const WAIT: Duration = Duration::from_secs(5);

async fn start(config: NetworkConfig) -> (SocketAddr, Arc<ProcessContext>, mpsc::Sender<()>) {
    let storage = MemoryStorage::new();
    storage
        .insert_account(AccountRow {
            id: 1,
            username: "alice".to_string(),
            password: "secret".to_string(),
            blocked: false,
            last_known_ip: None,
            secondary_password: None,
        })
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let process = Arc::new(ProcessContext::new(config, Arc::new(storage)));
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(serve_login(listener, process.clone(), rx));
    (address, process, tx)
}

async fn connect(address: SocketAddr) -> Framed<TcpStream, FrameCodec> {
    Framed::new(TcpStream::connect(address).await.unwrap(), FrameCodec::default())
}

fn check_password(username: &str, password: &str) -> Packet {
    let mut packet = Packet::with_opcode(RecvOp::CheckPassword.code());
    packet.write_string(username).write_string(password);
    packet
}

async fn next(client: &mut Framed<TcpStream, FrameCodec>) -> Option<Packet> {
    tokio::time::timeout(WAIT, client.next())
        .await
        .expect("server answered in time")
        .and_then(|frame| frame.ok())
}

async fn login_result(client: &mut Framed<TcpStream, FrameCodec>) -> u8 {
    let mut reply = next(client).await.expect("login result");
    assert_eq!(reply.read::<u16>().unwrap(), SendOp::CheckPasswordResult.code());
    reply.read::<u8>().unwrap()
}

// ============================================================================
// OUT-OF-ORDER AND UNKNOWN EVENTS
// ============================================================================

#[tokio::test]
async fn test_unknown_opcode_keeps_connection() {
    let (address, process, _shutdown) = start(NetworkConfig::default()).await;
    let mut client = connect(address).await;

    client.send(Packet::with_opcode(0x7777)).await.unwrap();
    client.send(check_password("alice", "secret")).await.unwrap();
    assert_eq!(login_result(&mut client).await, 0);
    assert_eq!(process.metrics.snapshot().packets_received, 2);
}

#[tokio::test]
async fn test_select_world_before_login_is_dropped() {
    let (address, process, _shutdown) = start(NetworkConfig::default()).await;
    let mut client = connect(address).await;

    let mut early = Packet::with_opcode(RecvOp::SelectWorld.code());
    early.write(2u8).write(0u8).write(0u8).write_ipv4(Ipv4Addr::LOCALHOST);
    client.send(early).await.unwrap();
    client.send(check_password("alice", "secret")).await.unwrap();

    assert_eq!(login_result(&mut client).await, 0);
    assert_eq!(process.metrics.snapshot().packets_dropped, 1);
}

#[tokio::test]
async fn test_character_entry_is_not_a_login_event() {
    let (address, process, _shutdown) = start(NetworkConfig::default()).await;
    let mut client = connect(address).await;

    let mut enter = Packet::with_opcode(RecvOp::CharEnterGame.code());
    enter.write(42u32);
    client.send(enter).await.unwrap();
    client.send(check_password("alice", "secret")).await.unwrap();

    assert_eq!(login_result(&mut client).await, 0);
    assert_eq!(process.metrics.snapshot().packets_faulted, 0);
}

// ============================================================================
// MALFORMED FRAMES
// ============================================================================

#[tokio::test]
async fn test_truncated_payload_closes_without_reply() {
    let (address, process, _shutdown) = start(NetworkConfig::default()).await;
    let mut client = connect(address).await;

    let mut truncated = Packet::with_opcode(RecvOp::CheckPassword.code());
    truncated.write(10u16).write_bytes(b"ali");
    client.send(truncated).await.unwrap();

    assert!(next(&mut client).await.is_none());
    assert_eq!(process.metrics.snapshot().packets_faulted, 1);
}

#[tokio::test]
async fn test_empty_frame_closes_connection() {
    let (address, _process, _shutdown) = start(NetworkConfig::default()).await;
    let mut client = connect(address).await;

    client.send(Packet::new()).await.unwrap();
    assert!(next(&mut client).await.is_none());
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let config = NetworkConfig::default_with_overrides(|c| c.transport.max_frame_size = 1024);
    let (address, _process, _shutdown) = start(config).await;
    let mut stream = TcpStream::connect(address).await.unwrap();

    stream.write_all(&(1_000_000u32).to_le_bytes()).await.unwrap();
    stream.write_all(&[0xAB; 64]).await.unwrap();

    let mut client = Framed::new(stream, FrameCodec::default());
    assert!(next(&mut client).await.is_none());
}

// ============================================================================
// DENIALS AND TEARDOWN
// ============================================================================

#[tokio::test]
async fn test_wrong_password_denies_and_closes() {
    let (address, process, _shutdown) = start(NetworkConfig::default()).await;
    let mut client = connect(address).await;

    client.send(check_password("alice", "nope")).await.unwrap();
    assert_eq!(login_result(&mut client).await, 4);
    assert!(next(&mut client).await.is_none());
    assert_eq!(process.metrics.snapshot().packets_denied, 1);
}

#[tokio::test]
async fn test_second_connection_for_same_account_is_refused() {
    let (address, _process, _shutdown) = start(NetworkConfig::default()).await;

    let mut first = connect(address).await;
    first.send(check_password("alice", "secret")).await.unwrap();
    assert_eq!(login_result(&mut first).await, 0);

    let mut second = connect(address).await;
    second.send(check_password("alice", "secret")).await.unwrap();
    assert_eq!(login_result(&mut second).await, 7);
    assert!(next(&mut second).await.is_none());
}

#[tokio::test]
async fn test_disconnect_releases_account() {
    let (address, process, _shutdown) = start(NetworkConfig::default()).await;

    let mut client = connect(address).await;
    client.send(check_password("alice", "secret")).await.unwrap();
    assert_eq!(login_result(&mut client).await, 0);
    assert!(process.sessions.is_account_online(1).unwrap());
    drop(client);

    let released = tokio::time::timeout(WAIT, async {
        while process.sessions.is_account_online(1).unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "account binding released after disconnect");

    let mut again = connect(address).await;
    again.send(check_password("alice", "secret")).await.unwrap();
    assert_eq!(login_result(&mut again).await, 0);
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.transport.idle_timeout = Some(Duration::from_millis(200));
    });
    let (address, process, _shutdown) = start(config).await;
    let mut client = connect(address).await;

    assert!(next(&mut client).await.is_none());
    assert_eq!(process.metrics.snapshot().packets_received, 0);
}

// ============================================================================
// ERROR FORMATTING
// ============================================================================

#[test]
fn test_error_display_formatting() {
    let err = ProtocolError::OutOfRange {
        needed: 4,
        remaining: 1,
    };
    assert_eq!(
        err.to_string(),
        "Read past end of packet: needed 4 bytes, 1 remaining"
    );
    assert_eq!(
        ProtocolError::OversizedPacket(70_000).to_string(),
        "Frame too large: 70000 bytes"
    );
    assert!(ProtocolError::ChannelReset.to_string().contains("reset"));
}
