//! Interoperability channel behavior over real loopback sockets

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use world_link::config::RpcConfig;
use world_link::core::packet::Packet;
use world_link::error::ProtocolError;
use world_link::interop::message::{ChannelUserLimit, Interoperation, MigrateClient};
use world_link::interop::server::{serve, typed, InteropRouter};
use world_link::interop::RpcChannel;
use world_link::transport::ServerOptions;

/// Replies with `channel_id * 10`; channel 0 stalls for two seconds first.
fn router() -> InteropRouter {
    InteropRouter::new()
        .register(
            Interoperation::ChannelUserLimitRequest,
            typed(|req: ChannelUserLimit| async move {
                if req.channel_id == 0 {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok::<_, ProtocolError>(Some(u32::from(req.channel_id) * 10))
            }),
        )
        .unwrap()
}

async fn start(router: InteropRouter) -> (SocketAddr, mpsc::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(serve(listener, Arc::new(router), rx, ServerOptions::default()));
    (addr, tx)
}

fn rpc_config(call_timeout: Duration) -> RpcConfig {
    RpcConfig {
        call_timeout,
        connect_timeout: Duration::from_secs(1),
        ..RpcConfig::default()
    }
}

fn limit(channel_id: u8) -> ChannelUserLimit {
    ChannelUserLimit {
        world_id: 0,
        channel_id,
    }
}

#[tokio::test]
async fn round_trip() {
    let (addr, _shutdown) = start(router()).await;
    let channel = RpcChannel::new(addr.to_string(), &rpc_config(Duration::from_secs(1)));

    assert!(!channel.is_connected().await);
    assert_eq!(channel.request(&limit(7)).await.unwrap(), Some(70));
    assert!(channel.is_connected().await);
    assert_eq!(channel.request(&limit(3)).await.unwrap(), Some(30));
    assert_eq!(channel.resets(), 0);
}

#[tokio::test]
async fn raw_call_tags_kind() {
    let (addr, _shutdown) = start(router()).await;
    let channel = RpcChannel::new(addr.to_string(), &rpc_config(Duration::from_secs(1)));

    let mut payload = Packet::new();
    payload.write(0u8).write(4u8);
    let mut reply = channel
        .call(Interoperation::ChannelUserLimitRequest, &payload)
        .await
        .unwrap();
    assert!(reply.read_bool().unwrap());
    assert_eq!(reply.read::<u32>().unwrap(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_each_get_their_own_reply() {
    let (addr, _shutdown) = start(router()).await;
    let channel = Arc::new(RpcChannel::new(
        addr.to_string(),
        &rpc_config(Duration::from_secs(5)),
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for channel_id in 1..=16u8 {
        let channel = channel.clone();
        tasks.spawn(async move {
            let reply = channel.request(&limit(channel_id)).await.unwrap();
            (channel_id, reply)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (channel_id, reply) = joined.unwrap();
        assert_eq!(reply, Some(u32::from(channel_id) * 10));
    }
    assert_eq!(channel.resets(), 0);
}

#[tokio::test]
async fn timeout_resets_channel_and_fails_queued_callers() {
    let (addr, _shutdown) = start(router()).await;
    let channel = Arc::new(RpcChannel::new(
        addr.to_string(),
        &rpc_config(Duration::from_millis(200)),
    ));

    let slow = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.request(&limit(0)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.request(&limit(5)).await })
    };

    assert!(matches!(slow.await.unwrap(), Err(ProtocolError::Timeout)));
    assert!(matches!(queued.await.unwrap(), Err(ProtocolError::ChannelReset)));
    assert_eq!(channel.resets(), 1);
    assert!(!channel.is_connected().await);

    // A fresh socket: the stalled reply can never be read as this answer
    assert_eq!(channel.request(&limit(6)).await.unwrap(), Some(60));
}

#[tokio::test]
async fn unknown_kind_disconnects_caller() {
    let (addr, _shutdown) = start(router()).await;
    let channel = RpcChannel::new(addr.to_string(), &rpc_config(Duration::from_secs(1)));

    let result = channel
        .request(&MigrateClient {
            world_id: 0,
            channel_id: 0,
        })
        .await;
    assert!(result.is_err());
    assert_eq!(channel.resets(), 1);

    assert_eq!(channel.request(&limit(2)).await.unwrap(), Some(20));
}

#[tokio::test]
async fn unreachable_peer_fails_fast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = RpcChannel::new(addr.to_string(), &rpc_config(Duration::from_secs(1)));
    let result = tokio::time::timeout(Duration::from_secs(3), channel.request(&limit(1)))
        .await
        .expect("connect failure should not hang");
    assert!(result.is_err());
}
