use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};
use world_link::core::codec::FrameCodec;
use world_link::core::packet::Packet;
use world_link::interop::message::{ClientAuth, InteropRequest};
use world_link::protocol::session::LoginStatus;

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let body_sizes = [16usize, 256, 4096, 60_000];

    for &size in &body_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Packet::from(vec![0u8; size]),
                |packet| {
                    let mut buf = BytesMut::with_capacity(size + 4);
                    FrameCodec::default().encode(packet, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut wire = BytesMut::new();
            FrameCodec::default()
                .encode(Packet::from(vec![0u8; size]), &mut wire)
                .unwrap();
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let frame = FrameCodec::default().decode(&mut buf).unwrap();
                    assert!(frame.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_packet_fields(c: &mut Criterion) {
    let update = ClientAuth {
        username: "alice".to_string(),
        account_id: 1,
        login_status: LoginStatus::Migrating,
        world_id: 0,
        channel_id: 1,
        remote_ip: std::net::Ipv4Addr::LOCALHOST,
    };

    c.bench_function("client_auth_encode", |b| b.iter(|| update.to_packet()));
    c.bench_function("client_auth_decode", |b| {
        let body = update.to_packet();
        b.iter_batched(
            || body.clone(),
            |mut body| {
                body.skip(1).unwrap();
                ClientAuth::decode(&mut body).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_frame_encode_decode, bench_packet_fields);
criterion_main!(benches);
