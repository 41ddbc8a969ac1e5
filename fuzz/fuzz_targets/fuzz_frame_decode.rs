#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;
use world_link::core::codec::FrameCodec;
use world_link::interop::message::{ChannelUserLimit, ClientAuth, InteropRequest, MigrateClient};

fuzz_target!(|data: &[u8]| {
    // Frame splitting must never panic or over-read
    let mut codec = FrameCodec::new(4096);
    let mut buffer = BytesMut::from(data);
    while let Ok(Some(mut frame)) = codec.decode(&mut buffer) {
        // Every frame is also a candidate interoperation body
        let Ok(_kind) = frame.read::<u8>() else {
            continue;
        };
        let position = frame.position();
        let _ = ClientAuth::decode(&mut frame);
        frame.rewind();
        let _ = frame.skip(position);
        let _ = MigrateClient::decode(&mut frame);
        let _ = ChannelUserLimit::decode_response(&mut frame);
    }
});
