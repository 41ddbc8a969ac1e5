//! # Core Protocol Components
//!
//! Packet buffer and transport framing shared by client connections and
//! interoperability channels.
//!
//! ## Components
//! - **Packet**: position-tracked little-endian byte buffer
//! - **Codec**: Tokio codec for length-prefixed framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [Body(N)]
//! client body:  [Opcode(2)] [Payload]
//! interop body: [Kind(1)] [Payload]      reply body: [Payload]
//! ```
//!
//! ## Security
//! - Maximum frame size is enforced before any body bytes are buffered
//! - Reads past the end of a packet fail instead of yielding stale data

pub mod codec;
pub mod packet;
