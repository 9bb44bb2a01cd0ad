//! Shoal protocol reference implementation.
//! Pure protocol pieces: addressing, messages, framing, the leader-held index,
//! and content digests. No I/O; the node crate drives the sockets.

pub mod dht;
pub mod integrity;
pub mod peer;
pub mod protocol;
pub mod wire;

pub use dht::Dht;
pub use peer::PeerAddr;
pub use protocol::Message;
pub use wire::{
    decode_frame, encode_frame, FrameDecodeError, FrameEncodeError, HEADER_LEN, PACKET_LEN,
};
