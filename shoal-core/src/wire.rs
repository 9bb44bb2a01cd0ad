//! Framing: 16-byte left-justified ASCII decimal length header + bincode payload.
//! Frames travel in 2048-byte chunks; the final chunk may be shorter.

use crate::protocol::Message;

/// Width of the ASCII decimal length header.
pub const HEADER_LEN: usize = 16;
/// Transmission chunk size; larger frames are sent and received in several pieces.
pub const PACKET_LEN: usize = 2048;
/// Ceiling on a single payload; anything larger is a corrupt or hostile header.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024; // 64 MiB

/// Encode a message into a single frame: ASCII length header + bincode payload.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(msg).map_err(FrameEncodeError::Encode)?;
    encode_payload(&payload)
}

/// Frame an already-serialized payload.
pub fn encode_payload(payload: &[u8]) -> Result<Vec<u8>, FrameEncodeError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(format!("{:<width$}", payload.len(), width = HEADER_LEN).as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Error encoding a message into a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Parse the fixed-width header into the payload length it declares.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, FrameDecodeError> {
    let text = std::str::from_utf8(header).map_err(|_| FrameDecodeError::BadHeader)?;
    let len: usize = text
        .trim_end()
        .parse()
        .map_err(|_| FrameDecodeError::BadHeader)?;
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    Ok(len)
}

/// Deserialize a complete payload.
pub fn decode_payload(payload: &[u8]) -> Result<Message, FrameDecodeError> {
    bincode::deserialize(payload).map_err(FrameDecodeError::Decode)
}

/// Decode one frame from the front of `bytes`. Returns the message and the number of bytes consumed.
/// Call with a partial buffer; `NeedMore` means the caller should try again after more data.
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameDecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(FrameDecodeError::NeedMore);
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let len = decode_header(&header)?;
    if bytes.len() < HEADER_LEN + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let msg = decode_payload(&bytes[HEADER_LEN..HEADER_LEN + len])?;
    Ok((msg, HEADER_LEN + len))
}

/// Error decoding a frame (need more bytes, bad or oversized header, or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("malformed length header")]
    BadHeader,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerAddr;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> PeerAddr {
        PeerAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn header_is_left_justified_ascii() {
        let frame = encode_payload(b"hello").unwrap();
        assert_eq!(&frame[..HEADER_LEN], b"5               ");
        assert_eq!(&frame[HEADER_LEN..], b"hello");
    }

    #[test]
    fn payload_roundtrip_at_chunk_boundaries() {
        // Sizes straddling the transmission chunk size; chunking must never
        // change the reassembled payload.
        for n in [0, PACKET_LEN - 1, PACKET_LEN, PACKET_LEN + 1, 2 * PACKET_LEN, 3 * PACKET_LEN] {
            let payload = vec![0xAB_u8; n];
            let frame = encode_payload(&payload).unwrap();
            assert_eq!(frame.len(), HEADER_LEN + n);
            let mut header = [0u8; HEADER_LEN];
            header.copy_from_slice(&frame[..HEADER_LEN]);
            assert_eq!(decode_header(&header).unwrap(), n);
            assert_eq!(&frame[HEADER_LEN..], &payload[..]);
        }
    }

    #[test]
    fn message_roundtrip_at_chunk_boundaries() {
        for n in [0, PACKET_LEN - 1, PACKET_LEN, PACKET_LEN + 1, 2 * PACKET_LEN] {
            let msg = Message::DownloadResponse {
                file_name: "f1.txt".into(),
                digest: [7u8; 32],
                bytes: vec![0x5C; n],
            };
            let frame = encode_frame(&msg).unwrap();
            let (decoded, consumed) = decode_frame(&frame).unwrap();
            assert_eq!(consumed, frame.len());
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn partial_read_need_more() {
        let msg = Message::LeaderCheck { from: addr(9001) };
        let frame = encode_frame(&msg).unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..HEADER_LEN]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_messages_in_one_buffer() {
        let a = Message::LeaderCheck { from: addr(9001) };
        let b = Message::LeaderCheckResponse { is_leader: true };
        let fa = encode_frame(&a).unwrap();
        let fb = encode_frame(&b).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (m1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, fa.len());
        let (m2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, fb.len());
        assert_eq!(m1, a);
        assert_eq!(m2, b);
    }

    #[test]
    fn rejects_garbage_header() {
        let mut frame = encode_payload(b"x").unwrap();
        frame[0] = b'z';
        assert!(matches!(
            decode_frame(&frame),
            Err(FrameDecodeError::BadHeader)
        ));
    }
}
