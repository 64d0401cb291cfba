//! Handshake packet wire format
//!
//! Implements the first packet of a connection:
//! - Frame length (VarInt)
//! - Packet id (VarInt, 0x00)
//! - Protocol version (VarInt)
//! - Host (VarInt byte length + UTF-8)
//! - Port (u16, big endian)
//! - Next state (VarInt: 1 = status, 2 = login, 3 = transfer)
//!
//! Also encodes the login disconnect packet used to reject a connection.

use bytes::{BufMut, BytesMut};

/// Handshake packet id
pub const HANDSHAKE_PACKET_ID: i32 = 0x00;

/// Login-state disconnect packet id
pub const LOGIN_DISCONNECT_PACKET_ID: i32 = 0x00;

/// Largest frame accepted (3-byte VarInt length)
pub const MAX_FRAME_LENGTH: usize = 2_097_151;

const VARINT_MAX_BYTES: usize = 5;

/// Connection state requested by the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Server list ping
    Status = 1,
    /// Player login
    Login = 2,
    /// Transfer from another server
    Transfer = 3,
}

impl TryFrom<i32> for NextState {
    type Error = &'static str;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NextState::Status),
            2 => Ok(NextState::Login),
            3 => Ok(NextState::Transfer),
            _ => Err("invalid next state"),
        }
    }
}

/// Packet decode result
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// Successfully decoded, with the number of bytes consumed
    Ok(T, usize),
    /// Need more data
    NeedMoreData,
    /// Invalid data
    Invalid(&'static str),
}

/// Decoded handshake packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub protocol_version: i32,
    pub host: String,
    pub port: u16,
    pub next_state: NextState,
}

impl HandshakePacket {
    /// Decode one length-prefixed handshake frame.
    ///
    /// `max_host_length` bounds the host string in characters.
    pub fn decode(buf: &[u8], max_host_length: usize) -> DecodeResult<Self> {
        let (frame_len, header_len) = match read_varint(buf) {
            DecodeResult::Ok(len, n) => (len, n),
            DecodeResult::NeedMoreData => return DecodeResult::NeedMoreData,
            DecodeResult::Invalid(e) => return DecodeResult::Invalid(e),
        };
        if frame_len < 0 || frame_len as usize > MAX_FRAME_LENGTH {
            return DecodeResult::Invalid("invalid frame length");
        }
        let total_len = header_len + frame_len as usize;
        if buf.len() < total_len {
            return DecodeResult::NeedMoreData;
        }

        // The frame is complete: anything short from here on is a truncated body
        match decode_body(&buf[header_len..total_len], max_host_length) {
            Ok(packet) => DecodeResult::Ok(packet, total_len),
            Err(e) => DecodeResult::Invalid(e),
        }
    }

    /// Encode as a length-prefixed frame
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut body = BytesMut::with_capacity(self.host.len() + 16);
        write_varint(&mut body, HANDSHAKE_PACKET_ID);
        write_varint(&mut body, self.protocol_version);
        write_string(&mut body, &self.host);
        body.put_u16(self.port);
        write_varint(&mut body, self.next_state as i32);

        write_varint(buf, body.len() as i32);
        buf.extend_from_slice(&body);
    }
}

fn decode_body(body: &[u8], max_host_length: usize) -> Result<HandshakePacket, &'static str> {
    let mut cursor = 0;

    let packet_id = take_varint(body, &mut cursor)?;
    if packet_id != HANDSHAKE_PACKET_ID {
        return Err("unexpected packet id");
    }
    let protocol_version = take_varint(body, &mut cursor)?;

    let host_len = take_varint(body, &mut cursor)?;
    if host_len < 0 || host_len as usize > max_host_length.saturating_mul(3) {
        return Err("host string too long");
    }
    let host_len = host_len as usize;
    let host_bytes = body
        .get(cursor..cursor + host_len)
        .ok_or("truncated handshake")?;
    let host = std::str::from_utf8(host_bytes).map_err(|_| "invalid host encoding")?;
    if host.chars().count() > max_host_length {
        return Err("host string too long");
    }
    cursor += host_len;

    let port_bytes = body.get(cursor..cursor + 2).ok_or("truncated handshake")?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
    cursor += 2;

    let next_state = NextState::try_from(take_varint(body, &mut cursor)?)?;

    if cursor != body.len() {
        return Err("trailing bytes in handshake");
    }

    Ok(HandshakePacket {
        protocol_version,
        host: host.to_string(),
        port,
        next_state,
    })
}

fn take_varint(body: &[u8], cursor: &mut usize) -> Result<i32, &'static str> {
    match read_varint(&body[*cursor..]) {
        DecodeResult::Ok(value, n) => {
            *cursor += n;
            Ok(value)
        }
        DecodeResult::NeedMoreData => Err("truncated handshake"),
        DecodeResult::Invalid(e) => Err(e),
    }
}

/// Read a VarInt (7 bits per byte, little-endian groups, at most 5 bytes)
pub fn read_varint(buf: &[u8]) -> DecodeResult<i32> {
    let mut value: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        let Some(&byte) = buf.get(i) else {
            return DecodeResult::NeedMoreData;
        };
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return DecodeResult::Ok(value as i32, i + 1);
        }
    }
    DecodeResult::Invalid("varint too long")
}

/// Write a VarInt
pub fn write_varint(buf: &mut BytesMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7f == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
}

fn write_string(buf: &mut BytesMut, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

/// Encode a login disconnect packet carrying `message` as a chat component
pub fn encode_login_disconnect(message: &str, buf: &mut BytesMut) {
    let reason = serde_json::json!({ "text": message }).to_string();
    let mut body = BytesMut::with_capacity(reason.len() + 8);
    write_varint(&mut body, LOGIN_DISCONNECT_PACKET_ID);
    write_string(&mut body, &reason);

    write_varint(buf, body.len() as i32);
    buf.extend_from_slice(&body);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HandshakePacket {
        HandshakePacket {
            protocol_version: 767,
            host: "play.example.com\0abc123".to_string(),
            port: 25565,
            next_state: NextState::Login,
        }
    }

    #[test]
    fn test_varint_known_values() {
        let cases: [(i32, &[u8]); 6] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (25565, &[0xdd, 0xc7, 0x01]),
            (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];
        for (value, bytes) in cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(&buf[..], bytes, "encoding {}", value);
            match read_varint(bytes) {
                DecodeResult::Ok(decoded, n) => {
                    assert_eq!(decoded, value);
                    assert_eq!(n, bytes.len());
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_varint_too_long() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(matches!(read_varint(&bytes), DecodeResult::Invalid(_)));
    }

    #[test]
    fn test_decode_encoded_packet() {
        let packet = sample();
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);

        match HandshakePacket::decode(&buf, 32767) {
            DecodeResult::Ok(decoded, n) => {
                assert_eq!(decoded, packet);
                assert_eq!(n, buf.len());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_needs_more_data() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        assert!(matches!(
            HandshakePacket::decode(&buf[..buf.len() - 1], 32767),
            DecodeResult::NeedMoreData
        ));
        assert!(matches!(
            HandshakePacket::decode(&[], 32767),
            DecodeResult::NeedMoreData
        ));
    }

    #[test]
    fn test_decode_leaves_following_bytes() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        let frame_len = buf.len();
        buf.extend_from_slice(&[0x01, 0x00]);
        assert!(matches!(
            HandshakePacket::decode(&buf, 32767),
            DecodeResult::Ok(_, n) if n == frame_len
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_packet_id() {
        let mut body = BytesMut::new();
        write_varint(&mut body, 0x01);
        let mut buf = BytesMut::new();
        write_varint(&mut buf, body.len() as i32);
        buf.extend_from_slice(&body);
        assert!(matches!(
            HandshakePacket::decode(&buf, 32767),
            DecodeResult::Invalid("unexpected packet id")
        ));
    }

    #[test]
    fn test_decode_rejects_long_host() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf);
        assert!(matches!(
            HandshakePacket::decode(&buf, 8),
            DecodeResult::Invalid("host string too long")
        ));
    }

    #[test]
    fn test_decode_rejects_bad_next_state() {
        let mut packet_buf = BytesMut::new();
        let mut body = BytesMut::new();
        write_varint(&mut body, HANDSHAKE_PACKET_ID);
        write_varint(&mut body, 767);
        write_string(&mut body, "play.example.com");
        body.put_u16(25565);
        write_varint(&mut body, 9);
        write_varint(&mut packet_buf, body.len() as i32);
        packet_buf.extend_from_slice(&body);

        assert!(matches!(
            HandshakePacket::decode(&packet_buf, 32767),
            DecodeResult::Invalid("invalid next state")
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let mut body = BytesMut::new();
        write_varint(&mut body, HANDSHAKE_PACKET_ID);
        write_varint(&mut body, 767);
        write_varint(&mut body, 10);
        body.extend_from_slice(b"abc");
        let mut buf = BytesMut::new();
        write_varint(&mut buf, body.len() as i32);
        buf.extend_from_slice(&body);
        assert!(matches!(
            HandshakePacket::decode(&buf, 32767),
            DecodeResult::Invalid("truncated handshake")
        ));
    }

    #[test]
    fn test_encode_login_disconnect() {
        let mut buf = BytesMut::new();
        encode_login_disconnect("Denied", &mut buf);

        let DecodeResult::Ok(frame_len, header) = read_varint(&buf) else {
            panic!("bad frame length");
        };
        assert_eq!(buf.len(), header + frame_len as usize);
        assert_eq!(buf[header], LOGIN_DISCONNECT_PACKET_ID as u8);

        let json_start = header + 2;
        let reason: serde_json::Value = serde_json::from_slice(&buf[json_start..]).unwrap();
        assert_eq!(reason["text"], "Denied");
    }
}
