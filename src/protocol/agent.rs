//! Agent wire protocol: the framing used on the local stream socket to each
//! per-session user agent.
//!
//! Frame: `{u32 type, u32 arg1, u32 arg2, u32 size}`, **native** byte order
//! (both ends run on the same host), followed by `size` payload bytes
//! (spec §6).

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Fixed 16-byte frame header preceding every agent-socket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentHeader {
    pub message_type: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub size: u32,
}

impl AgentHeader {
    pub const WIRE_SIZE: usize = 16;

    pub fn from_native_bytes(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut b = &buf[..];
        Self {
            message_type: b.get_u32_ne(),
            arg1: b.get_u32_ne(),
            arg2: b.get_u32_ne(),
            size: b.get_u32_ne(),
        }
    }

    pub fn to_native_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = BytesMut::with_capacity(Self::WIRE_SIZE);
        out.put_u32_ne(self.message_type);
        out.put_u32_ne(self.arg1);
        out.put_u32_ne(self.arg2);
        out.put_u32_ne(self.size);
        out.as_ref().try_into().expect("fixed-size header")
    }
}

/// One rectangle in a guest-resolution screen list: an id plus position and
/// size (spec §3, `Agent connection record`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl ScreenRect {
    /// Size of one encoded entry; `GUEST_XORG_RESOLUTION` payloads must be an
    /// integer multiple of this (spec §4.4).
    pub const WIRE_SIZE: usize = 20;

    fn decode(buf: &mut Bytes) -> Self {
        Self {
            id: buf.get_u32_ne(),
            width: buf.get_u32_ne(),
            height: buf.get_u32_ne(),
            x: buf.get_i32_ne(),
            y: buf.get_i32_ne(),
        }
    }

    fn encode(self, out: &mut BytesMut) {
        out.put_u32_ne(self.id);
        out.put_u32_ne(self.width);
        out.put_u32_ne(self.height);
        out.put_i32_ne(self.x);
        out.put_i32_ne(self.y);
    }
}

/// The closed set of message types carried on the agent socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AgentMessageType {
    Version = 1,
    GuestXorgResolution = 2,
    MonitorsConfig = 3,
    ClipboardGrab = 4,
    ClipboardRequest = 5,
    ClipboardData = 6,
    ClipboardRelease = 7,
    FileXferStart = 8,
    FileXferStatus = 9,
    FileXferData = 10,
    FileXferDisable = 11,
    AudioVolumeSync = 12,
    ClientDisconnected = 13,
}

impl AgentMessageType {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::Version,
            2 => Self::GuestXorgResolution,
            3 => Self::MonitorsConfig,
            4 => Self::ClipboardGrab,
            5 => Self::ClipboardRequest,
            6 => Self::ClipboardData,
            7 => Self::ClipboardRelease,
            8 => Self::FileXferStart,
            9 => Self::FileXferStatus,
            10 => Self::FileXferData,
            11 => Self::FileXferDisable,
            12 => Self::AudioVolumeSync,
            13 => Self::ClientDisconnected,
            _ => return None,
        })
    }
}

/// Protocol version advertised in the daemon's first message to a freshly
/// accepted agent connection.
pub const AGENT_PROTOCOL_VERSION: u32 = 1;

/// A fully parsed agent-socket message, paired with its header's `arg1`/
/// `arg2` where the wire format stores data there rather than in the body.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    Version(u32),
    GuestXorgResolution { width: u32, height: u32, screens: Vec<ScreenRect> },
    MonitorsConfig(Bytes),
    ClipboardGrab { selection: u32, types: Bytes },
    ClipboardRequest { selection: u32, format: u32 },
    ClipboardData { selection: u32, format: u32, data: Bytes },
    ClipboardRelease { selection: u32 },
    FileXferStart { id: u32, metadata: Bytes },
    FileXferStatus { id: u32, result: u32 },
    FileXferData { id: u32, data: Bytes },
    FileXferDisable,
    AudioVolumeSync(Bytes),
    ClientDisconnected,
}

/// Decode a message body given its header. Unlike the host protocol, the
/// agent framing carries most scalar fields in the header itself; malformed
/// bodies (wrong multiple for resolution entries) are reported to the
/// caller, which tears down the offending connection (spec §4.4, §7).
pub fn decode_body(header: AgentHeader, mut body: Bytes) -> Result<AgentMessage, BodyError> {
    let message_type = AgentMessageType::from_u32(header.message_type)
        .ok_or(BodyError::UnknownType(header.message_type))?;

    Ok(match message_type {
        AgentMessageType::Version => AgentMessage::Version(header.arg1),
        AgentMessageType::GuestXorgResolution => {
            if body.len() % ScreenRect::WIRE_SIZE != 0 {
                return Err(BodyError::NotEntryMultiple {
                    got: body.len(),
                    entry: ScreenRect::WIRE_SIZE,
                });
            }
            let mut screens = Vec::with_capacity(body.len() / ScreenRect::WIRE_SIZE);
            while body.has_remaining() {
                screens.push(ScreenRect::decode(&mut body));
            }
            AgentMessage::GuestXorgResolution {
                width: header.arg1,
                height: header.arg2,
                screens,
            }
        }
        AgentMessageType::MonitorsConfig => AgentMessage::MonitorsConfig(body),
        AgentMessageType::ClipboardGrab => AgentMessage::ClipboardGrab {
            selection: header.arg1,
            types: body,
        },
        AgentMessageType::ClipboardRequest => AgentMessage::ClipboardRequest {
            selection: header.arg1,
            format: header.arg2,
        },
        AgentMessageType::ClipboardData => AgentMessage::ClipboardData {
            selection: header.arg1,
            format: header.arg2,
            data: body,
        },
        AgentMessageType::ClipboardRelease => AgentMessage::ClipboardRelease { selection: header.arg1 },
        AgentMessageType::FileXferStart => AgentMessage::FileXferStart {
            id: header.arg1,
            metadata: body,
        },
        AgentMessageType::FileXferStatus => AgentMessage::FileXferStatus {
            id: header.arg1,
            result: header.arg2,
        },
        AgentMessageType::FileXferData => AgentMessage::FileXferData {
            id: header.arg1,
            data: body,
        },
        AgentMessageType::FileXferDisable => AgentMessage::FileXferDisable,
        AgentMessageType::AudioVolumeSync => AgentMessage::AudioVolumeSync(body),
        AgentMessageType::ClientDisconnected => AgentMessage::ClientDisconnected,
    })
}

/// Error decoding an agent-socket message body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("unknown agent message type: {0}")]
    UnknownType(u32),
    #[error("payload size {got} is not a multiple of entry size {entry}")]
    NotEntryMultiple { got: usize, entry: usize },
}

/// Encode an outbound agent message as `{header, body}` native-order bytes.
pub fn encode_message(message_type: AgentMessageType, arg1: u32, arg2: u32, body: &[u8]) -> BytesMut {
    let header = AgentHeader {
        message_type: message_type as u32,
        arg1,
        arg2,
        size: body.len() as u32,
    };
    let mut out = BytesMut::with_capacity(AgentHeader::WIRE_SIZE + body.len());
    out.extend_from_slice(&header.to_native_bytes());
    out.extend_from_slice(body);
    out
}

/// Encode the screen list back to bytes, for tests and loopback transports.
pub fn encode_screens(screens: &[ScreenRect]) -> BytesMut {
    let mut out = BytesMut::with_capacity(screens.len() * ScreenRect::WIRE_SIZE);
    for screen in screens {
        screen.encode(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_native_bytes() {
        let h = AgentHeader {
            message_type: AgentMessageType::Version as u32,
            arg1: 1,
            arg2: 0,
            size: 0,
        };
        assert_eq!(AgentHeader::from_native_bytes(&h.to_native_bytes()), h);
    }

    #[test]
    fn resolution_with_legacy_zero_args_decodes_with_empty_screens() {
        let header = AgentHeader {
            message_type: AgentMessageType::GuestXorgResolution as u32,
            arg1: 0,
            arg2: 0,
            size: 0,
        };
        let msg = decode_body(header, Bytes::new()).unwrap();
        assert_eq!(
            msg,
            AgentMessage::GuestXorgResolution {
                width: 0,
                height: 0,
                screens: vec![],
            }
        );
    }

    #[test]
    fn resolution_with_misaligned_payload_is_rejected() {
        let header = AgentHeader {
            message_type: AgentMessageType::GuestXorgResolution as u32,
            arg1: 1024,
            arg2: 768,
            size: 7,
        };
        let body = Bytes::from(vec![0u8; 7]);
        assert!(matches!(
            decode_body(header, body),
            Err(BodyError::NotEntryMultiple { got: 7, entry: 20 })
        ));
    }

    #[test]
    fn screen_list_round_trips() {
        let screens = vec![ScreenRect {
            id: 0,
            width: 1024,
            height: 768,
            x: 0,
            y: 0,
        }];
        let bytes = encode_screens(&screens).freeze();
        let header = AgentHeader {
            message_type: AgentMessageType::GuestXorgResolution as u32,
            arg1: 1024,
            arg2: 768,
            size: bytes.len() as u32,
        };
        let msg = decode_body(header, bytes).unwrap();
        assert_eq!(
            msg,
            AgentMessage::GuestXorgResolution {
                width: 1024,
                height: 768,
                screens,
            }
        );
    }
}
