//! Host wire protocol: the framing used on the virtio serial channel to the
//! host's remote-desktop client.
//!
//! Frame: `{u32 protocol, u32 type, u32 opaque, u32 size}` (little-endian)
//! followed by `size` bytes of payload (spec §6). [`HostHeader`] models the
//! fixed part; [`HostMessageType`] the closed set of known types;
//! [`HostMessage`] a parsed, native-byte-order payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::capabilities::CapabilitySet;
use super::error::{ProtocolError, Result};

/// The only protocol version this daemon accepts.
pub const PROTOCOL_VERSION: u32 = 1;

/// Fixed 16-byte frame header preceding every host-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostHeader {
    pub protocol: u32,
    pub message_type: u32,
    pub opaque: u32,
    pub size: u32,
}

impl HostHeader {
    /// Size of the header on the wire.
    pub const WIRE_SIZE: usize = 16;

    /// Parse a header out of its little-endian wire bytes.
    pub fn from_le_bytes(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut b = &buf[..];
        Self {
            protocol: b.get_u32_le(),
            message_type: b.get_u32_le(),
            opaque: b.get_u32_le(),
            size: b.get_u32_le(),
        }
    }

    /// Serialize as little-endian wire bytes.
    pub fn to_le_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = BytesMut::with_capacity(Self::WIRE_SIZE);
        out.put_u32_le(self.protocol);
        out.put_u32_le(self.message_type);
        out.put_u32_le(self.opaque);
        out.put_u32_le(self.size);
        out.as_ref().try_into().expect("fixed-size header")
    }
}

/// The closed set of message types carried on the host channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HostMessageType {
    MouseState = 1,
    MonitorsConfig = 2,
    Reply = 3,
    DisplayConfig = 4,
    AnnounceCapabilities = 5,
    ClipboardGrab = 6,
    ClipboardRequest = 7,
    ClipboardData = 8,
    ClipboardRelease = 9,
    FileXferStart = 10,
    FileXferStatus = 11,
    FileXferData = 12,
    ClientDisconnected = 13,
    MaxClipboard = 14,
    AudioVolumeSync = 15,
}

impl HostMessageType {
    /// One past the highest valid type value; type 0 and anything at or
    /// beyond this is rejected as unknown (spec §4.1).
    pub const TABLE_SIZE: u32 = 16;

    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::MouseState,
            2 => Self::MonitorsConfig,
            3 => Self::Reply,
            4 => Self::DisplayConfig,
            5 => Self::AnnounceCapabilities,
            6 => Self::ClipboardGrab,
            7 => Self::ClipboardRequest,
            8 => Self::ClipboardData,
            9 => Self::ClipboardRelease,
            10 => Self::FileXferStart,
            11 => Self::FileXferStatus,
            12 => Self::FileXferData,
            13 => Self::ClientDisconnected,
            14 => Self::MaxClipboard,
            15 => Self::AudioVolumeSync,
            _ => return None,
        })
    }

    /// Is this one of the four clipboard-family types eligible for the
    /// 4-byte selection prefix?
    pub fn is_clipboard_family(self) -> bool {
        matches!(
            self,
            Self::ClipboardGrab | Self::ClipboardRequest | Self::ClipboardData | Self::ClipboardRelease
        )
    }

    /// Minimum payload size (before any selection-prefix adjustment), and
    /// whether that size must be matched exactly.
    fn size_rule(self) -> (usize, bool) {
        match self {
            Self::MouseState => (16, true),
            Self::MonitorsConfig => (8, false),
            Self::Reply => (8, true),
            Self::DisplayConfig => (12, true),
            Self::AnnounceCapabilities => (4, false),
            Self::ClipboardGrab => (4, false),
            Self::ClipboardRequest => (4, true),
            Self::ClipboardData => (4, false),
            Self::ClipboardRelease => (0, true),
            Self::FileXferStart => (4, false),
            Self::FileXferStatus => (8, true),
            Self::FileXferData => (12, false),
            Self::ClientDisconnected => (0, true),
            Self::MaxClipboard => (4, true),
            Self::AudioVolumeSync => (8, false),
        }
    }
}

/// A per-monitor rectangle within a `MonitorsConfig` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorRect {
    pub depth: u32,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

/// A fully parsed, native-byte-order host message.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    MouseState {
        x: i32,
        y: i32,
        buttons: u32,
        display_id: u32,
    },
    MonitorsConfig {
        flags: u32,
        monitors: Vec<MonitorRect>,
    },
    Reply {
        of_type: u32,
        error: u32,
    },
    DisplayConfig {
        console: u32,
        width: u32,
        height: u32,
    },
    AnnounceCapabilities {
        request: bool,
        caps: CapabilitySet,
    },
    ClipboardGrab {
        selection: u8,
        types: Vec<u32>,
    },
    ClipboardRequest {
        selection: u8,
        format: u32,
    },
    ClipboardData {
        selection: u8,
        format: u32,
        data: Bytes,
    },
    ClipboardRelease {
        selection: u8,
    },
    FileXferStart {
        id: u32,
        metadata: Bytes,
    },
    FileXferStatus {
        id: u32,
        result: u32,
    },
    FileXferData {
        id: u32,
        data: Bytes,
    },
    ClientDisconnected,
    MaxClipboard {
        max_bytes: i32,
    },
    AudioVolumeSync {
        mute: bool,
        volume: Vec<u16>,
    },
}

/// Reply status codes used in `VD_AGENT_REPLY`-equivalent messages.
pub mod reply {
    pub const SUCCESS: u32 = 0;
    pub const ERROR: u32 = 1;
}

/// Validate a header + declared size against the per-type table, returning
/// the type on success. `selection_cap` is whether `ClipboardSelection` is
/// currently negotiated (adds 4 bytes to the minimum for clipboard-family
/// types, per spec §4.1).
pub fn validate_header(header: &HostHeader, selection_cap: bool) -> Result<HostMessageType> {
    if header.protocol != PROTOCOL_VERSION {
        return Err(ProtocolError::BadVersion(header.protocol));
    }
    if header.message_type == 0 || header.message_type >= HostMessageType::TABLE_SIZE {
        return Err(ProtocolError::UnknownType(header.message_type));
    }
    let message_type = HostMessageType::from_u32(header.message_type)
        .ok_or(ProtocolError::UnknownType(header.message_type))?;

    let (mut min, exact) = message_type.size_rule();
    if selection_cap && message_type.is_clipboard_family() {
        min += 4;
    }
    let got = header.size as usize;
    if exact {
        if got != min {
            return Err(ProtocolError::PayloadSizeMismatch {
                message_type: header.message_type,
                got,
                want: min,
            });
        }
    } else if got < min {
        return Err(ProtocolError::PayloadTooSmall {
            message_type: header.message_type,
            got,
            need: min,
        });
    }
    Ok(message_type)
}

/// Parse a validated payload (already size-checked by [`validate_header`])
/// into a [`HostMessage`], performing the little-endian-to-native swaps
/// described in spec §4.1.
pub fn decode_payload(
    message_type: HostMessageType,
    selection_cap: bool,
    mut payload: Bytes,
) -> Result<HostMessage> {
    let selection = if selection_cap && message_type.is_clipboard_family() {
        let sel = payload.get_u8();
        payload.advance(3); // padding
        sel
    } else {
        0
    };

    Ok(match message_type {
        HostMessageType::MouseState => HostMessage::MouseState {
            x: payload.get_i32_le(),
            y: payload.get_i32_le(),
            buttons: payload.get_u32_le(),
            display_id: payload.get_u32_le(),
        },
        HostMessageType::MonitorsConfig => {
            let num = payload.get_u32_le();
            let flags = payload.get_u32_le();
            let mut monitors = Vec::with_capacity(num as usize);
            for _ in 0..num {
                monitors.push(MonitorRect {
                    depth: payload.get_u32_le(),
                    width: payload.get_u32_le(),
                    height: payload.get_u32_le(),
                    x: payload.get_i32_le(),
                    y: payload.get_i32_le(),
                });
            }
            HostMessage::MonitorsConfig { flags, monitors }
        }
        HostMessageType::Reply => HostMessage::Reply {
            of_type: payload.get_u32_le(),
            error: payload.get_u32_le(),
        },
        HostMessageType::DisplayConfig => HostMessage::DisplayConfig {
            console: payload.get_u32_le(),
            width: payload.get_u32_le(),
            height: payload.get_u32_le(),
        },
        HostMessageType::AnnounceCapabilities => {
            let request = payload.get_u32_le() != 0;
            let mut words = Vec::new();
            while payload.remaining() >= 4 {
                words.push(payload.get_u32_le());
            }
            HostMessage::AnnounceCapabilities {
                request,
                caps: CapabilitySet::from_words(words),
            }
        }
        HostMessageType::ClipboardGrab => {
            let mut types = Vec::new();
            while payload.remaining() >= 4 {
                types.push(payload.get_u32_le());
            }
            HostMessage::ClipboardGrab { selection, types }
        }
        HostMessageType::ClipboardRequest => HostMessage::ClipboardRequest {
            selection,
            format: payload.get_u32_le(),
        },
        HostMessageType::ClipboardData => {
            let format = payload.get_u32_le();
            HostMessage::ClipboardData {
                selection,
                format,
                data: payload,
            }
        }
        HostMessageType::ClipboardRelease => HostMessage::ClipboardRelease { selection },
        HostMessageType::FileXferStart => {
            let id = payload.get_u32_le();
            HostMessage::FileXferStart { id, metadata: payload }
        }
        HostMessageType::FileXferStatus => HostMessage::FileXferStatus {
            id: payload.get_u32_le(),
            result: payload.get_u32_le(),
        },
        HostMessageType::FileXferData => {
            let id = payload.get_u32_le();
            let _size = payload.get_u64_le();
            HostMessage::FileXferData { id, data: payload }
        }
        HostMessageType::ClientDisconnected => HostMessage::ClientDisconnected,
        HostMessageType::MaxClipboard => HostMessage::MaxClipboard {
            max_bytes: payload.get_i32_le(),
        },
        HostMessageType::AudioVolumeSync => {
            let mute = payload.get_u32_le() != 0;
            let nchannels = payload.get_u16_le();
            payload.advance(2); // padding
            let mut volume = Vec::with_capacity(nchannels as usize);
            for _ in 0..nchannels {
                volume.push(payload.get_u16_le());
            }
            HostMessage::AudioVolumeSync { mute, volume }
        }
    })
}

/// Encode an outbound host message into `{header, payload}` little-endian
/// wire bytes, mirroring [`decode_payload`]'s rules (spec §4.1 "mirror
/// function").
pub fn encode_message(message_type: HostMessageType, opaque: u32, body: &HostMessage) -> BytesMut {
    encode_message_with_caps(message_type, opaque, body, false)
}

/// Like [`encode_message`], but adds the 4-byte selection prefix to
/// clipboard-family messages when `selection_cap` (the negotiated
/// `CLIPBOARD_SELECTION` capability) is set, mirroring [`decode_payload`].
pub fn encode_message_with_caps(
    message_type: HostMessageType,
    opaque: u32,
    body: &HostMessage,
    selection_cap: bool,
) -> BytesMut {
    let mut payload = BytesMut::new();
    let selection_prefix = |payload: &mut BytesMut, selection: u8| {
        if selection_cap {
            payload.put_u8(selection);
            payload.put_bytes(0, 3);
        }
    };

    match body {
        HostMessage::Reply { of_type, error } => {
            payload.put_u32_le(*of_type);
            payload.put_u32_le(*error);
        }
        HostMessage::AnnounceCapabilities { request, caps } => {
            payload.put_u32_le(*request as u32);
            for word in caps.as_words() {
                payload.put_u32_le(*word);
            }
        }
        HostMessage::ClipboardGrab { selection, types } => {
            selection_prefix(&mut payload, *selection);
            for t in types {
                payload.put_u32_le(*t);
            }
        }
        HostMessage::ClipboardRequest { selection, format } => {
            selection_prefix(&mut payload, *selection);
            payload.put_u32_le(*format);
        }
        HostMessage::ClipboardData { selection, format, data } => {
            selection_prefix(&mut payload, *selection);
            payload.put_u32_le(*format);
            payload.extend_from_slice(data);
        }
        HostMessage::ClipboardRelease { selection } => {
            selection_prefix(&mut payload, *selection);
        }
        HostMessage::FileXferStart { id, metadata } => {
            payload.put_u32_le(*id);
            payload.extend_from_slice(metadata);
        }
        HostMessage::FileXferStatus { id, result } => {
            payload.put_u32_le(*id);
            payload.put_u32_le(*result);
        }
        HostMessage::FileXferData { id, data } => {
            payload.put_u32_le(*id);
            payload.put_u64_le(data.len() as u64);
            payload.extend_from_slice(data);
        }
        HostMessage::AudioVolumeSync { mute, volume } => {
            payload.put_u32_le(*mute as u32);
            payload.put_u16_le(volume.len() as u16);
            payload.put_u16_le(0); // padding
            for v in volume {
                payload.put_u16_le(*v);
            }
        }
        HostMessage::ClientDisconnected => {}
        other => panic!("encode_message: unsupported outbound variant {other:?}"),
    }

    let header = HostHeader {
        protocol: PROTOCOL_VERSION,
        message_type: message_type as u32,
        opaque,
        size: payload.len() as u32,
    };
    let mut out = BytesMut::with_capacity(HostHeader::WIRE_SIZE + payload.len());
    out.extend_from_slice(&header.to_le_bytes());
    out.unsplit(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(message_type: u32, size: u32) -> HostHeader {
        HostHeader {
            protocol: PROTOCOL_VERSION,
            message_type,
            opaque: 0,
            size,
        }
    }

    #[test]
    fn rejects_bad_version() {
        let mut h = header(HostMessageType::MouseState as u32, 16);
        h.protocol = 99;
        assert_eq!(validate_header(&h, false), Err(ProtocolError::BadVersion(99)));
    }

    #[test]
    fn rejects_zero_and_out_of_range_type() {
        assert!(matches!(
            validate_header(&header(0, 0), false),
            Err(ProtocolError::UnknownType(0))
        ));
        assert!(matches!(
            validate_header(&header(HostMessageType::TABLE_SIZE, 0), false),
            Err(ProtocolError::UnknownType(_))
        ));
    }

    #[test]
    fn one_byte_short_fixed_shape_is_rejected() {
        let h = header(HostMessageType::MouseState as u32, 15);
        assert!(matches!(
            validate_header(&h, false),
            Err(ProtocolError::PayloadSizeMismatch { .. })
        ));
    }

    #[test]
    fn selection_capability_adds_four_bytes_to_clipboard_minimum() {
        let h = header(HostMessageType::ClipboardRelease as u32, 0);
        assert!(validate_header(&h, false).is_ok());
        assert!(matches!(
            validate_header(&h, true),
            Err(ProtocolError::PayloadSizeMismatch { .. })
        ));
        let h = header(HostMessageType::ClipboardRelease as u32, 4);
        assert!(validate_header(&h, true).is_ok());
    }

    #[test]
    fn clipboard_grab_round_trips_through_decode() {
        let mut payload = BytesMut::new();
        payload.put_u8(1);
        payload.put_bytes(0, 3);
        payload.put_u32_le(7);
        let msg = decode_payload(HostMessageType::ClipboardGrab, true, payload.freeze()).unwrap();
        assert_eq!(
            msg,
            HostMessage::ClipboardGrab {
                selection: 1,
                types: vec![7],
            }
        );
    }

    #[test]
    fn header_byte_round_trip() {
        let h = header(HostMessageType::Reply as u32, 8);
        let bytes = h.to_le_bytes();
        assert_eq!(HostHeader::from_le_bytes(&bytes), h);
    }
}
