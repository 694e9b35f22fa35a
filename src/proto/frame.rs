//! HTTP/2 frame codec (RFC 7540 §4), the byte-level layer under the engine.
//!
//! Only the frame types the engine acts on are decoded into variants; frame
//! types it doesn't need (PRIORITY, PUSH_PROMISE) are recognized just well
//! enough to skip their bytes, per spec.md §9.

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const FRAME_HEADER_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl Kind {
    fn from_u8(b: u8) -> Kind {
        match b {
            0x0 => Kind::Data,
            0x1 => Kind::Headers,
            0x2 => Kind::Priority,
            0x3 => Kind::RstStream,
            0x4 => Kind::Settings,
            0x5 => Kind::PushPromise,
            0x6 => Kind::Ping,
            0x7 => Kind::GoAway,
            0x8 => Kind::WindowUpdate,
            0x9 => Kind::Continuation,
            other => Kind::Unknown(other),
        }
    }
}

pub mod flag {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

#[derive(Debug, Clone, Copy)]
struct Head {
    length: usize,
    kind: Kind,
    flags: u8,
    stream_id: u32,
}

fn parse_head(buf: &[u8]) -> Head {
    debug_assert!(buf.len() >= FRAME_HEADER_LEN);
    let length = (u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2])) as usize;
    let kind = Kind::from_u8(buf[3]);
    let flags = buf[4];
    let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
    Head {
        length,
        kind,
        flags,
        stream_id,
    }
}

fn put_head(dst: &mut BytesMut, length: u32, kind: u8, flags: u8, stream_id: u32) {
    dst.put_u8((length >> 16) as u8);
    dst.put_u8((length >> 8) as u8);
    dst.put_u8(length as u8);
    dst.put_u8(kind);
    dst.put_u8(flags);
    dst.put_u32(stream_id & 0x7fff_ffff);
}

/// A decoded frame. `end_headers` on [`Frame::Headers`] reports whether the
/// frame (after merging any CONTINUATION frames) completed the header
/// block.
#[derive(Debug)]
pub enum Frame {
    Data {
        stream_id: u32,
        end_stream: bool,
        data: Bytes,
        /// Full frame payload length including any padding (RFC 7540
        /// §6.9.1): what the connection-level flow-control window is
        /// actually debited, as opposed to `data.len()`.
        flow_controlled_length: u32,
    },
    Headers {
        stream_id: u32,
        end_stream: bool,
        end_headers: bool,
        header_block: Bytes,
    },
    RstStream {
        stream_id: u32,
        error_code: u32,
    },
    Settings {
        ack: bool,
        params: Vec<(u16, u32)>,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        error_code: u32,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    /// PRIORITY, PUSH_PROMISE, or any frame type we don't recognize: the
    /// bytes were consumed, nothing else to do.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Short,
    InvalidPayloadLength,
    PartialSettingLength,
    BadPing,
}

/// Strips padding (PADDED flag) from a DATA/HEADERS payload, returning the
/// unpadded slice.
fn strip_padding(flags: u8, mut payload: &[u8]) -> Result<&[u8], FrameError> {
    if flags & flag::PADDED != 0 {
        if payload.is_empty() {
            return Err(FrameError::InvalidPayloadLength);
        }
        let pad_len = payload[0] as usize;
        payload = &payload[1..];
        if pad_len > payload.len() {
            return Err(FrameError::InvalidPayloadLength);
        }
        payload = &payload[..payload.len() - pad_len];
    }
    Ok(payload)
}

/// Strips the 5-byte stream-dependency/weight prefix (PRIORITY flag) a
/// HEADERS frame may carry before the header block.
fn strip_priority(flags: u8, payload: &[u8]) -> Result<&[u8], FrameError> {
    if flags & flag::PRIORITY != 0 {
        if payload.len() < 5 {
            return Err(FrameError::InvalidPayloadLength);
        }
        Ok(&payload[5..])
    } else {
        Ok(payload)
    }
}

/// Attempts to decode one frame from the front of `buf`. Returns `Ok(None)`
/// if `buf` doesn't yet hold a complete frame; the caller should read more
/// bytes and retry. On `Ok(Some(frame))`, the consumed bytes are advanced
/// out of `buf`.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let head = parse_head(&buf[..FRAME_HEADER_LEN]);
    if buf.len() < FRAME_HEADER_LEN + head.length {
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_LEN);
    let payload = buf.split_to(head.length).freeze();

    let frame = match head.kind {
        Kind::Data => {
            let data = strip_padding(head.flags, &payload)?;
            Frame::Data {
                stream_id: head.stream_id,
                end_stream: head.flags & flag::END_STREAM != 0,
                data: payload.slice_ref(data),
                flow_controlled_length: head.length as u32,
            }
        }
        Kind::Headers => {
            let unpadded = strip_padding(head.flags, &payload)?;
            let header_block = strip_priority(head.flags, unpadded)?;
            Frame::Headers {
                stream_id: head.stream_id,
                end_stream: head.flags & flag::END_STREAM != 0,
                end_headers: head.flags & flag::END_HEADERS != 0,
                header_block: payload.slice_ref(header_block),
            }
        }
        Kind::Continuation => Frame::Headers {
            stream_id: head.stream_id,
            // A CONTINUATION frame carries no END_STREAM flag of its own;
            // `Engine::feed` remembers the originating HEADERS frame's flag
            // while the block is being assembled.
            end_stream: false,
            end_headers: head.flags & flag::END_HEADERS != 0,
            header_block: payload,
        },
        Kind::RstStream => {
            if payload.len() != 4 {
                return Err(FrameError::InvalidPayloadLength);
            }
            Frame::RstStream {
                stream_id: head.stream_id,
                error_code: u32::from_be_bytes(payload[..4].try_into().unwrap()),
            }
        }
        Kind::Settings => {
            if head.flags & flag::ACK != 0 {
                if !payload.is_empty() {
                    return Err(FrameError::InvalidPayloadLength);
                }
                Frame::Settings {
                    ack: true,
                    params: Vec::new(),
                }
            } else {
                if payload.len() % 6 != 0 {
                    return Err(FrameError::PartialSettingLength);
                }
                let mut params = Vec::with_capacity(payload.len() / 6);
                let mut chunk = &payload[..];
                while !chunk.is_empty() {
                    let id = u16::from_be_bytes([chunk[0], chunk[1]]);
                    let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
                    params.push((id, value));
                    chunk = &chunk[6..];
                }
                Frame::Settings { ack: false, params }
            }
        }
        Kind::Ping => {
            if payload.len() != 8 {
                return Err(FrameError::BadPing);
            }
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&payload);
            Frame::Ping {
                ack: head.flags & flag::ACK != 0,
                payload: arr,
            }
        }
        Kind::GoAway => {
            if payload.len() < 8 {
                return Err(FrameError::InvalidPayloadLength);
            }
            let last_stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
            let error_code = u32::from_be_bytes(payload[4..8].try_into().unwrap());
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data: payload.slice(8..),
            }
        }
        Kind::WindowUpdate => {
            if payload.len() != 4 {
                return Err(FrameError::InvalidPayloadLength);
            }
            let increment = u32::from_be_bytes(payload[..4].try_into().unwrap()) & 0x7fff_ffff;
            Frame::WindowUpdate {
                stream_id: head.stream_id,
                increment,
            }
        }
        Kind::Priority | Kind::PushPromise | Kind::Unknown(_) => Frame::Ignored,
    };

    Ok(Some(frame))
}

/// The one-time client connection preface (RFC 7540 §3.5), sent before the
/// first SETTINGS frame.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub fn encode_settings(dst: &mut BytesMut, ack: bool, params: &[(u16, u32)]) {
    if ack {
        put_head(dst, 0, 0x4, flag::ACK, 0);
        return;
    }
    put_head(dst, (params.len() * 6) as u32, 0x4, 0, 0);
    for (id, value) in params {
        dst.put_u16(*id);
        dst.put_u32(*value);
    }
}

pub fn encode_window_update(dst: &mut BytesMut, stream_id: u32, increment: u32) {
    put_head(dst, 4, 0x8, 0, stream_id);
    dst.put_u32(increment & 0x7fff_ffff);
}

pub fn encode_headers(dst: &mut BytesMut, stream_id: u32, end_stream: bool, header_block: &[u8]) {
    let flags = flag::END_HEADERS | if end_stream { flag::END_STREAM } else { 0 };
    put_head(dst, header_block.len() as u32, 0x1, flags, stream_id);
    dst.put_slice(header_block);
}

pub fn encode_data(dst: &mut BytesMut, stream_id: u32, end_stream: bool, data: &[u8]) {
    let flags = if end_stream { flag::END_STREAM } else { 0 };
    put_head(dst, data.len() as u32, 0x0, flags, stream_id);
    dst.put_slice(data);
}

pub fn encode_rst_stream(dst: &mut BytesMut, stream_id: u32, error_code: u32) {
    put_head(dst, 4, 0x3, 0, stream_id);
    dst.put_u32(error_code);
}

pub fn encode_ping(dst: &mut BytesMut, ack: bool, payload: &[u8; 8]) {
    put_head(dst, 8, 0x6, if ack { flag::ACK } else { 0 }, 0);
    dst.put_slice(payload);
}
