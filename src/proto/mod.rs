//! The sans-I/O HTTP/2 engine: a state machine that turns inbound bytes into
//! [`Event`]s and queues outbound bytes for a caller-owned socket to flush.
//! No task in this module ever touches a `TcpStream` directly — see
//! `src/connection/reader.rs` and `src/connection/writer.rs` for the tasks
//! that drive it against a real socket.

pub mod frame;
pub mod hpack;

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use frame::{Frame, FrameError};

/// The value this crate advertises for `SETTINGS_INITIAL_WINDOW_SIZE` and
/// uses as its own per-response cap (spec.md §4.C, §4.D): a response larger
/// than this is rejected as [`crate::Error::ResponseTooLarge`] rather than
/// buffered without bound.
pub const MAX_RESPONSE_SIZE: u32 = 65536;

/// Connection-level inbound window this crate maintains via an immediate
/// WINDOW_UPDATE after the initial SETTINGS, per spec.md §4.C.
pub const CONNECTION_WINDOW_SIZE: u32 = 1 << 24;

/// Outbound-window threshold below which the connection reports `blocked`
/// (spec.md §6).
pub const REQUIRED_FREE_SPACE: i64 = 6000;

/// RFC 7540 §6.5.2 default, assumed until the peer's first SETTINGS frame
/// says otherwise.
const DEFAULT_REMOTE_MAX_CONCURRENT_STREAMS: u32 = 100;
const DEFAULT_REMOTE_INITIAL_WINDOW_SIZE: i64 = 65535;

mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// A unit of protocol state the reader task hands off to the connection's
/// stream table (spec.md §4.E, "event").
#[derive(Debug)]
pub enum Event {
    /// HEADERS (plus any CONTINUATION) completed for `stream_id`.
    ResponseReceived {
        stream_id: u32,
        headers: Vec<(String, String)>,
    },
    /// A DATA frame arrived for `stream_id`. `flow_controlled_length` is
    /// what was debited from the connection window and should be credited
    /// back once the caller has consumed the bytes.
    DataReceived {
        stream_id: u32,
        data: Bytes,
        flow_controlled_length: u32,
    },
    /// END_STREAM was observed (on a HEADERS or DATA frame) for `stream_id`.
    StreamEnded { stream_id: u32 },
    /// The peer's SETTINGS changed a value this crate cares about.
    RemoteSettingsChanged { max_concurrent_streams: Option<u32> },
    /// GOAWAY: the connection is going away. `last_stream_id` is the
    /// highest stream id the peer will still process.
    ConnectionTerminated {
        last_stream_id: u32,
        error_code: u32,
        debug_data: Bytes,
    },
    /// A WINDOW_UPDATE enlarged an outbound window; `stream_id` is `0` for
    /// the connection-level window.
    WindowUpdated { stream_id: u32 },
    /// Anything else with a known stream id (chiefly RST_STREAM) — recorded
    /// but not specifically interpreted by `Connection::post`'s wait loop,
    /// mirroring the original implementation's handling (spec.md §9).
    Other { stream_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    Frame(FrameError),
    Hpack(hpack::DecodeError),
    /// All odd client stream ids in the 31-bit space have been used.
    StreamsExhausted,
}

impl From<FrameError> for EngineError {
    fn from(e: FrameError) -> Self {
        EngineError::Frame(e)
    }
}

impl From<hpack::DecodeError> for EngineError {
    fn from(e: hpack::DecodeError) -> Self {
        EngineError::Hpack(e)
    }
}

/// Buffer of not-yet-complete header-block assembly for a HEADERS frame
/// followed by zero or more CONTINUATION frames.
struct HeaderAssembly {
    stream_id: u32,
    end_stream: bool,
    block: BytesMut,
}

/// The HTTP/2 engine for one client connection. Entirely sans-I/O: bytes go
/// in via [`Engine::feed`], events come out; bytes to send accumulate in an
/// internal buffer that [`Engine::take_outbound`] drains.
pub struct Engine {
    outbound: BytesMut,
    incoming: BytesMut,
    next_stream_id: u32,
    hpack_decoder: hpack::Decoder,
    header_assembly: Option<HeaderAssembly>,

    remote_max_concurrent_streams: u32,
    remote_initial_window_size: i64,

    outbound_connection_window: i64,
    outbound_stream_windows: HashMap<u32, i64>,
    open_outbound_streams: usize,

    went_away: bool,
}

impl Engine {
    pub fn new() -> Engine {
        Engine {
            outbound: BytesMut::new(),
            incoming: BytesMut::new(),
            next_stream_id: 1,
            hpack_decoder: hpack::Decoder::new(),
            header_assembly: None,
            remote_max_concurrent_streams: DEFAULT_REMOTE_MAX_CONCURRENT_STREAMS,
            remote_initial_window_size: DEFAULT_REMOTE_INITIAL_WINDOW_SIZE,
            outbound_connection_window: DEFAULT_REMOTE_INITIAL_WINDOW_SIZE,
            outbound_stream_windows: HashMap::new(),
            open_outbound_streams: 0,
            went_away: false,
        }
    }

    /// Queues the client preface, the crate's fixed local SETTINGS, and a
    /// connection-level WINDOW_UPDATE that raises our inbound window to
    /// [`CONNECTION_WINDOW_SIZE`] (spec.md §4.C).
    pub fn initiate(&mut self) {
        self.outbound.extend_from_slice(frame::PREFACE);
        frame::encode_settings(
            &mut self.outbound,
            false,
            &[
                (settings_id::ENABLE_PUSH, 0),
                (settings_id::MAX_CONCURRENT_STREAMS, 1 << 20),
                (settings_id::MAX_HEADER_LIST_SIZE, (1 << 16) - 1),
                (settings_id::INITIAL_WINDOW_SIZE, MAX_RESPONSE_SIZE),
            ],
        );
        frame::encode_window_update(
            &mut self.outbound,
            0,
            CONNECTION_WINDOW_SIZE - DEFAULT_REMOTE_INITIAL_WINDOW_SIZE as u32,
        );
    }

    /// Whether the engine still has an odd stream id left to allocate.
    pub fn streams_exhausted(&self) -> bool {
        self.next_stream_id > 0x7fff_ffff - 1
    }

    /// The current number of streams this crate has open but not yet ended
    /// or reset locally (spec.md §9 design note: tracked incrementally
    /// rather than recomputed from the stream table on every check).
    pub fn open_outbound_streams(&self) -> usize {
        self.open_outbound_streams
    }

    pub fn remote_max_concurrent_streams(&self) -> u32 {
        self.remote_max_concurrent_streams
    }

    /// Allocates the next client stream id (odd, strictly increasing) and
    /// marks it open.
    pub fn allocate_stream_id(&mut self) -> Result<u32, EngineError> {
        if self.streams_exhausted() {
            return Err(EngineError::StreamsExhausted);
        }
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        self.open_outbound_streams += 1;
        self.outbound_stream_windows
            .insert(id, self.remote_initial_window_size);
        Ok(id)
    }

    /// Queues a HEADERS frame for `stream_id` with `end_stream` set (every
    /// request this crate sends has its header block fully formed up
    /// front, so no CONTINUATION is ever emitted).
    pub fn send_headers(&mut self, stream_id: u32, headers: &[(String, String)], end_stream: bool) {
        let block = hpack::encode(headers);
        frame::encode_headers(&mut self.outbound, stream_id, end_stream, &block);
    }

    /// Queues a DATA frame for `stream_id`, decrementing both the
    /// connection and stream outbound windows. Callers should have already
    /// checked [`Engine::blocked`] before allocating the stream this data
    /// belongs to.
    ///
    /// No fragmentation across multiple DATA frames is implemented: request
    /// bodies here are APNs notification payloads, capped well under the
    /// default `SETTINGS_MAX_FRAME_SIZE` (16384), so a single frame always
    /// suffices.
    pub fn send_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) {
        frame::encode_data(&mut self.outbound, stream_id, end_stream, data);
        self.outbound_connection_window -= data.len() as i64;
        if let Some(w) = self.outbound_stream_windows.get_mut(&stream_id) {
            *w -= data.len() as i64;
        }
    }

    /// Queues a WINDOW_UPDATE frame raising the inbound window we advertise
    /// to the peer: connection-scope if `stream_id` is `None`, else that
    /// stream's (spec.md §4.E "increment the connection-scope inbound
    /// window", §4.E `post` "raise that stream's inbound window").
    pub fn increment_window(&mut self, stream_id: Option<u32>, amount: u32) {
        if amount == 0 {
            return;
        }
        frame::encode_window_update(&mut self.outbound, stream_id.unwrap_or(0), amount);
    }

    /// Whether the engine is unwilling to accept a new outbound stream
    /// right now (spec.md §4.D/§6 `blocked`): remaining outbound window at
    /// or below [`REQUIRED_FREE_SPACE`], the peer's concurrent-stream cap
    /// reached, or the peer has sent GOAWAY. This is a conservative,
    /// request-size-independent gate, not a check against any particular
    /// request's body length.
    pub fn blocked(&self) -> bool {
        self.went_away
            || self.outbound_connection_window <= REQUIRED_FREE_SPACE
            || self.open_outbound_streams >= self.remote_max_concurrent_streams as usize
    }

    /// Marks `stream_id` as no longer open (the caller sent END_STREAM, or
    /// a local RST_STREAM was issued).
    pub fn close_outbound_stream(&mut self, stream_id: u32) {
        if self.outbound_stream_windows.remove(&stream_id).is_some() {
            self.open_outbound_streams = self.open_outbound_streams.saturating_sub(1);
        }
    }

    /// Queues a RST_STREAM(CANCEL) for `stream_id` (spec.md §9 open
    /// question, resolved: see DESIGN.md).
    pub fn cancel_stream(&mut self, stream_id: u32) {
        frame::encode_rst_stream(&mut self.outbound, stream_id, 0x8 /* CANCEL */);
        self.close_outbound_stream(stream_id);
    }

    /// Takes and clears the bytes queued so far for the writer task to
    /// flush.
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    /// Feeds newly-read bytes from the socket into the engine, returning
    /// every event the resulting complete frames produced, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>, EngineError> {
        self.incoming.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(frame) = frame::decode(&mut self.incoming)? {
            self.handle_frame(frame, &mut events)?;
        }
        Ok(events)
    }

    fn handle_frame(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<(), EngineError> {
        match frame {
            Frame::Settings { ack, params } => {
                if !ack {
                    let mut max_concurrent_streams = None;
                    for (id, value) in params {
                        match id {
                            settings_id::MAX_CONCURRENT_STREAMS => {
                                self.remote_max_concurrent_streams = value;
                                max_concurrent_streams = Some(value);
                            }
                            settings_id::INITIAL_WINDOW_SIZE => {
                                let delta = value as i64 - self.remote_initial_window_size;
                                self.remote_initial_window_size = value as i64;
                                for window in self.outbound_stream_windows.values_mut() {
                                    *window += delta;
                                }
                            }
                            // HEADER_TABLE_SIZE, MAX_FRAME_SIZE,
                            // MAX_HEADER_LIST_SIZE: noted, not acted on —
                            // this crate never emits frames large enough or
                            // header blocks rich enough for them to matter.
                            settings_id::HEADER_TABLE_SIZE
                            | settings_id::MAX_FRAME_SIZE
                            | settings_id::MAX_HEADER_LIST_SIZE
                            | settings_id::ENABLE_PUSH => {}
                            _ => {}
                        }
                    }
                    frame::encode_settings(&mut self.outbound, true, &[]);
                    if max_concurrent_streams.is_some() {
                        events.push(Event::RemoteSettingsChanged {
                            max_concurrent_streams,
                        });
                    }
                }
            }
            Frame::Ping { ack, payload } => {
                if !ack {
                    frame::encode_ping(&mut self.outbound, true, &payload);
                }
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                if stream_id == 0 {
                    self.outbound_connection_window += increment as i64;
                } else if let Some(w) = self.outbound_stream_windows.get_mut(&stream_id) {
                    *w += increment as i64;
                }
                events.push(Event::WindowUpdated { stream_id });
            }
            Frame::GoAway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                self.went_away = true;
                events.push(Event::ConnectionTerminated {
                    last_stream_id,
                    error_code,
                    debug_data,
                });
            }
            Frame::RstStream { stream_id, .. } => {
                self.close_outbound_stream(stream_id);
                events.push(Event::Other { stream_id });
            }
            Frame::Data {
                stream_id,
                end_stream,
                data,
                flow_controlled_length,
            } => {
                events.push(Event::DataReceived {
                    stream_id,
                    data,
                    flow_controlled_length,
                });
                if end_stream {
                    events.push(Event::StreamEnded { stream_id });
                }
            }
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                header_block,
            } => {
                self.accumulate_header_block(stream_id, end_stream, end_headers, header_block, events)?;
            }
            Frame::Ignored => {}
        }
        Ok(())
    }

    fn accumulate_header_block(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        end_headers: bool,
        block: Bytes,
        events: &mut Vec<Event>,
    ) -> Result<(), EngineError> {
        let assembly = self.header_assembly.get_or_insert_with(|| HeaderAssembly {
            stream_id,
            end_stream,
            block: BytesMut::new(),
        });
        // The originating HEADERS frame's END_STREAM is what counts; a
        // CONTINUATION frame carries `end_stream: false` unconditionally.
        assembly.end_stream |= end_stream;
        assembly.block.extend_from_slice(&block);

        if end_headers {
            let HeaderAssembly {
                stream_id,
                end_stream,
                block,
            } = self.header_assembly.take().unwrap();
            let headers = self.hpack_decoder.decode(&block)?;
            events.push(Event::ResponseReceived { stream_id, headers });
            if end_stream {
                events.push(Event::StreamEnded { stream_id });
            }
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_headers() -> Vec<(String, String)> {
        vec![
            (":status".to_owned(), "200".to_owned()),
            ("apns-id".to_owned(), "UUID-1".to_owned()),
        ]
    }

    #[test]
    fn initiate_emits_preface_settings_and_window_update() {
        let mut engine = Engine::new();
        engine.initiate();
        let out = engine.take_outbound();
        assert!(out.starts_with(frame::PREFACE));
    }

    #[test]
    fn allocates_odd_increasing_stream_ids() {
        let mut engine = Engine::new();
        let a = engine.allocate_stream_id().unwrap();
        let b = engine.allocate_stream_id().unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 3);
        assert_eq!(engine.open_outbound_streams(), 2);
    }

    #[test]
    fn feed_single_headers_frame_emits_response_and_stream_ended() {
        let mut engine = Engine::new();
        let stream_id = engine.allocate_stream_id().unwrap();

        let mut server_out = BytesMut::new();
        let block = hpack::encode(&response_headers());
        frame::encode_headers(&mut server_out, stream_id, true, &block);

        let events = engine.feed(&server_out).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::ResponseReceived { stream_id: sid, headers } => {
                assert_eq!(*sid, stream_id);
                assert_eq!(headers, &response_headers());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(events[1], Event::StreamEnded { .. }));
    }

    #[test]
    fn feed_settings_frame_auto_acks_and_updates_max_concurrent_streams() {
        let mut engine = Engine::new();
        let mut server_out = BytesMut::new();
        frame::encode_settings(&mut server_out, false, &[(settings_id::MAX_CONCURRENT_STREAMS, 5)]);

        let events = engine.feed(&server_out).unwrap();
        assert_eq!(engine.remote_max_concurrent_streams(), 5);
        assert!(matches!(
            events[0],
            Event::RemoteSettingsChanged {
                max_concurrent_streams: Some(5)
            }
        ));
        // An ACK must have been queued in response.
        let out = engine.take_outbound();
        assert!(!out.is_empty());
    }

    #[test]
    fn feed_ping_auto_pongs_without_an_event() {
        let mut engine = Engine::new();
        let mut server_out = BytesMut::new();
        frame::encode_ping(&mut server_out, false, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let events = engine.feed(&server_out).unwrap();
        assert!(events.is_empty());
        let out = engine.take_outbound();
        assert!(!out.is_empty());
    }

    #[test]
    fn goaway_marks_connection_blocked() {
        let mut engine = Engine::new();
        let mut server_out = BytesMut::new();
        // Build a GOAWAY frame by hand since there is no encoder for it
        // (this crate never sends GOAWAY itself).
        server_out.extend_from_slice(&[0, 0, 8]); // length = 8
        server_out.extend_from_slice(&[0x7]); // type = GOAWAY
        server_out.extend_from_slice(&[0]); // flags
        server_out.extend_from_slice(&[0, 0, 0, 0]); // stream id 0
        server_out.extend_from_slice(&[0, 0, 0, 1]); // last stream id 1
        server_out.extend_from_slice(&[0, 0, 0, 0]); // error code NO_ERROR

        let events = engine.feed(&server_out).unwrap();
        assert!(matches!(events[0], Event::ConnectionTerminated { last_stream_id: 1, .. }));
        assert!(engine.blocked());
    }

    #[test]
    fn blocked_once_window_drops_to_required_free_space() {
        let mut engine = Engine::new();
        assert!(!engine.blocked());
        let to_send = vec![0u8; (DEFAULT_REMOTE_INITIAL_WINDOW_SIZE - REQUIRED_FREE_SPACE) as usize];
        let stream_id = engine.allocate_stream_id().unwrap();
        engine.send_data(stream_id, &to_send, false);
        assert!(engine.blocked());
    }

    #[test]
    fn data_frame_debits_connection_and_stream_windows() {
        let mut engine = Engine::new();
        let stream_id = engine.allocate_stream_id().unwrap();
        let before = engine.outbound_connection_window;
        engine.send_data(stream_id, b"hello", true);
        assert_eq!(engine.outbound_connection_window, before - 5);
    }

    #[test]
    fn increment_window_queues_a_window_update_frame() {
        let mut engine = Engine::new();
        engine.increment_window(Some(1), MAX_RESPONSE_SIZE);
        let out = engine.take_outbound();
        assert!(!out.is_empty());
    }

    #[test]
    fn window_update_credits_connection_window() {
        let mut engine = Engine::new();
        let before = engine.outbound_connection_window;
        let mut server_out = BytesMut::new();
        frame::encode_window_update(&mut server_out, 0, 100);
        let events = engine.feed(&server_out).unwrap();
        assert_eq!(engine.outbound_connection_window, before + 100);
        assert!(matches!(events[0], Event::WindowUpdated { stream_id: 0 }));
    }
}
