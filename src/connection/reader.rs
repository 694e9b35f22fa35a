//! The socket reader task (spec.md §4.E "background_read loop").

use std::sync::Arc;

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::Notify;
use tokio_rustls::client::TlsStream;

use crate::proto::Event;

use super::{mark_terminal, ChannelEvent, SharedInner};

type Io = TlsStream<tokio::net::TcpStream>;

/// Reads up to 65536 bytes per syscall, feeds them to the engine, and
/// dispatches the resulting events to the stream table. An empty read (the
/// peer closed the socket) or any I/O/protocol error is terminal.
pub(crate) async fn background_read(
    mut read_half: ReadHalf<Io>,
    inner: SharedInner,
    should_write: Arc<Notify>,
) {
    let mut buf = vec![0u8; 1 << 16];
    loop {
        if inner.lock().await.closed {
            return;
        }

        let n = match read_half.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("server closed the connection");
                mark_terminal(&inner, "Server closed the connection".to_owned()).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "background read task died");
                mark_terminal(&inner, e.to_string()).await;
                return;
            }
        };

        if let Err(reason) = dispatch(&inner, &buf[..n]).await {
            tracing::warn!(%reason, "closing connection after a protocol error");
            mark_terminal(&inner, reason).await;
            return;
        }

        // Feeding bytes may have queued SETTINGS ACKs, PING pongs, or
        // WINDOW_UPDATEs the engine needs to flush; wake the writer
        // unconditionally rather than trying to know exactly when.
        should_write.notify_one();
    }
}

async fn dispatch(inner: &SharedInner, bytes: &[u8]) -> Result<(), String> {
    let mut guard = inner.lock().await;
    let events = guard.engine.feed(bytes).map_err(|e| format!("{e:?}"))?;

    for event in events {
        match event {
            Event::ResponseReceived { stream_id, headers } => {
                tracing::trace!(stream_id, "response headers received");
                if let Some(channel) = guard.channels.get(&stream_id) {
                    channel.push(ChannelEvent::ResponseReceived(headers));
                }
            }
            Event::DataReceived {
                stream_id,
                data,
                flow_controlled_length,
            } => {
                // Stream-scope flow control is the channel's concern (the
                // per-stream window was pre-credited in `post`); connection
                // scope is rebated here.
                guard.engine.increment_window(None, flow_controlled_length);
                if let Some(channel) = guard.channels.get(&stream_id) {
                    channel.push(ChannelEvent::DataReceived(data));
                }
            }
            Event::StreamEnded { stream_id } => {
                if let Some(channel) = guard.channels.get(&stream_id) {
                    channel.push(ChannelEvent::StreamEnded);
                }
            }
            Event::RemoteSettingsChanged { max_concurrent_streams } => {
                if let Some(m) = max_concurrent_streams {
                    tracing::debug!(max_concurrent_streams = m, "peer settings changed");
                }
            }
            Event::ConnectionTerminated {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                guard.closing = true;
                if guard.outcome.is_none() {
                    guard.outcome = Some(derive_outcome(error_code, &debug_data));
                }
                tracing::info!(
                    last_stream_id,
                    error_code,
                    outcome = ?guard.outcome,
                    "peer sent GOAWAY"
                );
            }
            Event::WindowUpdated { .. } => {}
            Event::Other { stream_id } => {
                tracing::warn!(stream_id, "unhandled stream event");
                if let Some(channel) = guard.channels.get(&stream_id) {
                    channel.push(ChannelEvent::Other);
                }
            }
        }
    }
    Ok(())
}

/// Derives the human-readable GOAWAY outcome (spec.md §9 "Outcome string"):
/// the peer's `additional_data` interpreted as `{"reason": "..."}` JSON,
/// falling back to the first 100 bytes stringified, falling back to the
/// numeric error code.
fn derive_outcome(error_code: u32, debug_data: &[u8]) -> String {
    if !debug_data.is_empty() {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(debug_data) {
            if let Some(reason) = value.get("reason").and_then(|r| r.as_str()) {
                return reason.to_owned();
            }
        }
        let n = debug_data.len().min(100);
        return String::from_utf8_lossy(&debug_data[..n]).into_owned();
    }
    error_code.to_string()
}
