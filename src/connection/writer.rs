//! The socket writer task (spec.md §4.E "background_write loop").

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Notify;
use tokio_rustls::client::TlsStream;

use super::{mark_terminal, SharedInner};

type Io = TlsStream<tokio::net::TcpStream>;

/// Drains whatever the engine has queued and flushes it to the socket. If
/// the engine has nothing queued, waits for `should_write` to be signaled.
///
/// `last_stream_id_got` is captured before the flush and `last_stream_id_sent`
/// is advanced to that captured value only after the flush completes, so
/// `Connection::buffered` never observes a "sent" value that includes bytes
/// still in flight (spec.md §5 ordering guarantee).
pub(crate) async fn background_write(
    mut write_half: WriteHalf<Io>,
    inner: SharedInner,
    should_write: Arc<Notify>,
) {
    loop {
        // Register interest before taking the engine's outbound buffer so a
        // notification racing the check is never missed.
        let notified = should_write.notified();

        let (bytes, last_stream_id_got, closed) = {
            let mut guard = inner.lock().await;
            (
                guard.engine.take_outbound(),
                guard.last_stream_id_got,
                guard.closed,
            )
        };
        if closed {
            return;
        }

        if bytes.is_empty() {
            notified.await;
            continue;
        }

        if let Err(e) = write_half.write_all(&bytes).await {
            tracing::warn!(error = %e, "background write task died");
            mark_terminal(&inner, e.to_string()).await;
            return;
        }
        if let Err(e) = write_half.flush().await {
            tracing::warn!(error = %e, "background write task died");
            mark_terminal(&inner, e.to_string()).await;
            return;
        }

        inner.lock().await.last_stream_id_sent = last_stream_id_got;
    }
}
