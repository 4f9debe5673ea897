use crate::core::errors::{CloseError, ConnectError, RecvError, SendError, TransportError};
use crate::core::kernel::transport::{dial, WsReader, WsWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closed,
}

type ReadOutcome = (Box<dyn WsReader>, Result<Vec<u8>, TransportError>);

/// Where the read half currently lives
enum ReadSlot {
    Idle(Box<dyn WsReader>),
    /// A read whose caller timed out or was cancelled; the next receive resumes it
    Pending(JoinHandle<ReadOutcome>),
    Gone,
}

/// Cancellable duplex connection over one WebSocket
///
/// Writes from concurrent callers are serialized through one writer lock and
/// at most one read is in flight at any time. Each socket operation runs on a
/// background task that is raced against the caller's deadline and
/// cancellation token, so giving up on one direction never aborts the other.
pub struct Connection {
    url: String,
    writer: Arc<Mutex<Option<Box<dyn WsWriter>>>>,
    reader: Mutex<ReadSlot>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

enum ReadWait {
    Done(Result<ReadOutcome, JoinError>),
    Cancelled,
    Expired,
}

/// A read task taken out of its slot; parks it back unless it finished,
/// so a receive whose future is dropped loses nothing
struct InFlightRead<'a> {
    slot: MutexGuard<'a, ReadSlot>,
    task: Option<JoinHandle<ReadOutcome>>,
}

impl Drop for InFlightRead<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            *self.slot = ReadSlot::Pending(task);
        }
    }
}

/// Resolve at `deadline`, or never when there is none
pub(crate) async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Watch a send the caller stopped waiting for and log how it ended
fn drain_detached(task: JoinHandle<Result<(), TransportError>>) {
    tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => debug!("Detached send completed after caller gave up"),
            Ok(Err(e)) => warn!(error = %e, "Detached send failed"),
            Err(e) => warn!(error = %e, "Detached send task did not finish"),
        }
    });
}

impl Connection {
    /// Dial `url`, failing on timeout or cancellation before the handshake completes
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self, ConnectError> {
        let (writer, reader) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ConnectError::Cancelled),
            res = tokio::time::timeout(timeout, dial(url)) => {
                res.map_err(|_| ConnectError::Timeout)??
            }
        };

        debug!("WebSocket connected");
        Ok(Self::from_transport(url, writer, reader))
    }

    /// Wrap an already established transport
    pub fn from_transport<W: WsWriter, R: WsReader>(
        url: impl Into<String>,
        writer: W,
        reader: R,
    ) -> Self {
        Self {
            url: url.into(),
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
            reader: Mutex::new(ReadSlot::Idle(Box::new(reader))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else {
            ConnectionState::Connected
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Write one complete message
    ///
    /// On timeout or cancellation the write task is detached, not aborted:
    /// a half-written frame would corrupt the socket for everyone else.
    #[instrument(skip(self, text, cancel), fields(url = %self.url, bytes = text.len()))]
    pub async fn send(
        &self,
        text: String,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }

        let writer = Arc::clone(&self.writer);
        let closed = Arc::clone(&self.closed);
        let mut task = tokio::spawn(async move {
            let mut guard = writer.lock().await;
            let writer = guard.as_mut().ok_or(TransportError::Closed)?;
            let result = writer.write_text(text).await;
            if matches!(result, Err(TransportError::Closed)) {
                closed.store(true, Ordering::Release);
            }
            result
        });

        tokio::select! {
            biased;
            res = &mut task => match res {
                Ok(result) => result.map_err(SendError::from),
                Err(e) => Err(SendError::Transport(format!("send task failed: {}", e))),
            },
            () = cancel.cancelled() => {
                drain_detached(task);
                Err(SendError::Cancelled)
            }
            () = expire(deadline) => {
                drain_detached(task);
                Err(SendError::Timeout)
            }
        }
    }

    /// Wait for the next complete inbound message
    #[instrument(skip(self, cancel), fields(url = %self.url))]
    pub async fn receive(
        &self,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RecvError> {
        let mut slot = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RecvError::Cancelled),
            () = expire(deadline) => return Err(RecvError::Timeout),
            guard = self.reader.lock() => guard,
        };

        let task = match std::mem::replace(&mut *slot, ReadSlot::Gone) {
            ReadSlot::Idle(mut reader) => tokio::spawn(async move {
                let result = reader.read_message().await;
                (reader, result)
            }),
            ReadSlot::Pending(task) => task,
            ReadSlot::Gone => return Err(RecvError::Closed),
        };
        let mut read = InFlightRead {
            slot,
            task: Some(task),
        };

        let wait = match read.task.as_mut() {
            Some(task) => tokio::select! {
                biased;
                res = task => ReadWait::Done(res),
                () = cancel.cancelled() => ReadWait::Cancelled,
                () = expire(deadline) => ReadWait::Expired,
            },
            None => return Err(RecvError::Closed),
        };

        // Cancelled and expired reads stay parked through `read`'s drop
        match wait {
            ReadWait::Done(res) => {
                read.task = None;
                match res {
                    Ok((reader, Ok(data))) => {
                        *read.slot = ReadSlot::Idle(reader);
                        trace!(message = %String::from_utf8_lossy(&data), "read");
                        Ok(data)
                    }
                    Ok((_, Err(TransportError::Closed))) => {
                        self.closed.store(true, Ordering::Release);
                        Err(RecvError::Closed)
                    }
                    Ok((reader, Err(e))) => {
                        *read.slot = ReadSlot::Idle(reader);
                        Err(RecvError::from(e))
                    }
                    Err(e) => {
                        self.closed.store(true, Ordering::Release);
                        Err(RecvError::Transport(format!("receive task failed: {}", e)))
                    }
                }
            }
            ReadWait::Cancelled => Err(RecvError::Cancelled),
            ReadWait::Expired => Err(RecvError::Timeout),
        }
    }

    /// Close the socket
    ///
    /// A parked read is aborted. Calling this twice returns
    /// `CloseError::AlreadyClosed`; it must not race in-flight operations.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn disconnect(&self) -> Result<(), CloseError> {
        self.closed.store(true, Ordering::Release);

        if let Ok(mut slot) = self.reader.try_lock() {
            if let ReadSlot::Pending(task) = std::mem::replace(&mut *slot, ReadSlot::Gone) {
                task.abort();
            }
        }

        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => {
                writer
                    .close()
                    .await
                    .map_err(|e| CloseError::Transport(e.to_string()))?;
                debug!("WebSocket disconnected");
                Ok(())
            }
            None => Err(CloseError::AlreadyClosed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let ReadSlot::Pending(task) = self.reader.get_mut() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::mock;

    fn in_ms(ms: u64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_millis(ms))
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (conn, mut peer) = mock::pair();
        let token = CancellationToken::new();

        conn.send("hello".to_string(), in_ms(500), &token).await.unwrap();
        assert_eq!(peer.next_sent().await.as_deref(), Some("hello"));

        peer.push(r#"{"status":true}"#);
        let data = conn.receive(in_ms(500), &token).await.unwrap();
        assert_eq!(data, br#"{"status":true}"#.to_vec());
    }

    #[tokio::test]
    async fn test_receive_timeout_keeps_pending_message() {
        let (conn, peer) = mock::pair();
        let token = CancellationToken::new();

        let err = conn.receive(in_ms(30), &token).await.unwrap_err();
        assert_eq!(err, RecvError::Timeout);

        // The parked read picks up the message that arrives later
        peer.push("late");
        let data = conn.receive(in_ms(500), &token).await.unwrap();
        assert_eq!(data, b"late".to_vec());
    }

    #[tokio::test]
    async fn test_dropped_receive_keeps_pending_message() {
        let (conn, peer) = mock::pair();
        let token = CancellationToken::new();

        let dropped = tokio::time::timeout(Duration::from_millis(20), conn.receive(None, &token)).await;
        assert!(dropped.is_err());
        assert_eq!(conn.state(), ConnectionState::Connected);

        peer.push("after drop");
        let data = conn.receive(in_ms(500), &token).await.unwrap();
        assert_eq!(data, b"after drop".to_vec());
    }

    #[tokio::test]
    async fn test_receive_cancelled() {
        let (conn, _peer) = mock::pair();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = conn.receive(None, &token).await.unwrap_err();
        assert_eq!(err, RecvError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_receive_does_not_block_send() {
        let (conn, mut peer) = mock::pair();
        let conn = Arc::new(conn);
        let read_token = CancellationToken::new();

        let reader = Arc::clone(&conn);
        let read_cancel = read_token.clone();
        let read = tokio::spawn(async move { reader.receive(None, &read_cancel).await });

        conn.send("ping".to_string(), in_ms(500), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(peer.next_sent().await.as_deref(), Some("ping"));

        read_token.cancel();
        assert_eq!(read.await.unwrap().unwrap_err(), RecvError::Cancelled);
    }

    #[tokio::test]
    async fn test_send_timeout_detaches_write() {
        let (conn, mut peer) = mock::pair_with_write_delay(Duration::from_millis(100));
        let token = CancellationToken::new();

        let err = conn.send("slow".to_string(), in_ms(10), &token).await.unwrap_err();
        assert_eq!(err, SendError::Timeout);

        // The detached write still completes as one frame
        assert_eq!(peer.next_sent().await.as_deref(), Some("slow"));
    }

    #[tokio::test]
    async fn test_concurrent_sends_never_interleave() {
        let (conn, peer) = mock::pair_with_write_delay(Duration::from_millis(5));
        let conn = Arc::new(conn);
        let first = "A".repeat(64);
        let second = "B".repeat(64);

        let a = {
            let conn = Arc::clone(&conn);
            let frame = first.clone();
            tokio::spawn(async move { conn.send(frame, in_ms(1000), &CancellationToken::new()).await })
        };
        let b = {
            let conn = Arc::clone(&conn);
            let frame = second.clone();
            tokio::spawn(async move { conn.send(frame, in_ms(1000), &CancellationToken::new()).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let wire = peer.wire();
        assert!(
            wire == format!("{}{}", first, second) || wire == format!("{}{}", second, first),
            "frames interleaved on the wire: {}",
            wire
        );
    }

    #[tokio::test]
    async fn test_peer_close_marks_connection_closed() {
        let (conn, peer) = mock::pair();
        let token = CancellationToken::new();
        drop(peer);

        assert_eq!(conn.receive(in_ms(500), &token).await.unwrap_err(), RecvError::Closed);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            conn.send("x".to_string(), in_ms(500), &token).await.unwrap_err(),
            SendError::Closed
        );
    }

    #[tokio::test]
    async fn test_disconnect_twice_errors() {
        let (conn, _peer) = mock::pair();
        let token = CancellationToken::new();
        assert_eq!(conn.receive(in_ms(10), &token).await.unwrap_err(), RecvError::Timeout);

        conn.disconnect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.disconnect().await.unwrap_err(), CloseError::AlreadyClosed);
        assert_eq!(conn.receive(in_ms(10), &token).await.unwrap_err(), RecvError::Closed);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let err = Connection::connect("http://127.0.0.1:1/demo", Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_connect_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        // Non-routable address keeps the dial pending until the token wins
        let err = Connection::connect("ws://10.255.255.1:81", Duration::from_secs(5), &token)
            .await
            .unwrap_err();
        assert_eq!(err, ConnectError::Cancelled);
    }
}
