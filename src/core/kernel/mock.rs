//! In-memory transport for unit tests

use crate::core::errors::TransportError;
use crate::core::kernel::connection::Connection;
use crate::core::kernel::transport::{WsReader, WsWriter};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct MockWriter {
    sent: mpsc::UnboundedSender<String>,
    wire: Arc<Mutex<String>>,
    write_delay: Option<Duration>,
    closed: bool,
}

pub struct MockReader {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// The remote end of a mock connection
pub struct MockPeer {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    wire: Arc<Mutex<String>>,
}

impl MockPeer {
    /// Deliver one message to the connection
    pub fn push(&self, text: &str) {
        let _ = self.inbound.send(text.as_bytes().to_vec());
    }

    /// Next complete frame written by the connection, if one shows up within a second
    pub async fn next_sent(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), self.sent.recv())
            .await
            .ok()
            .flatten()
    }

    /// Raw bytes in the order they hit the wire
    pub fn wire(&self) -> String {
        self.wire.lock().unwrap().clone()
    }

    /// Split off the inbound half so a responder task can own it
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<Vec<u8>>) {
        (self.sent, self.inbound)
    }
}

#[async_trait]
impl WsWriter for MockWriter {
    async fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        // Written in two halves so unserialized writers would interleave
        let (head, tail) = text.split_at(text.len() / 2);
        self.wire.lock().unwrap().push_str(head);
        match self.write_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.wire.lock().unwrap().push_str(tail);

        self.sent.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[async_trait]
impl WsReader for MockReader {
    async fn read_message(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

pub fn pair() -> (Connection, MockPeer) {
    build(None)
}

pub fn pair_with_write_delay(delay: Duration) -> (Connection, MockPeer) {
    build(Some(delay))
}

fn build(write_delay: Option<Duration>) -> (Connection, MockPeer) {
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let wire = Arc::new(Mutex::new(String::new()));

    let writer = MockWriter {
        sent: sent_tx,
        wire: Arc::clone(&wire),
        write_delay,
        closed: false,
    };
    let reader = MockReader { inbound: inbound_rx };

    (
        Connection::from_transport("mock://venue", writer, reader),
        MockPeer {
            sent: sent_rx,
            inbound: inbound_tx,
            wire,
        },
    )
}
