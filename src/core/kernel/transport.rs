use crate::core::errors::{ConnectError, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{instrument, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a message-oriented socket - pure transport layer
#[async_trait]
pub trait WsWriter: Send + 'static {
    /// Write one complete text message
    async fn write_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the socket
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a message-oriented socket
#[async_trait]
pub trait WsReader: Send + 'static {
    /// Read the next complete data message
    ///
    /// Control frames are consumed here. A close frame or end of stream is
    /// reported as `TransportError::Closed`.
    async fn read_message(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Tungstenite-backed write half
pub struct TungsteniteWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Tungstenite-backed read half
pub struct TungsteniteReader {
    stream: SplitStream<WsStream>,
}

/// Dial a WebSocket endpoint and split it into its two halves
#[instrument(skip_all, fields(url = %url))]
pub async fn dial(url: &str) -> Result<(TungsteniteWriter, TungsteniteReader), ConnectError> {
    let (ws_stream, _) = connect_async(url).await.map_err(|e| match e {
        tokio_tungstenite::tungstenite::Error::Url(url_err) => {
            ConnectError::InvalidUrl(url_err.to_string())
        }
        tokio_tungstenite::tungstenite::Error::HttpFormat(http_err) => {
            ConnectError::InvalidUrl(http_err.to_string())
        }
        other => ConnectError::Transport(format!("WebSocket connection failed: {}", other)),
    })?;

    let (sink, stream) = ws_stream.split();
    Ok((TungsteniteWriter { sink }, TungsteniteReader { stream }))
}

fn map_ws_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error;
    match err {
        Error::ConnectionClosed | Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl WsWriter for TungsteniteWriter {
    async fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink.send(Message::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

#[async_trait]
impl WsReader for TungsteniteReader {
    async fn read_message(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    trace!(?frame, "Received close frame");
                    return Err(TransportError::Closed);
                }
                // Pongs to pings are queued by tungstenite and flushed on the next poll
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(TransportError::Closed),
            }
        }
    }
}
