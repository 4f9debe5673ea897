use crate::stream::{DispatcherState, RecordKind};
use thiserror::Error;

/// Failures reported by the raw WebSocket transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("Connection attempt timed out")]
    Timeout,

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseError {
    #[error("Connection already closed")]
    AlreadyClosed,

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Send timed out")]
    Timeout,

    #[error("Send cancelled")]
    Cancelled,

    #[error("Connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecvError {
    #[error("Receive timed out")]
    Timeout,

    #[error("Receive cancelled")]
    Cancelled,

    #[error("Connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<TransportError> for SendError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Self::Closed,
            TransportError::Protocol(msg) => Self::Transport(msg),
        }
    }
}

impl From<TransportError> for RecvError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Self::Closed,
            TransportError::Protocol(msg) => Self::Transport(msg),
        }
    }
}

/// Errors surfaced by a synchronous API call.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("API client is not connected")]
    NotConnected,

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to send request: {0}")]
    Send(SendError),

    #[error("Failed to receive response: {0}")]
    Recv(RecvError),

    #[error("Call timed out")]
    Timeout,

    #[error("Call cancelled")]
    Cancelled,

    #[error("Remote error: {code} - {description}")]
    Remote { code: String, description: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<SendError> for CallError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Timeout => Self::Timeout,
            SendError::Cancelled => Self::Cancelled,
            other => Self::Send(other),
        }
    }
}

impl From<RecvError> for CallError {
    fn from(err: RecvError) -> Self {
        match err {
            RecvError::Timeout => Self::Timeout,
            RecvError::Cancelled => Self::Cancelled,
            other => Self::Recv(other),
        }
    }
}

/// Errors from stream subscription management.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream client is not connected")]
    NotConnected,

    #[error("No stream session id set, login first")]
    MissingSession,

    #[error("{0} subscriptions need a symbol")]
    MissingSymbol(RecordKind),

    #[error("Failed to encode stream command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to send stream command: {0}")]
    Send(#[from] SendError),
}

/// Reasons the dispatcher's listen loop stopped.
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("Cannot listen while dispatcher is {0:?}")]
    InvalidState(DispatcherState),

    #[error("Unknown record kind received: {0}")]
    UnknownKind(String),

    #[error("Failed to decode stream message: {0}")]
    Decode(String),

    #[error("Stream connection closed")]
    Closed,

    #[error("Stream receive failed: {0}")]
    Recv(RecvError),
}

impl From<RecvError> for ListenError {
    fn from(err: RecvError) -> Self {
        match err {
            RecvError::Closed => Self::Closed,
            other => Self::Recv(other),
        }
    }
}
