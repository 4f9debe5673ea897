use super::types::{RecordKind, StreamRecord};
use crate::core::errors::ListenError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound stream command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCommand<'a> {
    pub command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_arrival_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_level: Option<u32>,
}

impl<'a> StreamCommand<'a> {
    pub const fn new(command: &'a str) -> Self {
        Self {
            command,
            stream_session_id: None,
            symbol: None,
            min_arrival_time: None,
            max_level: None,
        }
    }

    /// Liveness message
    pub const fn ping(session_id: &'a str) -> Self {
        Self::new("ping").with_session(session_id)
    }

    pub const fn with_session(mut self, session_id: &'a str) -> Self {
        self.stream_session_id = Some(session_id);
        self
    }

    pub const fn with_symbol(mut self, symbol: Option<&'a str>) -> Self {
        self.symbol = symbol;
        self
    }
}

/// Inbound envelope: `{"command": <kind tag>, "data": {...}}`
#[derive(Deserialize)]
struct StreamMessage {
    command: String,
    data: Value,
}

/// Decode one inbound push message into its typed record
pub fn decode_message(data: &[u8]) -> Result<StreamRecord, ListenError> {
    let message: StreamMessage = serde_json::from_slice(data)
        .map_err(|e| ListenError::Decode(format!("invalid stream envelope: {}", e)))?;

    let kind = RecordKind::from_tag(&message.command)
        .ok_or_else(|| ListenError::UnknownKind(message.command.clone()))?;

    StreamRecord::decode(kind, message.data)
        .map_err(|e| ListenError::Decode(format!("invalid {} record: {}", kind, e)))
}
