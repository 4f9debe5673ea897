use crate::api::types::{millis_to_datetime, RequestStatus, TradeCmd, TradeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kinds of push record the stream channel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Balance,
    Candle,
    KeepAlive,
    News,
    Profit,
    TickPrices,
    Trade,
    TradeStatus,
}

impl RecordKind {
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Balance,
        RecordKind::Candle,
        RecordKind::KeepAlive,
        RecordKind::News,
        RecordKind::Profit,
        RecordKind::TickPrices,
        RecordKind::Trade,
        RecordKind::TradeStatus,
    ];

    /// Wire tag carried in the `command` field of inbound messages
    pub const fn tag(self) -> &'static str {
        match self {
            RecordKind::Balance => "balance",
            RecordKind::Candle => "candle",
            RecordKind::KeepAlive => "keepAlive",
            RecordKind::News => "news",
            RecordKind::Profit => "profit",
            RecordKind::TickPrices => "tickPrices",
            RecordKind::Trade => "trade",
            RecordKind::TradeStatus => "tradeStatus",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub const fn start_command(self) -> &'static str {
        match self {
            RecordKind::Balance => "getBalance",
            RecordKind::Candle => "getCandles",
            RecordKind::KeepAlive => "getKeepAlive",
            RecordKind::News => "getNews",
            RecordKind::Profit => "getProfits",
            RecordKind::TickPrices => "getTickPrices",
            RecordKind::Trade => "getTrades",
            RecordKind::TradeStatus => "getTradeStatus",
        }
    }

    pub const fn stop_command(self) -> &'static str {
        match self {
            RecordKind::Balance => "stopBalance",
            RecordKind::Candle => "stopCandles",
            RecordKind::KeepAlive => "stopKeepAlive",
            RecordKind::News => "stopNews",
            RecordKind::Profit => "stopProfits",
            RecordKind::TickPrices => "stopTickPrices",
            RecordKind::Trade => "stopTrades",
            RecordKind::TradeStatus => "stopTradeStatus",
        }
    }

    /// Whether subscriptions and routing for this kind are per symbol
    pub const fn is_symbol_scoped(self) -> bool {
        matches!(self, RecordKind::Candle | RecordKind::TickPrices)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRecord {
    pub balance: f64,
    pub credit: f64,
    pub equity: f64,
    pub margin: f64,
    pub margin_free: f64,
    pub margin_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleRecord {
    pub close: f64,
    pub ctm: i64,
    pub ctm_string: String,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub quote_id: i32,
    pub symbol: String,
    pub vol: f64,
}

impl CandleRecord {
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.ctm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveRecord {
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub body: String,
    pub key: String,
    pub time: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitRecord {
    pub order: i64,
    pub order2: i64,
    pub position: i64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPriceRecord {
    pub ask: f64,
    pub ask_volume: Option<i64>,
    pub bid: f64,
    pub bid_volume: Option<i64>,
    pub high: f64,
    pub level: i32,
    pub low: f64,
    pub quote_id: i32,
    pub spread_raw: f64,
    pub spread_table: f64,
    pub symbol: String,
    pub timestamp: i64,
}

impl TickPriceRecord {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.timestamp)
    }
}

/// Trade update pushed when a position or order changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTradeRecord {
    pub close_price: f64,
    pub close_time: Option<i64>,
    pub closed: bool,
    pub cmd: TradeCmd,
    pub comment: String,
    pub commission: f64,
    #[serde(rename = "customComment")]
    pub custom_comment: Option<String>,
    pub digits: i32,
    pub expiration: Option<i64>,
    pub margin_rate: f64,
    pub offset: i32,
    pub open_price: f64,
    pub open_time: i64,
    pub order: i64,
    pub order2: i64,
    pub position: i64,
    pub profit: Option<f64>,
    pub sl: f64,
    /// `Modified` or `Deleted`
    pub state: String,
    pub storage: f64,
    pub symbol: String,
    pub tp: f64,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStatusRecord {
    pub custom_comment: Option<String>,
    pub message: Option<String>,
    pub order: i64,
    pub price: f64,
    pub request_status: RequestStatus,
}

/// One decoded push record
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    Balance(BalanceRecord),
    Candle(CandleRecord),
    KeepAlive(KeepAliveRecord),
    News(NewsRecord),
    Profit(ProfitRecord),
    TickPrices(TickPriceRecord),
    Trade(StreamTradeRecord),
    TradeStatus(TradeStatusRecord),
}

impl StreamRecord {
    /// Decode the `data` payload of a message tagged with `kind`
    pub fn decode(kind: RecordKind, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RecordKind::Balance => StreamRecord::Balance(serde_json::from_value(data)?),
            RecordKind::Candle => StreamRecord::Candle(serde_json::from_value(data)?),
            RecordKind::KeepAlive => StreamRecord::KeepAlive(serde_json::from_value(data)?),
            RecordKind::News => StreamRecord::News(serde_json::from_value(data)?),
            RecordKind::Profit => StreamRecord::Profit(serde_json::from_value(data)?),
            RecordKind::TickPrices => StreamRecord::TickPrices(serde_json::from_value(data)?),
            RecordKind::Trade => StreamRecord::Trade(serde_json::from_value(data)?),
            RecordKind::TradeStatus => StreamRecord::TradeStatus(serde_json::from_value(data)?),
        })
    }

    pub const fn kind(&self) -> RecordKind {
        match self {
            StreamRecord::Balance(_) => RecordKind::Balance,
            StreamRecord::Candle(_) => RecordKind::Candle,
            StreamRecord::KeepAlive(_) => RecordKind::KeepAlive,
            StreamRecord::News(_) => RecordKind::News,
            StreamRecord::Profit(_) => RecordKind::Profit,
            StreamRecord::TickPrices(_) => RecordKind::TickPrices,
            StreamRecord::Trade(_) => RecordKind::Trade,
            StreamRecord::TradeStatus(_) => RecordKind::TradeStatus,
        }
    }

    /// Symbol used for routing; only set for symbol-scoped kinds
    pub fn symbol(&self) -> Option<&str> {
        match self {
            StreamRecord::Candle(candle) => Some(&candle.symbol),
            StreamRecord::TickPrices(tick) => Some(&tick.symbol),
            _ => None,
        }
    }
}
