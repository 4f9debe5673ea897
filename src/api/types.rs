use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Convert a venue millisecond timestamp
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Candle period in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Period {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl From<Period> for i32 {
    fn from(period: Period) -> Self {
        match period {
            Period::M1 => 1,
            Period::M5 => 5,
            Period::M15 => 15,
            Period::M30 => 30,
            Period::H1 => 60,
            Period::H4 => 240,
            Period::D1 => 1440,
            Period::W1 => 10080,
            Period::MN1 => 43200,
        }
    }
}

impl TryFrom<i32> for Period {
    type Error = String;

    fn try_from(minutes: i32) -> Result<Self, Self::Error> {
        match minutes {
            1 => Ok(Self::M1),
            5 => Ok(Self::M5),
            15 => Ok(Self::M15),
            30 => Ok(Self::M30),
            60 => Ok(Self::H1),
            240 => Ok(Self::H4),
            1440 => Ok(Self::D1),
            10080 => Ok(Self::W1),
            43200 => Ok(Self::MN1),
            other => Err(format!("invalid period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TradeCmd {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
    Balance,
    Credit,
}

impl From<TradeCmd> for i32 {
    fn from(cmd: TradeCmd) -> Self {
        match cmd {
            TradeCmd::Buy => 0,
            TradeCmd::Sell => 1,
            TradeCmd::BuyLimit => 2,
            TradeCmd::SellLimit => 3,
            TradeCmd::BuyStop => 4,
            TradeCmd::SellStop => 5,
            TradeCmd::Balance => 6,
            TradeCmd::Credit => 7,
        }
    }
}

impl TryFrom<i32> for TradeCmd {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Buy),
            1 => Ok(Self::Sell),
            2 => Ok(Self::BuyLimit),
            3 => Ok(Self::SellLimit),
            4 => Ok(Self::BuyStop),
            5 => Ok(Self::SellStop),
            6 => Ok(Self::Balance),
            7 => Ok(Self::Credit),
            other => Err(format!("invalid trade command: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TradeType {
    Open,
    Pending,
    Close,
    Modify,
    Delete,
}

impl From<TradeType> for i32 {
    fn from(kind: TradeType) -> Self {
        match kind {
            TradeType::Open => 0,
            TradeType::Pending => 1,
            TradeType::Close => 2,
            TradeType::Modify => 3,
            TradeType::Delete => 4,
        }
    }
}

impl TryFrom<i32> for TradeType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Close),
            3 => Ok(Self::Modify),
            4 => Ok(Self::Delete),
            other => Err(format!("invalid trade type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum RequestStatus {
    Error,
    Pending,
    Accepted,
    Rejected,
}

impl From<RequestStatus> for i32 {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Error => 0,
            RequestStatus::Pending => 1,
            RequestStatus::Accepted => 3,
            RequestStatus::Rejected => 4,
        }
    }
}

impl TryFrom<i32> for RequestStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, String> {
        match value {
            0 => Ok(RequestStatus::Error),
            1 => Ok(Self::Pending),
            3 => Ok(Self::Accepted),
            4 => Ok(Self::Rejected),
            other => Err(format!("invalid request status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub ask: f64,
    pub bid: f64,
    pub category_name: String,
    pub contract_size: i64,
    pub currency: String,
    pub currency_pair: bool,
    pub currency_profit: String,
    pub description: String,
    pub expiration: Option<i64>,
    pub group_name: String,
    pub high: f64,
    pub initial_margin: f64,
    pub instant_max_volume: f64,
    pub leverage: f64,
    pub long_only: bool,
    pub lot_max: f64,
    pub lot_min: f64,
    pub lot_step: f64,
    pub low: f64,
    pub margin_hedged: f64,
    pub margin_hedged_strong: bool,
    pub margin_maintenance: Option<f64>,
    pub margin_mode: i32,
    pub percentage: f64,
    pub precision: i32,
    pub profit_mode: i32,
    pub quote_id: i32,
    pub short_selling: bool,
    pub spread_raw: f64,
    pub spread_table: f64,
    pub starting: Option<i64>,
    pub step_rule_id: i32,
    pub stops_level: i32,
    #[serde(rename = "swap_rollover3days")]
    pub swap_rollover_3_days: i32,
    pub swap_enable: bool,
    pub swap_long: f64,
    pub swap_short: f64,
    pub swap_type: i32,
    pub symbol: String,
    pub tick_size: f64,
    pub tick_value: f64,
    pub time: i64,
    pub time_string: String,
    pub trailing_enabled: bool,
    #[serde(rename = "type")]
    pub instrument_type: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    pub country: String,
    pub current: String,
    pub forecast: String,
    pub impact: String,
    pub period: String,
    pub previous: String,
    pub time: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartLastInfo {
    pub period: Period,
    pub start: i64,
    pub symbol: String,
}

impl ChartLastInfo {
    /// Candles for `symbol` from `start` until now
    pub fn since(symbol: impl Into<String>, period: Period, start: DateTime<Utc>) -> Self {
        Self {
            period,
            start: start.timestamp_millis(),
            symbol: symbol.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRangeInfo {
    pub end: i64,
    pub period: Period,
    pub start: i64,
    pub symbol: String,
    /// When non-zero, overrides `end` with a candle count (negative counts back from `start`)
    pub ticks: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateInfo {
    pub close: f64,
    pub ctm: i64,
    pub ctm_string: String,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub vol: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub digits: i32,
    pub rate_infos: Vec<RateInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionData {
    pub commission: f64,
    pub rate_of_exchange: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub company_unit: i32,
    pub currency: String,
    pub group: String,
    pub ib_account: bool,
    pub leverage: i32,
    pub leverage_multiplier: f64,
    pub spread_type: Option<String>,
    pub trailing_stop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginData {
    pub balance: f64,
    pub credit: f64,
    pub currency: String,
    pub equity: f64,
    pub margin: f64,
    pub margin_free: f64,
    pub margin_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsTopic {
    pub body: String,
    pub body_len: i64,
    pub key: String,
    pub time: i64,
    pub time_string: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub time: i64,
    pub time_string: String,
}

impl ServerTime {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub close_price: f64,
    pub close_time: Option<i64>,
    #[serde(rename = "close_timeString")]
    pub close_time_string: Option<String>,
    pub closed: bool,
    pub cmd: TradeCmd,
    pub comment: String,
    pub commission: f64,
    #[serde(rename = "customComment")]
    pub custom_comment: Option<String>,
    pub digits: i32,
    pub expiration: Option<i64>,
    #[serde(rename = "expirationString")]
    pub expiration_string: Option<String>,
    pub margin_rate: f64,
    pub offset: i32,
    pub open_price: f64,
    pub open_time: i64,
    #[serde(rename = "open_timeString")]
    pub open_time_string: String,
    pub order: i64,
    pub order2: i64,
    pub position: i64,
    pub profit: Option<f64>,
    pub sl: f64,
    pub storage: f64,
    pub symbol: Option<String>,
    pub timestamp: i64,
    pub tp: f64,
    pub volume: f64,
}

impl TradeRecord {
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.open_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeTransInfo {
    pub cmd: TradeCmd,
    pub custom_comment: String,
    pub expiration: i64,
    pub offset: i32,
    pub order: i64,
    pub price: f64,
    pub sl: f64,
    pub symbol: String,
    pub tp: f64,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub volume: f64,
}

impl TradeTransInfo {
    /// Market order opening a new position
    pub fn open(symbol: impl Into<String>, cmd: TradeCmd, volume: f64, price: f64) -> Self {
        Self {
            cmd,
            custom_comment: String::new(),
            expiration: 0,
            offset: 0,
            order: 0,
            price,
            sl: 0.0,
            symbol: symbol.into(),
            tp: 0.0,
            trade_type: TradeType::Open,
            volume,
        }
    }

    pub fn with_stops(mut self, sl: f64, tp: f64) -> Self {
        self.sl = sl;
        self.tp = tp;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.custom_comment = comment.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderId {
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub ask: f64,
    pub bid: f64,
    pub custom_comment: Option<String>,
    pub message: Option<String>,
    pub order: i64,
    pub request_status: RequestStatus,
}
