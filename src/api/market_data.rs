use super::client::ApiClient;
use super::types::{
    Calendar, ChartData, ChartLastInfo, ChartRangeInfo, NewsTopic, ServerTime, SymbolInfo, Version,
};
use crate::core::errors::CallError;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

#[derive(Serialize)]
struct SymbolArguments<'a> {
    symbol: &'a str,
}

#[derive(Serialize)]
struct ChartArguments<'a, I> {
    info: &'a I,
}

#[derive(Serialize)]
struct NewsArguments {
    start: i64,
    end: i64,
}

impl ApiClient {
    /// Every instrument available to the account
    #[instrument(skip(self))]
    pub async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>, CallError> {
        self.request::<(), _>("getAllSymbols", None).await
    }

    #[instrument(skip(self))]
    pub async fn get_symbol(&self, symbol: &str) -> Result<SymbolInfo, CallError> {
        self.request("getSymbol", Some(&SymbolArguments { symbol }))
            .await
    }

    /// Upcoming economic calendar events
    #[instrument(skip(self))]
    pub async fn get_calendar(&self) -> Result<Vec<Calendar>, CallError> {
        self.request::<(), _>("getCalendar", None).await
    }

    /// Candles from `info.start` until now
    ///
    /// The venue caps the history it returns depending on the period, so the
    /// first candle may be later than requested.
    #[instrument(skip(self))]
    pub async fn get_chart_last_request(&self, info: &ChartLastInfo) -> Result<ChartData, CallError> {
        self.request("getChartLastRequest", Some(&ChartArguments { info }))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_chart_range_request(
        &self,
        info: &ChartRangeInfo,
    ) -> Result<ChartData, CallError> {
        self.request("getChartRangeRequest", Some(&ChartArguments { info }))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_server_time(&self) -> Result<ServerTime, CallError> {
        self.request::<(), _>("getServerTime", None).await
    }

    /// Version of the venue's API
    #[instrument(skip(self))]
    pub async fn get_version(&self) -> Result<String, CallError> {
        let version: Version = self.request::<(), _>("getVersion", None).await?;
        Ok(version.version)
    }

    /// News between two millisecond timestamps; `end == 0` means until now
    #[instrument(skip(self))]
    pub async fn get_news(&self, start: i64, end: i64) -> Result<Vec<NewsTopic>, CallError> {
        self.request("getNews", Some(&NewsArguments { start, end }))
            .await
    }

    /// Keep the call session alive
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), CallError> {
        self.request::<(), Value>("ping", None).await?;
        Ok(())
    }
}
