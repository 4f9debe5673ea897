use super::client::ApiClient;
use super::types::{OrderId, TradeRecord, TradeTransInfo, TransactionStatus};
use crate::core::errors::CallError;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TradesArguments {
    opened_only: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionArguments<'a> {
    trade_trans_info: &'a TradeTransInfo,
}

#[derive(Serialize)]
struct OrderArguments {
    order: i64,
}

impl ApiClient {
    #[instrument(skip(self))]
    pub async fn get_trades(&self, opened_only: bool) -> Result<Vec<TradeRecord>, CallError> {
        self.request("getTrades", Some(&TradesArguments { opened_only }))
            .await
    }

    /// Submit an order; acceptance only, check `trade_transaction_status` for the outcome
    #[instrument(skip(self, trade_trans_info), fields(symbol = %trade_trans_info.symbol, cmd = ?trade_trans_info.cmd))]
    pub async fn trade_transaction(
        &self,
        trade_trans_info: &TradeTransInfo,
    ) -> Result<OrderId, CallError> {
        let order: OrderId = self
            .request("tradeTransaction", Some(&TransactionArguments { trade_trans_info }))
            .await?;
        info!(order = order.order, "Order accepted");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn trade_transaction_status(&self, order: i64) -> Result<TransactionStatus, CallError> {
        self.request("tradeTransactionStatus", Some(&OrderArguments { order }))
            .await
    }
}
