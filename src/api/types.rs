//! Wire types for the Polymarket Data API and the Polygon JSON-RPC endpoint.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{PositionValue, TradeEvent, TradeSide};

/// Position response from /positions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub condition_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outcome: String,
    pub size: Decimal,
    #[serde(default)]
    pub current_value: Decimal,
}

impl From<PositionResponse> for PositionValue {
    fn from(p: PositionResponse) -> Self {
        PositionValue {
            market_id: p.condition_id,
            title: p.title,
            outcome: p.outcome,
            size: p.size,
            current_value: p.current_value,
        }
    }
}

/// Trade response from /trades endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub proxy_wallet: String,
    pub side: String,
    #[serde(default)]
    pub asset: String,
    pub condition_id: String,
    pub size: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub transaction_hash: String,
}

impl TradeResponse {
    /// Validate a raw row and turn it into a [`TradeEvent`].
    ///
    /// Rows without a transaction hash, asset, known side or sane price are dropped.
    pub fn into_event(self) -> Option<TradeEvent> {
        let Some(side) = TradeSide::parse(&self.side) else {
            warn!(side = %self.side, tx = %self.transaction_hash, "Unknown trade side, dropping row");
            return None;
        };

        if self.transaction_hash.is_empty() || self.asset.is_empty() {
            warn!(market = %self.condition_id, "Trade row missing hash or asset, dropping row");
            return None;
        }

        if self.price <= Decimal::ZERO || self.price > Decimal::ONE || self.size <= Decimal::ZERO {
            warn!(
                tx = %self.transaction_hash,
                price = %self.price,
                size = %self.size,
                "Trade row has invalid price or size, dropping row"
            );
            return None;
        }

        let Some(timestamp) = Utc.timestamp_opt(self.timestamp, 0).single() else {
            warn!(tx = %self.transaction_hash, ts = self.timestamp, "Invalid trade timestamp, dropping row");
            return None;
        };

        Some(TradeEvent {
            trader_address: self.proxy_wallet.to_lowercase(),
            trade_id: self.transaction_hash,
            side,
            amount: self.size * self.price,
            price: self.price,
            size: self.size,
            market_id: self.condition_id,
            asset_id: self.asset,
            slug: self.slug,
            outcome: self.outcome,
            title: self.title,
            timestamp,
            detected_at: Utc::now(),
        })
    }
}

/// JSON-RPC request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: serde_json::Value,
    pub id: u64,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Response from CLOB order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "orderID", alias = "orderId", default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Outcome tokens received (BUY) or USDC received (SELL), as a decimal string
    #[serde(default)]
    pub taking_amount: Option<String>,
    /// USDC paid (BUY) or tokens given (SELL), as a decimal string
    #[serde(default)]
    pub making_amount: Option<String>,
}
