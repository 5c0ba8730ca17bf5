//! Polymarket Data API client for trade history and open positions.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::models::{PositionValue, TradeEvent};

use super::error::ApiError;
use super::types::{PositionResponse, TradeResponse};

pub const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const MAX_PAGE: u32 = 500;

/// Source of recent trades for a wallet.
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Most recent trades for `address`, newest first as the venue returns them.
    async fn recent_trades(&self, address: &str) -> Result<Vec<TradeEvent>, ApiError>;
}

/// Client for Polymarket Data API (read-only operations).
#[derive(Clone)]
pub struct DataClient {
    client: Client,
    base_url: String,
    trade_limit: u32,
}

impl DataClient {
    /// Create a new data client. `timeout` bounds every request.
    pub fn new(timeout: Duration, trade_limit: u32) -> Result<Self, ApiError> {
        Self::with_base_url(DATA_API_BASE.to_string(), timeout, trade_limit)
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String, timeout: Duration, trade_limit: u32) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            trade_limit: trade_limit.clamp(1, MAX_PAGE),
        })
    }

    /// Fetch open positions for a wallet.
    pub async fn get_positions(&self, address: &str) -> Result<Vec<PositionValue>, ApiError> {
        let url = format!("{}/positions?user={}&sizeThreshold=0", self.base_url, address);

        debug!(url = %url, "Fetching positions");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }

        let items: Vec<PositionResponse> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("positions: {e}")))?;

        Ok(items.into_iter().map(PositionValue::from).collect())
    }

    /// Fetch the latest taker trades for a wallet.
    pub async fn get_trades(&self, address: &str) -> Result<Vec<TradeEvent>, ApiError> {
        let url = format!(
            "{}/trades?user={}&takerOnly=true&limit={}",
            self.base_url, address, self.trade_limit
        );

        debug!(url = %url, "Fetching trades");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }

        let items: Vec<TradeResponse> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("trades: {e}")))?;

        let fetched = items.len();
        let trades: Vec<TradeEvent> = items
            .into_iter()
            .filter_map(TradeResponse::into_event)
            .map(|mut t| {
                // The API echoes the proxy wallet; key everything by the address we asked for
                t.trader_address = address.to_lowercase();
                t
            })
            .collect();

        debug!(address, fetched, valid = trades.len(), "Fetched trades");
        Ok(trades)
    }
}

#[async_trait]
impl TradeSource for DataClient {
    async fn recent_trades(&self, address: &str) -> Result<Vec<TradeEvent>, ApiError> {
        self.get_trades(address).await
    }
}
