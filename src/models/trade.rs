//! Trade events detected on target wallets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Parse a side as reported by the data API (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade observed on a target wallet that has not been mirrored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Target wallet that made the trade
    pub trader_address: String,

    /// Unique trade identifier (originating transaction hash)
    pub trade_id: String,

    /// Trade direction
    pub side: TradeSide,

    /// Notional value of the trade in USDC
    pub amount: Decimal,

    /// Price per outcome token (0.0 to 1.0)
    pub price: Decimal,

    /// Number of outcome tokens traded
    pub size: Decimal,

    /// Market condition ID
    pub market_id: String,

    /// CLOB token ID of the traded outcome
    pub asset_id: String,

    /// Market slug
    #[serde(default)]
    pub slug: String,

    /// Outcome label ("Yes", "No", ...)
    #[serde(default)]
    pub outcome: String,

    /// Market title for display
    #[serde(default)]
    pub title: String,

    /// When the trade happened on the venue
    pub timestamp: DateTime<Utc>,

    /// When the monitor picked it up
    pub detected_at: DateTime<Utc>,
}

impl TradeEvent {
    /// Ordering key used for per-trader chronological emission.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.trade_id.as_str())
    }

    /// Age of the trade relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
