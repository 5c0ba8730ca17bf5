//! Mirror orders and their outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trade::{TradeEvent, TradeSide};

/// Classification of a failed venue or network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity problems, timeouts, 429/5xx responses. Retried.
    TransientNetwork,
    /// Not enough USDC or token allowance on the proxy wallet.
    InsufficientBalance,
    /// The venue refused the order (price moved, market closed, FOK unfilled).
    RejectedOrder,
    /// Anything we could not classify.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::RejectedOrder => "rejected_order",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientNetwork)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirror order derived from a [`TradeEvent`] after sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyOrder {
    /// Identifier of the source trade
    pub source_trade_id: String,

    /// Target wallet the trade was copied from
    pub trader_address: String,

    /// CLOB token to trade
    pub asset_id: String,

    /// Market condition ID
    pub market_id: String,

    pub side: TradeSide,

    /// USDC notional to spend (BUY) or receive (SELL)
    pub amount: Decimal,

    /// Reference price taken from the source trade
    pub price: Decimal,

    /// Proxy wallet capital when the decision was made
    pub operator_capital: Decimal,

    /// Target wallet capital when the decision was made
    pub trader_capital: Decimal,

    /// Applied copy ratio
    pub copy_ratio: Decimal,

    pub created_at: DateTime<Utc>,
}

impl CopyOrder {
    /// Build the order for `trade` scaled by `copy_ratio`.
    pub fn from_trade(
        trade: &TradeEvent,
        copy_ratio: Decimal,
        operator_capital: Decimal,
        trader_capital: Decimal,
    ) -> Self {
        Self {
            source_trade_id: trade.trade_id.clone(),
            trader_address: trade.trader_address.clone(),
            asset_id: trade.asset_id.clone(),
            market_id: trade.market_id.clone(),
            side: trade.side,
            amount: trade.amount * copy_ratio,
            price: trade.price,
            operator_capital,
            trader_capital,
            copy_ratio,
            created_at: Utc::now(),
        }
    }

    /// Token quantity implied by amount and price.
    pub fn token_size(&self) -> Decimal {
        if self.price.is_zero() {
            return Decimal::ZERO;
        }
        self.amount / self.price
    }
}

/// Fill reported by the order gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub tokens_filled: Decimal,
    pub total_cost: Decimal,
}

/// Recorded outcome of submitting a [`CopyOrder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub tokens_filled: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Number of submission attempts made (retries included)
    pub attempts: u32,
}

impl OrderResult {
    pub fn filled(fill: Fill, attempts: u32) -> Self {
        Self {
            success: true,
            tokens_filled: Some(fill.tokens_filled),
            total_cost: Some(fill.total_cost),
            error_kind: None,
            error_message: None,
            attempts,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            tokens_filled: None,
            total_cost: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            attempts,
        }
    }
}
