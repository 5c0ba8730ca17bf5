//! Detection and execution outcomes, and where they are delivered.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::models::{CopyOrder, ErrorKind, OrderResult, TradeEvent};

/// Why a detected trade was not turned into an order.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Trader capital was zero or could not be fetched
    NoTraderCapital,
    /// Operator capital was zero, so the ratio collapsed to 0
    ZeroRatio,
    /// Sized amount fell under the configured floor
    BelowMinimum { amount: Decimal, minimum: Decimal },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoTraderCapital => f.write_str("trader capital unavailable"),
            SkipReason::ZeroRatio => f.write_str("copy ratio is zero"),
            SkipReason::BelowMinimum { amount, minimum } => {
                write!(f, "amount ${:.4} below minimum ${}", amount, minimum)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Detected(TradeEvent),
    Filtered { trade: TradeEvent, reason: SkipReason },
    Executed { order: CopyOrder, result: OrderResult },
    Failed { order: CopyOrder, result: OrderResult },
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Detected(_) => "detected",
            Outcome::Filtered { .. } => "filtered",
            Outcome::Executed { .. } => "executed",
            Outcome::Failed { .. } => "failed",
        }
    }

    /// Source trade id the outcome refers to.
    pub fn trade_id(&self) -> &str {
        match self {
            Outcome::Detected(trade) | Outcome::Filtered { trade, .. } => &trade.trade_id,
            Outcome::Executed { order, .. } | Outcome::Failed { order, .. } => &order.source_trade_id,
        }
    }
}

/// Receives every outcome produced by the pipeline.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn record(&self, outcome: &Outcome);
}

/// Sink that emits structured log events.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl OutcomeSink for TracingSink {
    async fn record(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Detected(t) => info!(
                trader = %t.trader_address,
                trade_id = %t.trade_id,
                side = %t.side,
                amount = %t.amount.round_dp(2),
                price = %t.price,
                market = %t.title,
                outcome = %t.outcome,
                "New trade detected"
            ),
            Outcome::Filtered { trade, reason } => info!(
                trader = %trade.trader_address,
                trade_id = %trade.trade_id,
                reason = %reason,
                "Trade skipped"
            ),
            Outcome::Executed { order, result } => info!(
                trader = %order.trader_address,
                trade_id = %order.source_trade_id,
                side = %order.side,
                amount = %order.amount.round_dp(2),
                ratio = %order.copy_ratio.round_dp(4),
                tokens = ?result.tokens_filled.map(|t| t.round_dp(4)),
                cost = ?result.total_cost.map(|c| c.round_dp(2)),
                attempts = result.attempts,
                "Copy trade executed"
            ),
            Outcome::Failed { order, result } => {
                let kind = result.error_kind.map(|k| k.as_str()).unwrap_or("unknown");
                let message = result.error_message.as_deref().unwrap_or("");
                if matches!(result.error_kind, None | Some(ErrorKind::Unknown)) {
                    error!(
                        trader = %order.trader_address,
                        trade_id = %order.source_trade_id,
                        asset = %order.asset_id,
                        side = %order.side,
                        amount = %order.amount,
                        price = %order.price,
                        attempts = result.attempts,
                        error = %message,
                        "Copy trade failed with unclassified error"
                    );
                } else {
                    warn!(
                        trader = %order.trader_address,
                        trade_id = %order.source_trade_id,
                        kind,
                        attempts = result.attempts,
                        error = %message,
                        "Copy trade failed"
                    );
                }
            }
        }
    }
}

/// Delivers each outcome to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl OutcomeSink for FanoutSink {
    async fn record(&self, outcome: &Outcome) {
        for sink in &self.sinks {
            sink.record(outcome).await;
        }
    }
}
