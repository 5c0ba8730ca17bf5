//! Capital-proportional sizing of copy orders.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{CopyOrder, TradeEvent};
use crate::outcome::SkipReason;

/// Sizing limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingConfig {
    /// Upper bound on the copy ratio
    pub max_ratio: Decimal,

    /// Orders below this USDC amount are skipped
    pub min_trade_size: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            max_ratio: dec!(1.0),
            min_trade_size: dec!(1.0),
        }
    }
}

/// `clamp(operator / trader, 0, max_ratio)`, or `None` when the trader has no capital.
pub fn copy_ratio(operator_capital: Decimal, trader_capital: Decimal, max_ratio: Decimal) -> Option<Decimal> {
    if trader_capital <= Decimal::ZERO {
        return None;
    }

    let raw = operator_capital / trader_capital;
    Some(raw.max(Decimal::ZERO).min(max_ratio.max(Decimal::ZERO)))
}

/// Turn a detected trade into a copy order, or explain why it is skipped.
pub fn size_order(
    trade: &TradeEvent,
    operator_capital: Decimal,
    trader_capital: Decimal,
    config: &SizingConfig,
) -> Result<CopyOrder, SkipReason> {
    let ratio = copy_ratio(operator_capital, trader_capital, config.max_ratio).ok_or(SkipReason::NoTraderCapital)?;
    if ratio.is_zero() {
        return Err(SkipReason::ZeroRatio);
    }

    let order = CopyOrder::from_trade(trade, ratio, operator_capital, trader_capital);
    if order.amount < config.min_trade_size {
        return Err(SkipReason::BelowMinimum {
            amount: order.amount,
            minimum: config.min_trade_size,
        });
    }

    Ok(order)
}
