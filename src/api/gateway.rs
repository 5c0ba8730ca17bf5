//! Order submission seam.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::models::{CopyOrder, Fill};

use super::error::ApiError;

/// Submits sized orders to the venue.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit(&self, order: &CopyOrder) -> Result<Fill, ApiError>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Gateway that never touches the venue and fills at the source price.
#[derive(Debug, Clone, Default)]
pub struct DryRunGateway;

#[async_trait]
impl OrderGateway for DryRunGateway {
    async fn submit(&self, order: &CopyOrder) -> Result<Fill, ApiError> {
        if order.price <= Decimal::ZERO {
            return Err(ApiError::Rejected(format!("invalid price {}", order.price)));
        }

        let fill = Fill {
            tokens_filled: order.token_size(),
            total_cost: order.amount,
        };

        info!(
            trade_id = %order.source_trade_id,
            side = %order.side,
            amount = %order.amount,
            price = %order.price,
            tokens = %fill.tokens_filled.round_dp(4),
            "[DRY RUN] Order simulated"
        );

        Ok(fill)
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_dry_run_fills_at_source_price() {
        let trade = crate::testing::trade("0xaaa", "0x01", Utc::now());
        let order = CopyOrder::from_trade(&trade, dec!(0.10), dec!(500), dec!(5000));

        let fill = tokio_test::assert_ok!(DryRunGateway.submit(&order).await);
        assert_eq!(fill.total_cost, dec!(10.00));
        assert_eq!(fill.tokens_filled.round_dp(2), dec!(16.67));
    }
}
