//! Wallet balances: cash plus the current value of open positions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current value of one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValue {
    /// Market condition ID
    pub market_id: String,

    /// Market title for display
    #[serde(default)]
    pub title: String,

    /// Outcome token held
    #[serde(default)]
    pub outcome: String,

    /// Number of outcome tokens held
    pub size: Decimal,

    /// Current market value in USDC
    pub current_value: Decimal,
}

/// Snapshot of a wallet's funds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Free USDC on the wallet
    pub cash: Decimal,

    /// Open positions
    #[serde(default)]
    pub positions: Vec<PositionValue>,
}

impl WalletBalance {
    pub fn new(cash: Decimal, positions: Vec<PositionValue>) -> Self {
        Self { cash, positions }
    }

    /// Total value of all open positions.
    pub fn positions_value(&self) -> Decimal {
        self.positions.iter().map(|p| p.current_value).sum()
    }

    /// Capital used for sizing: cash + positions.
    pub fn capital(&self) -> Decimal {
        self.cash + self.positions_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(value: Decimal) -> PositionValue {
        PositionValue {
            market_id: "0xmarket".to_string(),
            title: "Test Market".to_string(),
            outcome: "Yes".to_string(),
            size: dec!(10),
            current_value: value,
        }
    }

    #[test]
    fn test_capital_is_cash_plus_positions() {
        let balance = WalletBalance::new(dec!(120.50), vec![position(dec!(30)), position(dec!(49.50))]);
        assert_eq!(balance.positions_value(), dec!(79.50));
        assert_eq!(balance.capital(), dec!(200.00));
    }

    #[test]
    fn test_empty_wallet_has_zero_capital() {
        assert_eq!(WalletBalance::default().capital(), Decimal::ZERO);
    }
}
