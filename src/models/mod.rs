//! Data models for trade events, mirror orders, balances and trader state.

mod balance;
mod order;
mod trade;
mod trader;

pub use balance::{PositionValue, WalletBalance};
pub use order::{CopyOrder, ErrorKind, Fill, OrderResult};
pub use trade::{TradeEvent, TradeSide};
pub use trader::TraderBook;
