//! Trading pipeline: monitor -> queue -> executor, plus order sizing.

mod executor;
mod monitor;
pub mod queue;
mod sizing;

pub use executor::{ExecutorConfig, TradeExecutor};
pub use monitor::{MonitorConfig, TradeMonitor};
pub use queue::trade_queue;
pub use sizing::SizingConfig;
