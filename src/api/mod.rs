//! Polymarket API clients for trade detection and order execution.

mod clob_client;
mod data_client;
mod error;
mod gateway;
mod types;

pub use clob_client::ClobClient;
pub use data_client::{DataClient, TradeSource};
pub use error::ApiError;
pub use gateway::{DryRunGateway, OrderGateway};
pub use types::{RpcRequest, RpcResponse};
