//! Wallet capital lookup: USDC cash on Polygon plus open position value.

use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::api::{ApiError, DataClient, RpcRequest, RpcResponse};
use crate::models::WalletBalance;
use crate::retry::{with_retry, with_timeout, RetryPolicy};

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "0x70a08231";
const USDC_DECIMALS: u32 = 6;

/// Returns cash and open-position value for any wallet.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balance(&self, address: &str) -> Result<WalletBalance, ApiError>;
}

/// Balance provider backed by a Polygon RPC node and the Data API.
pub struct PolygonBalanceProvider {
    http: Client,
    rpc_url: String,
    usdc_contract: String,
    data: DataClient,
}

impl PolygonBalanceProvider {
    pub fn new(rpc_url: &str, usdc_contract: &str, data: DataClient, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            rpc_url: rpc_url.to_string(),
            usdc_contract: usdc_contract.to_string(),
            data,
        })
    }

    /// USDC balance via `eth_call` on the token contract.
    pub async fn usdc_balance(&self, address: &str) -> Result<Decimal, ApiError> {
        let payload = RpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: serde_json::json!([
                { "to": self.usdc_contract, "data": balance_of_calldata(address) },
                "latest"
            ]),
            id: 1,
        };

        let response = self.http.post(&self.rpc_url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("rpc response: {e}")))?;

        if let Some(err) = body.error {
            return Err(ApiError::Decode(format!("rpc error {}: {}", err.code, err.message)));
        }

        let raw = body
            .result
            .ok_or_else(|| ApiError::Decode("rpc response without result".into()))?;

        let cash = parse_usdc(&raw)?;
        debug!(address, cash = %cash, "Fetched USDC balance");
        Ok(cash)
    }
}

#[async_trait]
impl BalanceProvider for PolygonBalanceProvider {
    async fn get_balance(&self, address: &str) -> Result<WalletBalance, ApiError> {
        let (cash, positions) = tokio::try_join!(self.usdc_balance(address), self.data.get_positions(address))?;
        Ok(WalletBalance::new(cash, positions))
    }
}

/// Capital of `address`, or zero when the balance cannot be fetched.
///
/// The lookup is bounded by `timeout` per attempt and retried on transient failures.
pub async fn capital_or_zero(
    provider: &dyn BalanceProvider,
    address: &str,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Decimal {
    let (result, attempts) =
        with_retry(policy, "balance", || with_timeout(timeout, provider.get_balance(address))).await;

    match result {
        Ok(balance) => balance.capital(),
        Err(e) => {
            warn!(
                address,
                attempts,
                kind = %e.kind(),
                error = %e,
                "Balance lookup failed, treating capital as 0"
            );
            Decimal::ZERO
        }
    }
}

fn balance_of_calldata(address: &str) -> String {
    let trimmed = address.trim_start_matches("0x").to_lowercase();
    format!("{BALANCE_OF_SELECTOR}{trimmed:0>64}")
}

/// Parse a hex `uint256` into a USDC amount.
fn parse_usdc(raw: &str) -> Result<Decimal, ApiError> {
    let hex = raw.trim_start_matches("0x");
    if hex.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let units = U256::from_str_radix(hex, 16).map_err(|e| ApiError::Decode(format!("balance {raw}: {e}")))?;
    let units = Decimal::from_str(&units.to_string()).map_err(|e| ApiError::Decode(format!("balance {raw}: {e}")))?;

    Ok(units / Decimal::from(10u64.pow(USDC_DECIMALS)))
}
