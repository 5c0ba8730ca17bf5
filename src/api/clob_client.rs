//! Polymarket CLOB (Central Limit Order Book) client for order execution.
//!
//! The CLOB is Polymarket's off-chain order matching engine that settles on Polygon.
//! This client handles:
//! - L2 request authentication (HMAC-SHA256 over timestamp, method, path and body)
//! - Order signing using EIP-712 typed data, with the proxy wallet as maker
//! - Fill-or-kill market orders sized in USDC

use alloy_primitives::{Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE as BASE64_URL_SAFE},
    Engine,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{CopyOrder, Fill, TradeSide};

use super::error::ApiError;
use super::gateway::OrderGateway;
use super::types::OrderResponse;

type HmacSha256 = Hmac<Sha256>;

/// CLOB API base URL
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Slippage allowed on top of the best level for market orders (1%).
const SLIPPAGE_BPS: i64 = 100;

/// Signature type for CLOB orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    /// EOA signature
    Eoa = 0,
    /// Polymarket proxy signature
    Poly = 1,
    /// Polymarket proxy signature (gnosis safe)
    PolyGnosisSafe = 2,
}

impl SignatureType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SignatureType::Eoa),
            1 => Some(SignatureType::Poly),
            2 => Some(SignatureType::PolyGnosisSafe),
            _ => None,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Fill-or-kill market order
    Fok,
}

/// Signed order ready for submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Order submission request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: OrderType,
}

/// Order book entry
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
}

/// Order book response
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

/// Unsigned order fields, amounts in 6-decimal base units.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderData {
    salt: u64,
    maker: Address,
    signer: Address,
    token_id: U256,
    maker_amount: U256,
    taker_amount: U256,
    side: TradeSide,
    signature_type: SignatureType,
}

/// CLOB API client for executing trades on Polymarket.
pub struct ClobClient {
    http: Client,
    signer: PrivateKeySigner,
    funder: Address,
    signature_type: SignatureType,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    chain_id: u64,
    base_url: String,
}

impl ClobClient {
    /// Create a new CLOB client.
    ///
    /// # Arguments
    /// * `private_key` - Ethereum private key of the signing EOA (hex, with or without 0x prefix)
    /// * `funder` - Proxy wallet that holds the funds and acts as order maker
    /// * `api_key` / `api_secret` / `api_passphrase` - L2 API credentials
    /// * `chain_id` - Polygon chain ID (137 for mainnet, 80002 for Amoy testnet)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        private_key: &str,
        funder: &str,
        signature_type: SignatureType,
        api_key: &str,
        api_secret: &str,
        api_passphrase: &str,
        chain_id: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;
        let funder = Address::from_str(funder).context("Invalid proxy wallet address")?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            signer,
            funder,
            signature_type,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            api_passphrase: api_passphrase.to_string(),
            chain_id,
            base_url: CLOB_URL.to_string(),
        })
    }

    /// Create from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - POLYMARKET_API_KEY
    /// - POLYMARKET_API_SECRET
    /// - POLYMARKET_API_PASSPHRASE
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    /// - POLYMARKET_SIGNATURE_TYPE (defaults to 1, Polymarket proxy)
    /// - CLOB_HTTP_URL (defaults to the public endpoint)
    pub fn from_env(funder: &str, timeout: Duration) -> Result<Self> {
        let private_key = std::env::var("POLYMARKET_PRIVATE_KEY").context("POLYMARKET_PRIVATE_KEY not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY").context("POLYMARKET_API_KEY not set")?;
        let api_secret = std::env::var("POLYMARKET_API_SECRET").context("POLYMARKET_API_SECRET not set")?;
        let api_passphrase =
            std::env::var("POLYMARKET_API_PASSPHRASE").context("POLYMARKET_API_PASSPHRASE not set")?;
        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;
        let signature_type = std::env::var("POLYMARKET_SIGNATURE_TYPE")
            .unwrap_or_else(|_| "1".to_string())
            .parse::<u8>()
            .ok()
            .and_then(SignatureType::from_u8)
            .context("Invalid POLYMARKET_SIGNATURE_TYPE (expected 0, 1 or 2)")?;

        let mut client = Self::new(
            &private_key,
            funder,
            signature_type,
            &api_key,
            &api_secret,
            &api_passphrase,
            chain_id,
            timeout,
        )?;

        if let Ok(url) = std::env::var("CLOB_HTTP_URL") {
            client.base_url = url.trim_end_matches('/').to_string();
        }

        info!(
            signer = %client.address(),
            funder = %client.funder,
            chain_id,
            "CLOB client initialized"
        );
        Ok(client)
    }

    /// Get the signing wallet address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get order book for a token.
    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ApiError> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id);
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }

        resp.json()
            .await
            .map_err(|e| ApiError::Decode(format!("order book: {e}")))
    }

    /// Best price we can cross at, with slippage applied.
    ///
    /// Falls back to the reference price when that side of the book is empty.
    async fn marketable_price(&self, order: &CopyOrder) -> Result<Decimal, ApiError> {
        let book = self.get_order_book(&order.asset_id).await?;

        let best = match order.side {
            TradeSide::Buy => book
                .asks
                .iter()
                .filter_map(|l| Decimal::from_str(&l.price).ok())
                .min(),
            TradeSide::Sell => book
                .bids
                .iter()
                .filter_map(|l| Decimal::from_str(&l.price).ok())
                .max(),
        };

        let Some(best) = best else {
            return Err(ApiError::Rejected(format!(
                "no {} liquidity for token {}",
                if order.side == TradeSide::Buy { "ask" } else { "bid" },
                order.asset_id
            )));
        };

        let slippage = Decimal::new(SLIPPAGE_BPS, 4);
        let price = match order.side {
            TradeSide::Buy => (best * (Decimal::ONE + slippage)).min(Decimal::new(99, 2)),
            TradeSide::Sell => (best * (Decimal::ONE - slippage)).max(Decimal::new(1, 2)),
        };

        Ok(price.round_dp(2))
    }

    /// Place a fill-or-kill market order for the order's USDC amount.
    pub async fn market_order(&self, order: &CopyOrder) -> Result<Fill, ApiError> {
        let price = self.marketable_price(order).await?;
        let data = self.build_order(order, price)?;
        let signed = self.sign_order(&data).await?;

        let payload = OrderPayload {
            order: signed,
            owner: self.api_key.clone(),
            order_type: OrderType::Fok,
        };

        let body = serde_json::to_string(&payload).map_err(|e| ApiError::Decode(e.to_string()))?;
        let path = "/order";
        let headers = self.l2_headers("POST", path, &body)?;

        debug!(
            token = %order.asset_id,
            side = %order.side,
            amount = %order.amount,
            price = %price,
            "Submitting FOK order"
        );

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .headers(headers)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }

        let response: OrderResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("order response: {e}")))?;

        debug!(
            order_id = ?response.order_id,
            status = ?response.status,
            success = response.success,
            "Order response received"
        );

        fill_from_response(order, price, &response)
    }

    /// Compute maker/taker amounts for a market order.
    ///
    /// BUY: maker gives `amount` USDC, takes `amount / price` tokens.
    /// SELL: maker gives `amount / price` tokens, takes `amount` USDC.
    fn build_order(&self, order: &CopyOrder, price: Decimal) -> Result<OrderData, ApiError> {
        if price.is_zero() {
            return Err(ApiError::Rejected("zero price".into()));
        }

        let usdc = order.amount.round_dp(2);
        let tokens = (order.amount / price).round_dp(4);

        let (maker_amount, taker_amount) = match order.side {
            TradeSide::Buy => (to_base_units(usdc)?, to_base_units(tokens)?),
            TradeSide::Sell => (to_base_units(tokens)?, to_base_units(usdc)?),
        };

        let token_id = U256::from_str(&order.asset_id)
            .map_err(|e| ApiError::Signing(format!("invalid token id {}: {e}", order.asset_id)))?;

        let maker = match self.signature_type {
            SignatureType::Eoa => self.address(),
            _ => self.funder,
        };

        Ok(OrderData {
            salt: (uuid::Uuid::new_v4().as_u128() as u64) >> 11,
            maker,
            signer: self.address(),
            token_id,
            maker_amount,
            taker_amount,
            side: order.side,
            signature_type: self.signature_type,
        })
    }

    /// Sign an order using EIP-712 typed data.
    async fn sign_order(&self, data: &OrderData) -> Result<SignedOrder, ApiError> {
        let mut message = vec![0x19, 0x01];
        message.extend_from_slice(&self.domain_separator()?);
        message.extend_from_slice(&order_struct_hash(data)?);

        let digest = alloy_primitives::keccak256(&message);
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| ApiError::Signing(e.to_string()))?;

        Ok(SignedOrder {
            salt: data.salt,
            maker: data.maker.to_checksum(None),
            signer: data.signer.to_checksum(None),
            taker: ZERO_ADDRESS.to_string(),
            token_id: data.token_id.to_string(),
            maker_amount: data.maker_amount.to_string(),
            taker_amount: data.taker_amount.to_string(),
            side: data.side.as_str().to_string(),
            expiration: "0".to_string(),
            nonce: "0".to_string(),
            fee_rate_bps: "0".to_string(),
            signature_type: data.signature_type as u8,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Compute the EIP-712 domain separator.
    fn domain_separator(&self) -> Result<[u8; 32], ApiError> {
        let type_hash = alloy_primitives::keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let name_hash = alloy_primitives::keccak256(b"Polymarket CTF Exchange");
        let version_hash = alloy_primitives::keccak256(b"1");

        let mut encoded = Vec::with_capacity(32 * 5);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        encoded.extend_from_slice(&encode_address(parse_address(CTF_EXCHANGE)?));

        Ok(alloy_primitives::keccak256(&encoded).0)
    }

    /// Build L2 authentication headers for a request.
    fn l2_headers(&self, method: &str, path: &str, body: &str) -> Result<HeaderMap, ApiError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_l2(&self.api_secret, &timestamp, method, path, body)?;

        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| -> Result<(), ApiError> {
            let value = HeaderValue::from_str(value).map_err(|e| ApiError::Signing(e.to_string()))?;
            headers.insert(HeaderName::from_static(name), value);
            Ok(())
        };

        put("poly_address", &self.address().to_checksum(None))?;
        put("poly_signature", &signature)?;
        put("poly_timestamp", &timestamp)?;
        put("poly_api_key", &self.api_key)?;
        put("poly_passphrase", &self.api_passphrase)?;

        Ok(headers)
    }
}

#[async_trait]
impl OrderGateway for ClobClient {
    async fn submit(&self, order: &CopyOrder) -> Result<Fill, ApiError> {
        self.market_order(order).await
    }

    fn name(&self) -> &'static str {
        "clob"
    }
}

/// HMAC-SHA256 over `{timestamp}{method}{path}{body}`, keyed with the base64 API secret.
///
/// The result is URL-safe base64.
fn sign_l2(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String, ApiError> {
    let secret_bytes = BASE64_URL_SAFE
        .decode(secret)
        .or_else(|_| BASE64.decode(secret))
        .map_err(|e| ApiError::Signing(format!("invalid base64 secret: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes).map_err(|e| ApiError::Signing(e.to_string()))?;
    mac.update(format!("{timestamp}{method}{path}{body}").as_bytes());

    Ok(BASE64_URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Compute the EIP-712 order struct hash.
fn order_struct_hash(data: &OrderData) -> Result<[u8; 32], ApiError> {
    let type_hash = alloy_primitives::keccak256(
        b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
    );

    let side: u8 = match data.side {
        TradeSide::Buy => 0,
        TradeSide::Sell => 1,
    };

    let mut encoded = Vec::with_capacity(32 * 13);
    encoded.extend_from_slice(type_hash.as_slice());
    encoded.extend_from_slice(&U256::from(data.salt).to_be_bytes::<32>());
    encoded.extend_from_slice(&encode_address(data.maker));
    encoded.extend_from_slice(&encode_address(data.signer));
    encoded.extend_from_slice(&encode_address(parse_address(ZERO_ADDRESS)?));
    encoded.extend_from_slice(&data.token_id.to_be_bytes::<32>());
    encoded.extend_from_slice(&data.maker_amount.to_be_bytes::<32>());
    encoded.extend_from_slice(&data.taker_amount.to_be_bytes::<32>());
    encoded.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // expiration
    encoded.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // nonce
    encoded.extend_from_slice(&U256::ZERO.to_be_bytes::<32>()); // feeRateBps
    encoded.extend_from_slice(&encode_uint8(side));
    encoded.extend_from_slice(&encode_uint8(data.signature_type as u8));

    Ok(alloy_primitives::keccak256(&encoded).0)
}

/// Translate the venue response into a fill.
///
/// Missing amounts fall back to what the order implied at `price`.
fn fill_from_response(order: &CopyOrder, price: Decimal, response: &OrderResponse) -> Result<Fill, ApiError> {
    if !response.success {
        let msg = if response.error_msg.is_empty() {
            "order not accepted".to_string()
        } else {
            response.error_msg.clone()
        };
        return Err(ApiError::Rejected(msg));
    }

    let parse = |s: &Option<String>| s.as_deref().and_then(|v| Decimal::from_str(v).ok());
    let taking = parse(&response.taking_amount);
    let making = parse(&response.making_amount);
    let implied_tokens = if price.is_zero() { Decimal::ZERO } else { order.amount / price };

    let fill = match order.side {
        TradeSide::Buy => Fill {
            tokens_filled: taking.unwrap_or(implied_tokens),
            total_cost: making.unwrap_or(order.amount),
        },
        TradeSide::Sell => Fill {
            tokens_filled: making.unwrap_or(implied_tokens),
            total_cost: taking.unwrap_or(order.amount),
        },
    };

    Ok(fill)
}

/// Convert a decimal to 6-decimal base units, truncating.
fn to_base_units(amount: Decimal) -> Result<U256, ApiError> {
    let units = (amount * Decimal::from(1_000_000u64)).trunc();
    U256::from_str(&units.to_string()).map_err(|e| ApiError::Signing(format!("invalid amount {amount}: {e}")))
}

fn parse_address(addr: &str) -> Result<Address, ApiError> {
    Address::from_str(addr).map_err(|e| ApiError::Signing(format!("invalid address {addr}: {e}")))
}

/// Encode address to 32-byte padded format.
fn encode_address(addr: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_slice());
    buf
}

/// Encode uint8 to 32-byte padded format.
fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trade;
    use rust_decimal_macros::dec;

    // Well-known anvil test key
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PROXY: &str = "0x1111111111111111111111111111111111111111";

    fn client() -> ClobClient {
        ClobClient::new(
            TEST_KEY,
            PROXY,
            SignatureType::Poly,
            "key",
            &BASE64.encode(b"test-secret-key-1234"),
            "pass",
            137,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn order() -> CopyOrder {
        let mut t = trade("0xaaa", "0x01", Utc::now());
        t.asset_id = "123456789".into();
        CopyOrder::from_trade(&t, dec!(0.10), dec!(500), dec!(5000))
    }

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(dec!(100.5)).unwrap(), U256::from(100_500_000u64));
        assert_eq!(to_base_units(dec!(0.0000019)).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_encode_uint8() {
        let encoded = encode_uint8(1);
        assert_eq!(encoded[31], 1);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_l2_signature_is_base64_sha256() {
        let secret = BASE64.encode(b"test-secret-key-1234");
        let sig = sign_l2(&secret, "1700000000", "POST", "/order", "{}").unwrap();
        assert_eq!(BASE64_URL_SAFE.decode(&sig).unwrap().len(), 32);

        let again = sign_l2(&secret, "1700000000", "POST", "/order", "{}").unwrap();
        assert_eq!(sig, again);
    }

    #[test]
    fn test_buy_order_amounts_use_proxy_as_maker() {
        let c = client();
        let data = c.build_order(&order(), dec!(0.60)).unwrap();

        assert_eq!(data.maker, Address::from_str(PROXY).unwrap());
        assert_eq!(data.signer, c.address());
        assert_eq!(data.maker_amount, U256::from(10_000_000u64));
        // 10 / 0.60 = 16.6667 tokens
        assert_eq!(data.taker_amount, U256::from(16_666_700u64));
    }

    #[tokio::test]
    async fn test_signed_order_has_65_byte_signature() {
        let c = client();
        let data = c.build_order(&order(), dec!(0.60)).unwrap();
        let signed = c.sign_order(&data).await.unwrap();

        assert_eq!(signed.side, "BUY");
        assert_eq!(signed.signature_type, 1);
        assert_eq!(signed.signature.len(), 2 + 65 * 2);
    }

    #[test]
    fn test_fill_from_response() {
        let o = order();
        let ok = OrderResponse {
            order_id: Some("0xorder".into()),
            success: true,
            error_msg: String::new(),
            status: Some("matched".into()),
            taking_amount: Some("16.66".into()),
            making_amount: Some("9.996".into()),
        };
        let fill = fill_from_response(&o, dec!(0.60), &ok).unwrap();
        assert_eq!(fill.tokens_filled, dec!(16.66));
        assert_eq!(fill.total_cost, dec!(9.996));

        let rejected = OrderResponse {
            success: false,
            error_msg: "not enough balance / allowance".into(),
            ..ok
        };
        let err = fill_from_response(&o, dec!(0.60), &rejected).unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::InsufficientBalance);
    }
}
