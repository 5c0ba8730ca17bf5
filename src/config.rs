//! Runtime configuration, read from flags or the environment (`.env` included).

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use rust_decimal::Decimal;

use crate::retry::RetryPolicy;
use crate::trading::{ExecutorConfig, MonitorConfig, SizingConfig};

/// Polygon mainnet USDC.e
pub const DEFAULT_USDC_CONTRACT: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

#[derive(Debug, Clone, Args)]
pub struct MirrorConfig {
    /// Target wallets to mirror, comma-separated
    #[arg(long = "user-addresses", env = "USER_ADDRESSES", value_delimiter = ',', global = true)]
    pub user_addresses: Vec<String>,

    /// Operator wallet that places the mirror orders
    #[arg(long, env = "PROXY_WALLET", global = true)]
    pub proxy_wallet: Option<String>,

    /// Seconds between poll cycles
    #[arg(long, env = "FETCH_INTERVAL", default_value = "1", global = true)]
    pub fetch_interval: u64,

    /// Upper bound on the copy ratio
    #[arg(long, env = "MAX_COPY_RATIO", default_value = "1.0", global = true)]
    pub max_copy_ratio: Decimal,

    /// Mirror orders below this USDC amount are skipped
    #[arg(long, env = "MIN_TRADE_SIZE", default_value = "1", global = true)]
    pub min_trade_size: Decimal,

    /// Ignore trades older than this many hours (0 disables the check)
    #[arg(long = "too-old-hours", env = "TOO_OLD_TIMESTAMP", default_value = "1", global = true)]
    pub too_old_hours: u64,

    /// Trades requested per wallet per poll
    #[arg(long, env = "TRADE_FETCH_LIMIT", default_value = "50", global = true)]
    pub trade_fetch_limit: u32,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000", global = true)]
    pub request_timeout_ms: u64,

    #[arg(long, env = "ORDER_TIMEOUT_MS", default_value = "15000", global = true)]
    pub order_timeout_ms: u64,

    /// Attempts per outbound call, first try included
    #[arg(long, env = "RETRY_LIMIT", default_value = "3", global = true)]
    pub retry_limit: u32,

    /// Seconds to wait for services to drain on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "2", global = true)]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./polymirror.db?mode=rwc", global = true)]
    pub database_url: String,

    #[arg(long, env = "RPC_URL", default_value = "https://polygon-rpc.com", global = true)]
    pub rpc_url: String,

    #[arg(long, env = "USDC_CONTRACT_ADDRESS", default_value = DEFAULT_USDC_CONTRACT, global = true)]
    pub usdc_contract_address: String,

    #[arg(long, env = "LOG_DIR", default_value = "logs", global = true)]
    pub log_dir: String,
}

impl MirrorConfig {
    /// Check everything `run` depends on.
    pub fn validate(&self) -> Result<()> {
        if self.user_addresses.is_empty() {
            bail!("USER_ADDRESSES must list at least one wallet");
        }
        for address in &self.user_addresses {
            if !is_address(address) {
                bail!("invalid target wallet address: {address}");
            }
        }

        match &self.proxy_wallet {
            Some(proxy) if is_address(proxy) => {}
            Some(proxy) => bail!("invalid PROXY_WALLET address: {proxy}"),
            None => bail!("PROXY_WALLET is required"),
        }

        if !is_address(&self.usdc_contract_address) {
            bail!("invalid USDC_CONTRACT_ADDRESS: {}", self.usdc_contract_address);
        }
        if self.fetch_interval == 0 {
            bail!("FETCH_INTERVAL must be positive");
        }
        if self.request_timeout_ms == 0 || self.order_timeout_ms == 0 {
            bail!("request and order timeouts must be positive");
        }
        if !(1..=10).contains(&self.retry_limit) {
            bail!("RETRY_LIMIT must be between 1 and 10, got {}", self.retry_limit);
        }
        if self.max_copy_ratio <= Decimal::ZERO {
            bail!("MAX_COPY_RATIO must be greater than 0");
        }
        if self.min_trade_size < Decimal::ZERO {
            bail!("MIN_TRADE_SIZE cannot be negative");
        }
        if self.trade_fetch_limit == 0 {
            bail!("TRADE_FETCH_LIMIT must be positive");
        }

        Ok(())
    }

    /// Target wallets, lowercased and without duplicates.
    pub fn traders(&self) -> Vec<String> {
        let mut traders: Vec<String> = Vec::with_capacity(self.user_addresses.len());
        for address in &self.user_addresses {
            let address = address.trim().to_lowercase();
            if !address.is_empty() && !traders.contains(&address) {
                traders.push(address);
            }
        }
        traders
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_limit)
    }

    pub fn sizing(&self) -> SizingConfig {
        SizingConfig {
            max_ratio: self.max_copy_ratio,
            min_trade_size: self.min_trade_size,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.fetch_interval),
            max_trade_age: match self.too_old_hours {
                0 => None,
                hours => Some(chrono::Duration::hours(hours as i64)),
            },
            request_timeout: self.request_timeout(),
            retry: self.retry_policy(),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            proxy_wallet: self.proxy_wallet.clone().unwrap_or_default().to_lowercase(),
            sizing: self.sizing(),
            request_timeout: self.request_timeout(),
            order_timeout: self.order_timeout(),
            retry: self.retry_policy(),
        }
    }
}

/// `0x` followed by 40 hex digits.
pub fn is_address(s: &str) -> bool {
    let s = s.trim();
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rust_decimal_macros::dec;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0xABCDEFabcdef0000000000000000000000000002";
    const PROXY: &str = "0x9999999999999999999999999999999999999999";

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: MirrorConfig,
    }

    fn parse(args: &[&str]) -> MirrorConfig {
        let mut argv = vec!["polymirror"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().config
    }

    fn valid() -> MirrorConfig {
        parse(&["--user-addresses", &format!("{A},{B}"), "--proxy-wallet", PROXY])
    }

    #[test]
    fn test_is_address() {
        assert!(is_address(A));
        assert!(is_address(B));
        assert!(!is_address("0x123"));
        assert!(!is_address("1111111111111111111111111111111111111111aa"));
        assert!(!is_address("0xZZ11111111111111111111111111111111111111"));
    }

    #[test]
    fn test_defaults_and_derived_settings() {
        let config = valid();
        config.validate().unwrap();

        assert_eq!(config.traders(), vec![A.to_string(), B.to_lowercase()]);
        assert_eq!(config.max_copy_ratio, dec!(1.0));
        assert_eq!(config.retry_limit, 3);

        let monitor = config.monitor_config();
        assert_eq!(monitor.poll_interval, Duration::from_secs(1));
        assert_eq!(monitor.max_trade_age, Some(chrono::Duration::hours(1)));

        let executor = config.executor_config();
        assert_eq!(executor.proxy_wallet, PROXY);
        assert_eq!(executor.sizing.min_trade_size, dec!(1));
        assert_eq!(executor.order_timeout, Duration::from_millis(15000));
    }

    #[test]
    fn test_zero_age_disables_the_check() {
        let mut config = valid();
        config.too_old_hours = 0;
        assert_eq!(config.monitor_config().max_trade_age, None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = valid();
        config.user_addresses = vec!["0xnope".into()];
        assert!(config.validate().is_err());

        let mut config = valid();
        config.proxy_wallet = None;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.retry_limit = 0;
        assert!(config.validate().is_err());
        config.retry_limit = 11;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_copy_ratio = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.fetch_interval = 0;
        assert!(config.validate().is_err());
    }
}
