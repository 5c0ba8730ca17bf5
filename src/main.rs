//! Polymarket Copy-Trading Bot
//!
//! Watches a set of target wallets and mirrors each of their trades onto a
//! proxy wallet, scaled by the ratio of the two wallets' capital.

mod api;
mod balance;
mod config;
mod db;
mod lifecycle;
mod logging;
mod models;
mod outcome;
mod retry;
mod shutdown;
#[cfg(test)]
mod testing;
mod trading;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::api::{ClobClient, DataClient, DryRunGateway, OrderGateway};
use crate::balance::{capital_or_zero, BalanceProvider, PolygonBalanceProvider};
use crate::config::MirrorConfig;
use crate::db::{Database, PersistenceStore};
use crate::models::TraderBook;
use crate::outcome::{FanoutSink, OutcomeSink, TracingSink};
use crate::shutdown::{wait_for_signal, ShutdownCoordinator, ShutdownReason};
use crate::trading::{trade_queue, TradeExecutor, TradeMonitor};

/// Polymarket copy-trading bot CLI.
#[derive(Parser)]
#[command(name = "polymirror")]
#[command(about = "Mirror Polymarket trades from target wallets onto your proxy wallet", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    config: MirrorConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mirroring until SIGINT/SIGTERM
    Run {
        /// Log orders instead of sending them to the CLOB
        #[arg(long)]
        dry_run: bool,
    },

    /// Show cash, open positions and capital for a wallet
    Balance {
        /// Wallet address
        address: String,
    },

    /// Show copy-trade statistics from the database
    Status,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_file = logging::init(&cli.log_level, &cli.config.log_dir)?;
    info!(log_file = %log_file.display(), "Logging initialized");

    match cli.command {
        Commands::Run { dry_run } => {
            let code = run(cli.config, dry_run).await;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Balance { address } => {
            let config = cli.config;
            let data = DataClient::new(config.request_timeout(), config.trade_fetch_limit)?;
            let provider =
                PolygonBalanceProvider::new(&config.rpc_url, &config.usdc_contract_address, data, config.request_timeout())?;

            let balance = provider.get_balance(&address).await?;

            println!("\n=== Wallet: {} ===", address);
            println!("Cash (USDC):      ${:.2}", balance.cash);
            println!("Positions value:  ${:.2}", balance.positions_value());
            println!("Capital:          ${:.2}", balance.capital());

            if !balance.positions.is_empty() {
                println!("\n{:<50} {:<8} {:>12} {:>12}", "MARKET", "OUTCOME", "SIZE", "VALUE");
                println!("{}", "-".repeat(85));
                for pos in &balance.positions {
                    println!(
                        "{:<50} {:<8} {:>12.2} {:>12.2}",
                        truncate(&pos.title, 48),
                        truncate(&pos.outcome, 8),
                        pos.size,
                        pos.current_value
                    );
                }
            }
        }

        Commands::Status => {
            let db = Database::connect(&cli.config.database_url).await?;
            let stats = db.get_copy_trade_stats().await?;

            println!("\n=== Copy Trading Status ===\n");
            println!("Trades seen:      {}", stats.seen);
            println!("Outcomes logged:  {}", stats.total);
            println!("  Executed:       {}", stats.executed);
            println!("  Failed:         {}", stats.failed);
            println!("  Filtered:       {}", stats.filtered);

            let recent = db.get_recent_copy_trades(10).await?;
            if !recent.is_empty() {
                println!("\n--- Recent Copy Trades ---");
                println!(
                    "{:<20} {:<12} {:<14} {:<5} {:>10} {:>10} {:>8} {:<10} {}",
                    "TIME", "TRADER", "TRADE", "SIDE", "SOURCE", "AMOUNT", "RATIO", "STATUS", "DETAIL"
                );
                println!("{}", "-".repeat(120));
                for t in recent {
                    println!(
                        "{:<20} {:<12} {:<14} {:<5} {:>10.2} {:>10.2} {:>8.4} {:<10} {}",
                        truncate(&t.created_at, 19),
                        truncate(&t.trader_address, 10),
                        truncate(&t.source_trade_id, 12),
                        t.side,
                        t.source_amount,
                        t.amount.unwrap_or(0.0),
                        t.copy_ratio.unwrap_or(0.0),
                        t.status,
                        t.detail()
                    );
                }
            }

            db.close().await;
        }

        Commands::Config => {
            let config = cli.config;

            println!("\n=== Copy Trading Configuration ===\n");
            println!("Wallets:");
            println!("  Proxy Wallet:         {}", config.proxy_wallet.as_deref().unwrap_or("(not set)"));
            println!("  Target Wallets:       {}", config.traders().len());
            for trader in config.traders() {
                println!("    - {}", trader);
            }

            println!("\nSizing:");
            println!("  Max Copy Ratio:       {}", config.max_copy_ratio);
            println!("  Min Trade Size:       ${}", config.min_trade_size);

            println!("\nMonitoring:");
            println!("  Fetch Interval:       {}s", config.fetch_interval);
            println!("  Trade Fetch Limit:    {}", config.trade_fetch_limit);
            match config.too_old_hours {
                0 => println!("  Max Trade Age:        disabled"),
                hours => println!("  Max Trade Age:        {}h", hours),
            }

            println!("\nNetwork:");
            println!("  Request Timeout:      {}ms", config.request_timeout_ms);
            println!("  Order Timeout:        {}ms", config.order_timeout_ms);
            println!("  Retry Limit:          {}", config.retry_limit);
            println!("  RPC URL:              {}", config.rpc_url);
            println!("  USDC Contract:        {}", config.usdc_contract_address);

            println!("\nRuntime:");
            println!("  Database:             {}", config.database_url);
            println!("  Log Directory:        {}", config.log_dir);
            println!("  Shutdown Grace:       {}s", config.shutdown_grace_secs);

            if let Err(e) = config.validate() {
                println!("\nConfiguration is NOT runnable: {e}");
            }
        }
    }

    Ok(())
}

/// Wire the pipeline, run until a signal, then tear down. Returns the exit code.
async fn run(config: MirrorConfig, dry_run: bool) -> i32 {
    let coordinator = ShutdownCoordinator::new(config.shutdown_grace());

    if let Err(e) = start_pipeline(&config, dry_run, &coordinator).await {
        return coordinator.fail_startup(&e).await.exit_code();
    }

    println!("\nPress Ctrl+C to stop.\n");

    let signal = match wait_for_signal().await {
        Ok(signal) => signal,
        Err(e) => return coordinator.fail_startup(&e).await.exit_code(),
    };
    info!(signal, "Termination signal received");

    let second_signal = async {
        match wait_for_signal().await {
            Ok(second) => ShutdownReason::Signal(second),
            Err(e) => {
                warn!(error = %e, "Cannot listen for a second signal");
                std::future::pending().await
            }
        }
    };
    let outcome = coordinator
        .shutdown_or_force(ShutdownReason::Signal(signal), second_signal)
        .await;

    info!(?outcome, code = outcome.exit_code(), "Exiting");
    outcome.exit_code()
}

/// Build and start every service. Each resource is handed to the coordinator as soon
/// as it exists, so a later failure still releases it.
async fn start_pipeline(config: &MirrorConfig, dry_run: bool, coordinator: &ShutdownCoordinator) -> Result<()> {
    config.validate()?;

    let traders = config.traders();
    let executor_config = config.executor_config();
    let proxy_wallet = executor_config.proxy_wallet.clone();

    let (queue, rx) = trade_queue();
    let queue = Arc::new(queue);
    coordinator.register_resource(queue.clone());

    let db = Arc::new(Database::connect(&config.database_url).await?);
    coordinator.register_resource(db.clone());

    let data = DataClient::new(config.request_timeout(), config.trade_fetch_limit)?;
    let balances: Arc<dyn BalanceProvider> = Arc::new(PolygonBalanceProvider::new(
        &config.rpc_url,
        &config.usdc_contract_address,
        data.clone(),
        config.request_timeout(),
    )?);

    let gateway: Arc<dyn OrderGateway> = if dry_run {
        Arc::new(DryRunGateway)
    } else {
        match ClobClient::from_env(&proxy_wallet, config.order_timeout()) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "CLOB credentials unavailable, falling back to dry run");
                Arc::new(DryRunGateway)
            }
        }
    };

    let sink: Arc<dyn OutcomeSink> = Arc::new(FanoutSink::new().with(Arc::new(TracingSink)).with(db.clone()));
    let book = TraderBook::new(&traders);

    print_banner(config, balances.as_ref(), &traders, &proxy_wallet, &book, gateway.name()).await;

    let monitor = Arc::new(TradeMonitor::new(
        &traders,
        Arc::new(data),
        db.clone(),
        queue,
        sink.clone(),
        book.clone(),
        config.monitor_config(),
    ));
    let executor = Arc::new(TradeExecutor::new(
        rx,
        balances,
        gateway,
        db,
        sink,
        book,
        executor_config,
    ));

    coordinator.register_service(monitor.handle());
    coordinator.register_service(executor.handle());

    executor.start();
    monitor.start();
    Ok(())
}

async fn print_banner(
    config: &MirrorConfig,
    balances: &dyn BalanceProvider,
    traders: &[String],
    proxy_wallet: &str,
    book: &TraderBook,
    gateway: &str,
) {
    let timeout = config.request_timeout();
    let policy = config.retry_policy();

    println!("\n=== Polymarket Copy-Trading Bot ===");
    println!("Mode: {}", if gateway == "clob" { "LIVE TRADING" } else { "DRY RUN (no real trades)" });
    println!("Polling interval: {}s", config.fetch_interval);
    println!("Max copy ratio: {}", config.max_copy_ratio);
    println!("Min trade size: ${}", config.min_trade_size);

    let proxy_capital = capital_or_zero(balances, proxy_wallet, timeout, &policy).await;
    println!("\nProxy wallet: {}", proxy_wallet);
    println!("  Capital: ${:.2}", proxy_capital);

    println!("\nTarget wallets ({}):", traders.len());
    for trader in traders {
        let capital = capital_or_zero(balances, trader, timeout, &policy).await;
        book.record_capital(trader, capital).await;
        println!("  {}  ${:.2}", trader, capital);
    }

    info!(
        traders = traders.len(),
        proxy = %proxy_wallet,
        proxy_capital = %proxy_capital,
        gateway,
        "Copy-trading bot starting"
    );
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
