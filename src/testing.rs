//! In-memory fakes for the service seams, shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::api::{ApiError, OrderGateway, TradeSource};
use crate::balance::BalanceProvider;
use crate::db::{PersistenceStore, SeenStatus};
use crate::models::{CopyOrder, Fill, PositionValue, TradeEvent, TradeSide, WalletBalance};
use crate::outcome::{Outcome, OutcomeSink};
use crate::shutdown::Releasable;

/// A $100 BUY at 0.60 on a fixed market.
pub fn trade(trader: &str, id: &str, timestamp: DateTime<Utc>) -> TradeEvent {
    TradeEvent {
        trader_address: trader.to_lowercase(),
        trade_id: id.to_string(),
        side: TradeSide::Buy,
        amount: dec!(100),
        price: dec!(0.60),
        size: dec!(166.6667),
        market_id: "0xmarket".to_string(),
        asset_id: "1001".to_string(),
        slug: "will-it-rain".to_string(),
        outcome: "Yes".to_string(),
        title: "Will it rain tomorrow?".to_string(),
        timestamp,
        detected_at: Utc::now(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

#[derive(Default)]
pub struct FakeBalances {
    balances: HashMap<String, WalletBalance>,
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, cash: Decimal, positions_value: Decimal) -> Self {
        let position = PositionValue {
            market_id: "0xmarket".to_string(),
            title: "Open position".to_string(),
            outcome: "Yes".to_string(),
            size: positions_value,
            current_value: positions_value,
        };
        self.balances
            .insert(address.to_lowercase(), WalletBalance::new(cash, vec![position]));
        self
    }

    pub fn failing(mut self, address: &str) -> Self {
        self.failing.insert(address.to_lowercase());
        self
    }

    pub fn calls(&self, address: &str) -> usize {
        lock(&self.calls).get(&address.to_lowercase()).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BalanceProvider for FakeBalances {
    async fn get_balance(&self, address: &str) -> Result<WalletBalance, ApiError> {
        let address = address.to_lowercase();
        *lock(&self.calls).entry(address.clone()).or_default() += 1;

        if self.failing.contains(&address) {
            return Err(ApiError::Timeout(1));
        }
        Ok(self.balances.get(&address).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeSource {
    trades: Mutex<HashMap<String, Vec<TradeEvent>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    pub fn set(&self, address: &str, trades: Vec<TradeEvent>) {
        lock(&self.trades).insert(address.to_lowercase(), trades);
    }

    pub fn fail(&self, address: &str) {
        lock(&self.failing).insert(address.to_lowercase());
    }

    pub fn calls(&self, address: &str) -> usize {
        lock(&self.calls).get(&address.to_lowercase()).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TradeSource for FakeSource {
    async fn recent_trades(&self, address: &str) -> Result<Vec<TradeEvent>, ApiError> {
        let address = address.to_lowercase();
        *lock(&self.calls).entry(address.clone()).or_default() += 1;

        if lock(&self.failing).contains(&address) {
            return Err(ApiError::Timeout(1));
        }
        Ok(lock(&self.trades).get(&address).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    seen: Mutex<HashMap<(String, String), SeenStatus>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn mark(&self, trader: &str, trade_id: &str) {
        lock(&self.seen).insert((trader.to_lowercase(), trade_id.to_string()), SeenStatus::Executed);
    }

    pub fn status(&self, trader: &str, trade_id: &str) -> Option<SeenStatus> {
        lock(&self.seen)
            .get(&(trader.to_lowercase(), trade_id.to_string()))
            .copied()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn has_seen(&self, trader: &str, trade_id: &str) -> Result<bool> {
        Ok(self.status(trader, trade_id).is_some())
    }

    async fn record_trade(&self, trader: &str, trade_id: &str, status: SeenStatus) -> Result<()> {
        lock(&self.seen)
            .entry((trader.to_lowercase(), trade_id.to_string()))
            .or_insert(status);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Releasable for MemoryStore {
    fn name(&self) -> &'static str {
        "memory-store"
    }

    async fn release(&self) -> Result<()> {
        self.close().await;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySink {
    outcomes: Mutex<Vec<Outcome>>,
}

impl MemorySink {
    pub fn outcomes(&self) -> Vec<Outcome> {
        lock(&self.outcomes).clone()
    }

    pub fn statuses(&self) -> Vec<&'static str> {
        lock(&self.outcomes).iter().map(|o| o.status()).collect()
    }
}

#[async_trait]
impl OutcomeSink for MemorySink {
    async fn record(&self, outcome: &Outcome) {
        lock(&self.outcomes).push(outcome.clone());
    }
}

/// Gateway that fills like a dry run after returning any scripted errors.
#[derive(Default)]
pub struct RecordingGateway {
    errors: Mutex<VecDeque<ApiError>>,
    delay: Option<Duration>,
    submitted: Mutex<Vec<CopyOrder>>,
    attempts: AtomicUsize,
}

impl RecordingGateway {
    pub fn fail_with(self, errors: Vec<ApiError>) -> Self {
        *lock(&self.errors) = errors.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Orders that were accepted, in dispatch order.
    pub fn submitted(&self) -> Vec<CopyOrder> {
        lock(&self.submitted).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn submit(&self, order: &CopyOrder) -> Result<Fill, ApiError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.errors).pop_front();
        if let Some(e) = scripted {
            return Err(e);
        }

        lock(&self.submitted).push(order.clone());
        Ok(Fill {
            tokens_filled: order.token_size(),
            total_cost: order.amount,
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[derive(Default)]
pub struct CountingResource {
    releases: AtomicUsize,
    panics: bool,
}

impl CountingResource {
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Releasable for CountingResource {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn release(&self) -> Result<()> {
        if self.panics {
            panic!("release blew up");
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
