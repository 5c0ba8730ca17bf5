//! Trade monitor: polls target wallets and queues unseen trades oldest-first.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::TradeSource;
use crate::db::PersistenceStore;
use crate::lifecycle::{service_pair, ServiceHandle, ServiceRuntime, ServiceState};
use crate::models::{TradeEvent, TraderBook};
use crate::outcome::{Outcome, OutcomeSink};
use crate::retry::{with_retry, with_timeout, RetryPolicy};

use super::queue::TradeQueue;

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Trades older than this are never mirrored
    pub max_trade_age: Option<chrono::Duration>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_trade_age: Some(chrono::Duration::hours(1)),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Polls each target wallet on a fixed interval.
pub struct TradeMonitor {
    traders: Vec<String>,
    source: Arc<dyn TradeSource>,
    store: Arc<dyn PersistenceStore>,
    queue: Arc<TradeQueue>,
    sink: Arc<dyn OutcomeSink>,
    book: TraderBook,
    config: MonitorConfig,
    handle: ServiceHandle,
    runtime: Mutex<Option<ServiceRuntime>>,
}

impl TradeMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        traders: &[String],
        source: Arc<dyn TradeSource>,
        store: Arc<dyn PersistenceStore>,
        queue: Arc<TradeQueue>,
        sink: Arc<dyn OutcomeSink>,
        book: TraderBook,
        config: MonitorConfig,
    ) -> Self {
        let (runtime, handle) = service_pair("trade-monitor");

        Self {
            traders: traders.iter().map(|t| t.to_lowercase()).collect(),
            source,
            store,
            queue,
            sink,
            book,
            config,
            handle,
            runtime: Mutex::new(Some(runtime)),
        }
    }

    /// Spawn the poll loop. Returns `None` if it was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let runtime = self.runtime.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        runtime.set_state(ServiceState::Running);

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run(runtime).await }))
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    async fn run(&self, mut runtime: ServiceRuntime) {
        info!(
            traders = self.traders.len(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Trade monitor started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if runtime.stop_requested() {
                break;
            }

            tokio::select! {
                biased;
                _ = runtime.stopped() => break,
                _ = ticker.tick() => {}
            }

            self.poll_once().await;

            if self.queue.is_closed() {
                warn!("Trade queue closed, stopping monitor");
                break;
            }
        }

        runtime.set_state(ServiceState::Stopping);
        info!("Trade monitor stopped");
        runtime.set_state(ServiceState::Stopped);
    }

    /// One poll cycle over every wallet. Returns the number of trades queued.
    pub async fn poll_once(&self) -> usize {
        let mut emitted = 0;

        for trader in &self.traders {
            match self.poll_trader(trader).await {
                Ok(n) => emitted += n,
                Err(e) => warn!(trader = %trader, error = %format!("{e:#}"), "Poll failed, skipping wallet this cycle"),
            }
        }

        if emitted > 0 {
            debug!(emitted, "Poll cycle complete");
        }
        emitted
    }

    async fn poll_trader(&self, trader: &str) -> Result<usize> {
        let (fetched, attempts) = with_retry(&self.config.retry, "trades", || {
            with_timeout(self.config.request_timeout, self.source.recent_trades(trader))
        })
        .await;
        let trades = fetched.with_context(|| format!("fetching trades after {attempts} attempt(s)"))?;

        let mut cursor = self.book.cursor(trader).await;
        let now = Utc::now();
        let mut ids = HashSet::new();

        let candidates: Vec<TradeEvent> = trades
            .into_iter()
            .filter(|t| !cursor.covers(t))
            .filter(|t| ids.insert(t.trade_id.clone()))
            .filter(|t| match self.config.max_trade_age {
                Some(max_age) => t.age(now) <= max_age,
                None => true,
            })
            .collect();

        let mut fresh = Vec::with_capacity(candidates.len());
        let mut already = Vec::new();
        for trade in candidates {
            if self.store.has_seen(trader, &trade.trade_id).await? {
                already.push(trade);
            } else {
                fresh.push(trade);
            }
        }

        fresh.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        for trade in &already {
            cursor.advance(trade);
        }

        let mut emitted = 0;
        for trade in fresh {
            self.sink.record(&Outcome::Detected(trade.clone())).await;
            cursor.advance(&trade);
            if !self.queue.push(trade) {
                break;
            }
            emitted += 1;
        }

        self.book.set_cursor(trader, cursor).await;
        Ok(emitted)
    }
}
