//! Per-trader bookkeeping shared between the monitor and the executor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::trade::TradeEvent;

/// High-water mark of the newest trade already emitted for a trader.
///
/// Trade ids are transaction hashes and carry no ordering, so the mark is the
/// newest timestamp plus every id emitted at exactly that timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeCursor {
    pub timestamp: Option<DateTime<Utc>>,
    pub ids_at_timestamp: HashSet<String>,
}

impl TradeCursor {
    /// True if `trade` is at or below the mark.
    pub fn covers(&self, trade: &TradeEvent) -> bool {
        match self.timestamp {
            None => false,
            Some(ts) if trade.timestamp < ts => true,
            Some(ts) if trade.timestamp == ts => self.ids_at_timestamp.contains(&trade.trade_id),
            Some(_) => false,
        }
    }

    /// Move the mark forward to include `trade`. Never moves backwards.
    pub fn advance(&mut self, trade: &TradeEvent) {
        match self.timestamp {
            Some(ts) if trade.timestamp < ts => {}
            Some(ts) if trade.timestamp == ts => {
                self.ids_at_timestamp.insert(trade.trade_id.clone());
            }
            _ => {
                self.timestamp = Some(trade.timestamp);
                self.ids_at_timestamp.clear();
                self.ids_at_timestamp.insert(trade.trade_id.clone());
            }
        }
    }
}

/// Latest capital observed for a trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapitalSnapshot {
    pub capital: Decimal,
    pub taken_at: DateTime<Utc>,
}

/// Bookkeeping for one target wallet.
///
/// `last_seen` is written only by the monitor, `capital` only by the executor.
#[derive(Debug, Clone, Default)]
pub struct TraderState {
    pub last_seen: TradeCursor,
    pub capital: Option<CapitalSnapshot>,
}

/// Process-wide map of [`TraderState`], keyed by lowercase address.
///
/// Locks are only taken for in-memory reads and writes, never across I/O.
#[derive(Debug, Clone, Default)]
pub struct TraderBook {
    inner: Arc<RwLock<HashMap<String, TraderState>>>,
}

impl TraderBook {
    pub fn new(addresses: &[String]) -> Self {
        let map = addresses
            .iter()
            .map(|a| (a.to_lowercase(), TraderState::default()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn cursor(&self, address: &str) -> TradeCursor {
        let traders = self.inner.read().await;
        traders
            .get(&address.to_lowercase())
            .map(|t| t.last_seen.clone())
            .unwrap_or_default()
    }

    pub async fn set_cursor(&self, address: &str, cursor: TradeCursor) {
        let mut traders = self.inner.write().await;
        traders.entry(address.to_lowercase()).or_default().last_seen = cursor;
    }

    pub async fn record_capital(&self, address: &str, capital: Decimal) {
        let mut traders = self.inner.write().await;
        traders.entry(address.to_lowercase()).or_default().capital = Some(CapitalSnapshot {
            capital,
            taken_at: Utc::now(),
        });
    }

    pub async fn snapshot(&self, address: &str) -> Option<TraderState> {
        let traders = self.inner.read().await;
        traders.get(&address.to_lowercase()).cloned()
    }
}
