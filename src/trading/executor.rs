//! Trade executor: sizes each detected trade against live capital and submits it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, OrderGateway};
use crate::balance::{capital_or_zero, BalanceProvider};
use crate::db::{PersistenceStore, SeenStatus};
use crate::lifecycle::{service_pair, ServiceHandle, ServiceRuntime, ServiceState};
use crate::models::{OrderResult, TradeEvent, TraderBook};
use crate::outcome::{Outcome, OutcomeSink};
use crate::retry::{with_retry_if, with_timeout, RetryPolicy};

use super::sizing::{size_order, SizingConfig};

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Operator wallet whose capital sizes every order
    pub proxy_wallet: String,
    pub sizing: SizingConfig,
    pub request_timeout: Duration,
    pub order_timeout: Duration,
    pub retry: RetryPolicy,
}

struct Pending {
    runtime: ServiceRuntime,
    rx: UnboundedReceiver<TradeEvent>,
}

/// Consumes the trade queue one event at a time.
pub struct TradeExecutor {
    balances: Arc<dyn BalanceProvider>,
    gateway: Arc<dyn OrderGateway>,
    store: Arc<dyn PersistenceStore>,
    sink: Arc<dyn OutcomeSink>,
    book: TraderBook,
    config: ExecutorConfig,
    handle: ServiceHandle,
    pending: Mutex<Option<Pending>>,
}

impl TradeExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: UnboundedReceiver<TradeEvent>,
        balances: Arc<dyn BalanceProvider>,
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn PersistenceStore>,
        sink: Arc<dyn OutcomeSink>,
        book: TraderBook,
        config: ExecutorConfig,
    ) -> Self {
        let (runtime, handle) = service_pair("trade-executor");

        Self {
            balances,
            gateway,
            store,
            sink,
            book,
            config,
            handle,
            pending: Mutex::new(Some(Pending { runtime, rx })),
        }
    }

    /// Spawn the consume loop. Returns `None` if it was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        pending.runtime.set_state(ServiceState::Running);

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run(pending).await }))
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    async fn run(&self, pending: Pending) {
        let Pending { mut runtime, mut rx } = pending;
        info!(gateway = self.gateway.name(), "Trade executor started");

        loop {
            let next = tokio::select! {
                biased;
                _ = runtime.stopped() => None,
                next = rx.recv() => next,
            };

            let Some(trade) = next else { break };
            self.process(trade).await;
        }

        runtime.set_state(ServiceState::Stopping);

        rx.close();
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Unprocessed trades left in queue at shutdown");
        }

        info!("Trade executor stopped");
        runtime.set_state(ServiceState::Stopped);
    }

    /// Size, submit and record a single trade.
    pub async fn process(&self, trade: TradeEvent) -> Outcome {
        let (operator_capital, trader_capital) = tokio::join!(
            self.capital(&self.config.proxy_wallet),
            self.capital(&trade.trader_address)
        );
        self.book.record_capital(&trade.trader_address, trader_capital).await;

        debug!(
            trade_id = %trade.trade_id,
            operator = %operator_capital,
            trader = %trader_capital,
            "Capital refreshed"
        );

        let order = match size_order(&trade, operator_capital, trader_capital, &self.config.sizing) {
            Ok(order) => order,
            Err(reason) => {
                self.mark_seen(&trade.trader_address, &trade.trade_id, SeenStatus::Skipped).await;
                let outcome = Outcome::Filtered { trade, reason };
                self.sink.record(&outcome).await;
                return outcome;
            }
        };

        // A resent order gets a fresh salt, so only retry when the first one never arrived
        let (submitted, attempts) = with_retry_if(&self.config.retry, "order", ApiError::is_resend_safe, || {
            with_timeout(self.config.order_timeout, self.gateway.submit(&order))
        })
        .await;

        let outcome = match submitted {
            Ok(fill) => {
                self.mark_seen(&order.trader_address, &order.source_trade_id, SeenStatus::Executed)
                    .await;
                Outcome::Executed {
                    result: OrderResult::filled(fill, attempts),
                    order,
                }
            }
            Err(e) => Outcome::Failed {
                result: OrderResult::failed(e.kind(), e.to_string(), attempts),
                order,
            },
        };

        self.sink.record(&outcome).await;
        outcome
    }

    async fn capital(&self, address: &str) -> rust_decimal::Decimal {
        capital_or_zero(
            self.balances.as_ref(),
            address,
            self.config.request_timeout,
            &self.config.retry,
        )
        .await
    }

    async fn mark_seen(&self, trader: &str, trade_id: &str, status: SeenStatus) {
        if let Err(e) = self.store.record_trade(trader, trade_id, status).await {
            warn!(trader, trade_id, error = %e, "Failed to persist dedup record");
        }
    }
}
