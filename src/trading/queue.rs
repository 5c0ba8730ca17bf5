//! Ordered work queue between the monitor and the executor.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::TradeEvent;
use crate::shutdown::Releasable;

/// Producer side of the trade queue. Closing it ends the executor's input.
pub struct TradeQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<TradeEvent>>>,
}

/// Create a queue and its single consumer.
pub fn trade_queue() -> (TradeQueue, mpsc::UnboundedReceiver<TradeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TradeQueue { tx: Mutex::new(Some(tx)) }, rx)
}

impl TradeQueue {
    /// Enqueue a trade. Returns false once the queue is closed.
    pub fn push(&self, event: TradeEvent) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_closed(&self) -> bool {
        match self.tx.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

#[async_trait]
impl Releasable for TradeQueue {
    fn name(&self) -> &'static str {
        "trade-queue"
    }

    async fn release(&self) -> Result<()> {
        self.close();
        debug!("Trade queue closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trade;
    use chrono::Utc;

    #[tokio::test]
    async fn test_fifo_until_closed() {
        let (queue, mut rx) = trade_queue();
        let now = Utc::now();

        assert!(queue.push(trade("0xaaa", "0x01", now)));
        assert!(queue.push(trade("0xaaa", "0x02", now)));
        queue.release().await.unwrap();
        assert!(!queue.push(trade("0xaaa", "0x03", now)));
        assert!(queue.is_closed());

        assert_eq!(rx.recv().await.unwrap().trade_id, "0x01");
        assert_eq!(rx.recv().await.unwrap().trade_id, "0x02");
        assert!(rx.recv().await.is_none());
    }
}
