use super::types::{RecordKind, StreamRecord};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Routing key: a record kind plus, for symbol-scoped kinds, the symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub kind: RecordKind,
    pub symbol: Option<String>,
}

impl SubscriptionKey {
    /// Build a key, dropping the symbol for kinds that are not routed by symbol
    pub fn new(kind: RecordKind, symbol: Option<&str>) -> Self {
        Self {
            kind,
            symbol: symbol
                .filter(|_| kind.is_symbol_scoped())
                .map(str::to_string),
        }
    }

    pub fn for_record(record: &StreamRecord) -> Self {
        Self::new(record.kind(), record.symbol())
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{}:{}", self.kind, symbol),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Where records for one subscription go
#[derive(Clone)]
pub enum Consumer {
    /// Invoked on the listen task; a slow callback delays every other subscription
    Callback(Arc<dyn Fn(StreamRecord) + Send + Sync>),
    /// Bounded queue; delivery waits for capacity
    Queue(mpsc::Sender<StreamRecord>),
}

impl Consumer {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(StreamRecord) + Send + Sync + 'static,
    {
        Consumer::Callback(Arc::new(f))
    }

    /// Hand one record over; `false` when the queue's receiver is gone
    pub async fn deliver(&self, record: StreamRecord) -> bool {
        match self {
            Consumer::Callback(f) => {
                f(record);
                true
            }
            Consumer::Queue(tx) => tx.send(record).await.is_ok(),
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Callback(_) => f.write_str("Consumer::Callback"),
            Consumer::Queue(tx) => f
                .debug_struct("Consumer::Queue")
                .field("capacity", &tx.capacity())
                .finish(),
        }
    }
}

/// Subscription table behind one lock; at most one consumer per key
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<SubscriptionKey, Consumer>>,
}

impl Registry {
    /// Register `consumer`, returning the one it replaced
    pub async fn insert(&self, key: SubscriptionKey, consumer: Consumer) -> Option<Consumer> {
        self.entries.lock().await.insert(key, consumer)
    }

    pub async fn remove(&self, key: &SubscriptionKey) -> Option<Consumer> {
        self.entries.lock().await.remove(key)
    }

    /// Consumer for `key`, cloned out so delivery happens without the lock held
    pub async fn get(&self, key: &SubscriptionKey) -> Option<Consumer> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::KeepAliveRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_key_ignores_symbol_for_account_kinds() {
        assert_eq!(
            SubscriptionKey::new(RecordKind::Balance, Some("EURUSD")),
            SubscriptionKey::new(RecordKind::Balance, None)
        );
        assert_eq!(
            SubscriptionKey::new(RecordKind::Candle, Some("EURUSD")).to_string(),
            "candle:EURUSD"
        );
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let registry = Registry::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let key = SubscriptionKey::new(RecordKind::KeepAlive, None);

        let counter = Arc::clone(&first);
        registry
            .insert(key.clone(), Consumer::callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        let counter = Arc::clone(&second);
        let replaced = registry
            .insert(key.clone(), Consumer::callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        assert!(replaced.is_some());

        let consumer = registry.get(&key).await.unwrap();
        assert!(consumer.deliver(StreamRecord::KeepAlive(KeepAliveRecord { timestamp: 1 })).await);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.keys().await, vec![key]);
    }

    #[tokio::test]
    async fn test_closed_queue_reports_undelivered() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let consumer = Consumer::Queue(tx);
        assert!(!consumer.deliver(StreamRecord::KeepAlive(KeepAliveRecord { timestamp: 1 })).await);
    }
}
