//! Periodic removal of expired grants.
//!
//! Each sweep is independent and idempotent: a store that fails is logged
//! and retried on the next tick, and a partially swept batch is simply
//! finished later.

use crate::config::Config;
use crate::grants::error::GrantError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A store whose expired records can be swept.
#[async_trait]
pub trait Sweepable: Send + Sync {
    /// Label for logs and metrics.
    fn kind(&self) -> &'static str;

    /// Remove expired records, returning how many were removed.
    async fn sweep_expired(&self) -> Result<usize, GrantError>;
}

/// Sweeps a set of stores on a fixed cadence.
pub struct GrantSweeper {
    stores: Vec<Arc<dyn Sweepable>>,
    interval: Duration,
}

impl GrantSweeper {
    /// Sweeper with no stores, running every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            stores: Vec::new(),
            interval,
        }
    }

    /// Sweeper running every `config.sweep_interval`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sweep_interval)
    }

    /// Add a store to every sweep.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Sweepable>) -> Self {
        self.stores.push(store);
        self
    }

    /// Time between sweeps.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep every store once. Failed stores are absent from the result.
    pub async fn run_once(&self) -> BTreeMap<&'static str, usize> {
        let mut swept = BTreeMap::new();
        for store in &self.stores {
            match store.sweep_expired().await {
                Ok(count) => {
                    *swept.entry(store.kind()).or_insert(0) += count;
                }
                Err(e) => {
                    warn!(kind = store.kind(), error = %e, "Grant sweep failed");
                }
            }
        }
        debug!(?swept, "Sweep pass finished");
        swept
    }

    /// Run [`GrantSweeper::run_once`] every interval until `shutdown`
    /// changes or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.interval.as_secs_f64(),
                stores = self.stores.len(),
                "Grant sweeper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.changed() => {
                        info!("Grant sweeper stopped");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        kind: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Sweepable for CountingStore {
        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn sweep_expired(&self) -> Result<usize, GrantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GrantError::repository("database unavailable"))
            } else {
                Ok(2)
            }
        }
    }

    fn store(kind: &'static str, fail: bool) -> Arc<CountingStore> {
        Arc::new(CountingStore {
            kind,
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_run_once_skips_failing_store() {
        let good = store("nonce", false);
        let bad = store("device_code", true);
        let sweeper = GrantSweeper::new(Duration::from_secs(60))
            .with_store(bad.clone())
            .with_store(good.clone());

        let swept = sweeper.run_once().await;
        assert_eq!(swept.get("nonce"), Some(&2));
        assert!(!swept.contains_key("device_code"));
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_stops_on_shutdown() {
        let good = store("nonce", false);
        let sweeper = GrantSweeper::new(Duration::from_millis(10)).with_store(good.clone());

        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(good.calls.load(Ordering::SeqCst) >= 1);
    }
}
