use crate::error::{Result, VectorStoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds applied by [`crate::CorpusIndex`] to store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Concurrent store handles.
    pub pool_size: usize,
    /// How long a query may wait for a handle before failing.
    pub acquire_timeout: Duration,
    /// Concurrent exhaustive scans.
    pub max_concurrent_scans: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            pool_size: 8,
            acquire_timeout: Duration::from_millis(2_000),
            max_concurrent_scans: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
}

/// FIFO semaphore with in-flight and waiter counters.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    name: &'static str,
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

pub struct LimitPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for LimitPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WaiterGuard(Arc<Counters>);

impl WaiterGuard {
    fn new(counters: &Arc<Counters>) -> Self {
        counters.waiters.fetch_add(1, Ordering::SeqCst);
        Self(counters.clone())
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimit {
    #[must_use]
    pub fn new(name: &'static str, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            name,
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Waits for a slot as long as it takes.
    pub async fn acquire(&self) -> Result<LimitPermit> {
        let waiter = WaiterGuard::new(&self.counters);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VectorStoreError::StoreUnavailable(format!("{} limiter closed", self.name)))?;
        drop(waiter);
        Ok(self.admit(permit))
    }

    /// Waits for a slot up to `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<LimitPermit> {
        let waiter = WaiterGuard::new(&self.counters);
        let acquired = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await;
        drop(waiter);
        match acquired {
            Ok(Ok(permit)) => Ok(self.admit(permit)),
            Ok(Err(_)) => Err(VectorStoreError::StoreUnavailable(format!(
                "{} limiter closed",
                self.name
            ))),
            Err(_) => {
                log::warn!(
                    "{} saturated: no slot within {}ms ({} in flight)",
                    self.name,
                    timeout.as_millis(),
                    self.counters.in_flight.load(Ordering::SeqCst)
                );
                Err(VectorStoreError::AcquireTimeout {
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> LimitSnapshot {
        LimitSnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            waiters: self.counters.waiters.load(Ordering::SeqCst),
        }
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> LimitPermit {
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        LimitPermit {
            permit,
            counters: self.counters.clone(),
        }
    }
}
