//! Bounded pool of ready drivers with blocking acquire and guaranteed
//! release through an RAII guard.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::error::{HarvestError, Result};

struct PoolInner<D> {
    idle: Mutex<VecDeque<D>>,
    notify: Notify,
    capacity: usize,
    /// Drivers currently owned by the pool, idle or checked out.
    population: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl<D> PoolInner<D> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<D>> {
        // No code path panics while holding the lock.
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-capacity driver pool. Capacity equals the run's worker concurrency,
/// so a worker holding a permit can always expect a driver unless warm-up
/// came up short or the run is winding down.
pub struct DriverPool<D: Driver> {
    inner: Arc<PoolInner<D>>,
}

impl<D: Driver> Clone for DriverPool<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> DriverPool<D> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
                population: AtomicUsize::new(0),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    /// Add a freshly created driver. Returns `false` when the pool is
    /// already at capacity.
    pub fn add(&self, driver: D) -> bool {
        let mut population = self.inner.population.load(Ordering::SeqCst);
        loop {
            if population >= self.inner.capacity {
                return false;
            }
            match self.inner.population.compare_exchange(
                population,
                population + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(current) => population = current,
            }
        }
        debug!(driver = driver.id(), "Driver added to pool");
        self.inner.idle().push_back(driver);
        self.inner.notify.notify_one();
        true
    }

    /// Check a driver out, waiting up to `timeout` for one to become idle.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledDriver<D>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so a release between the
            // check and the await is not missed.
            let notified = self.inner.notify.notified();

            if let Some(driver) = self.inner.idle().pop_front() {
                self.inner.acquired.fetch_add(1, Ordering::SeqCst);
                return Ok(PooledDriver {
                    driver: Some(driver),
                    pool: Arc::clone(&self.inner),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, notified).await.is_err()
            {
                return Err(HarvestError::PoolExhausted(timeout));
            }
        }
    }

    /// Close and discard every driver the pool still owns. Waits up to
    /// `per_item_timeout` for each busy driver; a driver that never comes
    /// back stops the drain with a warning rather than an error. Calling
    /// drain on an empty pool is a no-op, so repeated drains are safe.
    pub async fn drain(&self, per_item_timeout: Duration) {
        loop {
            let remaining = self.inner.population.load(Ordering::SeqCst);
            if remaining == 0 {
                break;
            }
            match self.acquire(per_item_timeout).await {
                Ok(guard) => {
                    let mut driver = guard.detach();
                    driver.close().await;
                    debug!(driver = driver.id(), "Driver closed during drain");
                }
                Err(_) => {
                    warn!(
                        remaining,
                        timeout_ms = per_item_timeout.as_millis() as u64,
                        "Pool drain timed out waiting for a busy driver"
                    );
                    break;
                }
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Drivers the pool currently owns, idle or checked out.
    pub fn population(&self) -> usize {
        self.inner.population.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    pub fn acquired_total(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    pub fn released_total(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }
}

/// Checked-out driver. Dropping the guard returns the driver to the pool on
/// every exit path, including panics and cancellation.
pub struct PooledDriver<D: Driver> {
    driver: Option<D>,
    pool: Arc<PoolInner<D>>,
}

impl<D: Driver> std::fmt::Debug for PooledDriver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDriver")
            .field("driver", &self.driver.as_ref().map(Driver::id))
            .finish()
    }
}

impl<D: Driver> PooledDriver<D> {
    /// Take the driver out of the pool permanently. Counts as a release for
    /// pairing purposes but shrinks the population.
    pub fn detach(mut self) -> D {
        let driver = self.driver.take().expect("driver present until drop");
        self.pool.population.fetch_sub(1, Ordering::SeqCst);
        self.pool.released.fetch_add(1, Ordering::SeqCst);
        self.pool.notify.notify_one();
        driver
    }
}

impl<D: Driver> Deref for PooledDriver<D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.driver.as_ref().expect("driver present until drop")
    }
}

impl<D: Driver> DerefMut for PooledDriver<D> {
    fn deref_mut(&mut self) -> &mut D {
        self.driver.as_mut().expect("driver present until drop")
    }
}

impl<D: Driver> Drop for PooledDriver<D> {
    fn drop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.clear_binding();
            self.pool.idle().push_back(driver);
            self.pool.released.fetch_add(1, Ordering::SeqCst);
            self.pool.notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TaskId;
    use async_trait::async_trait;

    struct FakeDriver {
        id: String,
        bound: Option<TaskId>,
    }

    impl FakeDriver {
        fn new(n: usize) -> Self {
            Self {
                id: format!("fake-{n}"),
                bound: None,
            }
        }
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn id(&self) -> &str {
            &self.id
        }

        fn bind(&mut self, task: TaskId) {
            self.bound = Some(task);
        }

        fn clear_binding(&mut self) {
            self.bound = None;
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn add_respects_capacity() {
        let pool = DriverPool::new(2);
        assert!(pool.add(FakeDriver::new(0)));
        assert!(pool.add(FakeDriver::new(1)));
        assert!(!pool.add(FakeDriver::new(2)));
        assert_eq!(pool.population(), 2);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn acquire_times_out_on_empty_pool() {
        let pool: DriverPool<FakeDriver> = DriverPool::new(1);
        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, HarvestError::PoolExhausted(_)));
    }

    #[tokio::test]
    async fn drop_returns_driver_and_clears_binding() {
        let pool = DriverPool::new(1);
        pool.add(FakeDriver::new(0));

        let mut guard = pool.acquire(Duration::from_millis(20)).await.unwrap();
        guard.bind(TaskId::new());
        assert_eq!(pool.idle_count(), 0);
        drop(guard);

        assert_eq!(pool.idle_count(), 1);
        let guard = pool.acquire(Duration::from_millis(20)).await.unwrap();
        assert!(guard.bound.is_none());
        assert_eq!(pool.acquired_total(), 2);
        assert_eq!(pool.released_total(), 1);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_release() {
        let pool = DriverPool::new(1);
        pool.add(FakeDriver::new(0));
        let guard = pool.acquire(Duration::from_millis(20)).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn drain_closes_everything_and_is_idempotent() {
        let pool = DriverPool::new(3);
        for n in 0..3 {
            pool.add(FakeDriver::new(n));
        }

        pool.drain(Duration::from_millis(50)).await;
        assert_eq!(pool.population(), 0);
        assert_eq!(pool.idle_count(), 0);

        let start = Instant::now();
        pool.drain(Duration::from_secs(60)).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn drain_gives_up_on_a_driver_that_never_returns() {
        let pool = DriverPool::new(2);
        pool.add(FakeDriver::new(0));
        pool.add(FakeDriver::new(1));

        let held = pool.acquire(Duration::from_millis(20)).await.unwrap();
        pool.drain(Duration::from_millis(30)).await;

        // The idle driver was closed; the held one stays in the population.
        assert_eq!(pool.population(), 1);
        drop(held);
    }
}
