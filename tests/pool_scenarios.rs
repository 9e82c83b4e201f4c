//! Integration tests mirroring the pool's seed scenarios: startup
//! reconstruction and trimming, acquire-by-identity, concurrent
//! acquisition under capacity pressure, and idle-overflow disposal.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eni_pool::{
    CancellationToken, EmptyInitializer, Pool, PoolConfig, PoolError, PoolInitializer,
    PoolResource, ResourceFactory, ResourceHolder,
};
use thiserror::Error;

#[derive(Debug, Clone)]
struct Eni {
    id: String,
}

impl PoolResource for Eni {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "eni"
    }
}

#[derive(Debug, Error)]
#[error("fake factory failure")]
struct FakeError;

struct FakeFactory {
    next_id: AtomicU64,
    created: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
    create_delay: Duration,
    fail_create: AtomicBool,
}

impl FakeFactory {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            created: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicUsize::new(0)),
            create_delay: Duration::ZERO,
            fail_create: AtomicBool::new(false),
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            create_delay: delay,
            ..Self::new()
        }
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// A cheap, shareable handle onto the create counter, for tests that
    /// move the factory itself into `Pool::new` but still need to read
    /// the count afterward.
    fn created_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.created)
    }

    /// Same as [`FakeFactory::created_counter`], for the dispose count.
    fn disposed_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.disposed)
    }
}

#[async_trait]
impl ResourceFactory<Eni> for FakeFactory {
    type Error = FakeError;

    async fn create(&self) -> Result<Eni, FakeError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FakeError);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Eni {
            id: format!("created-{n}"),
        })
    }

    async fn dispose(&self, _resource: Eni) -> Result<(), FakeError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SeedInitializer {
    idle_ids: Vec<&'static str>,
    inuse_count: usize,
}

impl SeedInitializer {
    fn idle(ids: &[&'static str]) -> Self {
        Self {
            idle_ids: ids.to_vec(),
            inuse_count: 0,
        }
    }

    fn idle_and_inuse(ids: &[&'static str], inuse_count: usize) -> Self {
        Self {
            idle_ids: ids.to_vec(),
            inuse_count,
        }
    }
}

#[async_trait]
impl PoolInitializer<Eni> for SeedInitializer {
    type Error = std::convert::Infallible;

    async fn initialize(&self, holder: &mut dyn ResourceHolder<Eni>) -> Result<(), Self::Error> {
        for id in &self.idle_ids {
            holder.add_idle(Eni { id: id.to_string() });
        }
        for n in 0..self.inuse_count {
            holder.add_inuse(Eni {
                id: format!("seed-inuse-{n}"),
            });
        }
        Ok(())
    }
}

fn fast_reconcile_config(min_idle: usize, max_idle: usize, capacity: usize) -> PoolConfig {
    PoolConfig::builder()
        .min_idle(min_idle)
        .max_idle(max_idle)
        .capacity(capacity)
        .reconcile_interval(Duration::from_millis(15))
        .create_retry_backoff(Duration::from_millis(15))
        .build()
        .expect("valid test config")
}

#[tokio::test(flavor = "multi_thread")]
async fn no_autocreate_when_idle_meets_min() {
    let factory = FakeFactory::new();
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        factory,
        SeedInitializer::idle(&["1", "2", "3"]),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stat = pool.stat();
    assert_eq!(stat.idle, 3);
    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn autocreate_to_min_idle() {
    let pool = Pool::new(fast_reconcile_config(3, 5, 10), FakeFactory::new(), EmptyInitializer)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stat = pool.stat();
    assert_eq!(stat.idle, 3);
    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn trims_over_max_idle_at_startup() {
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        FakeFactory::new(),
        SeedInitializer::idle(&["1", "2", "3", "4", "5", "6"]),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stat = pool.stat();
    assert_eq!(stat.idle, 5);
    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn trims_over_capacity_at_startup() {
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        FakeFactory::new(),
        SeedInitializer::idle_and_inuse(&["1"], 10),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stat = pool.stat();
    assert_eq!(stat.idle + stat.inuse, 10);
    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn acquire_by_missing_preferred_id_falls_back_to_any_idle() {
    let factory = FakeFactory::new();
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        factory,
        SeedInitializer::idle(&["1", "2", "3"]),
    )
    .await
    .unwrap();

    let guard = pool
        .acquire(Some("1000"), CancellationToken::new())
        .await
        .unwrap();
    assert!(["1", "2", "3"].contains(&guard.id()));

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn acquire_by_matching_preferred_id_returns_that_resource() {
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        FakeFactory::new(),
        SeedInitializer::idle(&["1", "2", "3"]),
    )
    .await
    .unwrap();

    let guard = pool
        .acquire(Some("2"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(guard.id(), "2");

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn preferred_id_currently_inuse_is_reported_busy() {
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        FakeFactory::new(),
        SeedInitializer::idle(&["1", "2", "3"]),
    )
    .await
    .unwrap();

    let first = pool
        .acquire(Some("2"), CancellationToken::new())
        .await
        .unwrap();

    let second = pool.acquire(Some("2"), CancellationToken::new()).await;
    assert!(matches!(second, Err(PoolError::ResourceBusy)));

    first.release().unwrap();
    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_acquire_respects_capacity_and_honors_cancellation() {
    let factory = FakeFactory::with_delay(Duration::from_millis(2));
    let created = factory.created_counter();
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        factory,
        SeedInitializer::idle(&["1", "2", "3"]),
    )
    .await
    .unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let pool = pool.clone();
        tasks.spawn(async move { pool.acquire_with_timeout(None, Duration::from_secs(1)).await });
    }

    let mut ok = 0;
    let mut cancelled = 0;
    while let Some(res) = tasks.join_next().await {
        match res.unwrap() {
            Ok(_guard) => ok += 1,
            Err(PoolError::ContextDone) => cancelled += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // 3 initial idle + up to 7 creates (capacity 10) can succeed; the rest
    // must be turned away rather than blow past capacity.
    assert!(ok <= 10);
    assert_eq!(ok + cancelled, 20);
    assert_eq!(created.load(Ordering::SeqCst), 7);

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn release_into_full_idle_triggers_disposal() {
    let factory = FakeFactory::new();
    let pool = Pool::new(
        fast_reconcile_config(3, 5, 10),
        factory,
        SeedInitializer::idle(&["1", "2", "3"]),
    )
    .await
    .unwrap();

    let mut guards = Vec::new();
    for _ in 0..6 {
        guards.push(pool.acquire_any().await.unwrap());
    }
    assert_eq!(pool.stat().idle, 0);
    assert_eq!(pool.stat().inuse, 6);

    let mut drained: Vec<_> = guards.drain(0..3).collect();
    for g in drained.drain(..) {
        g.release().unwrap();
    }
    assert_eq!(pool.stat().idle, 3);

    let mut more: Vec<_> = guards.drain(0..2).collect();
    for g in more.drain(..) {
        g.release().unwrap();
    }
    assert_eq!(pool.stat().idle, 5);

    let last = guards.pop().unwrap();
    last.release().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stat().idle, 5);

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn release_of_unknown_id_is_invalid_state() {
    let pool = Pool::new(fast_reconcile_config(0, 5, 10), FakeFactory::new(), EmptyInitializer)
        .await
        .unwrap();

    let err = pool.release("not-exists").unwrap_err();
    assert!(matches!(err, PoolError::InvalidState));

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn double_release_is_invalid_state_on_second_call() {
    let pool = Pool::new(fast_reconcile_config(0, 5, 10), FakeFactory::new(), EmptyInitializer)
        .await
        .unwrap();

    let guard = pool.acquire_any().await.unwrap();
    let id = guard.id().to_string();
    guard.release().unwrap();

    let second = pool.release(&id);
    assert!(matches!(second, Err(PoolError::InvalidState)));

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_plus_inuse_never_exceeds_capacity() {
    let pool = Pool::new(fast_reconcile_config(0, 2, 4), FakeFactory::new(), EmptyInitializer)
        .await
        .unwrap();

    let mut guards = Vec::new();
    for _ in 0..4 {
        guards.push(pool.acquire_any().await.unwrap());
    }
    let fifth = pool
        .acquire(None, {
            let t = CancellationToken::new();
            t.cancel();
            t
        })
        .await;
    assert!(matches!(fifth, Err(PoolError::ContextDone)));

    let stat = pool.stat();
    assert!(stat.idle + stat.inuse <= stat.capacity);

    for g in guards.drain(..) {
        g.release().unwrap();
    }
    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn construction_rejects_invalid_config() {
    let config = PoolConfig::builder().min_idle(5).max_idle(2).capacity(10).build();
    assert!(config.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn close_waits_for_in_flight_create() {
    let factory = FakeFactory::with_delay(Duration::from_millis(50));
    let created = factory.created_counter();
    let disposed = factory.disposed_counter();
    let pool = Pool::new(fast_reconcile_config(0, 2, 2), factory, EmptyInitializer)
        .await
        .unwrap();

    let acquirer = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_any().await })
    };

    // Let the acquire grab its admission token and start the (slow)
    // factory.create() call before racing close() against it.
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.close().await.unwrap();

    // close() must not return until the in-flight create has finished and
    // been settled; since the pool is already closed by the time it
    // finishes, it must have been disposed rather than admitted.
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);

    let outcome = acquirer.await.unwrap();
    assert!(matches!(outcome, Err(PoolError::PoolClosed)));
}
