//! The pool itself: registry + admission controller + acquire/release
//! paths + reconciler, wired together behind a single mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::factory::ResourceFactory;
use crate::guard::PoolGuard;
use crate::initializer::PoolInitializer;
use crate::registry::{InitHolder, Registry};
use crate::resource::PoolResource;
use crate::stat::PoolStat;

/// A bounded, self-healing pool of externally-provisioned resources.
///
/// Construct with [`Pool::new`], wrapped in an `Arc` since the pool owns a
/// background reconciler task that outlives any single call.
pub struct Pool<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    config: PoolConfig,
    factory: F,
    registry: Mutex<Registry<R>>,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
    notify: Notify,
    reconciler: Mutex<Option<JoinHandle<()>>>,
    /// Every task that touches the factory or the registry after the
    /// caller's own stack frame — creates, disposes, startup trimming —
    /// is spawned here rather than onto a throwaway `JoinSet`, and the
    /// `closed` flag is only ever flipped while holding this same lock,
    /// so `close()` can drain exactly the set of work that was admitted
    /// before shutdown began; see `spawn_tracked`.
    background: Mutex<JoinSet<()>>,
    last_create_failure: Mutex<Option<Instant>>,
}

impl<R, F> Pool<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    /// Validate `config`, reconstruct state via `initializer`, trim to
    /// capacity/`max_idle`, and start the background reconciler.
    ///
    /// Startup disposal (over-capacity or over-`max_idle` trimming) runs
    /// in the background and does not delay this call's return.
    pub async fn new<I>(
        config: PoolConfig,
        factory: F,
        initializer: I,
    ) -> Result<Arc<Self>, PoolError<F::Error>>
    where
        I: PoolInitializer<R>,
    {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let mut registry = Registry::new();
        {
            let mut holder = InitHolder {
                registry: &mut registry,
            };
            initializer
                .initialize(&mut holder)
                .await
                .map_err(|e| PoolError::Initializer(Box::new(e)))?;
        }

        // Trim anything the reconstructor reported beyond capacity. These
        // resources never held an admission token, so disposing them
        // returns none.
        let (idle_n, inuse_n) = registry.sizes();
        let mut overflow = (idle_n + inuse_n).saturating_sub(config.capacity);
        let mut untokened = Vec::new();
        while overflow > 0 {
            if let Some(r) = registry.take_idle_any() {
                untokened.push(r);
            } else if let Some(r) = registry.take_inuse_any() {
                tracing::warn!(
                    resource_id = %r.id(),
                    "reconstructed pool over capacity from inuse resources, disposing"
                );
                untokened.push(r);
            } else {
                break;
            }
            overflow -= 1;
        }

        let semaphore = Arc::new(Semaphore::new(config.capacity));
        let (idle_n, inuse_n) = registry.sizes();
        for _ in 0..(idle_n + inuse_n) {
            if let Ok(permit) = semaphore.clone().try_acquire_owned() {
                permit.forget();
            }
        }

        // Trim idle surplus beyond max_idle. These resources do hold a
        // token, which disposal must return.
        let mut tokened_excess = Vec::new();
        while registry.idle_len() > config.max_idle {
            match registry.take_idle_any() {
                Some(r) => tokened_excess.push(r),
                None => break,
            }
        }

        tracing::info!(
            idle = registry.idle_len(),
            inuse = registry.inuse_len(),
            capacity = config.capacity,
            min_idle = config.min_idle,
            max_idle = config.max_idle,
            reconstructed_disposals = untokened.len() + tokened_excess.len(),
            "pool reconstructed from initializer"
        );

        let pool = Arc::new(Self {
            config,
            factory,
            registry: Mutex::new(registry),
            semaphore,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
            reconciler: Mutex::new(None),
            background: Mutex::new(JoinSet::new()),
            last_create_failure: Mutex::new(None),
        });

        for r in untokened {
            // These never held a token; dispose them plainly. The pool
            // cannot be closed yet (we haven't returned `new` or started
            // the reconciler), so there is nothing for `close()` to race.
            let pool = Arc::clone(&pool);
            pool.background.lock().spawn(async move {
                let rid = r.id().to_string();
                if let Err(e) = pool.factory.dispose(r).await {
                    tracing::warn!(resource_id = %rid, error = %e, "startup over-capacity dispose failed");
                } else {
                    tracing::debug!(resource_id = %rid, "disposed reconstructed over-capacity resource");
                }
                // Unlike `dispose_inline`, no token is returned: these
                // resources never held one (they were never counted into
                // the semaphore in the first place).
            });
        }
        for r in tokened_excess {
            pool.spawn_dispose(r);
        }

        pool.spawn_reconciler();
        Ok(pool)
    }

    /// Acquire a resource. `preferred_id` names an idle resource the
    /// caller would like back; an empty/absent preference, or one that
    /// doesn't name an idle resource, falls back to any idle resource and
    /// finally to creating one. `cancel` is honored while waiting for
    /// admission; a create already in flight always runs to completion.
    pub async fn acquire(
        self: &Arc<Self>,
        preferred_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<PoolGuard<R, F>, PoolError<F::Error>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::PoolClosed);
        }

        if let Some(id) = preferred_id {
            let outcome = {
                let mut reg = self.registry.lock();
                if let Some(r) = reg.take_idle_by_id(id) {
                    let handle = r.clone();
                    reg.add_inuse(r);
                    Some(Ok(handle))
                } else if reg.contains_inuse(id) {
                    Some(Err(PoolError::ResourceBusy))
                } else {
                    None
                }
            };
            match outcome {
                Some(Ok(handle)) => {
                    tracing::debug!(resource_id = %handle.id(), "admitted preferred idle resource");
                    return Ok(self.guard(handle));
                }
                Some(Err(e)) => return Err(e),
                None => {}
            }
        }

        {
            let mut reg = self.registry.lock();
            if let Some(r) = reg.take_idle_any() {
                let handle = r.clone();
                reg.add_inuse(r);
                tracing::debug!(resource_id = %handle.id(), "admitted idle resource");
                return Ok(self.guard(handle));
            }
        }

        self.acquire_via_create(cancel).await
    }

    /// Convenience wrapper: acquire any resource with no cancellation.
    pub async fn acquire_any(self: &Arc<Self>) -> Result<PoolGuard<R, F>, PoolError<F::Error>> {
        self.acquire(None, CancellationToken::new()).await
    }

    /// Convenience wrapper: acquire with a simple deadline instead of a
    /// pre-built [`CancellationToken`].
    ///
    /// A deadline only ever aborts the *wait* for admission; a create
    /// already running is never interrupted (see [`Pool::acquire`]).
    pub async fn acquire_with_timeout(
        self: &Arc<Self>,
        preferred_id: Option<&str>,
        timeout: Duration,
    ) -> Result<PoolGuard<R, F>, PoolError<F::Error>> {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        let sleeper = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            canceller.cancel();
        });
        let result = self.acquire(preferred_id, cancel).await;
        sleeper.abort();
        result
    }

    /// Acquire an admission token, then run `factory.create()` to
    /// completion on the tracked background set so `close()` can wait for
    /// it regardless of whether this caller is still around to observe
    /// the result.
    async fn acquire_via_create(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<PoolGuard<R, F>, PoolError<F::Error>> {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PoolError::ContextDone),
                    acquired = self.semaphore.clone().acquire_owned() => {
                        match acquired {
                            Ok(permit) => permit,
                            Err(_) => return Err(PoolError::PoolClosed),
                        }
                    }
                }
            }
        };

        let (tx, rx) = tokio::sync::oneshot::channel();
        let pool = Arc::clone(self);
        let spawned = self.spawn_tracked(async move {
            let outcome = pool.run_create(permit, cancel).await;
            let _ = tx.send(outcome);
        });
        if !spawned {
            return Err(PoolError::PoolClosed);
        }

        match rx.await {
            Ok(result) => result.map(|resource| self.guard(resource)),
            // The sender side was dropped without sending, which only
            // happens if the spawned task itself panicked.
            Err(_) => Err(PoolError::PoolClosed),
        }
    }

    /// Runs one `factory.create()` to completion and settles its result —
    /// admitted into `inuse`, deposited into `idle`, or disposed — no
    /// matter what happened to the caller that originally requested it.
    /// Always invoked from within the tracked background set.
    async fn run_create(
        self: Arc<Self>,
        permit: OwnedSemaphorePermit,
        cancel: CancellationToken,
    ) -> Result<R, PoolError<F::Error>> {
        match self.factory.create().await {
            Ok(resource) => {
                permit.forget();
                tracing::debug!(resource_id = %resource.id(), "factory created resource");

                if self.closed.load(Ordering::Acquire) {
                    tracing::debug!(
                        resource_id = %resource.id(),
                        "pool closed while create was in flight, disposing instead of admitting"
                    );
                    self.dispose_inline(resource).await;
                    return Err(PoolError::PoolClosed);
                }

                if cancel.is_cancelled() {
                    self.settle_idle_or_dispose(resource.clone()).await;
                    return Err(PoolError::ContextDone);
                }

                self.registry.lock().add_inuse(resource.clone());
                tracing::debug!(resource_id = %resource.id(), "admitted newly created resource into inuse");
                Ok(resource)
            }
            Err(e) => {
                drop(permit);
                tracing::warn!(error = %e, "factory create failed");
                Err(PoolError::Factory(e))
            }
        }
    }

    /// Return a checked-out resource by id. Non-blocking: disposal (if
    /// idle is already at `max_idle`) runs in the background.
    pub fn release(self: &Arc<Self>, id: &str) -> Result<(), PoolError<F::Error>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::PoolClosed);
        }

        let outcome = {
            let mut reg = self.registry.lock();
            match reg.take_inuse_by_id(id) {
                None => None,
                Some(r) => {
                    if reg.idle_len() < self.config.max_idle {
                        reg.add_idle(r);
                        Some(None)
                    } else {
                        Some(Some(r))
                    }
                }
            }
        };

        match outcome {
            None => Err(PoolError::InvalidState),
            Some(None) => {
                tracing::debug!(resource_id = id, "released resource into idle");
                self.notify.notify_one();
                Ok(())
            }
            Some(Some(r)) => {
                tracing::debug!(resource_id = id, "idle saturated, disposing released resource");
                self.spawn_dispose(r);
                Ok(())
            }
        }
    }

    /// Stop accepting new work, dispose idle resources, and wait for
    /// in-flight creates/disposes to finish. Resources still checked out
    /// are left with the caller — the pool cannot revoke a live handle.
    pub async fn close(self: &Arc<Self>) -> Result<(), PoolError<F::Error>> {
        // Flip `closed` and take ownership of the background set as one
        // step, under the same lock `spawn_tracked` uses: whichever of
        // "a caller spawns new background work" and "close() takes over
        // the set" happens first under this lock is the one that wins,
        // so no create spawned after this point escapes the drain below.
        let mut pending = {
            let mut bg = self.background.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::replace(&mut *bg, JoinSet::new())
        };

        if let Some(handle) = self.reconciler.lock().take() {
            handle.abort();
        }

        let idle_resources = {
            let mut reg = self.registry.lock();
            reg.clear_inuse();
            reg.drain_idle()
        };
        tracing::info!(disposing = idle_resources.len(), "pool closing, disposing idle reserve");
        for r in idle_resources {
            let pool = Arc::clone(self);
            pending.spawn(async move {
                pool.dispose_inline(r).await;
            });
        }

        while pending.join_next().await.is_some() {}
        tracing::info!("pool closed");
        Ok(())
    }

    /// Read-only snapshot of current occupancy.
    pub fn stat(&self) -> PoolStat {
        let reg = self.registry.lock();
        PoolStat {
            idle: reg.idle_len(),
            inuse: reg.inuse_len(),
            capacity: self.config.capacity,
        }
    }

    fn guard(self: &Arc<Self>, resource: R) -> PoolGuard<R, F> {
        PoolGuard::new(resource, Arc::clone(self))
    }

    /// Spawn `fut` onto the tracked background set, unless the pool has
    /// already started closing. Returns whether it was actually spawned.
    ///
    /// The closed-check and the spawn happen under the same lock `close`
    /// uses to flip `closed` and take over the set, so the two can never
    /// interleave: either this spawn lands in the set `close` will drain,
    /// or `close` has already claimed the set and this call is refused.
    fn spawn_tracked<Fut>(self: &Arc<Self>, fut: Fut) -> bool
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut bg = self.background.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        bg.spawn(fut);
        true
    }

    /// Place a just-created resource into idle, or dispose it if idle is
    /// already saturated or the pool has closed since the create began.
    /// Used when a create's original caller is no longer waiting (the
    /// caller's `ctx` was cancelled, see `run_create`) and by the
    /// reconciler's top-up path.
    async fn settle_idle_or_dispose(self: &Arc<Self>, resource: R) {
        let mut resource = Some(resource);
        {
            let mut reg = self.registry.lock();
            if !self.closed.load(Ordering::Acquire) && reg.idle_len() < self.config.max_idle {
                reg.add_idle(resource.take().unwrap());
            }
        }
        match resource {
            None => {
                tracing::debug!("deposited create into idle after original caller stopped waiting");
                self.notify.notify_one();
            }
            Some(r) => {
                tracing::debug!(resource_id = %r.id(), "idle saturated or pool closed, disposing instead");
                self.dispose_inline(r).await;
            }
        }
    }

    /// Run `factory.dispose` to completion and return its admission
    /// token. Failures are logged and swallowed — the resource is gone
    /// either way (spec.md §7).
    async fn dispose_inline(self: &Arc<Self>, resource: R) {
        let rid = resource.id().to_string();
        match self.factory.dispose(resource).await {
            Ok(()) => tracing::debug!(resource_id = %rid, "disposed resource"),
            Err(e) => tracing::warn!(resource_id = %rid, error = %e, "factory dispose failed"),
        }
        self.semaphore.add_permits(1);
    }

    /// Dispose `resource` in the background and return its admission
    /// token once dispose completes (regardless of outcome).
    ///
    /// If the pool is already closing, falls back to an untracked spawn:
    /// the resource has already been removed from the registry by the
    /// caller, so there is nothing left for `close()`'s teardown to
    /// corrupt — only the factory-side teardown and the token return
    /// remain, which do not need to block `close()`'s return.
    fn spawn_dispose(self: &Arc<Self>, resource: R) {
        let pool = Arc::clone(self);
        let mut bg = self.background.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(bg);
            // `close()` already claimed the tracked set between this
            // resource being pulled out of the registry and the spawn
            // attempt above. The resource is already gone from the
            // registry, so there is nothing left to corrupt; fall back
            // to a plain, untracked spawn so the factory still gets to
            // tear it down and the admission token is still returned,
            // just without `close()` waiting on it.
            tokio::spawn(async move { pool.dispose_inline(resource).await });
            return;
        }
        bg.spawn(async move { pool.dispose_inline(resource).await });
    }

    fn spawn_reconciler(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.reconcile_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = pool.notify.notified() => {}
                }
                if pool.closed.load(Ordering::Acquire) {
                    break;
                }
                pool.reconcile_once().await;
            }
        });
        *self.reconciler.lock() = Some(handle);
    }

    async fn reconcile_once(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let (idle, free) = {
            let reg = self.registry.lock();
            (reg.idle_len(), self.semaphore.available_permits())
        };

        if idle < self.config.min_idle && free > 0 {
            if let Some(last) = *self.last_create_failure.lock() {
                if last.elapsed() < self.config.create_retry_backoff {
                    tracing::debug!("reconcile pass: skipping top-up, still in create-failure backoff");
                    return;
                }
            }
            let to_create = (self.config.min_idle - idle).min(free);
            tracing::info!(
                idle,
                min_idle = self.config.min_idle,
                to_create,
                "pool below minimum idle, topping up"
            );
            let mut waiters = Vec::with_capacity(to_create);
            for _ in 0..to_create {
                let pool = Arc::clone(self);
                let (tx, rx) = tokio::sync::oneshot::channel();
                let spawned = self.spawn_tracked(async move {
                    pool.reconciler_create_one().await;
                    let _ = tx.send(());
                });
                if spawned {
                    waiters.push(rx);
                }
            }
            for rx in waiters {
                let _ = rx.await;
            }
        } else if idle > self.config.max_idle {
            let excess = idle - self.config.max_idle;
            tracing::info!(idle, max_idle = self.config.max_idle, excess, "pool above maximum idle, trimming");
            for _ in 0..excess {
                let r = self.registry.lock().take_idle_any();
                match r {
                    Some(r) => self.spawn_dispose(r),
                    None => break,
                }
            }
        } else {
            tracing::debug!(
                idle,
                min_idle = self.config.min_idle,
                max_idle = self.config.max_idle,
                "reconcile pass: idle within bounds"
            );
        }
    }

    async fn reconciler_create_one(self: &Arc<Self>) {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return,
        };
        if self.closed.load(Ordering::Acquire) {
            drop(permit);
            return;
        }

        match self.factory.create().await {
            Ok(resource) => {
                permit.forget();
                *self.last_create_failure.lock() = None;
                tracing::debug!(resource_id = %resource.id(), "reconciler created resource to top up idle reserve");
                self.settle_idle_or_dispose(resource).await;
            }
            Err(e) => {
                drop(permit);
                *self.last_create_failure.lock() = Some(Instant::now());
                tracing::debug!(error = %e, "reconciler create failed, retrying next tick");
            }
        }
    }
}
