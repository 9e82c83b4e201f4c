//! Startup reconstruction: populating the pool from external truth.

use async_trait::async_trait;

use crate::resource::PoolResource;

/// Sink the initializer reports discovered resources into.
///
/// `add_idle`/`add_inuse` may be called any number of times while
/// `PoolInitializer::initialize` runs; each call consumes one admission
/// token, subject to the post-initialization trimming described on
/// [`crate::Pool::new`].
pub trait ResourceHolder<R: PoolResource> {
    /// Report a resource that is free for the pool to hand out.
    fn add_idle(&mut self, resource: R);

    /// Report a resource already checked out by some external caller
    /// (e.g. one discovered still attached to a running workload).
    fn add_inuse(&mut self, resource: R);
}

/// One-shot callback invoked exactly once during [`crate::Pool::new`] to
/// recover state from a crash or restart.
///
/// Recovery truth lives outside the pool (container runtime, CNI state
/// directory, cloud API); this trait only carries what the reconstructor
/// found into the fresh in-memory registry.
#[async_trait]
pub trait PoolInitializer<R: PoolResource>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn initialize(&self, holder: &mut dyn ResourceHolder<R>) -> Result<(), Self::Error>;
}

/// An initializer for pools with no recoverable state (fresh start, or
/// recovery genuinely delegated elsewhere).
pub struct EmptyInitializer;

#[async_trait]
impl<R: PoolResource> PoolInitializer<R> for EmptyInitializer {
    type Error = std::convert::Infallible;

    async fn initialize(&self, _holder: &mut dyn ResourceHolder<R>) -> Result<(), Self::Error> {
        Ok(())
    }
}
