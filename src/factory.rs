//! External resource factory interface.

use async_trait::async_trait;

use crate::resource::PoolResource;

/// Creates and disposes the resource the pool manages.
///
/// Both operations may block and may fail. On a `create` error no side
/// effects are visible to the pool — no token is consumed. `dispose`
/// failures are logged by the pool and swallowed; the resource is gone
/// either way.
///
/// Implementers must be safe to call concurrently from distinct tasks —
/// the pool issues concurrent creates up to its spare capacity.
#[async_trait]
pub trait ResourceFactory<R>: Send + Sync + 'static
where
    R: PoolResource,
{
    /// Error type surfaced verbatim to the caller of `Pool::acquire`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Provision a new resource.
    async fn create(&self) -> Result<R, Self::Error>;

    /// Tear down a resource the pool no longer wants.
    async fn dispose(&self, resource: R) -> Result<(), Self::Error>;
}
