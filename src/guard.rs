//! RAII handle returned by `Pool::acquire`.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::PoolError;
use crate::factory::ResourceFactory;
use crate::pool::Pool;
use crate::resource::PoolResource;

/// A checked-out resource. Dropping it releases the resource back to the
/// pool; call [`PoolGuard::release`] instead to observe the `Result`.
pub struct PoolGuard<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    resource: R,
    id: String,
    pool: Arc<Pool<R, F>>,
    released: bool,
}

impl<R, F> PoolGuard<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    pub(crate) fn new(resource: R, pool: Arc<Pool<R, F>>) -> Self {
        let id = resource.id().to_string();
        Self {
            resource,
            id,
            pool,
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the resource to the pool, observing any error.
    pub fn release(mut self) -> Result<(), PoolError<F::Error>> {
        self.released = true;
        self.pool.release(&self.id)
    }
}

impl<R, F> Deref for PoolGuard<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R, F> DerefMut for PoolGuard<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resource
    }
}

impl<R, F> Drop for PoolGuard<R, F>
where
    R: PoolResource + Clone,
    F: ResourceFactory<R>,
{
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.pool.release(&self.id) {
                tracing::debug!(resource_id = %self.id, error = %e, "auto-release on drop failed");
            }
        }
    }
}
