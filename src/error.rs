//! Pool-level error kinds.

use thiserror::Error;

/// Errors surfaced by [`crate::Pool`] operations.
///
/// `E` is the associated error type of the [`crate::ResourceFactory`] in
/// use; factory errors are threaded through verbatim rather than
/// stringified, unlike the initializer error below (boxed, since it is
/// only consulted once at startup and callers don't need to match on it).
#[derive(Debug, Error)]
pub enum PoolError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("release rejected: resource is not checked out")]
    InvalidState,

    #[error("resource is currently in use")]
    ResourceBusy,

    #[error("pool is closed")]
    PoolClosed,

    #[error("acquire cancelled before a resource was returned")]
    ContextDone,

    #[error("resource factory failed: {0}")]
    Factory(#[source] E),

    #[error("pool initializer failed: {0}")]
    Initializer(#[source] Box<dyn std::error::Error + Send + Sync>),
}
