//! The resource trait pooled values must implement.

/// An opaque, pool-managed value with a stable identity and a type tag.
///
/// Identity is unique across the pool's lifetime and is the only key the
/// pool uses internally; `kind` is carried for the caller's benefit (e.g.
/// logging, routing) and never inspected by the pool itself.
pub trait PoolResource: Send + 'static {
    /// Stable identity, unique across idle ∪ inuse.
    fn id(&self) -> &str;

    /// Type tag, opaque to the pool.
    fn kind(&self) -> &str;
}
