//! A bounded, self-healing object pool for expensive, externally
//! provisioned resources (network interfaces, in the motivating case).
//!
//! Callers acquire a resource — optionally by identity — use it, and
//! release it back. The pool amortizes creation cost against a hard
//! fleet-wide capacity, keeps a warm idle reserve, and reaps surplus
//! idle resources in the background.

mod config;
mod error;
mod factory;
mod guard;
mod initializer;
mod pool;
mod registry;
mod resource;
mod stat;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::PoolError;
pub use factory::ResourceFactory;
pub use guard::PoolGuard;
pub use initializer::{EmptyInitializer, PoolInitializer, ResourceHolder};
pub use pool::Pool;
pub use resource::PoolResource;
pub use stat::PoolStat;

pub use tokio_util::sync::CancellationToken;
