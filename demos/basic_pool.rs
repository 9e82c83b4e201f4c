//! Demonstrates the network-interface pool: a fake factory that simulates
//! slow ENI attach/detach, a reconciler keeping a warm idle reserve, and
//! an acquire/release round trip.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eni_pool::{EmptyInitializer, Pool, PoolConfig, PoolResource, ResourceFactory};
use thiserror::Error;

#[derive(Debug, Clone)]
struct NetworkInterface {
    id: String,
    mac: String,
}

impl PoolResource for NetworkInterface {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "eni"
    }
}

#[derive(Debug, Error)]
#[error("eni factory error: {0}")]
struct EniError(String);

struct FakeEniFactory {
    next_id: AtomicU64,
}

#[async_trait]
impl ResourceFactory<NetworkInterface> for FakeEniFactory {
    type Error = EniError;

    async fn create(&self) -> Result<NetworkInterface, Self::Error> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(NetworkInterface {
            id: format!("eni-{n}"),
            mac: format!("02:00:00:00:{:02x}:{:02x}", (n >> 8) & 0xff, n & 0xff),
        })
    }

    async fn dispose(&self, resource: NetworkInterface) -> Result<(), Self::Error> {
        tracing::debug!(resource_id = %resource.id, mac = %resource.mac, "detaching eni");
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = PoolConfig::builder()
        .min_idle(2)
        .max_idle(5)
        .capacity(10)
        .build()
        .map_err(|e| format!("invalid config: {e}"))?;

    let factory = FakeEniFactory {
        next_id: AtomicU64::new(0),
    };

    let pool = Pool::new(config, factory, EmptyInitializer).await?;

    // Let the reconciler top up to min_idle.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let warmed_up = pool.stat();
    tracing::info!(?warmed_up, "after warmup");

    let guard = pool.acquire_any().await?;
    tracing::info!(resource_id = guard.id(), "acquired eni");

    guard.release()?;
    let after_release = pool.stat();
    tracing::info!(?after_release, "after release");

    pool.close().await?;
    Ok(())
}
