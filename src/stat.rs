//! Read-only pool snapshot.

use serde::Serialize;

/// A point-in-time snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStat {
    pub idle: usize,
    pub inuse: usize,
    pub capacity: usize,
}

impl PoolStat {
    /// Render as JSON, for embedding in a status endpoint or log line.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "idle": self.idle,
            "inuse": self.inuse,
            "capacity": self.capacity,
        })
    }
}
