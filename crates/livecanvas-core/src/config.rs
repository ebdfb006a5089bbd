//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Interval between reaction emissions while the pointer is held.
pub const DEFAULT_REACTION_EMIT_INTERVAL_MS: u64 = 100;
/// How long a reaction stays in the active list.
pub const DEFAULT_REACTION_TTL_MS: u64 = 4000;
/// Interval between sweeps of expired reactions.
pub const DEFAULT_REACTION_SWEEP_INTERVAL_MS: u64 = 1000;
/// Maximum number of undo steps kept per client.
pub const DEFAULT_MAX_UNDO_STEPS: usize = 100;
/// Default relay endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3030/ws";

/// Tunables for a live client.
///
/// Every field has a default so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub reaction_emit_interval_ms: u64,
    pub reaction_ttl_ms: u64,
    pub reaction_sweep_interval_ms: u64,
    pub max_undo_steps: usize,
    pub server_url: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            reaction_emit_interval_ms: DEFAULT_REACTION_EMIT_INTERVAL_MS,
            reaction_ttl_ms: DEFAULT_REACTION_TTL_MS,
            reaction_sweep_interval_ms: DEFAULT_REACTION_SWEEP_INTERVAL_MS,
            max_undo_steps: DEFAULT_MAX_UNDO_STEPS,
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl LiveConfig {
    /// Parse a configuration from JSON, defaulting missing fields.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
