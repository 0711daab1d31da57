//! Beacon node configuration
//!
//! Loaded from a JSON file; every section falls back to defaults so a
//! minimal config only needs the remote address.

use crate::error::{BeaconError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub identity: IdentityConfig,
    pub connector: ConnectorConfig,
    pub negotiation: NegotiationConfig,
    pub pricing: PricingConfig,
    pub commit: CommitRetryConfig,
}

impl BeaconConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: BeaconConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the node misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.connector.queue_capacity == 0 {
            return Err(BeaconError::InvalidConfig(
                "connector.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.connector.backoff.multiplier < 1.0 {
            return Err(BeaconError::InvalidConfig(
                "connector.backoff.multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.negotiation.offer_ttl_ms == 0 {
            return Err(BeaconError::InvalidConfig(
                "negotiation.offer_ttl_ms must be nonzero".to_string(),
            ));
        }
        if self.commit.max_attempts == 0 {
            return Err(BeaconError::InvalidConfig(
                "commit.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity announced in the registration envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Hex-encoded public key the beacon id is derived from
    pub pubkey_hex: String,
    pub display_name: String,
    pub capabilities: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            pubkey_hex: String::new(),
            display_name: "beacon".to_string(),
            capabilities: vec!["negotiate".to_string(), "transact".to_string()],
        }
    }
}

/// Session connector configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Address of the AURA Core to dial
    pub remote_addr: String,
    /// Outbound queue capacity
    pub queue_capacity: usize,
    /// What to do with a full queue while connected
    pub overflow: OverflowPolicy,
    pub backoff: BackoffConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            remote_addr: "127.0.0.1:7420".to_string(),
            queue_capacity: 256,
            overflow: OverflowPolicy::Reject,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Policy for a full outbound queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued envelope to make room
    DropOldest,
    /// Refuse the new envelope
    Reject,
}

/// Exponential backoff schedule for reconnects and commit retries
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub multiplier: f64,
    pub cap_ms: u64,
    /// Consecutive failures tolerated before giving up
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 250,
            multiplier: 2.0,
            cap_ms: 30_000,
            max_retries: 8,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry `attempt` (1-based), capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let raw = self.base_ms as f64 * self.multiplier.powi(exp as i32);
        Duration::from_millis((raw as u64).min(self.cap_ms))
    }
}

/// Negotiation state machine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// How long a proposition stands before it expires
    pub offer_ttl_ms: u64,
    /// Counter-offer rounds tolerated before declining out-of-policy
    pub max_rounds: u32,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            offer_ttl_ms: 30_000,
            max_rounds: 8,
        }
    }
}

impl NegotiationConfig {
    pub fn offer_ttl(&self) -> Duration {
        Duration::from_millis(self.offer_ttl_ms)
    }
}

/// Band pricing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Floor as parts-per-hundred of list price
    pub floor_percent: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { floor_percent: 85 }
    }
}

/// Transaction commit retry configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitRetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for CommitRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig {
                base_ms: 100,
                multiplier: 2.0,
                cap_ms: 5_000,
                max_retries: 3,
            },
        }
    }
}
