//! Core identifier types used throughout the Beacon

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Correlation identifier binding an inquiry, its negotiation and its
/// transaction together. Unique for the lifetime of a negotiation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Generate a new unique correlation ID (timestamp + random suffix)
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis();
        let suffix: u32 = rand::random();

        Self(format!("corr_{}_{:08x}", timestamp, suffix))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Beacon identifier (derived from public key hash)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconId(pub String);

impl BeaconId {
    /// Create BeaconId from public key bytes
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(pubkey);
        let result = hasher.finalize();
        Self(hex::encode(&result[..16])) // Use first 16 bytes
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote counterparty identifier (an AURA Core / Scout)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterpartyId(pub String);

impl fmt::Display for CounterpartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stock-keeping unit identifying one catalog item
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(pub String);

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_uniqueness() {
        let id1 = CorrelationId::generate();
        let id2 = CorrelationId::generate();

        assert!(id1.0.starts_with("corr_"));
        // Random suffix avoids same-millisecond collisions
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_beacon_id_from_pubkey() {
        let pubkey1 = b"test_public_key_1";
        let pubkey2 = b"test_public_key_2";

        let beacon1 = BeaconId::from_pubkey(pubkey1);
        let beacon2 = BeaconId::from_pubkey(pubkey2);

        // Different pubkeys should produce different beacon IDs
        assert_ne!(beacon1, beacon2);

        // Same pubkey should produce same beacon ID (deterministic)
        let beacon1_again = BeaconId::from_pubkey(pubkey1);
        assert_eq!(beacon1, beacon1_again);
    }

    #[test]
    fn test_serialization() {
        let corr = CorrelationId::generate();
        let serialized = serde_json::to_string(&corr).unwrap();
        let deserialized: CorrelationId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(corr, deserialized);

        let sku = Sku("sku-001".to_string());
        let serialized = serde_json::to_string(&sku).unwrap();
        let deserialized: Sku = serde_json::from_str(&serialized).unwrap();
        assert_eq!(sku, deserialized);
    }
}
