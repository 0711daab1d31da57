//! Built-in collaborator implementations
//!
//! Enough to run a self-contained beacon node: a JSON-backed in-memory
//! catalog, a band pricing policy, an in-memory order gateway and a
//! tracing-backed diagnostic sink.

use crate::capabilities::{
    DiagnosticRecord, DiagnosticSink, InventoryMatch, InventorySearch, OrderGateway,
    OrderReceipt, PricingPolicy, Quotation, QuoteRequest,
};
use crate::error::{BeaconError, CommitFailure, Result};
use crate::negotiation::{Intent, Terms};
use crate::types::{unix_millis, CorrelationId, Sku};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One sellable item in the local catalog
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: Sku,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub available: u32,
    /// Listed unit price in minor currency units
    pub list_price: u64,
}

/// In-memory inventory backed by a JSON catalog file
pub struct MemoryInventory {
    items: Mutex<Vec<CatalogItem>>,
}

impl MemoryInventory {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    /// Load a catalog from a JSON array file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
        Ok(Self::new(items))
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().expect("catalog poisoned").len()
    }

    fn matches(item: &CatalogItem, intent: &Intent) -> bool {
        let query = intent.query.to_lowercase();
        let title_hit = item.title.to_lowercase().contains(&query)
            || item.sku.0.to_lowercase() == query;

        let category_hit = match (&intent.category, &item.category) {
            (Some(wanted), Some(have)) => wanted.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
            (None, _) => true,
        };

        let price_hit = intent
            .max_unit_price
            .map(|cap| item.list_price <= cap)
            .unwrap_or(true);

        title_hit && category_hit && price_hit
    }
}

#[async_trait]
impl InventorySearch for MemoryInventory {
    async fn search(&self, intent: &Intent) -> Result<Vec<InventoryMatch>> {
        let items = self.items.lock().expect("catalog poisoned");

        let mut found: Vec<InventoryMatch> = items
            .iter()
            .filter(|item| Self::matches(item, intent))
            .map(|item| InventoryMatch {
                sku: item.sku.clone(),
                title: item.title.clone(),
                available: item.available,
                list_price: item.list_price,
            })
            .collect();

        // Cheapest first is the best opening position
        found.sort_by_key(|m| m.list_price);
        Ok(found)
    }
}

/// Pricing policy with a fixed floor ratio under the list price.
///
/// Opens at list price and concedes toward the midpoint of the standing
/// ask and the counter-offer, never below the floor.
pub struct BandPricing {
    /// Floor as parts-per-hundred of list price, e.g. 85
    floor_percent: u64,
}

impl BandPricing {
    pub fn new(floor_percent: u64) -> Result<Self> {
        if floor_percent == 0 || floor_percent > 100 {
            return Err(BeaconError::InvalidConfig(format!(
                "floor_percent out of range: {}",
                floor_percent
            )));
        }
        Ok(Self { floor_percent })
    }
}

#[async_trait]
impl PricingPolicy for BandPricing {
    async fn price_for(&self, request: QuoteRequest) -> Result<Quotation> {
        if request.list_price == 0 {
            return Err(BeaconError::Unpriceable(request.sku.0));
        }

        let floor = (request.list_price * self.floor_percent) / 100;
        let ask = match request.counter_price {
            // Concede to the midpoint, clamped at the floor
            Some(counter) if counter < request.list_price => {
                ((request.list_price + counter) / 2).max(floor)
            }
            _ => request.list_price,
        };

        Ok(Quotation { ask, floor })
    }
}

/// In-memory order gateway: decrements catalog stock on commit
pub struct MemoryOrderGateway {
    stock: Mutex<HashMap<Sku, u32>>,
}

impl MemoryOrderGateway {
    pub fn from_catalog(items: &[CatalogItem]) -> Self {
        let stock = items
            .iter()
            .map(|item| (item.sku.clone(), item.available))
            .collect();
        Self {
            stock: Mutex::new(stock),
        }
    }

    pub fn remaining(&self, sku: &Sku) -> Option<u32> {
        self.stock.lock().expect("stock poisoned").get(sku).copied()
    }
}

#[async_trait]
impl OrderGateway for MemoryOrderGateway {
    async fn commit_order(
        &self,
        terms: &Terms,
        correlation_id: &CorrelationId,
    ) -> std::result::Result<OrderReceipt, CommitFailure> {
        let mut stock = self.stock.lock().expect("stock poisoned");

        let Some(available) = stock.get_mut(&terms.sku) else {
            return Err(CommitFailure::Permanent(format!(
                "unknown sku {}",
                terms.sku
            )));
        };

        if *available < terms.quantity {
            return Err(CommitFailure::Permanent(format!(
                "insufficient stock for {}: {} left",
                terms.sku, available
            )));
        }

        *available -= terms.quantity;
        Ok(OrderReceipt {
            order_ref: format!("ord_{}", correlation_id),
            committed_at: unix_millis(),
        })
    }
}

/// Diagnostic sink writing structured records to the tracing subscriber
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, record: DiagnosticRecord) {
        match record {
            DiagnosticRecord::EnvelopeSent { kind } => {
                tracing::debug!(kind, "envelope sent");
            }
            DiagnosticRecord::EnvelopeReceived { kind } => {
                tracing::debug!(kind, "envelope received");
            }
            DiagnosticRecord::EnvelopeDropped { kind } => {
                tracing::warn!(kind, "envelope dropped");
            }
            DiagnosticRecord::StateTransition {
                correlation_id,
                state,
            } => {
                tracing::info!(%correlation_id, state, "negotiation state");
            }
            DiagnosticRecord::CommitAttempt {
                correlation_id,
                attempt,
            } => {
                tracing::debug!(%correlation_id, attempt, "commit attempt");
            }
        }
    }
}
