use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{Document, DocumentStore, FirestoreStore, ORDERS_COLLECTION};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::DeliveryOutcome;

const DELIVERY_FIELD: &str = "delivery";

/// Where a saved document ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written to both tiers
    Synced,
    /// Written locally only, waiting for [`TieredStore::sync`]
    PendingSync,
}

impl SaveOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SaveOutcome::Synced)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct LocalRecord {
    doc: Document,
    pending_sync: bool,
}

/// Local-first document cache in front of an optional remote store.
///
/// Writes land in the local tier before the remote one; reads merge both
/// tiers with last-writer-wins on `updated_at`.
#[derive(Clone)]
pub struct TieredStore {
    remote: Option<Arc<dyn DocumentStore>>,
    local: Arc<DashMap<(String, String), LocalRecord>>,
}

impl TieredStore {
    pub fn new(remote: Option<Arc<dyn DocumentStore>>) -> Self {
        Self {
            remote,
            local: Arc::new(DashMap::new()),
        }
    }

    pub fn local_only() -> Self {
        Self::new(None)
    }

    /// Local-only when the document store is not configured.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        match FirestoreStore::from_config(cfg) {
            Ok(remote) => Ok(Self::new(Some(Arc::new(remote)))),
            Err(ServiceError::NotConfigured(what)) => {
                warn!("{}; documents are kept in process memory only", what);
                Ok(Self::local_only())
            }
            Err(e) => Err(e),
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.local.iter().filter(|r| r.value().pending_sync).count()
    }

    /// Writes locally, then remotely. A remote failure leaves the record pending.
    #[instrument(skip(self, doc), fields(doc_id = %doc.id))]
    pub async fn save(&self, collection: &str, mut doc: Document) -> SaveOutcome {
        if doc.id.is_empty() {
            doc.id = Uuid::new_v4().to_string();
        }
        doc.updated_at = Some(Utc::now());
        let key = (collection.to_string(), doc.id.clone());

        self.local.insert(
            key.clone(),
            LocalRecord {
                doc: doc.clone(),
                pending_sync: true,
            },
        );

        let Some(remote) = &self.remote else {
            return SaveOutcome::PendingSync;
        };

        match remote.create(collection, &doc).await {
            Ok(_) => {
                if let Some(mut record) = self.local.get_mut(&key) {
                    if record.doc.updated_at == doc.updated_at {
                        record.pending_sync = false;
                    }
                }
                SaveOutcome::Synced
            }
            Err(e) => {
                warn!("Remote write to {} failed, kept locally: {}", collection, e);
                SaveOutcome::PendingSync
            }
        }
    }

    /// Every document of `collection` across both tiers.
    ///
    /// Falls back to the local tier when the remote cannot be read.
    #[instrument(skip(self))]
    pub async fn list(&self, collection: &str) -> Vec<Document> {
        let mut merged: HashMap<String, Document> = HashMap::new();

        if let Some(remote) = &self.remote {
            match remote.list(collection).await {
                Ok(documents) => {
                    for doc in documents {
                        self.refresh_local(collection, &doc);
                        merged.insert(doc.id.clone(), doc);
                    }
                }
                Err(e) => warn!("Remote read of {} failed, serving local tier: {}", collection, e),
            }
        }

        for record in self.local.iter().filter(|r| r.key().0 == collection) {
            let local = &record.value().doc;
            let newer = merged
                .get(&local.id)
                .map_or(true, |remote| is_newer(local.updated_at, remote.updated_at));
            if newer {
                merged.insert(local.id.clone(), local.clone());
            }
        }

        debug!("{} documents in {}", merged.len(), collection);
        merged.into_values().collect()
    }

    /// Keeps the local copy when it is newer than what the remote returned.
    fn refresh_local(&self, collection: &str, remote: &Document) {
        let key = (collection.to_string(), remote.id.clone());
        let replace = self
            .local
            .get(&key)
            .map_or(true, |local| {
                !local.pending_sync && !is_newer(local.doc.updated_at, remote.updated_at)
            });
        if replace {
            let mut doc = remote.clone();
            if let Some(delivery) = self
                .local
                .get(&key)
                .and_then(|local| local.doc.fields.get(DELIVERY_FIELD).cloned())
            {
                doc.fields.insert(DELIVERY_FIELD.to_string(), delivery);
            }
            self.local.insert(
                key,
                LocalRecord {
                    doc,
                    pending_sync: false,
                },
            );
        }
    }

    /// Pushes every pending record to the remote tier.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> SyncReport {
        let mut report = SyncReport::default();
        let Some(remote) = &self.remote else {
            return report;
        };

        let pending: Vec<((String, String), Document)> = self
            .local
            .iter()
            .filter(|r| r.value().pending_sync)
            .map(|r| (r.key().clone(), r.value().doc.clone()))
            .collect();

        for ((collection, id), doc) in pending {
            match remote.create(&collection, &doc).await {
                Ok(_) => {
                    if let Some(mut record) = self.local.get_mut(&(collection.clone(), id)) {
                        if record.doc.updated_at == doc.updated_at {
                            record.pending_sync = false;
                        }
                    }
                    report.synced += 1;
                }
                Err(e) => {
                    warn!("Sync of {}/{} failed: {}", collection, doc.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.synced + report.failed > 0 {
            info!(synced = report.synced, failed = report.failed, "Local tier sync finished");
        }
        report
    }

    /// Attaches the notifier outcome to the local copy of the order.
    pub fn record_delivery(&self, order_number: &str, outcome: DeliveryOutcome) {
        let key = (ORDERS_COLLECTION.to_string(), order_number.to_string());
        match self.local.get_mut(&key) {
            Some(mut record) => {
                let value = serde_json::to_value(outcome).unwrap_or(Value::Null);
                record.doc.fields.insert(DELIVERY_FIELD.to_string(), value);
            }
            None => warn!(order_number, "Delivery outcome for an order missing from the local tier"),
        }
    }

    /// `None` if the order is unknown locally; `Some(None)` while delivery is in flight.
    pub fn delivery(&self, order_number: &str) -> Option<Option<DeliveryOutcome>> {
        let key = (ORDERS_COLLECTION.to_string(), order_number.to_string());
        self.local.get(&key).map(|record| {
            record
                .doc
                .fields
                .get(DELIVERY_FIELD)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
        })
    }
}

fn is_newer(candidate: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    match (candidate, current) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
