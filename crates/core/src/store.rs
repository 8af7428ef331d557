//! In-memory generation state store.
//!
//! Each record sits behind its own lock. The map-level lock is only held to
//! look up, insert, or remove an entry, never while a record is mutated, so
//! updates to different generations do not contend with each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::generation::{GenerationRecord, RecordUpdate};
use crate::types::GenerationId;

type Entry = Arc<RwLock<GenerationRecord>>;

/// Concurrent map from generation id to its lifecycle record.
///
/// Designed to be wrapped in `Arc` and shared between the orchestrator
/// tasks (one writer per record) and any number of status relays.
pub struct GenerationStore {
    records: RwLock<HashMap<GenerationId, Entry>>,
}

impl GenerationStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `record`, replacing any existing record with the same id.
    pub async fn put(&self, record: GenerationRecord) {
        let id = record.id;
        self.records
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(record)));
    }

    /// Apply `update` to an existing record.
    ///
    /// Returns `true` when the update was applied. Unknown ids are a no-op;
    /// updates the state machine rejects are logged and dropped.
    pub async fn merge(&self, id: &GenerationId, update: RecordUpdate) -> bool {
        let Some(entry) = self.entry(id).await else {
            tracing::debug!(generation_id = %id, "Merge on unknown generation ignored");
            return false;
        };

        let mut record = entry.write().await;
        match record.apply(update) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(generation_id = %id, error = %e, "Rejected generation update");
                false
            }
        }
    }

    /// Snapshot of the record for `id`, if present.
    pub async fn get(&self, id: &GenerationId) -> Option<GenerationRecord> {
        let entry = self.entry(id).await?;
        let record = entry.read().await;
        Some(record.clone())
    }

    /// Whether a record exists for `id`.
    pub async fn contains(&self, id: &GenerationId) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Remove terminal records whose last update is at least `ttl` old.
    ///
    /// Active records are never evicted. Returns the number removed.
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let now = chrono::Utc::now();

        let entries: Vec<(GenerationId, Entry)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect();

        let mut expired = Vec::new();
        for (id, entry) in entries {
            let record = entry.read().await;
            if record.is_terminal() && now - record.updated_at >= ttl {
                expired.push(id);
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut records = self.records.write().await;
        expired
            .iter()
            .filter(|id| records.remove(*id).is_some())
            .count()
    }

    async fn entry(&self, id: &GenerationId) -> Option<Entry> {
        self.records.read().await.get(id).cloned()
    }
}

impl Default for GenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationState, GenerationStatus};

    fn submitted() -> RecordUpdate {
        RecordUpdate::Submitted {
            prompt_id: "prompt-1".into(),
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_snapshot() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();

        store.put(GenerationRecord::queued(id)).await;

        let record = store.get(&id).await.expect("record should exist");
        assert_eq!(record.id, id);
        assert_eq!(record.status(), GenerationStatus::Queued);
        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();

        assert!(store.get(&id).await.is_none());
        assert!(!store.contains(&id).await);
    }

    #[tokio::test]
    async fn put_replaces_existing_record() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();
        store.put(GenerationRecord::queued(id)).await;
        assert!(store.merge(&id, submitted()).await);

        store.put(GenerationRecord::queued(id)).await;

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status(), GenerationStatus::Queued);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn merge_unknown_is_noop() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();

        assert!(!store.merge(&id, submitted()).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn merge_applies_in_order() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();
        store.put(GenerationRecord::queued(id)).await;

        assert!(store.merge(&id, submitted()).await);
        assert!(
            store
                .merge(
                    &id,
                    RecordUpdate::Progress {
                        progress: 0.4,
                        step: 4,
                        total_steps: 10,
                    },
                )
                .await
        );

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.prompt_id.as_deref(), Some("prompt-1"));
        assert_eq!(
            record.state,
            GenerationState::Generating {
                progress: 0.4,
                step: Some(4),
                total_steps: Some(10),
            }
        );
    }

    #[tokio::test]
    async fn merge_after_terminal_is_rejected() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();
        store.put(GenerationRecord::queued(id)).await;
        store.merge(&id, RecordUpdate::failed("unreachable")).await;

        assert!(!store.merge(&id, submitted()).await);

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status(), GenerationStatus::Error);
        assert!(record.prompt_id.is_none());
    }

    #[tokio::test]
    async fn evict_expired_removes_only_terminal_records() {
        let store = GenerationStore::new();
        let active = GenerationId::new_v4();
        let failed = GenerationId::new_v4();
        let completed = GenerationId::new_v4();

        for id in [active, failed, completed] {
            store.put(GenerationRecord::queued(id)).await;
            store.merge(&id, submitted()).await;
        }
        store.merge(&failed, RecordUpdate::failed("boom")).await;
        store
            .merge(
                &completed,
                RecordUpdate::Completed {
                    image_ref: None,
                    image_location: None,
                },
            )
            .await;

        let removed = store.evict_expired(Duration::ZERO).await;

        assert_eq!(removed, 2);
        assert!(store.contains(&active).await);
        assert!(!store.contains(&failed).await);
        assert!(!store.contains(&completed).await);
    }

    #[tokio::test]
    async fn evict_expired_keeps_recent_terminal_records() {
        let store = GenerationStore::new();
        let id = GenerationId::new_v4();
        store.put(GenerationRecord::queued(id)).await;
        store.merge(&id, RecordUpdate::failed("boom")).await;

        let removed = store.evict_expired(Duration::from_secs(3600)).await;

        assert_eq!(removed, 0);
        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn concurrent_writers_on_different_ids_do_not_interfere() {
        let store = Arc::new(GenerationStore::new());
        let ids: Vec<GenerationId> = (0..16).map(|_| GenerationId::new_v4()).collect();
        for id in &ids {
            store.put(GenerationRecord::queued(*id)).await;
            store.merge(id, submitted()).await;
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for step in 1..=20u32 {
                    store
                        .merge(
                            &id,
                            RecordUpdate::Progress {
                                progress: step as f64 / 20.0,
                                step,
                                total_steps: 20,
                            },
                        )
                        .await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for id in &ids {
            let record = store.get(id).await.unwrap();
            assert_eq!(record.progress(), 1.0);
        }
    }
}
