//! In-process session records with expiry sweeping
//!
//! Implements the `tower-sessions` store traits over a map held in memory.
//! Expired records are never handed back by [`SessionStore::load`], and
//! [`ExpiredDeletion::delete_expired`] reclaims them; [`spawn_expiry_sweep`]
//! runs that on a fixed period for the lifetime of the server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_sessions::{
    session::{Id, Record},
    session_store::{self, ExpiredDeletion},
    SessionStore,
};

#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<Mutex<HashMap<Id, Record>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, expired or not
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn is_live(record: &Record, now: OffsetDateTime) -> bool {
    record.expiry_date > now
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.records.lock().await;
        while records.contains_key(&record.id) {
            record.id = Id::default();
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.records.lock().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .records
            .lock()
            .await
            .get(session_id)
            .filter(|record| is_live(record, now))
            .cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.records.lock().await.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for MemorySessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| is_live(record, now));

        let removed = before - records.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = records.len(), "Swept expired sessions");
        }
        Ok(())
    }
}

/// Reclaim expired records every `period` until the runtime shuts down
pub fn spawn_expiry_sweep(store: MemorySessionStore, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = store.delete_expired().await {
                tracing::error!(error = %e, "Failed to sweep expired sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_in: time::Duration) -> Record {
        Record {
            id: Id::default(),
            data: HashMap::new(),
            expiry_date: OffsetDateTime::now_utc() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_expired_record_is_not_loaded() {
        let store = MemorySessionStore::new();
        let mut stale = record(time::Duration::seconds(-5));
        store.create(&mut stale).await.unwrap();

        assert!(store.load(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_record_round_trips() {
        let store = MemorySessionStore::new();
        let mut live = record(time::Duration::hours(1));
        live.data
            .insert("uid".to_string(), serde_json::Value::from(4u64));
        store.create(&mut live).await.unwrap();

        let loaded = store.load(&live.id).await.unwrap().expect("live record");

        assert_eq!(loaded.data.get("uid"), Some(&serde_json::Value::from(4u64)));
    }

    #[tokio::test]
    async fn test_delete_expired_reclaims_only_stale_records() {
        let store = MemorySessionStore::new();
        for _ in 0..50 {
            let mut abandoned = record(time::Duration::seconds(-1));
            store.create(&mut abandoned).await.unwrap();
        }
        let mut live = record(time::Duration::hours(1));
        store.create(&mut live).await.unwrap();
        assert_eq!(store.len().await, 51);

        store.delete_expired().await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.load(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_task_reclaims_in_background() {
        let store = MemorySessionStore::new();
        let mut abandoned = record(time::Duration::seconds(-1));
        store.create(&mut abandoned).await.unwrap();

        let sweeper = spawn_expiry_sweep(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();

        assert!(store.is_empty().await);
    }
}
