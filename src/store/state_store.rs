//! Durable session store.
//!
//! # Responsibilities
//! - Serve reads from an in-memory cache
//! - Serialize every mutation behind one async mutex so a read-modify-write
//!   never interleaves with a snapshot rewrite
//! - Persist the full snapshot before acknowledging a durable mutation
//! - Support in-memory-only mutations (dirty until the next flush)

use std::path::Path;
use std::sync::{Mutex as SyncMutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{PersistenceError, StoreError};
use crate::observability::metrics;
use crate::store::record::{SessionRecord, SessionStatus, Sessions};
use crate::store::snapshot::SnapshotFile;

/// Session counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub active: usize,
    pub idle: usize,
    pub closed: usize,
}

/// State guarded by the mutation lock.
#[derive(Debug, Default)]
struct WriteState {
    /// Cache holds changes not yet on disk.
    dirty: bool,
}

/// Session store backed by a JSON snapshot file.
#[derive(Debug)]
pub struct StateStore {
    snapshot: SnapshotFile,
    cache: RwLock<Sessions>,
    write: Mutex<WriteState>,
    /// When a snapshot was last written successfully.
    last_persisted: SyncMutex<Option<Instant>>,
    /// Set when durable writes are refused (the snapshot failed to load).
    disabled: Option<String>,
}

impl StateStore {
    /// Recover the store from `<data_dir>/<partition>.json`.
    pub async fn load(data_dir: &Path, partition: &str) -> Result<Self, StoreError> {
        let snapshot = SnapshotFile::new(data_dir, partition);
        let sessions = snapshot.load().await?.unwrap_or_default();

        tracing::info!(
            path = %snapshot.path().display(),
            sessions = sessions.len(),
            "Session store loaded"
        );
        metrics::record_sessions(sessions.len());

        Ok(Self {
            snapshot,
            cache: RwLock::new(sessions),
            write: Mutex::new(WriteState::default()),
            last_persisted: SyncMutex::new(None),
            disabled: None,
        })
    }

    /// An empty store that never touches disk. Used when the snapshot could
    /// not be loaded, so the unreadable file is left intact for inspection.
    pub fn detached(data_dir: &Path, partition: &str, reason: impl Into<String>) -> Self {
        Self {
            snapshot: SnapshotFile::new(data_dir, partition),
            cache: RwLock::new(Sessions::new()),
            write: Mutex::new(WriteState::default()),
            last_persisted: SyncMutex::new(None),
            disabled: Some(reason.into()),
        }
    }

    /// Whether durable writes are possible.
    pub fn is_persistent(&self) -> bool {
        self.disabled.is_none()
    }

    /// Whether a snapshot was written less than `window` ago.
    pub fn persisted_within(&self, window: Duration) -> bool {
        let last = *self
            .last_persisted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last.is_some_and(|at| at.elapsed() < window)
    }

    pub fn path(&self) -> &Path {
        self.snapshot.path()
    }

    pub fn get(&self, key: &str) -> Option<SessionRecord> {
        self.read_cache().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_cache().is_empty()
    }

    /// All sessions, ordered by key.
    pub fn list(&self) -> Vec<(String, SessionRecord)> {
        self.read_cache()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn summary(&self) -> StoreSummary {
        let mut summary = StoreSummary::default();
        for record in self.read_cache().values() {
            match record.status {
                SessionStatus::Active => summary.active += 1,
                SessionStatus::Idle => summary.idle += 1,
                SessionStatus::Closed => summary.closed += 1,
            }
        }
        summary
    }

    /// Insert or replace a record; durable before returning.
    pub async fn put(&self, key: &str, record: SessionRecord) -> Result<(), PersistenceError> {
        self.update(key, |_| record).await.map(|_| ())
    }

    /// Atomic read-modify-write of one record, durable before returning. On
    /// failure the cache is left as it was.
    pub async fn update<F>(&self, key: &str, f: F) -> Result<SessionRecord, PersistenceError>
    where
        F: FnOnce(Option<&SessionRecord>) -> SessionRecord,
    {
        let mut state = self.write.lock().await;
        let mut next = self.read_cache().clone();
        let record = f(next.get(key));
        next.insert(key.to_string(), record.clone());
        self.commit(&mut state, next).await?;
        Ok(record)
    }

    /// Like [`update`](Self::update) but only touches the cache. The change
    /// is written by the next durable mutation or [`flush`](Self::flush).
    pub async fn update_in_memory<F>(&self, key: &str, f: F) -> SessionRecord
    where
        F: FnOnce(Option<&SessionRecord>) -> SessionRecord,
    {
        let mut state = self.write.lock().await;
        let mut cache = self.write_cache();
        let record = f(cache.get(key));
        cache.insert(key.to_string(), record.clone());
        state.dirty = true;
        metrics::record_sessions(cache.len());
        record
    }

    /// Remove a record. Removing an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let mut state = self.write.lock().await;
        if !self.read_cache().contains_key(key) {
            return Ok(());
        }
        let mut next = self.read_cache().clone();
        next.remove(key);
        self.commit(&mut state, next).await
    }

    /// Mark a session closed. Returns false when the key is unknown.
    pub async fn close(&self, key: &str) -> Result<bool, PersistenceError> {
        let mut state = self.write.lock().await;
        let mut next = self.read_cache().clone();
        match next.get_mut(key) {
            Some(record) => record.status = SessionStatus::Closed,
            None => return Ok(false),
        }
        self.commit(&mut state, next).await?;
        Ok(true)
    }

    /// Remove sessions whose last activity predates `now - idle_threshold`.
    ///
    /// Removal always applies to the cache. If the snapshot cannot be
    /// rewritten the change stays dirty for the next flush.
    pub async fn sweep(&self, idle_threshold: Duration) -> usize {
        self.sweep_at(Utc::now(), idle_threshold).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>, idle_threshold: Duration) -> usize {
        let Some(cutoff) = cutoff(now, idle_threshold) else {
            return 0;
        };
        self.remove_where(|record| record.is_inactive_since(cutoff)).await
    }

    /// Remove sessions an operator closed.
    pub async fn purge_closed(&self) -> usize {
        self.remove_where(|record| record.status == SessionStatus::Closed)
            .await
    }

    /// Flip active sessions quiet for `idle_after` to idle, in memory.
    pub async fn mark_idle_at(&self, now: DateTime<Utc>, idle_after: Duration) -> usize {
        let Some(cutoff) = cutoff(now, idle_after) else {
            return 0;
        };
        let mut state = self.write.lock().await;
        let mut cache = self.write_cache();
        let mut marked = 0;
        for record in cache.values_mut() {
            if record.status == SessionStatus::Active && record.is_inactive_since(cutoff) {
                record.status = SessionStatus::Idle;
                marked += 1;
            }
        }
        if marked > 0 {
            state.dirty = true;
        }
        marked
    }

    /// Write the cache if it holds in-memory changes. Returns whether a
    /// snapshot was written.
    pub async fn flush(&self) -> Result<bool, PersistenceError> {
        let mut state = self.write.lock().await;
        if !state.dirty {
            return Ok(false);
        }
        let current = self.read_cache().clone();
        self.commit(&mut state, current).await?;
        Ok(true)
    }

    async fn remove_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&SessionRecord) -> bool,
    {
        let mut state = self.write.lock().await;
        let mut next = self.read_cache().clone();
        let before = next.len();
        next.retain(|_, record| !predicate(record));
        let removed = before - next.len();
        if removed == 0 {
            return 0;
        }

        match self.persist(&next).await {
            Ok(()) => state.dirty = false,
            Err(PersistenceError::Disabled(_)) => state.dirty = true,
            Err(e) => {
                tracing::warn!(error = %e, removed, "Removed sessions kept in memory only");
                state.dirty = true;
            }
        }
        metrics::record_sessions(next.len());
        *self.write_cache() = next;
        removed
    }

    /// Persist `next` and make it the cache. Caller holds the write lock.
    async fn commit(&self, state: &mut WriteState, next: Sessions) -> Result<(), PersistenceError> {
        self.persist(&next).await?;
        metrics::record_sessions(next.len());
        *self.write_cache() = next;
        state.dirty = false;
        Ok(())
    }

    async fn persist(&self, sessions: &Sessions) -> Result<(), PersistenceError> {
        if let Some(reason) = &self.disabled {
            return Err(PersistenceError::Disabled(reason.clone()));
        }
        self.snapshot.write(sessions).await?;
        *self
            .last_persisted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
        Ok(())
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Sessions> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Sessions> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}
