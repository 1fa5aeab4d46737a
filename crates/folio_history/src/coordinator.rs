//! Debounced commit coordinator.
//!
//! Keeps one debounce entry per document key. Every signal folds its actors
//! into the entry and pushes the flush back by the debounce interval, but
//! never past `window start + max_wait`, so a document under continuous
//! editing is still snapshotted at least once per `max_wait`.
//!
//! Flushes run on spawned tokio tasks. A failed flush with a transient error
//! puts its actors back into a debounce entry and retries with exponential
//! backoff.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use folio_core::DocumentKey;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::config::{DisconnectPolicy, HistoryConfig};
use crate::error::HistoryResult;
use crate::materializer::{MaterializeOutcome, SnapshotMaterializer};
use crate::signal::{EditSignal, SignalKind};

/// Transient per-key debounce state.
struct DebounceEntry {
    window_started_at: Instant,
    /// Identifies the timer allowed to flush this entry
    generation: u64,
    timer: Option<JoinHandle<()>>,
    actor_ids: BTreeSet<String>,
    /// Failed materializations of the actors in this entry
    attempt: u32,
}

impl DebounceEntry {
    fn new(window_started_at: Instant) -> Self {
        Self {
            window_started_at,
            generation: 0,
            timer: None,
            actor_ids: BTreeSet::new(),
            attempt: 0,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    config: HistoryConfig,
    materializer: SnapshotMaterializer,
    entries: Mutex<HashMap<DocumentKey, DebounceEntry>>,
    /// Serializes materializations per key
    in_flight: Mutex<HashMap<DocumentKey, Arc<AsyncMutex<()>>>>,
    next_generation: AtomicU64,
}

/// Coalesces edit signals into periodic, deduplicated snapshots.
///
/// Cheap to clone; clones share the same debounce state. Signal handlers
/// spawn tasks and must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct CommitCoordinator {
    inner: Arc<Inner>,
}

impl CommitCoordinator {
    /// Create a coordinator. The configured retention is applied to the
    /// materializer.
    pub fn new(config: HistoryConfig, materializer: SnapshotMaterializer) -> HistoryResult<Self> {
        config.validate()?;
        let materializer = materializer.with_retention(config.retention);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                materializer,
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.inner.config
    }

    pub fn materializer(&self) -> &SnapshotMaterializer {
        &self.inner.materializer
    }

    /// Handle a signal according to its kind.
    pub fn on_signal(&self, signal: EditSignal) {
        match signal.kind {
            SignalKind::Edit => self.on_edit_signal(signal),
            SignalKind::Disconnect => self.on_disconnect(signal),
        }
    }

    /// Record an edit and (re)arm the debounce timer for its document.
    pub fn on_edit_signal(&self, signal: EditSignal) {
        self.inner.clone().coalesce(signal, false);
    }

    /// Record a participant leaving a document.
    ///
    /// Coalesced like an edit unless the disconnect policy asks for an
    /// immediate flush.
    pub fn on_disconnect(&self, signal: EditSignal) {
        let immediate = self.inner.config.disconnect_policy == DisconnectPolicy::FlushImmediately;
        self.inner.clone().coalesce(signal, immediate);
    }

    /// Flush a pending entry now and wait for the materialization.
    ///
    /// Returns `Ok(None)` when nothing was pending for the key.
    pub async fn flush(&self, key: &DocumentKey) -> HistoryResult<Option<MaterializeOutcome>> {
        let Some(mut entry) = self.inner.lock_entries().remove(key) else {
            return Ok(None);
        };
        entry.cancel_timer();
        self.inner
            .run_flush(key.clone(), entry.actor_ids, entry.attempt)
            .await
            .map(Some)
    }

    /// Flush every pending entry, e.g. on shutdown.
    ///
    /// Returns the number of versions created. Failures are logged.
    pub async fn flush_all(&self) -> usize {
        let drained: Vec<_> = self.inner.lock_entries().drain().collect();
        info!("Flushing {} pending documents", drained.len());

        let mut created = 0;
        for (key, mut entry) in drained {
            entry.cancel_timer();
            if let Ok(MaterializeOutcome::Created(_)) =
                self.inner.run_flush(key, entry.actor_ids, entry.attempt).await
            {
                created += 1;
            }
        }
        created
    }

    /// Keys with a pending flush.
    pub fn pending_keys(&self) -> Vec<DocumentKey> {
        let mut keys: Vec<_> = self.inner.lock_entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_pending(&self, key: &DocumentKey) -> bool {
        self.inner.lock_entries().contains_key(key)
    }
}

impl std::fmt::Debug for CommitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitCoordinator")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_keys())
            .finish()
    }
}

impl Inner {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<DocumentKey, DebounceEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn coalesce(self: Arc<Self>, signal: EditSignal, immediate: bool) {
        let EditSignal {
            document_key: key,
            actor_ids,
            observed_at,
            ..
        } = signal;

        let mut entries = self.lock_entries();

        let Some(debounce) = self.config.debounce else {
            let (actors, attempt) = match entries.remove(&key) {
                Some(mut pending) => {
                    pending.cancel_timer();
                    let mut actors = pending.actor_ids;
                    actors.extend(actor_ids);
                    (actors, pending.attempt)
                }
                None => (actor_ids, 0),
            };
            drop(entries);
            self.spawn_flush(key, actors, attempt);
            return;
        };

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| DebounceEntry::new(observed_at));
        entry.actor_ids.extend(actor_ids);
        entry.cancel_timer();

        let window_deadline = entry.window_started_at + debounce.max_wait;
        if immediate || observed_at >= window_deadline {
            let Some(entry) = entries.remove(&key) else {
                return;
            };
            drop(entries);
            debug!("Flushing {} without waiting (immediate: {})", key, immediate);
            self.spawn_flush(key, entry.actor_ids, entry.attempt);
            return;
        }

        let deadline = (observed_at + debounce.interval).min(window_deadline);
        let generation = self.next_generation();
        entry.generation = generation;
        entry.timer = Some(self.clone().spawn_timer(key, generation, deadline));
    }

    fn spawn_flush(self: Arc<Self>, key: DocumentKey, actor_ids: BTreeSet<String>, attempt: u32) {
        tokio::spawn(async move {
            let _ = self.run_flush(key, actor_ids, attempt).await;
        });
    }

    fn spawn_timer(
        self: Arc<Self>,
        key: DocumentKey,
        generation: u64,
        deadline: Instant,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            sleep_until(deadline).await;
            self.fire(key, generation).await;
        })
    }

    /// Timer expiry: flush the entry if this timer still owns it.
    async fn fire(self: Arc<Self>, key: DocumentKey, generation: u64) {
        let entry = {
            let mut entries = self.lock_entries();
            match entries.get(&key) {
                Some(entry) if entry.generation == generation => entries.remove(&key),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            debug!("Timer for {} superseded", key);
            return;
        };
        let _ = self.run_flush(key, entry.actor_ids, entry.attempt).await;
    }

    async fn run_flush(
        self: &Arc<Self>,
        key: DocumentKey,
        actor_ids: BTreeSet<String>,
        attempt: u32,
    ) -> HistoryResult<MaterializeOutcome> {
        let key_lock = self.key_lock(&key);
        let result = {
            let _guard = key_lock.lock().await;
            self.materializer.materialize(&key, &actor_ids).await
        };
        drop(key_lock);
        self.release_key_lock(&key);

        match &result {
            Ok(MaterializeOutcome::Created(meta)) => {
                debug!("Flushed {}: created version {}", key, meta.id);
            }
            Ok(MaterializeOutcome::Unchanged) => {
                debug!("Flushed {}: no changes", key);
            }
            Err(e) if e.is_transient() && attempt + 1 < self.config.retry.max_attempts => {
                warn!(
                    "Snapshot of {} failed (attempt {}), retrying: {}",
                    key,
                    attempt + 1,
                    e
                );
                self.schedule_retry(key, actor_ids, attempt + 1);
            }
            Err(e) => {
                error!(
                    "Snapshot of {} failed after {} attempts, giving up: {}",
                    key,
                    attempt + 1,
                    e
                );
            }
        }
        result
    }

    /// Put failed actors back into a debounce entry and arm a backoff timer.
    fn schedule_retry(
        self: &Arc<Self>,
        key: DocumentKey,
        actor_ids: BTreeSet<String>,
        attempt: u32,
    ) {
        let mut entries = self.lock_entries();
        match entries.entry(key.clone()) {
            // New signals arrived while materializing; their timer covers the retry.
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.actor_ids.extend(actor_ids);
                entry.attempt = entry.attempt.max(attempt);
            }
            Entry::Vacant(vacant) => {
                let now = Instant::now();
                let delay = self.config.retry.delay_for(attempt);
                let generation = self.next_generation();
                let timer = self.clone().spawn_timer(key, generation, now + delay);
                vacant.insert(DebounceEntry {
                    window_started_at: now,
                    generation,
                    timer: Some(timer),
                    actor_ids,
                    attempt,
                });
            }
        }
    }

    fn key_lock(&self, key: &DocumentKey) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(key.clone()).or_default().clone()
    }

    fn release_key_lock(&self, key: &DocumentKey) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = in_flight.get(key)
            && Arc::strong_count(lock) == 1
        {
            in_flight.remove(key);
        }
    }
}
