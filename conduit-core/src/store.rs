//! Encrypted, TTL-bound cache of per-conversation engine state.
//!
//! Entries are keyed by role-prefixed conversation id (`ENC_<id>`,
//! `DEC_<id>`) and sealed with AES-256-GCM before insertion, so the map
//! never holds a state blob in the clear. Expiry is measured from the last
//! write and applied lazily on read, by [`SessionStateStore::purge_expired`],
//! and by the optional background sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::crypto::{SealedState, StateCipher};
use crate::engine::{EngineRole, StateBlob, StatefulEngine};
use crate::error::{Result, StoreError};

/// 24 hours.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(1440 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Idle time after the last write before an entry is evicted.
    pub ttl: Duration,
    /// Upper bound on entries; the least recently written is evicted first.
    pub max_entries: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_STATE_TTL,
            max_entries: None,
        }
    }
}

struct EncryptedStateEntry {
    sealed: SealedState,
    written_at: Instant,
}

pub struct SessionStateStore<C: Clock = SystemClock> {
    entries: DashMap<String, EncryptedStateEntry>,
    cipher: StateCipher,
    config: StoreConfig,
    clock: C,
}

impl SessionStateStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl<C: Clock> SessionStateStore<C> {
    pub fn with_clock(config: StoreConfig, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            cipher: StateCipher::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn is_expired(&self, entry: &EncryptedStateEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.written_at) > self.config.ttl
    }

    /// Seal `state` and insert it, replacing any previous entry and
    /// restarting its TTL.
    pub fn store(
        &self,
        role: EngineRole,
        conversation_id: &str,
        state: StateBlob,
    ) -> std::result::Result<(), StoreError> {
        let key = role.cache_key(conversation_id);
        let sealed = self
            .cipher
            .seal(conversation_id, &key, state.expose().as_bytes())
            .map_err(|_| StoreError::Seal { key: key.clone() })?;
        drop(state);

        if !self.entries.contains_key(&key) {
            self.enforce_capacity();
        }

        self.entries.insert(
            key.clone(),
            EncryptedStateEntry {
                sealed,
                written_at: self.clock.now(),
            },
        );
        debug!(cache_key = %key, "Stored engine state");
        Ok(())
    }

    /// Copy read: decrypts the entry and leaves it in place.
    pub fn get(
        &self,
        role: EngineRole,
        conversation_id: &str,
    ) -> std::result::Result<StateBlob, StoreError> {
        let key = role.cache_key(conversation_id);
        let now = self.clock.now();

        let sealed = match self.entries.get(&key) {
            Some(entry) if !self.is_expired(&entry, now) => entry.sealed.clone(),
            Some(entry) => {
                drop(entry);
                self.entries.remove_if(&key, |_, e| self.is_expired(e, now));
                debug!(cache_key = %key, "Engine state expired");
                return Err(StoreError::NotFound { key });
            }
            None => return Err(StoreError::NotFound { key }),
        };

        self.open(conversation_id, key, &sealed)
    }

    /// Move-out read: the entry is removed, so the caller becomes the only
    /// holder of the live state until it stores it back.
    pub fn take(
        &self,
        role: EngineRole,
        conversation_id: &str,
    ) -> std::result::Result<StateBlob, StoreError> {
        let key = role.cache_key(conversation_id);
        let now = self.clock.now();

        let Some((_, entry)) = self.entries.remove(&key) else {
            return Err(StoreError::NotFound { key });
        };
        if self.is_expired(&entry, now) {
            debug!(cache_key = %key, "Engine state expired");
            return Err(StoreError::NotFound { key });
        }

        self.open(conversation_id, key, &entry.sealed)
    }

    fn open(
        &self,
        conversation_id: &str,
        key: String,
        sealed: &SealedState,
    ) -> std::result::Result<StateBlob, StoreError> {
        let plaintext = match self.cipher.open(conversation_id, &key, sealed) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                warn!(cache_key = %key, "Failed to open sealed engine state");
                return Err(StoreError::Open { key });
            }
        };
        String::from_utf8(plaintext)
            .map(StateBlob::new)
            .map_err(|_| StoreError::Open { key })
    }

    /// Save `engine` under its own role. Consumes the engine.
    pub fn put_engine<E: StatefulEngine>(&self, conversation_id: &str, engine: E) -> Result<()> {
        let role = engine.role();
        self.store(role, conversation_id, engine.save_state())?;
        Ok(())
    }

    /// Take the stored state for `role` and restore an engine from it.
    pub fn take_engine<E: StatefulEngine>(
        &self,
        role: EngineRole,
        conversation_id: &str,
    ) -> Result<E> {
        let blob = self.take(role, conversation_id)?;
        Ok(E::restore_state(blob)?)
    }

    pub fn contains(&self, role: EngineRole, conversation_id: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(&role.cache_key(conversation_id))
            .map(|entry| !self.is_expired(&entry, now))
            .unwrap_or(false)
    }

    /// Drop both channels of a conversation.
    pub fn remove_conversation(&self, conversation_id: &str) {
        self.entries.remove(&EngineRole::Encoder.cache_key(conversation_id));
        self.entries.remove(&EngineRole::Decoder.cache_key(conversation_id));
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_capacity(&self) {
        let Some(max) = self.config.max_entries else {
            return;
        };

        while self.entries.len() >= max.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().written_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    info!(cache_key = %key, "State store full, evicted oldest entry");
                }
                None => break,
            }
        }
    }
}

/// Periodically purge expired entries until the returned task is aborted.
pub fn spawn_sweeper<C: Clock>(
    store: Arc<SessionStateStore<C>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                info!(purged, "Swept expired engine state");
            }
        }
    })
}
