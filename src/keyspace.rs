//! Lock-guarded key space with per-key time-to-live.
//!
//! One `RwLock` covers every key. Reads take the shared lock and hide
//! entries whose deadline has passed (lazy expiry); `expire` additionally
//! schedules a one-shot task that physically removes the entry once the
//! deadline is reached (eager expiry). Each entry carries a generation so a
//! timer scheduled for an older incarnation of the key never deletes a newer
//! one.

use std::collections::hash_map::{self, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Longest accepted TTL; larger EXPIRE values are clamped to it.
const MAX_TTL_SECS: i64 = i32::MAX as i64;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
    generation: u64,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }
}

#[derive(Debug)]
pub(crate) struct Keyspace<V> {
    data: Arc<RwLock<HashMap<String, Slot<V>>>>,
    generations: Arc<AtomicU64>,
}

impl<V> Clone for Keyspace<V> {
    fn clone(&self) -> Self {
        Keyspace {
            data: Arc::clone(&self.data),
            generations: Arc::clone(&self.generations),
        }
    }
}

impl<V> Default for Keyspace<V> {
    fn default() -> Self {
        Keyspace {
            data: Arc::new(RwLock::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<V: Send + Sync + 'static> Keyspace<V> {
    // Every critical section leaves the map consistent, so a panic elsewhere
    // while holding the lock does not invalidate the data.
    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<String, Slot<V>>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot<V>>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Runs `f` against the live value of `key`.
    pub(crate) fn read<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        let now = Instant::now();
        let data = self.read_guard();
        let entry = data.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(f(&entry.value))
    }

    /// Replaces whatever is stored under `key`, dropping any TTL.
    pub(crate) fn insert(&self, key: String, value: V) {
        let generation = self.next_generation();
        self.write_guard().insert(
            key,
            Slot {
                value,
                expires_at: None,
                generation,
            },
        );
    }

    /// Mutates the live value of `key`, creating it with `create` when the
    /// key is absent or already logically expired.
    pub(crate) fn upsert<R>(
        &self,
        key: &str,
        create: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let now = Instant::now();
        let mut data = self.write_guard();
        let fresh = |generation| Slot {
            value: create(),
            expires_at: None,
            generation,
        };
        let slot = match data.entry(key.to_string()) {
            hash_map::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh(self.next_generation()));
                }
                occupied.into_mut()
            }
            hash_map::Entry::Vacant(vacant) => vacant.insert(fresh(self.next_generation())),
        };
        f(&mut slot.value)
    }

    /// Gives `key` a TTL of `seconds` from now and schedules its removal.
    /// Returns false when the key does not exist (or has already expired).
    pub(crate) fn expire(&self, key: &str, seconds: i64) -> bool {
        let ttl = Duration::from_secs(seconds.clamp(0, MAX_TTL_SECS).unsigned_abs());
        let now = Instant::now();
        // Counted from the EXPIRE call, not from when the value was written.
        let Some(deadline) = now.checked_add(ttl) else {
            log::warn!("ttl of {seconds}s for key {key:?} is out of range");
            return false;
        };

        let generation = {
            let mut data = self.write_guard();
            let Some(entry) = data.get_mut(key) else {
                return false;
            };
            if entry.is_expired(now) {
                return false;
            }
            entry.expires_at = Some(deadline);
            entry.generation = self.next_generation();
            entry.generation
        };

        self.schedule_removal(key.to_string(), generation, deadline);
        true
    }

    fn schedule_removal(&self, key: String, generation: u64, deadline: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("no tokio runtime; key {key:?} will only expire lazily");
            return;
        };

        let keyspace = self.clone();
        runtime.spawn(async move {
            // The timer wheel caps long sleeps, so it may wake before the deadline.
            loop {
                tokio::time::sleep_until(deadline.into()).await;
                if keyspace.remove_generation(&key, generation) {
                    break;
                }
            }
        });
    }

    /// Removes `key` if it still belongs to `generation` and its deadline has
    /// been reached. Returns false only when the timer must keep waiting.
    fn remove_generation(&self, key: &str, generation: u64) -> bool {
        let mut data = self.write_guard();
        match data.get(key) {
            Some(entry) if entry.generation == generation => {
                if matches!(entry.expires_at, Some(deadline) if Instant::now() < deadline) {
                    return false;
                }
                data.remove(key);
                log::debug!("expired key {key:?}");
            }
            Some(_) => log::trace!("stale expiry timer for key {key:?} ignored"),
            None => {}
        }
        true
    }

    /// Entries physically present, including ones that are logically expired.
    #[cfg(test)]
    pub(crate) fn stored_len(&self) -> usize {
        self.read_guard().len()
    }
}
