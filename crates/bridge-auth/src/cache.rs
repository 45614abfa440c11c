//! Per-host credential cache
//!
//! [`CredentialCache`] maps a normalized host to at most one
//! [`SessionCredential`]. Each host has its own slot with two async
//! mutexes: a login lock held across a host's login so concurrent callers
//! share one request, and an entry lock that is never held across network
//! I/O. Cross-host scans only take entry locks, so a slow login against one
//! host never blocks lookups for another.
//!
//! Entries older than the cache TTL are treated as misses and dropped on
//! the next access. Empty slots that nobody holds are pruned on
//! invalidation.

use crate::session::{normalize_host, SessionCredential};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default credential lifetime (5 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// A single host's cache entry.
#[derive(Default)]
pub(crate) struct Slot {
    /// Held for the whole login against this host
    pub(crate) login: Mutex<()>,
    entry: Mutex<Option<SessionCredential>>,
}

impl Slot {
    /// Whether the slot holds nothing and is referenced only by the map.
    fn is_idle(self: &Arc<Self>) -> bool {
        Arc::strong_count(self) == 1
            && self
                .entry
                .try_lock()
                .map(|entry| entry.is_none())
                .unwrap_or(false)
    }
}

/// Concurrency-safe host → credential cache.
pub struct CredentialCache {
    /// One slot per host with an entry or a login in flight
    slots: RwLock<HashMap<String, Arc<Slot>>>,

    /// Maximum credential age; `None` keeps entries until invalidated
    ttl: Option<Duration>,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(Some(DEFAULT_SESSION_TTL))
    }
}

impl CredentialCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a cache whose entries only leave on invalidation.
    pub fn without_expiry() -> Self {
        Self::new(None)
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Return the cached credential for `host` if present and fresh.
    ///
    /// Does not wait for a login in flight.
    pub async fn get(&self, host: &str) -> Option<SessionCredential> {
        let slot = self.existing_slot(host).await?;
        self.fresh_in(&slot).await
    }

    /// Store (or overwrite) the credential for `host`, stamping it as acquired now.
    pub async fn put(&self, host: &str, credential: SessionCredential) {
        let slot = self.slot(host).await;
        Self::store_in(&slot, host, credential).await;
    }

    /// Remove the entry for `host`. Returns whether an entry was removed.
    ///
    /// Waits for a login to the same host that is already in flight, so its
    /// result does not outlive the invalidation.
    pub async fn invalidate(&self, host: &str) -> bool {
        let Some(slot) = self.existing_slot(host).await else {
            return false;
        };

        let removed = {
            let _login = slot.login.lock().await;
            slot.entry.lock().await.take().is_some()
        };
        drop(slot);

        if removed {
            debug!(host = %normalize_host(host), "Invalidated cached session");
        }
        self.prune().await;
        removed
    }

    /// Drop every cached entry.
    ///
    /// Logins already in flight are not waited for.
    pub async fn clear(&self) {
        for slot in self.snapshot().await {
            slot.entry.lock().await.take();
        }
        self.prune().await;
    }

    /// Hosts that currently hold a fresh credential.
    pub async fn hosts(&self) -> Vec<String> {
        let slots: Vec<(String, Arc<Slot>)> = {
            let map = self.slots.read().await;
            map.iter()
                .map(|(host, slot)| (host.clone(), Arc::clone(slot)))
                .collect()
        };

        let mut hosts = Vec::new();
        for (host, slot) in slots {
            if self.fresh_in(&slot).await.is_some() {
                hosts.push(host);
            }
        }
        hosts.sort();
        hosts
    }

    /// Number of hosts with a fresh credential.
    pub async fn len(&self) -> usize {
        self.hosts().await.len()
    }

    /// Whether no host holds a fresh credential.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get or create the slot for `host`.
    pub(crate) async fn slot(&self, host: &str) -> Arc<Slot> {
        let key = normalize_host(host);
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(&key) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key).or_default())
    }

    /// Clone the fresh entry out of a slot, clearing it if stale.
    pub(crate) async fn fresh_in(&self, slot: &Slot) -> Option<SessionCredential> {
        let mut entry = slot.entry.lock().await;
        match entry.as_ref() {
            Some(cred) if self.is_fresh(cred) => Some(cred.clone()),
            Some(cred) => {
                debug!(host = %cred.host, "Cached session expired");
                *entry = None;
                None
            }
            None => None,
        }
    }

    /// Put a previously issued credential back without restamping it.
    ///
    /// Returns it only if it is still fresh.
    pub(crate) async fn restore_in(
        &self,
        slot: &Slot,
        credential: SessionCredential,
    ) -> Option<SessionCredential> {
        *slot.entry.lock().await = Some(credential);
        self.fresh_in(slot).await
    }

    /// Write a credential into a slot, stamping it as acquired now.
    pub(crate) async fn store_in(
        slot: &Slot,
        host: &str,
        mut credential: SessionCredential,
    ) -> SessionCredential {
        credential.host = normalize_host(host);
        credential.acquired_at = Utc::now();
        *slot.entry.lock().await = Some(credential.clone());
        credential
    }

    fn is_fresh(&self, credential: &SessionCredential) -> bool {
        match self.ttl {
            Some(ttl) => !credential.is_expired(ttl),
            None => true,
        }
    }

    async fn existing_slot(&self, host: &str) -> Option<Arc<Slot>> {
        let key = normalize_host(host);
        self.slots.read().await.get(&key).cloned()
    }

    async fn snapshot(&self) -> Vec<Arc<Slot>> {
        self.slots.read().await.values().cloned().collect()
    }

    /// Drop slots that hold nothing and that no caller references.
    async fn prune(&self) {
        let mut slots = self.slots.write().await;
        slots.retain(|_, slot| !slot.is_idle());
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }
}
