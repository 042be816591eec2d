//! Pending-change set
//!
//! Per-manager registry of adapters with unsaved field mutations. Keyed by an
//! explicit storage identity so adapters re-created for the same record
//! collapse to one entry. Never cleared implicitly: only a commit drain or
//! an explicit discard removes entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::adapter::ItemAdapter;
use crate::ids::{ContainerId, RecordId, RecordIdentity};

/// Identity key for one pending entry.
///
/// Persisted records key by storage identity, which stays stable across
/// adapter re-creation. Records without a storage identity yet key by adapter
/// address, since nothing else distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKey {
    Persisted(ContainerId, RecordId),
    Unsaved(usize),
}

/// Compute the pending-set key for an adapter.
pub fn change_key(adapter: &Arc<ItemAdapter>) -> ChangeKey {
    match adapter.identity() {
        Some(RecordIdentity {
            container,
            record: Some(record),
        }) => ChangeKey::Persisted(container, record),
        _ => ChangeKey::Unsaved(Arc::as_ptr(adapter) as usize),
    }
}

/// Set of writable adapters awaiting commit, duplicates collapsed by identity.
#[derive(Default)]
pub struct PendingChangeSet {
    entries: Mutex<HashMap<ChangeKey, Arc<ItemAdapter>>>,
}

impl PendingChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChangeKey, Arc<ItemAdapter>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an adapter with unsaved changes.
    ///
    /// When a different adapter is already tracked for the same identity, its
    /// unsaved writes are absorbed into the incoming adapter (the incoming
    /// writes win), so no mutation is lost to adapter re-creation.
    pub fn track(&self, adapter: Arc<ItemAdapter>) {
        let key = change_key(&adapter);
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            if Arc::ptr_eq(existing, &adapter) {
                return;
            }
            if let (Some(old), Some(new)) = (existing.as_direct(), adapter.as_direct()) {
                new.absorb_pending(old.take_pending());
            }
        }
        entries.insert(key, adapter);
    }

    pub fn remove(&self, key: &ChangeKey) {
        self.lock().remove(key);
    }

    pub fn take(&self, key: &ChangeKey) -> Option<Arc<ItemAdapter>> {
        self.lock().remove(key)
    }

    pub fn get(&self, key: &ChangeKey) -> Option<Arc<ItemAdapter>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &ChangeKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Copy of the current entries. Commit drains iterate this snapshot so
    /// adapters tracked mid-drain are kept for a later pass instead of being
    /// lost or processed twice.
    pub fn snapshot(&self) -> Vec<(ChangeKey, Arc<ItemAdapter>)> {
        self.lock().iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
