//! Model collections
//!
//! A lazily materialized, read-only-aware sequence of typed model instances
//! built from adapters. Adapters whose exact content type is incompatible
//! with the requested type, or unknown, are silently skipped; heterogeneous
//! containers legitimately hold records outside the requested type.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::adapter::ItemAdapter;
use crate::descriptor::Descriptor;
use crate::manager::ManagerId;
use crate::model::{ContentModel, Item};
use crate::pending::PendingChangeSet;

/// Ordered, lazily evaluated sequence of `R` instances over query results.
pub struct ModelCollection<R: ContentModel> {
    adapters: Vec<Arc<ItemAdapter>>,
    requested: Arc<Descriptor>,
    owner: ManagerId,
    pending: Arc<PendingChangeSet>,
    total_count: Option<u64>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: ContentModel> ModelCollection<R> {
    pub(crate) fn new(
        adapters: Vec<Arc<ItemAdapter>>,
        requested: Arc<Descriptor>,
        owner: ManagerId,
        pending: Arc<PendingChangeSet>,
        total_count: Option<u64>,
    ) -> Self {
        Self {
            adapters,
            requested,
            owner,
            pending,
            total_count,
            _marker: PhantomData,
        }
    }

    pub(crate) fn empty(
        requested: Arc<Descriptor>,
        owner: ManagerId,
        pending: Arc<PendingChangeSet>,
    ) -> Self {
        Self::new(Vec::new(), requested, owner, pending, Some(0))
    }

    /// Backend-reported total row count for search results; the number of
    /// returned rows for structured queries.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// Number of raw result rows, before type-compatibility filtering.
    pub fn raw_len(&self) -> usize {
        self.adapters.len()
    }

    /// Materialize typed instances lazily, skipping rows whose exact content
    /// type does not resolve within the requested type.
    pub fn iter(&self) -> impl Iterator<Item = R> + '_ {
        self.adapters.iter().filter_map(move |adapter| {
            let exact = adapter.content_type_id()?;
            if !self.requested.accepts_exact(&exact) {
                return None;
            }
            Some(R::from_item(Item::new(
                Arc::clone(adapter),
                self.owner,
                Arc::clone(&self.pending),
            )))
        })
    }

    /// Materialize the whole sequence.
    pub fn to_vec(&self) -> Vec<R> {
        self.iter().collect()
    }
}

impl<R: ContentModel> fmt::Debug for ModelCollection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCollection")
            .field("raw_len", &self.adapters.len())
            .field("requested", &self.requested.type_name())
            .field("total_count", &self.total_count)
            .finish()
    }
}

impl<R: ContentModel> IntoIterator for ModelCollection<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.to_vec().into_iter()
    }
}
