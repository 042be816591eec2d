//! Item adapters
//!
//! A closed set of three variants behind one capability surface: read field
//! by name, write field by name where supported, storage identity, underlying
//! record handle. Callers above this layer never branch on the variant; only
//! the direct-record variant supports write-back and ever enters the
//! pending-change set.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::backend::{RecordHandle, SearchRow, TabularRow};
use crate::error::{MapperError, MapperResult};
use crate::fields;
use crate::ids::{ContainerId, ContentTypeId, RecordId, RecordIdentity};

/// Writable adapter over a directly fetched record. Unsaved field writes live
/// in an overlay map until the commit pipeline drains them into the record.
pub struct DirectRecordAdapter {
    record: Arc<dyn RecordHandle>,
    pending: Mutex<BTreeMap<String, Value>>,
}

impl DirectRecordAdapter {
    pub fn new(record: Arc<dyn RecordHandle>) -> Self {
        Self {
            record,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    fn overlay(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn identity(&self) -> RecordIdentity {
        self.record.identity()
    }

    pub fn content_type_id(&self) -> ContentTypeId {
        self.record.content_type_id()
    }

    /// Unsaved writes shadow the stored value.
    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.overlay().get(name) {
            return Some(value.clone());
        }
        self.record.field(name)
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.overlay().insert(name.into(), value);
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.overlay().is_empty()
    }

    /// Drain the overlay for a commit attempt.
    pub fn take_pending(&self) -> BTreeMap<String, Value> {
        std::mem::take(&mut *self.overlay())
    }

    /// Put a drained overlay back after a failed write. Writes that arrived
    /// in the meantime win over the restored ones.
    pub fn restore_pending(&self, changes: BTreeMap<String, Value>) {
        let mut overlay = self.overlay();
        for (name, value) in changes {
            overlay.entry(name).or_insert(value);
        }
    }

    /// Merge another adapter's drained overlay beneath this one's writes.
    /// Used when the pending-change set collapses two adapters that share a
    /// storage identity.
    pub fn absorb_pending(&self, changes: BTreeMap<String, Value>) {
        self.restore_pending(changes);
    }

    pub fn record(&self) -> &Arc<dyn RecordHandle> {
        &self.record
    }
}

/// Read-only adapter over one federated tabular row.
pub struct TabularRowAdapter {
    row: TabularRow,
}

impl TabularRowAdapter {
    pub fn new(row: TabularRow) -> Self {
        Self { row }
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::persisted(self.row.container, self.row.record)
    }

    pub fn content_type_id(&self) -> Option<ContentTypeId> {
        content_type_from_fields(&self.row.fields)
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.row.fields.get(name).cloned()
    }
}

/// Read-only adapter over one search-index row.
pub struct SearchResultRowAdapter {
    row: SearchRow,
}

impl SearchResultRowAdapter {
    pub fn new(row: SearchRow) -> Self {
        Self { row }
    }

    pub fn path(&self) -> &str {
        &self.row.path
    }

    /// Search rows carry their storage identity as indexed fields; rows
    /// missing either field have no resolvable identity.
    pub fn identity(&self) -> Option<RecordIdentity> {
        let container = self
            .row
            .fields
            .get(fields::CONTAINER_ID)?
            .as_str()
            .and_then(|s| s.parse().ok())
            .map(ContainerId::from_uuid)?;
        let record = self
            .row
            .fields
            .get(fields::ID)?
            .as_u64()
            .map(RecordId::new)?;
        Some(RecordIdentity::persisted(container, record))
    }

    pub fn content_type_id(&self) -> Option<ContentTypeId> {
        content_type_from_fields(&self.row.fields)
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.row.fields.get(name).cloned()
    }
}

fn content_type_from_fields(
    fields: &std::collections::HashMap<String, Value>,
) -> Option<ContentTypeId> {
    fields
        .get(fields::CONTENT_TYPE_ID)
        .and_then(|v| v.as_str())
        .map(ContentTypeId::new)
}

/// Uniform facade over one retrieved record, regardless of which backend
/// produced it.
pub enum ItemAdapter {
    Direct(DirectRecordAdapter),
    Tabular(TabularRowAdapter),
    SearchRow(SearchResultRowAdapter),
}

impl ItemAdapter {
    pub fn direct(record: Arc<dyn RecordHandle>) -> Self {
        ItemAdapter::Direct(DirectRecordAdapter::new(record))
    }

    pub fn tabular(row: TabularRow) -> Self {
        ItemAdapter::Tabular(TabularRowAdapter::new(row))
    }

    pub fn search_row(row: SearchRow) -> Self {
        ItemAdapter::SearchRow(SearchResultRowAdapter::new(row))
    }

    /// Storage identity, when the source row resolves to one.
    pub fn identity(&self) -> Option<RecordIdentity> {
        match self {
            ItemAdapter::Direct(a) => Some(a.identity()),
            ItemAdapter::Tabular(a) => Some(a.identity()),
            ItemAdapter::SearchRow(a) => a.identity(),
        }
    }

    /// Exact content-type identifier of the underlying record, when known.
    pub fn content_type_id(&self) -> Option<ContentTypeId> {
        match self {
            ItemAdapter::Direct(a) => Some(a.content_type_id()),
            ItemAdapter::Tabular(a) => a.content_type_id(),
            ItemAdapter::SearchRow(a) => a.content_type_id(),
        }
    }

    /// Read a field by name.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            ItemAdapter::Direct(a) => a.field(name),
            ItemAdapter::Tabular(a) => a.field(name),
            ItemAdapter::SearchRow(a) => a.field(name),
        }
    }

    /// Write a field by name. Only the direct variant is writable.
    pub fn set_field(&self, name: &str, value: Value) -> MapperResult<()> {
        match self {
            ItemAdapter::Direct(a) => {
                a.set_field(name, value);
                Ok(())
            }
            _ => Err(MapperError::ReadOnlyItem(format!(
                "cannot write field `{}` through a query-row adapter",
                name
            ))),
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, ItemAdapter::Direct(_))
    }

    pub fn as_direct(&self) -> Option<&DirectRecordAdapter> {
        match self {
            ItemAdapter::Direct(a) => Some(a),
            _ => None,
        }
    }

    /// Underlying record handle; present on the direct variant only.
    pub fn record(&self) -> Option<&Arc<dyn RecordHandle>> {
        self.as_direct().map(DirectRecordAdapter::record)
    }
}
