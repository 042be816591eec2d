//! Model types and the item handle they wrap
//!
//! A model type declares its content-type metadata through [`ContentModel`]
//! and wraps an [`Item`], the handle over one retrieved record. Field writes
//! through the handle register the adapter into the owning manager's
//! pending-change set; the write is persisted only by an explicit commit.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::ItemAdapter;
use crate::error::MapperResult;
use crate::ids::{ContentTypeId, RecordIdentity};
use crate::manager::ManagerId;
use crate::pending::PendingChangeSet;

/// What kind of record a model type materializes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// Generic record in a list-style container.
    Record,
    File,
    Folder,
    /// Grouping folder with document-set semantics.
    DocumentSet,
    /// Publishing page.
    Page,
}

impl ItemKind {
    /// Whether items of this kind must carry a name at creation.
    pub fn requires_name(&self) -> bool {
        !matches!(self, ItemKind::Record)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Record => write!(f, "Record"),
            ItemKind::File => write!(f, "File"),
            ItemKind::Folder => write!(f, "Folder"),
            ItemKind::DocumentSet => write!(f, "DocumentSet"),
            ItemKind::Page => write!(f, "Page"),
        }
    }
}

/// The fixed backing container kind of a model type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    GenericList,
    DocumentLibrary,
    PageLibrary,
}

/// Content-type metadata and construction contract for a typed model.
///
/// Types with no fixed backing container kind (`container_kind() == None`)
/// are cross-cutting: bound to more than one container they are queried
/// through the search index, since a federated structured query cannot span
/// more than one content-type family.
pub trait ContentModel: Send + Sync + 'static {
    /// Ordered content-type identifiers this type materializes as, most
    /// specific first. Empty means the type is unresolvable.
    fn content_type_ids() -> &'static [&'static str];

    /// Field names required to populate this type.
    fn required_fields() -> &'static [&'static str] {
        &[]
    }

    fn item_kind() -> ItemKind {
        ItemKind::Record
    }

    /// Fixed backing container kind, `None` for cross-cutting types.
    fn container_kind() -> Option<ContainerKind> {
        Some(ContainerKind::GenericList)
    }

    /// True for pure capability/interface markers; such types can be queried
    /// but never created.
    fn is_abstract() -> bool {
        false
    }

    /// Wrap a retrieved item. Field access goes through [`ContentModel::item`].
    fn from_item(item: Item) -> Self
    where
        Self: Sized;

    /// The item handle this model instance wraps.
    fn item(&self) -> &Item;
}

/// Handle over one retrieved record, owned by the manager that produced it.
///
/// Carries the shared adapter plus the owning manager's identity token; the
/// token is what mutate/recycle/delete/commit check before touching storage.
#[derive(Clone)]
pub struct Item {
    adapter: Arc<ItemAdapter>,
    owner: ManagerId,
    pending: Arc<PendingChangeSet>,
}

impl Item {
    pub(crate) fn new(
        adapter: Arc<ItemAdapter>,
        owner: ManagerId,
        pending: Arc<PendingChangeSet>,
    ) -> Self {
        Self {
            adapter,
            owner,
            pending,
        }
    }

    /// Read a field by name.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.adapter.field(name)
    }

    /// Read a string field by name.
    pub fn field_string(&self, name: &str) -> Option<String> {
        self.field(name).and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    /// Write a field and register the unsaved change with the owning manager.
    ///
    /// Fails on items materialized from federated or search rows; those
    /// adapters are read-only.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> MapperResult<()> {
        self.adapter.set_field(name, value.into())?;
        self.pending.track(Arc::clone(&self.adapter));
        Ok(())
    }

    pub fn identity(&self) -> Option<RecordIdentity> {
        self.adapter.identity()
    }

    pub fn content_type_id(&self) -> Option<ContentTypeId> {
        self.adapter.content_type_id()
    }

    pub fn is_read_only(&self) -> bool {
        !self.adapter.is_writable()
    }

    /// True while this item has changes awaiting commit.
    pub fn has_pending_changes(&self) -> bool {
        self.adapter
            .as_direct()
            .is_some_and(|d| d.has_pending_changes())
    }

    pub(crate) fn adapter(&self) -> &Arc<ItemAdapter> {
        &self.adapter
    }

    pub(crate) fn owner_id(&self) -> ManagerId {
        self.owner
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("identity", &self.adapter.identity())
            .field("content_type", &self.adapter.content_type_id())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}
