//! strata-orm: typed object-to-store mapping over hierarchical content
//! repositories.
//!
//! The engine maps model types, identified by hierarchical content-type ids,
//! onto records stored in heterogeneous containers. A per-type
//! [`EntityManager`] derives its query strategy once from the bound container
//! set: a single container gets a structured item query, several containers
//! of a fixed kind get one federated query, and cross-cutting types spanning
//! containers fall back to the keyword search index. Retrieved rows are
//! adapted behind one facade, field writes accumulate in a pending-change
//! set, and an explicit commit drains them back with selectable versioning
//! and audit semantics.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_orm::{
//!     ContentModel, DescriptorRegistry, EntityManager, Item, ItemRequest, MemoryRepository,
//! };
//!
//! struct Task {
//!     item: Item,
//! }
//!
//! impl ContentModel for Task {
//!     fn content_type_ids() -> &'static [&'static str] {
//!         &["record.task"]
//!     }
//!
//!     fn from_item(item: Item) -> Self {
//!         Self { item }
//!     }
//!
//!     fn item(&self) -> &Item {
//!         &self.item
//!     }
//! }
//!
//! # fn main() -> Result<(), strata_orm::MapperError> {
//! let scope = Arc::new(MemoryRepository::new("/sites/team"));
//! let registry = Arc::new(DescriptorRegistry::new());
//! let manager = EntityManager::<Task>::new(scope, registry)?;
//!
//! let task = manager.create::<Task>()?.expect("task materializes");
//! task.item().set_field("Title", "ship it")?;
//! manager.commit_changes()?;
//!
//! for task in manager.get_items::<Task>(&ItemRequest::new())?.iter() {
//!     println!("{:?}", task.item().field_string("Title"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod collection;
pub mod commit;
pub mod descriptor;
pub mod error;
pub mod fields;
pub mod filter;
pub mod ids;
pub mod manager;
pub mod memory;
pub mod model;
pub mod pending;
pub mod query;
pub mod usage;

pub use adapter::ItemAdapter;
pub use backend::{
    BackendFailure, BackendFailureKind, BackendResult, Container, RecordHandle, RepositoryScope,
    SearchResults, SearchRow, TabularRow, TermStore,
};
pub use collection::ModelCollection;
pub use commit::CommitMode;
pub use descriptor::{Descriptor, DescriptorRegistry};
pub use error::{MapperError, MapperResult};
pub use filter::{FilterExpression, FilterOperator};
pub use ids::{ContainerId, ContentTypeId, Locale, RecordId, RecordIdentity, ScopeId};
pub use manager::{EntityManager, ItemRequest, ManagerId, QueryMode};
pub use memory::{MemoryContainer, MemoryRecord, MemoryRepository, RecordingTermStore};
pub use model::{ContainerKind, ContentModel, Item, ItemKind};
pub use pending::{ChangeKey, PendingChangeSet};
pub use query::{FederatedQuery, ItemQuery, KeywordInclusion, SearchQuery};
pub use usage::ContainerUsage;
