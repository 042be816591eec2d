//! Repository backend seams
//!
//! Trait abstraction over the repository connection scope and the three query
//! surfaces it exposes, plus the record handle the commit pipeline writes
//! through. The engine is synchronous: every method here is blocking I/O from
//! the caller's point of view, with no internal retry or timeout layer.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::commit::CommitMode;
use crate::descriptor::Descriptor;
use crate::ids::{ContainerId, ContentTypeId, Locale, RecordId, RecordIdentity};
use crate::query::{FederatedQuery, ItemQuery, SearchQuery};
use crate::usage::ContainerUsage;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendFailure>;

/// Coarse classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFailureKind {
    /// Unspecific execution failure; for federated queries this triggers the
    /// read-only schema diagnosis pass.
    Execution,
    /// The backend rejected the request as invalid.
    Validation,
    /// The backend or a required resource is unreachable.
    Unavailable,
}

impl fmt::Display for BackendFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFailureKind::Execution => write!(f, "execution"),
            BackendFailureKind::Validation => write!(f, "validation"),
            BackendFailureKind::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Failure reported by a backend call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("backend {kind} failure: {message}")]
pub struct BackendFailure {
    pub kind: BackendFailureKind,
    pub message: String,
}

impl BackendFailure {
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: BackendFailureKind::Execution,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: BackendFailureKind::Validation,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: BackendFailureKind::Unavailable,
            message: message.into(),
        }
    }

    /// True when the failure carries no actionable classification, the
    /// signal that a federated query deserves a schema diagnosis pass.
    pub fn is_unspecific(&self) -> bool {
        self.kind == BackendFailureKind::Execution
    }
}

/// One row of a federated tabular result.
#[derive(Debug, Clone)]
pub struct TabularRow {
    pub container: ContainerId,
    pub record: RecordId,
    pub fields: HashMap<String, Value>,
}

/// One row of a keyword search result.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub path: String,
    pub fields: HashMap<String, Value>,
}

/// Keyword search result set with the backend-reported total, which is
/// independent of the row-limit window actually returned.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub rows: Vec<SearchRow>,
    pub total_rows: u64,
}

/// The repository connection scope: opens containers, executes federated and
/// search queries, reports administrative policy, and brackets unsafe updates.
pub trait RepositoryScope: Send + Sync {
    /// Absolute URL of this scope; search queries without explicit containers
    /// are path-restricted to it.
    fn scope_url(&self) -> String;

    /// Administrative row-limit ceiling, if one is configured.
    fn row_limit_ceiling(&self) -> Option<u32>;

    /// Open a container by id; `None` if it does not exist in this scope.
    fn open_container(&self, id: &ContainerId) -> Option<Arc<dyn Container>>;

    /// Containers under this scope currently hosting the given content type.
    fn containers_hosting(&self, content_type: &ContentTypeId) -> Vec<ContainerUsage>;

    /// Provision a container able to host the descriptor's type; `Ok(None)`
    /// when nothing can be provisioned.
    fn provision_container(&self, descriptor: &Descriptor) -> BackendResult<Option<ContainerUsage>>;

    /// Attach the descriptor's content type (and its required fields) to an
    /// existing container.
    fn provision_content_type(
        &self,
        container: &Arc<dyn Container>,
        descriptor: &Descriptor,
    ) -> BackendResult<()>;

    /// Create a page through the publishing system's creation path.
    fn create_page(
        &self,
        container: &ContainerId,
        name: &str,
        content_type: &ContentTypeId,
    ) -> BackendResult<Arc<dyn RecordHandle>>;

    /// Execute a structured query spanning several containers.
    fn execute_federated(&self, query: &FederatedQuery) -> BackendResult<Vec<TabularRow>>;

    /// Execute a keyword search query.
    fn execute_search(&self, query: &SearchQuery) -> BackendResult<SearchResults>;

    /// Working culture for the current request scope.
    fn resolve_locale(&self) -> Locale;

    /// Term-store handle, absent if none is configured for the scope.
    fn term_store(&self) -> Option<Arc<dyn TermStore>> {
        None
    }

    /// Enter the scoped "allow unsafe update" bracket for writes.
    fn begin_unsafe_updates(&self) {}

    /// Leave the scoped "allow unsafe update" bracket.
    fn end_unsafe_updates(&self) {}
}

/// One physical container within a scope.
pub trait Container: Send + Sync {
    fn id(&self) -> ContainerId;

    fn server_relative_path(&self) -> String;

    /// Number of records currently stored; zero short-circuits item queries.
    fn item_count(&self) -> u64;

    /// True if the content type (or an ancestor of it) is attached here.
    fn hosts_content_type(&self, content_type: &ContentTypeId) -> bool;

    /// Execute a structured item query against this container.
    fn execute_items(&self, query: &ItemQuery) -> BackendResult<Vec<Arc<dyn RecordHandle>>>;

    /// Add a bare record; the content-type identifier is assigned by a
    /// follow-up update.
    fn add_record(&self) -> BackendResult<Arc<dyn RecordHandle>>;

    /// Add a placeholder-content file with the content-type identifier preset.
    fn add_file(&self, name: &str, content_type: &ContentTypeId)
        -> BackendResult<Arc<dyn RecordHandle>>;

    /// Add a sub-folder; the content-type identifier is assigned by a
    /// follow-up update.
    fn add_folder(&self, name: &str) -> BackendResult<Arc<dyn RecordHandle>>;

    /// Of the given field names, the ones this container does not carry.
    fn missing_required_fields(&self, required: &[String]) -> BackendResult<Vec<String>>;
}

/// One stored record, the write-back surface of the commit pipeline.
pub trait RecordHandle: Send + Sync {
    /// Storage identity; `record == None` for a synthetic, never-persisted record.
    fn identity(&self) -> RecordIdentity;

    /// Exact content-type identifier of this record.
    fn content_type_id(&self) -> ContentTypeId;

    fn field(&self, name: &str) -> Option<Value>;

    /// Write the given field changes with the commit mode's versioning and
    /// audit semantics.
    fn apply(&self, changes: &BTreeMap<String, Value>, mode: CommitMode) -> BackendResult<()>;

    /// True if checkout policy is enforced for this record.
    fn requires_checkout(&self) -> bool {
        false
    }

    fn is_checked_out(&self) -> bool {
        false
    }

    fn check_out(&self) -> BackendResult<()> {
        Ok(())
    }

    fn check_in(&self, _comment: &str) -> BackendResult<()> {
        Ok(())
    }

    /// Move the record to a recoverable trash state.
    fn recycle(&self) -> BackendResult<()>;

    /// Permanently remove the record.
    fn delete(&self) -> BackendResult<()>;
}

/// Externally-owned term-store handle; the manager assigns its working
/// language exactly once at construction.
pub trait TermStore: Send + Sync {
    fn set_working_language(&self, locale: &Locale);
}
