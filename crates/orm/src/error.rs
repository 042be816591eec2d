//! Error types for the mapping engine
//!
//! Usage errors (creation preconditions, foreign-item checks) and backend
//! query failures share one caller-facing taxonomy. Query failures carry the
//! backend query text and the scope identity for diagnosis and are logged to
//! the tracing channel before they are returned; nothing is retried.

use crate::backend::BackendFailure;
use crate::model::ItemKind;

/// Result type alias for mapping-engine operations.
pub type MapperResult<T> = Result<T, MapperError>;

/// Error taxonomy for the mapping engine.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// A type carries no recognizable content-type metadata.
    #[error("type `{type_name}` carries no content-type metadata")]
    UnresolvableType { type_name: &'static str },

    /// The requested type is not the manager's type or one of its specializations.
    #[error("type `{requested}` is not `{expected}` or one of its specializations")]
    TypeMismatch {
        expected: &'static str,
        requested: &'static str,
    },

    /// The type is a pure capability/interface marker and cannot be instantiated.
    #[error("type `{type_name}` is an abstract capability marker and cannot be instantiated")]
    AbstractType { type_name: &'static str },

    /// The item kind requires a name and none was supplied.
    #[error("item kind `{kind}` requires a name")]
    NameRequired { kind: ItemKind },

    /// More than one container is bound; creation needs exactly one target.
    #[error("{count} containers are bound; item creation requires exactly one")]
    AmbiguousTarget { count: usize },

    /// No container exists or could be provisioned for the type.
    #[error("no container could be provisioned for `{type_name}`")]
    NoTarget { type_name: &'static str },

    /// The item belongs to a different manager instance.
    #[error("item belongs to a different manager instance")]
    ForeignItem,

    /// A write was attempted through a read-only adapter variant.
    #[error("item is read-only: {0}")]
    ReadOnlyItem(String),

    /// A backend query failed; carries the query text and the scope it ran against.
    #[error("query execution failed against `{scope}`: {source} (query: {query})")]
    QueryExecution {
        query: String,
        scope: String,
        #[source]
        source: BackendFailure,
    },

    /// A non-query backend operation failed (creation, recycle, delete, commit write).
    #[error(transparent)]
    Backend(#[from] BackendFailure),
}
