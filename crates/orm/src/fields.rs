//! Well-known field names
//!
//! Field names the engine itself reads or writes. Backends are expected to
//! surface these on every record regardless of its content type.

/// Record id within its container.
pub const ID: &str = "ID";

/// Exact content-type identifier of the record.
pub const CONTENT_TYPE_ID: &str = "ContentTypeId";

/// Display name / leaf name of the record.
pub const TITLE: &str = "Title";

/// Server-relative path of the record; prefix-matched for search scoping.
pub const PATH: &str = "Path";

/// Owning container id, carried on federated and search rows.
pub const CONTAINER_ID: &str = "ContainerId";

/// Last-modified audit timestamp.
pub const MODIFIED: &str = "Modified";

/// Last-modified-by audit principal.
pub const EDITOR: &str = "Editor";

/// Fields included in every structured query regardless of the requested type.
pub const ALWAYS_REQUIRED: &[&str] = &[ID, CONTENT_TYPE_ID, TITLE];
