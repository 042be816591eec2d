//! Identifier newtypes shared across the mapping engine
//!
//! Containers and scopes are addressed by id, never by path: paths can be
//! renamed while ids stay stable, so every equality in this crate goes
//! through these types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one physical container (a list/collection instance) within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(Uuid);

impl ContainerId {
    /// Generate a fresh container id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the owning site/collection of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one stored record within its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hierarchical content-type identifier.
///
/// Ids are dot-separated segments, e.g. `record.document.contract`; every
/// dotted extension of an id is a specialization of it. Subtype checks and
/// result-row compatibility both reduce to [`ContentTypeId::is_descendant_of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentTypeId(String);

impl ContentTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` is `ancestor` itself or a dotted extension of it.
    ///
    /// Segment-aware: `record.do` is not an ancestor of `record.document`.
    pub fn is_descendant_of(&self, ancestor: &ContentTypeId) -> bool {
        if self.0 == ancestor.0 {
            return true;
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.0.as_str())
            && self.0.as_bytes()[ancestor.0.len()] == b'.'
    }
}

impl fmt::Display for ContentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentTypeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Storage identity of one record: container plus record id.
///
/// `record == None` marks a synthetic identity that was never persisted;
/// recycle and delete are no-ops for such records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub container: ContainerId,
    pub record: Option<RecordId>,
}

impl RecordIdentity {
    pub fn persisted(container: ContainerId, record: RecordId) -> Self {
        Self {
            container,
            record: Some(record),
        }
    }

    pub fn unsaved(container: ContainerId) -> Self {
        Self {
            container,
            record: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.record.is_some()
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record {
            Some(record) => write!(f, "{}:{}", self.container, record),
            None => write!(f, "{}:<unsaved>", self.container),
        }
    }
}

/// Working culture for a request scope, e.g. `en-US`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendant_includes_self() {
        let id = ContentTypeId::new("record.document");
        assert!(id.is_descendant_of(&id));
    }

    #[test]
    fn descendant_requires_segment_boundary() {
        let child = ContentTypeId::new("record.document");
        assert!(child.is_descendant_of(&ContentTypeId::new("record")));
        assert!(!child.is_descendant_of(&ContentTypeId::new("record.do")));
        assert!(!ContentTypeId::new("recorder").is_descendant_of(&ContentTypeId::new("record")));
    }

    #[test]
    fn unsaved_identity_is_not_persisted() {
        let identity = RecordIdentity::unsaved(ContainerId::generate());
        assert!(!identity.is_persisted());
        assert!(identity.to_string().ends_with("<unsaved>"));
    }
}
