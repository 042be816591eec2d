//! Container usages
//!
//! A usage identifies one physical container hosting a type and resolves it
//! lazily against a repository scope, caching the handle. Equality is by
//! container and scope id, never by path (paths can change).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::backend::{Container, RepositoryScope};
use crate::ids::{ContainerId, ScopeId};

struct UsageInner {
    container: ContainerId,
    scope: ScopeId,
    server_relative_path: String,
    resolved: OnceCell<Option<Arc<dyn Container>>>,
}

/// Handle to one physical container within a scope; cheap to clone.
#[derive(Clone)]
pub struct ContainerUsage {
    inner: Arc<UsageInner>,
}

impl ContainerUsage {
    pub fn new(
        container: ContainerId,
        scope: ScopeId,
        server_relative_path: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(UsageInner {
                container,
                scope,
                server_relative_path: server_relative_path.into(),
                resolved: OnceCell::new(),
            }),
        }
    }

    pub fn container_id(&self) -> ContainerId {
        self.inner.container
    }

    pub fn scope_id(&self) -> ScopeId {
        self.inner.scope
    }

    pub fn server_relative_path(&self) -> &str {
        &self.inner.server_relative_path
    }

    /// Open the container against the given scope, binding lazily and caching
    /// the outcome (including "not found") for this usage's lifetime.
    pub fn resolve(&self, scope: &dyn RepositoryScope) -> Option<Arc<dyn Container>> {
        self.inner
            .resolved
            .get_or_init(|| scope.open_container(&self.inner.container))
            .clone()
    }
}

impl PartialEq for ContainerUsage {
    fn eq(&self, other: &Self) -> bool {
        self.inner.container == other.inner.container && self.inner.scope == other.inner.scope
    }
}

impl Eq for ContainerUsage {}

impl Hash for ContainerUsage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.container.hash(state);
        self.inner.scope.hash(state);
    }
}

impl fmt::Debug for ContainerUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerUsage")
            .field("container", &self.inner.container)
            .field("scope", &self.inner.scope)
            .field("path", &self.inner.server_relative_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id_not_path() {
        let container = ContainerId::generate();
        let scope = ScopeId::generate();
        let a = ContainerUsage::new(container, scope, "/sites/a/lists/docs");
        let b = ContainerUsage::new(container, scope, "/sites/a/lists/docs-renamed");
        assert_eq!(a, b);

        let c = ContainerUsage::new(ContainerId::generate(), scope, "/sites/a/lists/docs");
        assert_ne!(a, c);
    }
}
