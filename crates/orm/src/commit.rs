//! Commit modes and the single-adapter commit pipeline
//!
//! A commit mode decides, at the point of writing a mutated record back,
//! whether a new version is created and whether the modified/modified-by
//! audit fields are updated. Independent of the mode, a file under enforced
//! checkout policy that is not currently checked out is transparently checked
//! out before the write and checked back in afterwards. The bracket is
//! invisible to the caller and never itself tracked as a pending change.

use serde::{Deserialize, Serialize};

use crate::adapter::ItemAdapter;
use crate::backend::RepositoryScope;
use crate::error::{MapperError, MapperResult};

/// Versioning/audit semantics applied when writing a mutated record back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommitMode {
    /// New version, audit fields updated.
    #[default]
    Default,
    /// New version, audit fields left untouched.
    SystemUpdate,
    /// No new version, audit fields left untouched.
    SystemUpdateOverwriteVersion,
    /// No new version, audit fields updated.
    OverwriteVersion,
}

impl CommitMode {
    /// Whether the write creates a new version of the record.
    pub fn creates_version(&self) -> bool {
        matches!(self, CommitMode::Default | CommitMode::SystemUpdate)
    }

    /// Whether the write updates the modified/modified-by audit fields.
    pub fn updates_audit_fields(&self) -> bool {
        matches!(self, CommitMode::Default | CommitMode::OverwriteVersion)
    }
}

impl std::fmt::Display for CommitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitMode::Default => write!(f, "Default"),
            CommitMode::SystemUpdate => write!(f, "SystemUpdate"),
            CommitMode::SystemUpdateOverwriteVersion => {
                write!(f, "SystemUpdateOverwriteVersion")
            }
            CommitMode::OverwriteVersion => write!(f, "OverwriteVersion"),
        }
    }
}

/// Brackets a write in the scope's "allow unsafe update" window.
struct UnsafeUpdateGuard<'a> {
    scope: &'a dyn RepositoryScope,
}

impl<'a> UnsafeUpdateGuard<'a> {
    fn new(scope: &'a dyn RepositoryScope) -> Self {
        scope.begin_unsafe_updates();
        Self { scope }
    }
}

impl Drop for UnsafeUpdateGuard<'_> {
    fn drop(&mut self) {
        self.scope.end_unsafe_updates();
    }
}

/// Write one adapter's unsaved changes back to the repository.
///
/// On failure the drained overlay is restored to the adapter so the caller's
/// unsaved values survive the failed attempt; the adapter stays in the
/// pending-change set (removal is the caller's job, only after success).
pub(crate) fn commit_adapter(
    scope: &dyn RepositoryScope,
    adapter: &ItemAdapter,
    mode: CommitMode,
) -> MapperResult<()> {
    // Membership in the pending set implies the writable variant; a read-only
    // adapter here has nothing to drain.
    let Some(direct) = adapter.as_direct() else {
        return Ok(());
    };
    let changes = direct.take_pending();
    if changes.is_empty() {
        return Ok(());
    }

    let record = direct.record();
    let _guard = UnsafeUpdateGuard::new(scope);
    let bracket_checkout = record.requires_checkout() && !record.is_checked_out();

    let outcome: crate::backend::BackendResult<()> = (|| {
        if bracket_checkout {
            tracing::debug!(identity = %record.identity(), "transparent checkout before commit write");
            record.check_out()?;
        }
        record.apply(&changes, mode)?;
        if bracket_checkout {
            record.check_in("")?;
        }
        Ok(())
    })();

    match outcome {
        Ok(()) => Ok(()),
        Err(failure) => {
            direct.restore_pending(changes);
            Err(MapperError::Backend(failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_holds_exactly() {
        assert!(CommitMode::Default.creates_version());
        assert!(CommitMode::Default.updates_audit_fields());

        assert!(CommitMode::SystemUpdate.creates_version());
        assert!(!CommitMode::SystemUpdate.updates_audit_fields());

        assert!(!CommitMode::SystemUpdateOverwriteVersion.creates_version());
        assert!(!CommitMode::SystemUpdateOverwriteVersion.updates_audit_fields());

        assert!(!CommitMode::OverwriteVersion.creates_version());
        assert!(CommitMode::OverwriteVersion.updates_audit_fields());
    }
}
