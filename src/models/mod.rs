pub mod enums;
pub mod conversation;
pub mod appointment;
pub mod medication;
pub mod health_log;

pub use enums::*;
pub use conversation::*;
pub use appointment::*;
pub use medication::*;
pub use health_log::*;

use chrono::{DateTime, Utc};

/// Shape shared by the three record kinds the assistant can mutate.
///
/// Resolution only ever looks at `id`, `label` and `scheduled_at`, so one
/// generic resolver and one generic applier serve every kind.
pub trait StoredRecord: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Fields required to create a record (the id is assigned by the store).
    type Draft: Clone + Send + Sync + 'static;

    /// Partial update; `None` fields are left untouched.
    type Patch: Clone + Send + Sync + 'static;

    fn id(&self) -> &str;

    /// Owning profile; `list_all` is scoped by it.
    fn user_profile_id(&self) -> &str;

    /// Descriptive name matched case-insensitively during resolution.
    fn label(&self) -> Option<&str>;

    /// Canonical date/time matched exactly during resolution.
    fn scheduled_at(&self) -> Option<DateTime<Utc>>;

    fn from_draft(id: String, draft: Self::Draft) -> Self;

    fn apply_patch(&mut self, patch: Self::Patch);

    /// One-line description for prompts and disambiguation messages.
    fn summary(&self) -> String;

    /// Whether `check_patch` needs the stored record to judge `patch`.
    fn patch_needs_current(_patch: &Self::Patch) -> bool {
        false
    }

    /// Reject a patch that would leave `self` inconsistent once merged.
    fn check_patch(&self, _patch: &Self::Patch) -> Result<(), PatchConflict> {
        Ok(())
    }
}

/// Field an update may not set because of what the record already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConflict {
    pub field: &'static str,
    pub reason: &'static str,
}
