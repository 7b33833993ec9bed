//! Error taxonomy for the action pipeline.
//!
//! Parse failures never show up here: the parser returns `None` instead.
//! Everything below is surfaced to the user and leaves the pending action staged.

use thiserror::Error;

use crate::models::{EntityKind, Intent};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Cannot {intent} {}: missing required field `{field}`", .entity.display_name())]
    MissingField {
        entity: EntityKind,
        intent: Intent,
        field: &'static str,
    },

    #[error("Cannot {intent} {}: field `{field}` {reason}", .entity.display_name())]
    InvalidField {
        entity: EntityKind,
        intent: Intent,
        field: &'static str,
        reason: String,
    },

    #[error("Cannot update {}: no fields to change", .entity.display_name())]
    NothingToUpdate { entity: EntityKind },

    #[error("Could not find the {} to {intent}", .entity.display_name())]
    NotFound { entity: EntityKind, intent: Intent },

    #[error(
        "Found {} matching {} records, please say which one to {intent}: {}",
        .candidates.len(),
        .entity.display_name(),
        .candidates.join("; ")
    )]
    Ambiguous {
        entity: EntityKind,
        intent: Intent,
        candidates: Vec<String>,
    },

    #[error("There is no pending action to apply")]
    NothingPending,

    #[error("The pending action is already being applied")]
    AlreadyApplying,

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl ActionError {
    /// Text shown to the user. Store failures without a useful message fall
    /// back to `generic`.
    pub fn user_message(&self, generic: &str) -> String {
        match self {
            Self::Store(e) => {
                let message = e.to_string();
                if message.trim().is_empty() {
                    generic.to_string()
                } else {
                    message
                }
            }
            other => other.to_string(),
        }
    }

    /// Validation errors are raised before any lookup or write happens.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. } | Self::InvalidField { .. } | Self::NothingToUpdate { .. }
        )
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Ambiguous { .. })
    }
}
