//! Chat action pipeline.
//!
//! Turns an assistant reply (or, failing that, the user's own message) into a
//! single reviewable mutation of an appointment, medication reminder or health
//! log, and applies it once the user confirms.
//!
//! ```text
//! reply → parser (or fallback) → staging → [confirm] → validation
//!       → resolver (update/delete) → apply → snapshot refresh
//! ```

pub mod apply;
pub mod dates;
pub mod error;
pub mod fallback;
pub mod parser;
pub mod prompt;
pub mod resolver;
pub mod staging;
pub mod types;
pub mod validation;

pub use apply::{ActionApplier, Snapshots};
pub use dates::{to_canonical, Clock, DateTimeResolver, FixedClock, SystemClock};
pub use error::ActionError;
pub use fallback::derive_fallback_action;
pub use parser::{parse_action, render_action_block, strip_action_blocks};
pub use prompt::build_system_prompt;
pub use resolver::{lookup_key, match_records, EntityResolver, Resolution, Snapshot};
pub use staging::{ApplyInFlight, ConfirmationStaging, PendingAction, PendingStatus, INTERRUPTED_MESSAGE};
pub use types::*;
pub use validation::validate;
