//! Entity resolution: turns a loose reference from an action into the id of
//! exactly one stored record.
//!
//! One generic implementation serves all three record kinds through
//! `StoredRecord`. The search space is the session's cached snapshot, fetched
//! lazily when empty.

use chrono::TimeZone;
use serde_json::{Map, Value};

use super::dates::DateTimeResolver;
use super::error::ActionError;
use super::types::{LookupKey, TargetRef};
use crate::config::AmbiguityPolicy;
use crate::models::{EntityKind, Intent, StoredRecord};
use crate::store::RecordStore;

// ═══════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════

/// Most recent full listing of one record kind.
#[derive(Debug, Clone)]
pub struct Snapshot<R> {
    records: Vec<R>,
}

impl<R> Default for Snapshot<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R: StoredRecord> Snapshot<R> {
    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn replace(&mut self, records: Vec<R>) {
        self.records = records;
    }

    /// Forget the cached listing; the next resolution re-fetches.
    pub fn invalidate(&mut self) {
        self.records.clear();
    }

    /// Re-fetch the full listing and overwrite the cache.
    pub async fn refresh(
        &mut self,
        store: &dyn RecordStore<R>,
        user_id: &str,
    ) -> Result<(), ActionError> {
        self.records = store.list_all(user_id).await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Lookup keys
// ═══════════════════════════════════════════

/// Build the lookup key for an update/delete from the action's data bag:
/// the kind's label field and its date field (resolved to an instant).
///
/// A date that is present but unresolvable is dropped from the key; callers
/// that must reject it check `date_field` themselves.
pub fn lookup_key<Tz: TimeZone>(
    entity: EntityKind,
    data: &Map<String, Value>,
    dates: &DateTimeResolver<Tz>,
) -> LookupKey {
    let label = data
        .get(entity.label_field())
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let when = data
        .get(entity.date_field())
        .and_then(Value::as_str)
        .and_then(|raw| dates.resolve_str(raw));
    LookupKey { label, when }
}

// ═══════════════════════════════════════════
// Matching
// ═══════════════════════════════════════════

/// Outcome of matching a lookup key against a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    NotFound,
    /// Summaries of every remaining candidate, in listing order.
    Ambiguous(Vec<String>),
}

fn label_matches<R: StoredRecord>(record: &R, label: &str) -> bool {
    record
        .label()
        .is_some_and(|l| l.trim().to_lowercase() == label.to_lowercase())
}

fn date_matches<R: StoredRecord>(record: &R, key: &LookupKey) -> bool {
    key.when.is_some() && record.scheduled_at() == key.when
}

/// Match `key` against `records` in order.
///
/// A record matches if its label equals the key's label (case-insensitive) OR
/// its date equals the key's date. Several matches are narrowed to those
/// matching every supplied criterion, or failing that to those matching the
/// label. Anything still ambiguous is settled by `policy`.
pub fn match_records<R: StoredRecord>(
    records: &[R],
    key: &LookupKey,
    policy: AmbiguityPolicy,
) -> Resolution {
    if key.is_empty() {
        return Resolution::NotFound;
    }

    let any: Vec<&R> = records
        .iter()
        .filter(|r| {
            key.label.as_deref().is_some_and(|l| label_matches(*r, l)) || date_matches(*r, key)
        })
        .collect();

    let candidates = match any.len() {
        0 => return Resolution::NotFound,
        1 => return Resolution::Found(any[0].id().to_string()),
        _ => any,
    };

    let all: Vec<&R> = candidates
        .iter()
        .copied()
        .filter(|r| {
            key.label.as_deref().map_or(true, |l| label_matches(*r, l))
                && (key.when.is_none() || date_matches(*r, key))
        })
        .collect();
    if all.len() == 1 {
        return Resolution::Found(all[0].id().to_string());
    }

    // Nothing matches both, as in a reschedule whose new time is already
    // taken: a record named by the key beats one that only shares the date.
    let named: Vec<&R> = if all.is_empty() {
        candidates
            .iter()
            .copied()
            .filter(|r| key.label.as_deref().is_some_and(|l| label_matches(*r, l)))
            .collect()
    } else {
        Vec::new()
    };
    if named.len() == 1 {
        return Resolution::Found(named[0].id().to_string());
    }

    match policy {
        AmbiguityPolicy::FirstMatch => Resolution::Found(candidates[0].id().to_string()),
        AmbiguityPolicy::Reject => {
            let pool = if !all.is_empty() {
                &all
            } else if !named.is_empty() {
                &named
            } else {
                &candidates
            };
            Resolution::Ambiguous(pool.iter().map(|r| r.summary()).collect())
        }
    }
}

// ═══════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════

/// Resolves update/delete targets for one record kind.
pub struct EntityResolver<'a, R: StoredRecord> {
    store: &'a dyn RecordStore<R>,
    user_id: &'a str,
    policy: AmbiguityPolicy,
}

impl<'a, R: StoredRecord> EntityResolver<'a, R> {
    pub fn new(store: &'a dyn RecordStore<R>, user_id: &'a str, policy: AmbiguityPolicy) -> Self {
        Self {
            store,
            user_id,
            policy,
        }
    }

    /// Resolve `target` to a record id. Explicit ids are trusted as-is.
    pub async fn resolve(
        &self,
        target: &TargetRef,
        intent: Intent,
        snapshot: &mut Snapshot<R>,
    ) -> Result<String, ActionError> {
        let key = match target {
            TargetRef::Id(id) => return Ok(id.clone()),
            TargetRef::Lookup(key) => key,
        };

        if snapshot.is_empty() {
            tracing::debug!(entity = %R::KIND, "Snapshot empty, fetching records");
            snapshot.refresh(self.store, self.user_id).await?;
        }

        match match_records(snapshot.records(), key, self.policy) {
            Resolution::Found(id) => {
                tracing::debug!(entity = %R::KIND, %intent, record_id = %id, "Target resolved");
                Ok(id)
            }
            Resolution::NotFound => Err(ActionError::NotFound {
                entity: R::KIND,
                intent,
            }),
            Resolution::Ambiguous(candidates) => {
                tracing::debug!(
                    entity = %R::KIND,
                    %intent,
                    candidates = candidates.len(),
                    "Target ambiguous"
                );
                Err(ActionError::Ambiguous {
                    entity: R::KIND,
                    intent,
                    candidates,
                })
            }
        }
    }
}
