//! # Edit History
//!
//! The append-only audit trail carried by every transaction record.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Audit Trail Rules                                                  │
//! │                                                                     │
//! │  • Every state-changing call appends EXACTLY ONE entry              │
//! │  • An entry records only fields whose committed value differs       │
//! │    from the pre-edit value                                          │
//! │  • Entries are never mutated or removed - length only grows         │
//! │  • History is structured data (JSON column), never reconstructed    │
//! │    by parsing free text                                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Field Change
// =============================================================================

/// Before/after values for a single field, stringified for the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Option<String>,
    pub to: Option<String>,
}

// =============================================================================
// Edit Entry
// =============================================================================

/// One audit entry: who changed what, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    /// Opaque actor id from the identity provider.
    pub editor: String,
    pub at: DateTime<Utc>,
    /// field name → {from, to}. BTreeMap keeps JSON output stable.
    pub changes: BTreeMap<String, FieldChange>,
    /// Free text. Callers default this to a synthetic description rather
    /// than leave it empty, so the trail stays inspectable.
    pub reason: String,
}

// =============================================================================
// Change Set Builder
// =============================================================================

/// Collects field diffs for one edit, skipping fields that did not change.
///
/// ## Usage
/// ```rust
/// use tally_core::history::ChangeSet;
///
/// let mut changes = ChangeSet::new();
/// changes.record("payment_method", "cash", "card");
/// changes.record("total_cents", 500, 500); // no-op, values equal
/// assert_eq!(changes.len(), 1);
///
/// let entry = changes.into_entry("user-7", "customer paid by card");
/// assert!(entry.changes.contains_key("payment_method"));
/// ```
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: BTreeMap<String, FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    /// Records a change if `from` and `to` render differently.
    pub fn record<T: fmt::Display, U: fmt::Display>(&mut self, field: &str, from: T, to: U) {
        let from = from.to_string();
        let to = to.to_string();
        if from != to {
            self.changes.insert(
                field.to_string(),
                FieldChange {
                    from: Some(from),
                    to: Some(to),
                },
            );
        }
    }

    /// Records a change between optional values (absent = None in the trail).
    pub fn record_opt<T: fmt::Display>(&mut self, field: &str, from: Option<T>, to: Option<T>) {
        let from = from.map(|v| v.to_string());
        let to = to.map(|v| v.to_string());
        if from != to {
            self.changes.insert(field.to_string(), FieldChange { from, to });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Finalizes the set into an audit entry stamped now.
    pub fn into_entry(self, editor: impl Into<String>, reason: impl Into<String>) -> EditEntry {
        EditEntry {
            editor: editor.into(),
            at: Utc::now(),
            changes: self.changes,
            reason: reason.into(),
        }
    }
}

/// Builds an entry with no field diffs (creation, status-only markers where
/// the status diff is recorded separately by the caller).
pub fn entry_without_changes(editor: impl Into<String>, reason: impl Into<String>) -> EditEntry {
    ChangeSet::new().into_entry(editor, reason)
}

// =============================================================================
// Unit Tests
// =============================================================================
