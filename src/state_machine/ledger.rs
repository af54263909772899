//! Feedback ledger: the feedback rounds applied to the current model

use crate::process::CanonicalModel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use similar::TextDiff;
use uuid::Uuid;

/// One successful feedback round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub text: String,
    pub applied_at: DateTime<Utc>,
    /// Model the feedback produced
    pub model_id: Uuid,
    /// Unified diff between the indented trees before and after
    pub diff: String,
}

impl LedgerEntry {
    pub fn new(text: impl Into<String>, before: &CanonicalModel, after: &CanonicalModel) -> Self {
        let old = before.tree().pretty();
        let new = after.tree().pretty();
        let diff = TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(
                &format!("revision {}", before.revision),
                &format!("revision {}", after.revision),
            )
            .to_string();

        Self {
            text: text.into(),
            applied_at: after.created_at,
            model_id: after.id,
            diff,
        }
    }
}

/// Append-only in application order; cleared when a new model is generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeedbackLedger {
    entries: Vec<LedgerEntry>,
}

impl FeedbackLedger {
    pub fn append(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Feedback texts in application order
    pub fn all(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
