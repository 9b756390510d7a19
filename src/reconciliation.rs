// ⚖️ Reconciliation Engine - One record per real location
//
// A location first seen by name only lives under its provisional slug
// ("example-city"). Once a notice supplies its code, that record must end up
// under the canonical key ("EXAM"):
//
//   provisional only            → PROMOTED (re-keyed in place)
//   provisional + canonical     → MERGED (logs unioned, provisional dropped)
//   no provisional record       → UNCHANGED
//
// Running it again on an already reconciled store is a no-op.

use crate::entities::{EntityKey, NameDirectory};
use crate::resolver::Candidate;
use crate::store::HistoryStore;
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// RECONCILIATION OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    /// Nothing to reconcile for this candidate
    Unchanged,

    /// Provisional record re-keyed under its code
    Promoted { from: String, to: String },

    /// Provisional record folded into an existing canonical record
    Merged {
        from: String,
        into: String,
        events_taken: usize,
    },
}

impl ReconciliationOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ReconciliationOutcome::Unchanged)
    }

    pub fn is_promotion(&self) -> bool {
        matches!(self, ReconciliationOutcome::Promoted { .. })
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, ReconciliationOutcome::Merged { .. })
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine
    }

    /// Reconcile the store against one resolved candidate
    pub fn reconcile(&self, store: &mut HistoryStore, candidate: &Candidate) -> ReconciliationOutcome {
        let code = match candidate.identifier.as_deref() {
            Some(code) => code,
            None => return ReconciliationOutcome::Unchanged,
        };

        self.reconcile_name(store, &candidate.name, code)
    }

    /// Fold the provisional record for `name` (if any) into `code`
    pub fn reconcile_name(&self, store: &mut HistoryStore, name: &str, code: &str) -> ReconciliationOutcome {
        let provisional = EntityKey::provisional_for(name);
        let canonical = EntityKey::canonical(code);

        let mut record = match store.remove(&provisional) {
            Some(record) => record,
            None => return ReconciliationOutcome::Unchanged,
        };

        let from = provisional.to_string();
        let to = canonical.to_string();

        if store.contains(&canonical) {
            let events_taken = store.insert(canonical, record);
            info!(from = %from, into = %to, events_taken, "merged provisional record");
            ReconciliationOutcome::Merged {
                from,
                into: to,
                events_taken,
            }
        } else {
            record.identifier = Some(code.to_string());
            store.insert(canonical, record);
            info!(from = %from, to = %to, "promoted provisional record");
            ReconciliationOutcome::Promoted { from, to }
        }
    }

    /// Reconcile every provisional record whose name the directory now
    /// knows a code for. Returns only the outcomes that changed the store.
    pub fn sweep(&self, store: &mut HistoryStore, directory: &NameDirectory) -> Vec<ReconciliationOutcome> {
        let mut outcomes = Vec::new();

        for key in store.provisional_keys() {
            let name = match store.get(&key) {
                Some(record) => record.name.clone(),
                None => continue,
            };
            let code = match directory.identifier_for(&name) {
                Some(code) => code.to_string(),
                None => continue,
            };

            let outcome = self.reconcile_name(store, &name, &code);
            if !outcome.is_unchanged() {
                outcomes.push(outcome);
            }
        }

        outcomes
    }
}

// ============================================================================
// TESTS
// ============================================================================
