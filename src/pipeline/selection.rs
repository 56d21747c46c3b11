// src/pipeline/selection.rs
//
// Active-entry tracking.

use super::entry::{BatchEntry, EntryId};

/// The entry a UI currently shows in detail.
///
/// Always refers to an existing entry, or is `None` only when the store is
/// empty; call [`Selection::reconcile`] after every store mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    active: Option<EntryId>,
}

impl Selection {
    pub fn active(&self) -> Option<EntryId> {
        self.active
    }

    /// Select `id` if it exists. Returns false (and changes nothing) otherwise.
    pub fn select(&mut self, id: EntryId, entries: &[BatchEntry]) -> bool {
        if entries.iter().any(|e| e.id() == id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    /// Fall back to the first entry when nothing (or a removed entry) is
    /// active.
    pub fn reconcile(&mut self, entries: &[BatchEntry]) {
        let still_present = self
            .active
            .is_some_and(|id| entries.iter().any(|e| e.id() == id));
        if !still_present {
            self.active = entries.first().map(BatchEntry::id);
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}
