//! Bounded multi-select buffer feeding a single batched trigger.

use crate::error::ActionError;
use crate::ledger::ReactorId;
use crate::round_clock::Phase;

pub const DEFAULT_MAX_SELECTION: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Selection is at capacity; nothing changed
    Full,
}

/// Ordered set of reactor IDs, insertion order preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<ReactorId>,
    capacity: usize,
}

/// One ledger write covering every selected reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTrigger {
    pub ids: Vec<ReactorId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SELECTION)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Removes `id` if present, otherwise appends it unless full.
    pub fn toggle(&mut self, id: ReactorId) -> ToggleOutcome {
        if let Some(pos) = self.ids.iter().position(|&selected| selected == id) {
            self.ids.remove(pos);
            ToggleOutcome::Removed
        } else if self.is_full() {
            ToggleOutcome::Full
        } else {
            self.ids.push(id);
            ToggleOutcome::Added
        }
    }

    pub fn contains(&self, id: ReactorId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[ReactorId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ids.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&ReactorId) -> bool,
    {
        self.ids.retain(keep);
    }

    /// Packages the whole selection into one batch. Only valid during
    /// `Trigger` and with at least one reactor selected.
    pub fn submit(&self, phase: Phase) -> Result<BatchTrigger, ActionError> {
        if phase != Phase::Trigger {
            return Err(ActionError::wrong_phase(Phase::Trigger, phase));
        }
        if self.ids.is_empty() {
            return Err(ActionError::EmptySelection);
        }
        Ok(BatchTrigger { ids: self.ids.clone() })
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut selection = Selection::new();
        assert_eq!(selection.toggle(4), ToggleOutcome::Added);
        assert_eq!(selection.toggle(9), ToggleOutcome::Added);
        assert_eq!(selection.toggle(4), ToggleOutcome::Removed);
        assert_eq!(selection.ids(), &[9]);
    }

    #[test]
    fn test_eleventh_toggle_is_noop() {
        let mut selection = Selection::new();
        for id in 0..10 {
            assert_eq!(selection.toggle(id), ToggleOutcome::Added);
        }
        assert_eq!(selection.toggle(10), ToggleOutcome::Full);
        assert_eq!(selection.len(), 10);
        assert!(!selection.contains(10));

        // Removal still works at capacity
        assert_eq!(selection.toggle(3), ToggleOutcome::Removed);
        assert_eq!(selection.toggle(10), ToggleOutcome::Added);
    }

    #[test]
    fn test_submit_only_in_trigger() {
        let mut selection = Selection::new();
        assert_eq!(selection.submit(Phase::Trigger), Err(ActionError::EmptySelection));

        selection.toggle(1);
        selection.toggle(2);
        assert_eq!(
            selection.submit(Phase::Deploy),
            Err(ActionError::wrong_phase(Phase::Trigger, Phase::Deploy))
        );
        assert_eq!(selection.submit(Phase::Trigger).unwrap().ids, vec![1, 2]);
    }

    #[test]
    fn test_retain_keeps_order() {
        let mut selection = Selection::new();
        for id in [5, 1, 8, 3] {
            selection.toggle(id);
        }
        selection.retain(|id| *id != 1);
        assert_eq!(selection.ids(), &[5, 8, 3]);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(ids in proptest::collection::vec(0u64..40, 0..200)) {
            let mut selection = Selection::new();
            for id in ids {
                selection.toggle(id);
                prop_assert!(selection.len() <= DEFAULT_MAX_SELECTION);
            }
            let mut unique = selection.ids().to_vec();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), selection.len());
        }

        #[test]
        fn prop_double_toggle_is_identity(
            seed in proptest::collection::vec(0u64..40, 0..9),
            id in 100u64..200,
        ) {
            let mut selection = Selection::new();
            for s in seed {
                selection.toggle(s);
            }
            let before = selection.clone();
            selection.toggle(id);
            selection.toggle(id);
            prop_assert_eq!(selection, before);
        }
    }
}
