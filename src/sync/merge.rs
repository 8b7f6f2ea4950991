use std::collections::HashSet;

use crate::domain::EntityId;

/// How a locally held value is reconciled against the value another context stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Stored wins when it moved ahead, or moved back while a reset was observed.
    AdoptIfAdvancedOrReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    KeepLocal(T),
    AdoptStored(T),
}

impl<T: Copy> Resolution<T> {
    pub fn value(&self) -> T {
        match *self {
            Resolution::KeepLocal(v) | Resolution::AdoptStored(v) => v,
        }
    }

    pub fn adopted(&self) -> bool {
        matches!(self, Resolution::AdoptStored(_))
    }
}

impl MergePolicy {
    pub fn merge<T: PartialOrd + Copy>(self, local: T, stored: T, reset_observed: bool) -> Resolution<T> {
        let adopt = match self {
            MergePolicy::AdoptIfAdvancedOrReset => {
                stored > local || (stored < local && reset_observed)
            }
        };
        if adopt {
            Resolution::AdoptStored(stored)
        } else {
            Resolution::KeepLocal(local)
        }
    }
}

/// Appends entries whose id is not yet in the log. Returns how many were added.
pub fn append_unique<T, F>(log: &mut Vec<T>, entries: impl IntoIterator<Item = T>, id_of: F) -> usize
where
    F: Fn(&T) -> &EntityId,
{
    let mut seen: HashSet<EntityId> = log.iter().map(|e| id_of(e).clone()).collect();
    let before = log.len();
    for entry in entries {
        if seen.insert(id_of(&entry).clone()) {
            log.push(entry);
        }
    }
    log.len() - before
}

/// Positions of local entities absent from the stored id set and not shielded by a grace window.
pub fn evictions<T>(
    local: &[T],
    stored: &HashSet<EntityId>,
    id_of: impl Fn(&T) -> &EntityId,
    protected: impl Fn(&T) -> bool,
) -> Vec<usize> {
    local
        .iter()
        .enumerate()
        .filter(|(_, e)| !protected(e) && !stored.contains(id_of(e)))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adopt_if_advanced_or_reset() {
        let policy = MergePolicy::AdoptIfAdvancedOrReset;
        assert_eq!(policy.merge(10u64, 15, false), Resolution::AdoptStored(15));
        assert_eq!(policy.merge(10u64, 5, false), Resolution::KeepLocal(10));
        assert_eq!(policy.merge(10u64, 0, true), Resolution::AdoptStored(0));
        assert_eq!(policy.merge(10u64, 10, true), Resolution::KeepLocal(10));
        assert!(policy.merge(10u64, 0, true).adopted());
        assert_eq!(policy.merge(10u64, 5, false).value(), 10);
    }

    #[test]
    fn test_append_unique_skips_known_and_repeated_ids() {
        let mut log = vec![EntityId::new("a")];
        let added = append_unique(
            &mut log,
            vec![EntityId::new("a"), EntityId::new("b"), EntityId::new("b")],
            |id| id,
        );
        assert_eq!(added, 1);
        assert_eq!(log, vec![EntityId::new("a"), EntityId::new("b")]);
    }

    #[test]
    fn test_evictions_respect_protection() {
        let local = vec![(EntityId::new("a"), false), (EntityId::new("b"), true), (EntityId::new("c"), false)];
        let stored: HashSet<EntityId> = [EntityId::new("c")].into_iter().collect();

        let evicted = evictions(&local, &stored, |e| &e.0, |e| e.1);
        assert_eq!(evicted, vec![0]);
    }
}
