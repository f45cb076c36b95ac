use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, Weak};

use crate::core::{outlives, Index};
use crate::index::solution::Solution;

/// Consumer of newly indexed solutions. Join helpers implement this; the
/// fan-out is synchronous, so every complete solution derivable from an
/// insertion is emitted before the insertion call returns.
pub trait SolutionConsumer<V>: Send + Sync {
    /// Stable identity used for unsubscription.
    fn consumer_id(&self) -> u64;

    /// Called after the solution has been indexed locally.
    fn on_solution(&self, solution: &Arc<Solution<V>>);
}

/// Outcome of [`SolutionIndex::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// No equal solution existed; the solution was indexed and fanned out.
    Inserted,
    /// An equal but earlier-expiring solution was tombstoned and replaced.
    Superseded,
    /// An equal solution with the same or a later expiration already exists.
    Ignored,
}

struct Store<V> {
    /// Full set of live solutions, keyed by their projected values.
    solutions: HashMap<Vec<V>, Arc<Solution<V>>>,
    /// Per bound position: value -> subset of solutions containing it.
    by_position: Vec<HashMap<V, Vec<Arc<Solution<V>>>>>,
}

/// Per-structural-pattern storage of partial results.
///
/// One index is shared by every structurally identical tuple pattern across
/// all queries, regardless of variable names. Mutation of the full set and
/// the secondary indices is the only point requiring mutual exclusion;
/// lookups clone candidate sets out so join iteration never holds the lock.
pub struct SolutionIndex<V> {
    width: usize,
    store: RwLock<Store<V>>,
    subscribers: RwLock<Vec<Arc<dyn SolutionConsumer<V>>>>,
}

impl<V> SolutionIndex<V>
where
    V: Eq + Hash + Clone + Send + Sync,
{
    /// Creates an empty index for patterns projecting `width` distinct
    /// variables.
    pub fn new(width: usize) -> Arc<Self> {
        Arc::new(SolutionIndex {
            width,
            store: RwLock::new(Store {
                solutions: HashMap::new(),
                by_position: (0..width).map(|_| HashMap::new()).collect(),
            }),
            subscribers: RwLock::new(Vec::new()),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Inserts a solution, enforcing monotonic lifetime: an equal solution
    /// already present wins unless the incoming one expires strictly later
    /// (or never), in which case the old one is tombstoned and replaced.
    ///
    /// Indexing happens before subscriber fan-out, so a newly joinable
    /// partner is visible to itself — the second half of the symmetric hash
    /// join.
    pub fn add(self: &Arc<Self>, solution: Arc<Solution<V>>) -> AddOutcome {
        debug_assert_eq!(solution.values().len(), self.width);

        let outcome = {
            let mut store = self.store.write().unwrap();
            let outcome = match store.solutions.get(solution.values()) {
                Some(existing) => {
                    if !outlives(solution.expires_at(), existing.expires_at()) {
                        return AddOutcome::Ignored;
                    }
                    let existing = Arc::clone(existing);
                    Self::unlink(&mut store, &existing);
                    existing.mark_tombstone();
                    AddOutcome::Superseded
                }
                None => AddOutcome::Inserted,
            };

            solution.set_owner(Arc::downgrade(self));
            store.solutions.insert(solution.values().to_vec(), Arc::clone(&solution));
            for (position, value) in solution.values().iter().enumerate() {
                store.by_position[position]
                    .entry(value.clone())
                    .or_default()
                    .push(Arc::clone(&solution));
            }
            outcome
        };

        self.notify(&solution);
        outcome
    }

    /// Removes the solution equal to `values`. Returns whether one existed.
    pub fn remove_values(&self, values: &[V]) -> bool {
        let mut store = self.store.write().unwrap();
        match store.solutions.get(values) {
            Some(existing) => {
                let existing = Arc::clone(existing);
                Self::unlink(&mut store, &existing);
                existing.mark_tombstone();
                true
            }
            None => false,
        }
    }

    /// Removes exactly `solution`, matching by identity rather than value.
    /// A stale expiry racing a superseding insert of equal values must not
    /// take out the later-expiring replacement. Returns whether the stored
    /// entry was this solution.
    pub(crate) fn remove_solution(&self, solution: &Solution<V>) -> bool {
        let mut store = self.store.write().unwrap();
        match store.solutions.get(solution.values()) {
            Some(existing) if std::ptr::eq(existing.as_ref(), solution) => {
                let existing = Arc::clone(existing);
                Self::unlink(&mut store, &existing);
                existing.mark_tombstone();
                true
            }
            _ => false,
        }
    }

    /// Removes every solution matching a value pattern, `None` positions
    /// acting as wildcards. The bound position with the fewest candidates is
    /// scanned to minimize cost; an all-wildcard pattern clears everything.
    /// Returns the number of solutions removed.
    pub fn remove_pattern(&self, pattern: &[Option<V>]) -> usize {
        debug_assert_eq!(pattern.len(), self.width);
        let mut store = self.store.write().unwrap();

        let mut narrowest: Option<(usize, &V)> = None;
        let mut narrowest_len = usize::MAX;
        for (position, value) in pattern.iter().enumerate() {
            if let Some(value) = value {
                let len = store.by_position[position].get(value).map_or(0, Vec::len);
                if len < narrowest_len {
                    narrowest_len = len;
                    narrowest = Some((position, value));
                }
            }
        }

        let candidates: Vec<Arc<Solution<V>>> = match narrowest {
            // All positions are wildcards: remove everything.
            None => store.solutions.values().cloned().collect(),
            Some((position, value)) => {
                store.by_position[position].get(value).cloned().unwrap_or_default()
            }
        };

        let mut removed = 0;
        for candidate in candidates {
            let matches = candidate
                .values()
                .iter()
                .zip(pattern)
                .all(|(have, want)| want.as_ref().is_none_or(|want| want == have));
            if matches {
                Self::unlink(&mut store, &candidate);
                candidate.mark_tombstone();
                removed += 1;
            }
        }
        removed
    }

    /// O(1) average lookup of the candidate set for a `(position, value)`
    /// binding. The returned set is a snapshot; concurrent insertion does not
    /// invalidate it.
    pub fn get_solutions(&self, position: usize, value: &V) -> Vec<Arc<Solution<V>>> {
        let store = self.store.read().unwrap();
        store.by_position.get(position).and_then(|m| m.get(value)).cloned().unwrap_or_default()
    }

    /// Candidate count for a `(position, value)` binding without cloning.
    pub fn count_solutions(&self, position: usize, value: &V) -> usize {
        let store = self.store.read().unwrap();
        store.by_position.get(position).and_then(|m| m.get(value)).map_or(0, Vec::len)
    }

    /// Number of live solutions in the full set.
    pub fn len(&self) -> usize {
        self.store.read().unwrap().solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().unwrap().solutions.is_empty()
    }

    /// Registers a consumer for synchronous fan-out of future insertions.
    pub fn subscribe(&self, consumer: Arc<dyn SolutionConsumer<V>>) {
        self.subscribers.write().unwrap().push(consumer);
    }

    /// Drops the consumer with the given id. Returns whether it was present.
    pub fn unsubscribe(&self, consumer_id: u64) -> bool {
        let mut subscribers = self.subscribers.write().unwrap();
        let before = subscribers.len();
        subscribers.retain(|consumer| consumer.consumer_id() != consumer_id);
        subscribers.len() != before
    }

    /// Whether any consumer is still subscribed. The trie prunes leaves whose
    /// index has no subscribers left.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.read().unwrap().is_empty()
    }

    fn notify(&self, solution: &Arc<Solution<V>>) {
        // Snapshot under the lock, invoke outside it: a consumer may probe
        // this very index while joining.
        let subscribers: Vec<Arc<dyn SolutionConsumer<V>>> =
            self.subscribers.read().unwrap().clone();
        for subscriber in subscribers {
            subscriber.on_solution(solution);
        }
    }

    fn unlink(store: &mut Store<V>, solution: &Arc<Solution<V>>) {
        store.solutions.remove(solution.values());
        for (position, value) in solution.values().iter().enumerate() {
            if let Some(bucket) = store.by_position[position].get_mut(value) {
                bucket.retain(|candidate| !Arc::ptr_eq(candidate, solution));
                if bucket.is_empty() {
                    store.by_position[position].remove(value);
                }
            }
        }
    }
}

impl<V> Index<Arc<Solution<V>>> for Arc<SolutionIndex<V>>
where
    V: Eq + Hash + Clone + Send + Sync,
{
    fn add(&self, item: Arc<Solution<V>>) -> bool {
        !matches!(SolutionIndex::add(self, item), AddOutcome::Ignored)
    }

    fn remove(&self, item: &Arc<Solution<V>>) -> bool {
        self.remove_solution(item)
    }

    fn clear(&self) {
        let width = self.width;
        self.remove_pattern(&vec![None; width]);
    }

    fn is_empty(&self) -> bool {
        SolutionIndex::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NEVER_EXPIRES;

    fn solution(values: &[&str], expires_at: i64) -> Arc<Solution<String>> {
        Arc::new(Solution::new(values.iter().map(|v| v.to_string()).collect(), expires_at))
    }

    #[test]
    fn later_expiration_supersedes_earlier() {
        let index = SolutionIndex::new(2);
        assert_eq!(index.add(solution(&["a", "b"], 100)), AddOutcome::Inserted);
        assert_eq!(index.add(solution(&["a", "b"], 50)), AddOutcome::Ignored);
        assert_eq!(index.add(solution(&["a", "b"], 100)), AddOutcome::Ignored);
        assert_eq!(index.add(solution(&["a", "b"], 200)), AddOutcome::Superseded);
        assert_eq!(index.add(solution(&["a", "b"], NEVER_EXPIRES)), AddOutcome::Superseded);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn secondary_indices_track_removal() {
        let index = SolutionIndex::new(2);
        index.add(solution(&["a", "b"], NEVER_EXPIRES));
        index.add(solution(&["a", "c"], NEVER_EXPIRES));
        assert_eq!(index.count_solutions(0, &"a".to_string()), 2);

        assert!(index.remove_values(&["a".to_string(), "b".to_string()]));
        assert_eq!(index.count_solutions(0, &"a".to_string()), 1);
        assert_eq!(index.count_solutions(1, &"b".to_string()), 0);
    }

    #[test]
    fn remove_pattern_with_wildcards() {
        let index = SolutionIndex::new(2);
        index.add(solution(&["a", "b"], NEVER_EXPIRES));
        index.add(solution(&["a", "c"], NEVER_EXPIRES));
        index.add(solution(&["d", "c"], NEVER_EXPIRES));

        assert_eq!(index.remove_pattern(&[Some("a".to_string()), None]), 2);
        assert_eq!(index.len(), 1);

        // All-wildcard pattern clears the rest.
        assert_eq!(index.remove_pattern(&[None, None]), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn stale_expiry_cannot_remove_a_superseding_solution() {
        let index = SolutionIndex::new(2);
        let stale = solution(&["a", "b"], 100);
        index.add(Arc::clone(&stale));

        // Eviction can tombstone the popped entry right before an equal,
        // longer-lived solution lands; the identity check must keep the
        // replacement in the store.
        stale.mark_tombstone();
        assert_eq!(index.add(solution(&["a", "b"], 200)), AddOutcome::Superseded);

        assert!(!index.remove_solution(&stale));
        assert_eq!(index.len(), 1);
        assert_eq!(index.count_solutions(0, &"a".to_string()), 1);
    }

    #[test]
    fn remove_pattern_matching_nothing_is_a_noop() {
        let index = SolutionIndex::new(1);
        index.add(solution(&["a"], NEVER_EXPIRES));
        assert_eq!(index.remove_pattern(&[Some("z".to_string())]), 0);
        assert_eq!(index.len(), 1);
    }
}
