use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::core::Expirable;
use crate::index::solution::Solution;
use crate::index::solution_index::{SolutionConsumer, SolutionIndex};
use crate::query::Query;

static NEXT_HELPER_ID: AtomicU64 = AtomicU64::new(1);

/// Per-pattern join actor.
///
/// Each registered tuple pattern gets exactly one helper. The helper owns the
/// pattern's variable→position map over a [`SolutionIndex`] that may be
/// shared with other, structurally identical patterns. When its index fans
/// out a new solution, the helper drives the recursive join against the other
/// patterns of its query and emits complete solutions through the query's
/// callback.
pub struct JoinHelper<K, V> {
    id: u64,
    index: Arc<SolutionIndex<V>>,
    /// This pattern's variable names mapped to slots in the projected array.
    positions: HashMap<K, usize>,
    query: Weak<Query<K, V>>,
}

impl<K, V> JoinHelper<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(
        index: Arc<SolutionIndex<V>>,
        positions: HashMap<K, usize>,
        query: Weak<Query<K, V>>,
    ) -> Arc<Self> {
        Arc::new(JoinHelper {
            id: NEXT_HELPER_ID.fetch_add(1, Ordering::Relaxed),
            index,
            positions,
            query,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn index(&self) -> &Arc<SolutionIndex<V>> {
        &self.index
    }

    /// Whether this helper's pattern references the variable.
    pub fn references(&self, variable: &K) -> bool {
        self.positions.contains_key(variable)
    }

    /// Recursively resolves the remaining sibling helpers against the
    /// bindings accumulated so far.
    ///
    /// Among all (variable, value) pairs currently bound, every remaining
    /// helper referencing that variable is probed for its candidate set. An
    /// empty candidate set kills the branch. Otherwise the single smallest
    /// set is iterated (standard hash-join sizing heuristic): compatible
    /// candidates merge their bindings into a copy of the mapping and the
    /// recursion continues with that helper resolved.
    ///
    /// Base case: no helpers remain, so the mapping binds every variable of
    /// the query; it is delivered together with the *triggering* solution's
    /// expiration (not the minimum across contributing partials).
    fn resolve(
        query: &Arc<Query<K, V>>,
        mapping: HashMap<K, V>,
        remaining: &[Arc<JoinHelper<K, V>>],
        expires_at: i64,
    ) {
        if remaining.is_empty() {
            query.deliver(mapping, expires_at);
            return;
        }

        let mut smallest: Option<(usize, Vec<Arc<Solution<V>>>)> = None;
        for (variable, value) in &mapping {
            for (slot, helper) in remaining.iter().enumerate() {
                let Some(&position) = helper.positions.get(variable) else {
                    continue;
                };
                let candidates = helper.index.get_solutions(position, value);
                if candidates.is_empty() {
                    // No partner for this binding: no solution through here.
                    return;
                }
                if smallest.as_ref().is_none_or(|(_, best)| candidates.len() < best.len()) {
                    smallest = Some((slot, candidates));
                }
            }
        }

        // Connectivity guarantees some remaining helper shares a variable
        // with the bound set.
        let Some((slot, candidates)) = smallest else {
            debug_assert!(false, "no remaining join helper references a bound variable");
            return;
        };

        let helper = &remaining[slot];
        let rest: Vec<Arc<JoinHelper<K, V>>> = remaining
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != slot)
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for candidate in candidates {
            if candidate.is_tombstone() {
                continue;
            }
            if let Some(merged) = helper.merge(&mapping, &candidate) {
                Self::resolve(query, merged, &rest, expires_at);
            }
        }
    }

    /// Verifies that every shared-variable value of `candidate` agrees with
    /// the mapping, and returns the mapping extended with the candidate's
    /// bindings; `None` on conflict.
    fn merge(&self, mapping: &HashMap<K, V>, candidate: &Solution<V>) -> Option<HashMap<K, V>> {
        let values = candidate.values();
        let mut merged = mapping.clone();
        for (variable, &position) in &self.positions {
            match merged.get(variable) {
                Some(bound) if *bound != values[position] => return None,
                Some(_) => {}
                None => {
                    merged.insert(variable.clone(), values[position].clone());
                }
            }
        }
        Some(merged)
    }
}

impl<K, V> SolutionConsumer<V> for JoinHelper<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn consumer_id(&self) -> u64 {
        self.id
    }

    fn on_solution(&self, solution: &Arc<Solution<V>>) {
        let Some(query) = self.query.upgrade() else {
            return;
        };
        if query.is_tombstone() {
            return;
        }

        // 1. Project the trigger into a variable -> value mapping.
        let values = solution.values();
        let mut mapping = HashMap::with_capacity(self.positions.len());
        for (variable, &position) in &self.positions {
            mapping.insert(variable.clone(), values[position].clone());
        }

        // 2. Everything but this helper still needs resolving.
        let remaining: Vec<Arc<JoinHelper<K, V>>> =
            query.helpers().into_iter().filter(|helper| helper.id != self.id).collect();

        // 3. Recurse, carrying the trigger's own expiration.
        Self::resolve(&query, mapping, &remaining, solution.expires_at());
    }
}
