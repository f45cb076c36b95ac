use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::core::expiration::ExpirationManager;
use crate::core::Index;
use crate::index::join_helper::JoinHelper;
use crate::index::solution::Solution;
use crate::index::solution_index::{AddOutcome, SolutionConsumer, SolutionIndex};
use crate::pattern::{GraphPattern, Term, TuplePattern};
use crate::query::Query;

/// Branch key for one trie position: either a constant value or a variable
/// occurrence, identified by the relative offset back to the position where
/// that variable first occurred. Offset 0 marks a fresh variable.
///
/// Keying variables by offset instead of by name gives position-based
/// sharing: queries whose patterns are structurally identical but use
/// different variable names walk the exact same trie path.
enum BranchKey<'a, V> {
    Constant(&'a V),
    Variable(usize),
}

struct TrieNode<V> {
    /// Constant branches, keyed by the value a tuple must carry here.
    constants: HashMap<V, TrieNode<V>>,
    /// Variable branches, indexed by relative offset.
    variables: Vec<Option<Box<TrieNode<V>>>>,
    /// Present iff some registered pattern ends at this depth.
    leaf: Option<Arc<SolutionIndex<V>>>,
}

impl<V> Default for TrieNode<V> {
    fn default() -> Self {
        TrieNode { constants: HashMap::new(), variables: Vec::new(), leaf: None }
    }
}

impl<V> TrieNode<V> {
    fn is_structurally_empty(&self) -> bool {
        self.constants.is_empty()
            && self.variables.iter().all(Option::is_none)
            && self.leaf.is_none()
    }
}

/// The pattern trie: maps sequences of tuple positions to [`SolutionIndex`]
/// leaves, used both to register patterns and to dispatch incoming tuples.
///
/// Trie-structure mutation (query add/remove) is exclusive; tuple ingestion
/// and retraction only take the shared side of the lock and mutate leaf
/// indices through their own interior locking.
pub struct QueryIndex<K, V> {
    root: RwLock<TrieNode<V>>,
    _variables: PhantomData<K>,
}

impl<K, V> QueryIndex<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(QueryIndex { root: RwLock::new(TrieNode::default()), _variables: PhantomData })
    }

    /// Admits a query: walks/extends the trie once per tuple pattern,
    /// creates-or-reuses the `SolutionIndex` at each terminal depth, builds a
    /// `JoinHelper` from the accumulated variable→position map and installs
    /// it on the query (exactly once per pattern; rebinding is illegal).
    ///
    /// Connectivity and non-empty validation already happened when the
    /// `GraphPattern` was constructed, so admission itself cannot fail.
    pub fn add(self: &Arc<Self>, query: &Arc<Query<K, V>>) {
        let Some(pattern) = query.pattern() else {
            return;
        };

        let mut root = self.root.write().unwrap();
        for (pattern_index, tuple_pattern) in pattern.patterns().iter().enumerate() {
            let mut node = &mut *root;
            for key in Self::branch_keys(tuple_pattern) {
                node = match key {
                    BranchKey::Constant(value) => node.constants.entry(value.clone()).or_default(),
                    BranchKey::Variable(offset) => {
                        if node.variables.len() <= offset {
                            node.variables.resize_with(offset + 1, || None);
                        }
                        node.variables[offset].get_or_insert_with(Box::default)
                    }
                };
            }

            let index = Arc::clone(
                node.leaf
                    .get_or_insert_with(|| SolutionIndex::new(tuple_pattern.projection_width())),
            );
            debug_assert_eq!(index.width(), tuple_pattern.projection_width());

            let helper = JoinHelper::new(
                Arc::clone(&index),
                tuple_pattern.variable_positions(),
                Arc::downgrade(query),
            );
            index.subscribe(Arc::clone(&helper) as Arc<dyn SolutionConsumer<V>>);
            query.attach_helper(pattern_index, helper);
        }
        drop(root);

        query.set_owner(Arc::downgrade(self));
    }

    /// Reverses the registration walk for every pattern of the query,
    /// detaching its helpers and pruning trie nodes and solution indices
    /// that become structurally empty.
    ///
    /// A pattern that cannot be located means the trie was corrupted by a
    /// caller bypassing the API; every pattern is still attempted, then the
    /// inconsistency is a fatal assertion.
    pub fn remove_registration(
        &self,
        pattern: &GraphPattern<K, V>,
        helpers: &[Arc<JoinHelper<K, V>>],
    ) {
        let mut missing = Vec::new();
        {
            let mut root = self.root.write().unwrap();
            for (pattern_index, tuple_pattern) in pattern.patterns().iter().enumerate() {
                let keys = Self::branch_keys(tuple_pattern);
                let helper_id = helpers.get(pattern_index).map(|helper| helper.id());
                if Self::remove_walk(&mut root, &keys, helper_id).is_err() {
                    missing.push(pattern_index);
                }
            }
        }
        assert!(
            missing.is_empty(),
            "patterns {missing:?} were not registered in the trie; index is corrupted"
        );
    }

    /// Dispatches one incoming tuple: walks the trie following every
    /// variable branch plus the matching constant branch at each position,
    /// builds a `Solution` from the projection at every reached leaf and
    /// inserts it into that leaf's index (fanning out joins synchronously).
    /// Finite-expiration solutions are handed to the expiration manager.
    ///
    /// Matching is prefix-tolerant: a longer tuple matches a pattern on its
    /// first `arity` positions, a shorter one never reaches that pattern's
    /// leaf. Returns whether any leaf was reached.
    pub fn add_tuple(
        &self,
        tuple: &[V],
        expires_at: i64,
        solutions: &ExpirationManager<Arc<Solution<V>>>,
    ) -> bool {
        let matches = {
            let root = self.root.read().unwrap();
            let mut out = Vec::new();
            Self::collect_matches(&root, tuple, 0, &mut Vec::new(), &mut out);
            out
        };
        if matches.is_empty() {
            return false;
        }

        // Leaf insertion happens outside the trie lock: the join fan-out may
        // call user code, and concurrent ingestion must not serialize on the
        // trie.
        for (index, projection) in matches {
            let solution = Arc::new(Solution::new(projection, expires_at));
            if index.add(Arc::clone(&solution)) != AddOutcome::Ignored {
                solutions.add(solution);
            }
        }
        true
    }

    /// Retracts previously seen tuples by value pattern, `None` positions
    /// acting as wildcards. A wildcard descends every constant branch as
    /// well as the variable branches. Returns the number of partial results
    /// removed across all reached leaves.
    pub fn remove_tuples(&self, pattern: &[Option<V>]) -> usize {
        let matches = {
            let root = self.root.read().unwrap();
            let mut out = Vec::new();
            Self::collect_retractions(&root, pattern, 0, &mut Vec::new(), &mut Vec::new(), &mut out);
            out
        };

        let mut removed = 0;
        for (index, projection) in matches {
            removed += index.remove_pattern(&projection);
        }
        removed
    }

    /// Whether the trie currently holds no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.root.read().unwrap().is_structurally_empty()
    }

    fn branch_keys(pattern: &TuplePattern<K, V>) -> Vec<BranchKey<'_, V>> {
        let mut first_occurrence: HashMap<&K, usize> = HashMap::new();
        pattern
            .terms()
            .iter()
            .enumerate()
            .map(|(position, term)| match term {
                Term::Constant(value) => BranchKey::Constant(value),
                Term::Variable(name) => match first_occurrence.get(name) {
                    Some(&first) => BranchKey::Variable(position - first),
                    None => {
                        first_occurrence.insert(name, position);
                        BranchKey::Variable(0)
                    }
                },
            })
            .collect()
    }

    /// Depth-first removal of one pattern's path. `Ok(true)` means the node
    /// became structurally empty and the parent should prune the branch;
    /// `Err(())` means the path does not exist.
    fn remove_walk(
        node: &mut TrieNode<V>,
        keys: &[BranchKey<'_, V>],
        helper_id: Option<u64>,
    ) -> Result<bool, ()> {
        let Some((key, rest)) = keys.split_first() else {
            let index = node.leaf.as_ref().ok_or(())?;
            if let Some(helper_id) = helper_id {
                index.unsubscribe(helper_id);
            }
            if !index.has_subscribers() {
                node.leaf = None;
            }
            return Ok(node.is_structurally_empty());
        };

        match key {
            BranchKey::Constant(value) => {
                let child = node.constants.get_mut(value).ok_or(())?;
                if Self::remove_walk(child, rest, helper_id)? {
                    node.constants.remove(value);
                }
            }
            BranchKey::Variable(offset) => {
                let child = node.variables.get_mut(*offset).and_then(Option::as_mut).ok_or(())?;
                if Self::remove_walk(child, rest, helper_id)? {
                    node.variables[*offset] = None;
                    while node.variables.last().is_some_and(Option::is_none) {
                        node.variables.pop();
                    }
                }
            }
        }
        Ok(node.is_structurally_empty())
    }

    fn collect_matches(
        node: &TrieNode<V>,
        tuple: &[V],
        depth: usize,
        projection: &mut Vec<V>,
        out: &mut Vec<(Arc<SolutionIndex<V>>, Vec<V>)>,
    ) {
        if let Some(index) = &node.leaf {
            out.push((Arc::clone(index), projection.clone()));
        }
        if depth == tuple.len() {
            return;
        }
        let value = &tuple[depth];

        if let Some(child) = node.constants.get(value) {
            Self::collect_matches(child, tuple, depth + 1, projection, out);
        }

        for (offset, child) in node.variables.iter().enumerate() {
            let Some(child) = child else { continue };
            if offset == 0 {
                projection.push(value.clone());
                Self::collect_matches(child, tuple, depth + 1, projection, out);
                projection.pop();
            } else if depth >= offset && tuple[depth - offset] == *value {
                // Non-first occurrence: the tuple must repeat the value bound
                // at the variable's first occurrence, else this branch dies.
                Self::collect_matches(child, tuple, depth + 1, projection, out);
            }
        }
    }

    fn collect_retractions(
        node: &TrieNode<V>,
        pattern: &[Option<V>],
        depth: usize,
        projection: &mut Vec<Option<V>>,
        first_depths: &mut Vec<usize>,
        out: &mut Vec<(Arc<SolutionIndex<V>>, Vec<Option<V>>)>,
    ) {
        if let Some(index) = &node.leaf {
            out.push((Arc::clone(index), projection.clone()));
        }
        if depth == pattern.len() {
            return;
        }
        let value = pattern[depth].as_ref();

        match value {
            Some(value) => {
                if let Some(child) = node.constants.get(value) {
                    Self::collect_retractions(child, pattern, depth + 1, projection, first_depths, out);
                }
            }
            // A wildcard descends every constant child.
            None => {
                for child in node.constants.values() {
                    Self::collect_retractions(child, pattern, depth + 1, projection, first_depths, out);
                }
            }
        }

        for (offset, child) in node.variables.iter().enumerate() {
            let Some(child) = child else { continue };
            if offset == 0 {
                projection.push(value.cloned());
                first_depths.push(depth);
                Self::collect_retractions(child, pattern, depth + 1, projection, first_depths, out);
                first_depths.pop();
                projection.pop();
                continue;
            }

            // Projection slot of the variable that first occurred `offset`
            // positions back; slots are pushed in first-occurrence order.
            let slot = depth
                .checked_sub(offset)
                .and_then(|first| first_depths.iter().position(|&d| d == first));
            let Some(slot) = slot else { continue };

            match (value, projection[slot].clone()) {
                // Both bound: the repeat must agree with the slot binding.
                (Some(current), Some(bound)) => {
                    if *current == bound {
                        Self::collect_retractions(child, pattern, depth + 1, projection, first_depths, out);
                    }
                }
                // A bound repeat over a wildcarded first occurrence narrows
                // the slot for the whole subtree, so only matching solutions
                // are removed at the leaves below.
                (Some(current), None) => {
                    projection[slot] = Some(current.clone());
                    Self::collect_retractions(child, pattern, depth + 1, projection, first_depths, out);
                    projection[slot] = None;
                }
                // A wildcard repeat matches whatever the slot holds.
                (None, _) => {
                    Self::collect_retractions(child, pattern, depth + 1, projection, first_depths, out);
                }
            }
        }
    }
}
