use std::collections::VecDeque;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::pattern::{PatternError, TuplePattern};

/// The full conjunction of tuple patterns making up one query.
///
/// Invariant: the pattern-connectivity graph (vertices are patterns, an edge
/// exists iff two patterns share a variable name) is a single connected
/// component. A disconnected graph is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPattern<K, V> {
    patterns: Vec<TuplePattern<K, V>>,
}

impl<K, V> GraphPattern<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Builds a graph pattern, rejecting empty or disconnected conjunctions.
    pub fn new(patterns: Vec<TuplePattern<K, V>>) -> Result<Self, PatternError> {
        if patterns.is_empty() {
            return Err(PatternError::EmptyGraphPattern);
        }
        if !Self::is_connected(&patterns) {
            return Err(PatternError::Disconnected);
        }
        Ok(GraphPattern { patterns })
    }

    pub fn patterns(&self) -> &[TuplePattern<K, V>] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Breadth-first search over the shared-variable adjacency: every pattern
    /// must be reachable from the first one.
    fn is_connected(patterns: &[TuplePattern<K, V>]) -> bool {
        let mut visited = vec![false; patterns.len()];
        let mut pending = VecDeque::new();
        visited[0] = true;
        pending.push_back(0);

        while let Some(current) = pending.pop_front() {
            for (other, seen) in visited.iter_mut().enumerate() {
                if !*seen && patterns[current].shares_variable_with(&patterns[other]) {
                    *seen = true;
                    pending.push_back(other);
                }
            }
        }

        visited.into_iter().all(|seen| seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Term;

    fn pattern(terms: &[&str]) -> TuplePattern<String, String> {
        TuplePattern::new(
            terms
                .iter()
                .map(|t| match t.strip_prefix('?') {
                    Some(name) => Term::Variable(name.to_string()),
                    None => Term::Constant(t.to_string()),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn accepts_connected_cycle() {
        let result = GraphPattern::new(vec![
            pattern(&["?x", "knows", "?y"]),
            pattern(&["?y", "knows", "?z"]),
            pattern(&["?z", "knows", "?x"]),
        ]);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_disconnected_patterns() {
        let result = GraphPattern::new(vec![
            pattern(&["?x", "knows", "?y"]),
            pattern(&["?a", "knows", "?b"]),
        ]);
        assert_eq!(result.unwrap_err(), PatternError::Disconnected);
    }

    #[test]
    fn rejects_empty_graph_pattern() {
        let result = GraphPattern::<String, String>::new(vec![]);
        assert_eq!(result.unwrap_err(), PatternError::EmptyGraphPattern);
    }

    #[test]
    fn connectivity_may_be_transitive() {
        // x-y and y-z are linked through y even though the first and last
        // patterns share nothing directly.
        let result = GraphPattern::new(vec![
            pattern(&["?x", "p", "?y"]),
            pattern(&["?y", "p", "?z"]),
            pattern(&["?z", "p", "?w"]),
        ]);
        assert!(result.is_ok());
    }
}
