use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::pattern::{PatternError, Term};

/// One conjunct of a query: a non-empty ordered sequence of terms with at
/// least one variable.
///
/// Matching against tuples is prefix-tolerant: a tuple longer than the
/// pattern matches on its first `arity()` positions, a shorter tuple never
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuplePattern<K, V> {
    terms: Vec<Term<K, V>>,
}

impl<K, V> TuplePattern<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Builds a pattern, rejecting empty or all-constant term sequences.
    pub fn new(terms: Vec<Term<K, V>>) -> Result<Self, PatternError> {
        if terms.is_empty() {
            return Err(PatternError::EmptyTuplePattern);
        }
        if !terms.iter().any(Term::is_variable) {
            return Err(PatternError::NoVariables);
        }
        Ok(TuplePattern { terms })
    }

    pub fn terms(&self) -> &[Term<K, V>] {
        &self.terms
    }

    /// Number of positions a tuple must cover to match.
    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// Maps each distinct variable name to its slot in the projected value
    /// array, assigned in first-occurrence order.
    pub fn variable_positions(&self) -> HashMap<K, usize> {
        let mut positions = HashMap::new();
        for term in &self.terms {
            if let Some(name) = term.variable() {
                let next = positions.len();
                positions.entry(name.clone()).or_insert(next);
            }
        }
        positions
    }

    /// Number of distinct variables, i.e. the width of projected solutions.
    pub fn projection_width(&self) -> usize {
        self.variable_positions().len()
    }

    /// Whether this pattern shares at least one variable name with `other`.
    pub fn shares_variable_with(&self, other: &Self) -> bool {
        let own = self.variable_positions();
        other.terms.iter().any(|term| term.variable().is_some_and(|name| own.contains_key(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Term<String, String> {
        Term::Variable(name.to_string())
    }

    fn con(value: &str) -> Term<String, String> {
        Term::Constant(value.to_string())
    }

    #[test]
    fn rejects_empty_and_constant_only_patterns() {
        assert_eq!(
            TuplePattern::<String, String>::new(vec![]).unwrap_err(),
            PatternError::EmptyTuplePattern
        );
        assert_eq!(
            TuplePattern::new(vec![con("a"), con("b")]).unwrap_err(),
            PatternError::NoVariables
        );
    }

    #[test]
    fn variable_positions_follow_first_occurrence() {
        let pattern =
            TuplePattern::new(vec![var("x"), con("likes"), var("x"), var("g")]).unwrap();
        let positions = pattern.variable_positions();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions["x"], 0);
        assert_eq!(positions["g"], 1);
        assert_eq!(pattern.projection_width(), 2);
    }
}
