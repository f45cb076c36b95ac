use serde::{Deserialize, Serialize};

/// One position of a tuple pattern: either a named variable or a constant
/// value that an incoming tuple must match exactly. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term<K, V> {
    /// A variable to be bound by matching tuples.
    Variable(K),
    /// A constant the tuple value at this position must equal.
    Constant(V),
}

impl<K, V> Term<K, V> {
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    /// The variable name, if this term is a variable.
    pub fn variable(&self) -> Option<&K> {
        match self {
            Term::Variable(name) => Some(name),
            Term::Constant(_) => None,
        }
    }

    /// The constant value, if this term is a constant.
    pub fn constant(&self) -> Option<&V> {
        match self {
            Term::Variable(_) => None,
            Term::Constant(value) => Some(value),
        }
    }
}
