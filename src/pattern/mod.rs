//! The static shape of a query: terms, tuple patterns and graph patterns.

pub mod graph_pattern;
pub mod term;
pub mod tuple_pattern;

pub use graph_pattern::GraphPattern;
pub use term::Term;
pub use tuple_pattern::TuplePattern;

/// Errors rejected synchronously at pattern construction. Nothing is mutated
/// when one of these is returned, so there is no rollback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// A graph pattern with zero tuple patterns.
    EmptyGraphPattern,
    /// A tuple pattern with zero positions.
    EmptyTuplePattern,
    /// A tuple pattern without a single variable cannot be indexed.
    NoVariables,
    /// The pattern-connectivity graph is not a single connected component;
    /// unconnected patterns only interact through an unbounded Cartesian
    /// product, which this engine cannot bound.
    Disconnected,
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::EmptyGraphPattern => write!(f, "Graph pattern has no tuple patterns"),
            PatternError::EmptyTuplePattern => write!(f, "Tuple pattern has no positions"),
            PatternError::NoVariables => {
                write!(f, "Tuple pattern has no variables and cannot be indexed")
            }
            PatternError::Disconnected => {
                write!(f, "Graph pattern is not variable-connected")
            }
        }
    }
}

impl std::error::Error for PatternError {}
