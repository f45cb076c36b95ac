//! The incremental multi-way join engine: per-pattern partial-result stores,
//! join helpers, and the pattern trie routing tuples to them.

pub mod join_helper;
pub mod query_index;
pub mod solution;
pub mod solution_index;

pub use join_helper::JoinHelper;
pub use query_index::QueryIndex;
pub use solution::Solution;
pub use solution_index::{SolutionConsumer, SolutionIndex};
