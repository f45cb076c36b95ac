//! # Argus
//!
//! Argus is a continuous query engine: clients register standing conjunctive
//! tuple-pattern queries *before* data arrives, and the engine incrementally
//! evaluates them as unbounded tuples stream in, emitting complete variable
//! bindings as soon as they become derivable.
//!
//! The name is inspired by Argus Panoptes, the all-seeing watchman of Greek
//! myth whose hundred eyes never all sleep at once — a fitting guardian for
//! an engine that keeps every registered query watching the stream
//! simultaneously.
//!
//! ## Features
//!
//! - Incremental multi-way symmetric hash joins over streaming tuples
//! - Trie-based pattern index with structural sharing across queries
//! - Per-tuple and per-query TTLs with lazy, heap-based expiration
//!
//! ## Example
//!
//! ```rust
//! use argus::engine::Engine;
//! use argus::parsing::PatternParser;
//!
//! let engine: Engine<String, String> = Engine::new();
//! let parser = PatternParser::new().unwrap();
//! let pattern = parser.parse("?x <knows> ?y").unwrap();
//!
//! engine
//!     .register("friends", pattern, 0, |bindings, _expires_at| {
//!         println!("complete solution: {:?}", bindings);
//!     })
//!     .unwrap();
//!
//! let matched = engine.ingest(
//!     &["Arthur".to_string(), "knows".to_string(), "Ford".to_string()],
//!     0,
//! );
//! assert!(matched);
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::new_without_default)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

/// Shared capabilities: expiration, the generic index contract, the clock
pub mod core;

/// Pattern model: terms, tuple patterns, graph patterns
pub mod pattern;

/// Partial-result stores, join helpers and the pattern trie
pub mod index;

/// Standing queries and the expiration composition root
pub mod query;

/// The top-level engine API
pub mod engine;

/// Textual pattern parsing for the CLI and tests
pub mod parsing;

// Re-export commonly used types
pub use crate::core::{Expirable, Index, NEVER_EXPIRES};
pub use engine::{
    CompleteSolution, Engine, EngineConfig, EngineError, QueryHandle, QueryId, Result,
};
pub use pattern::{GraphPattern, PatternError, Term, TuplePattern};
