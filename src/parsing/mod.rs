//! Textual pattern parsing for the CLI and tests.

pub mod pattern_parser;

pub use pattern_parser::{PatternParseError, PatternParser};
