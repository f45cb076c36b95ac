use regex::Regex;

use crate::pattern::{GraphPattern, PatternError, Term, TuplePattern};

/// Errors produced while parsing textual graph patterns.
#[derive(Debug)]
pub enum PatternParseError {
    /// The input contained no pattern at all.
    Empty,
    /// A token did not match the term syntax.
    InvalidTerm(String),
    /// The parsed pattern failed structural validation.
    Invalid(PatternError),
}

impl std::fmt::Display for PatternParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternParseError::Empty => write!(f, "Empty graph pattern"),
            PatternParseError::InvalidTerm(token) => write!(f, "Invalid term: {}", token),
            PatternParseError::Invalid(err) => write!(f, "Invalid pattern: {}", err),
        }
    }
}

impl std::error::Error for PatternParseError {}

impl From<PatternError> for PatternParseError {
    fn from(err: PatternError) -> Self {
        PatternParseError::Invalid(err)
    }
}

/// Parser for the textual pattern syntax used by the CLI and tests.
///
/// A graph pattern is a `;`-separated list of tuple patterns; a tuple
/// pattern is a whitespace-separated list of terms. `?name` is a variable,
/// `<value>` or a bare token is a constant:
///
/// ```text
/// ?x <knows> ?y ; ?y <knows> ?z ; ?z <knows> ?x
/// ```
pub struct PatternParser {
    variable_regex: Regex,
    constant_regex: Regex,
}

impl PatternParser {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(PatternParser {
            variable_regex: Regex::new(r"^\?([A-Za-z_][A-Za-z0-9_]*)$")?,
            constant_regex: Regex::new(r"^<([^<>\s]+)>$")?,
        })
    }

    /// Parses a full graph pattern.
    pub fn parse(&self, input: &str) -> Result<GraphPattern<String, String>, PatternParseError> {
        let mut patterns = Vec::new();
        for chunk in input.split(';') {
            if chunk.trim().is_empty() {
                continue;
            }
            patterns.push(self.parse_tuple_pattern(chunk)?);
        }
        if patterns.is_empty() {
            return Err(PatternParseError::Empty);
        }
        Ok(GraphPattern::new(patterns)?)
    }

    /// Parses a single tuple pattern.
    pub fn parse_tuple_pattern(
        &self,
        input: &str,
    ) -> Result<TuplePattern<String, String>, PatternParseError> {
        let terms: Vec<Term<String, String>> = input
            .split_whitespace()
            .map(|token| self.parse_term(token))
            .collect::<Result<_, _>>()?;
        Ok(TuplePattern::new(terms)?)
    }

    fn parse_term(&self, token: &str) -> Result<Term<String, String>, PatternParseError> {
        if let Some(captures) = self.variable_regex.captures(token) {
            return Ok(Term::Variable(captures[1].to_string()));
        }
        if let Some(captures) = self.constant_regex.captures(token) {
            return Ok(Term::Constant(captures[1].to_string()));
        }
        if token.starts_with('?') || token.contains('<') || token.contains('>') {
            return Err(PatternParseError::InvalidTerm(token.to_string()));
        }
        Ok(Term::Constant(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variables_and_constants() {
        let parser = PatternParser::new().unwrap();
        let pattern = parser.parse("?x <knows> ?y").unwrap();
        assert_eq!(pattern.len(), 1);
        let terms = pattern.patterns()[0].terms();
        assert_eq!(terms[0], Term::Variable("x".to_string()));
        assert_eq!(terms[1], Term::Constant("knows".to_string()));
        assert_eq!(terms[2], Term::Variable("y".to_string()));
    }

    #[test]
    fn parses_multi_pattern_conjunctions() {
        let parser = PatternParser::new().unwrap();
        let pattern = parser.parse("?x knows ?y ; ?y knows ?z").unwrap();
        assert_eq!(pattern.len(), 2);
    }

    #[test]
    fn rejects_malformed_terms() {
        let parser = PatternParser::new().unwrap();
        assert!(matches!(
            parser.parse("?x <kno ws> ?y"),
            Err(PatternParseError::InvalidTerm(_))
        ));
        assert!(matches!(parser.parse("? knows ?y"), Err(PatternParseError::InvalidTerm(_))));
    }

    #[test]
    fn rejects_disconnected_input() {
        let parser = PatternParser::new().unwrap();
        assert!(matches!(
            parser.parse("?x knows ?y ; ?a knows ?b"),
            Err(PatternParseError::Invalid(PatternError::Disconnected))
        ));
    }
}
