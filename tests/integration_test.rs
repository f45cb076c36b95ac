//! Integration tests for Argus
//!
//! These tests verify the engine's registration surface: admission errors,
//! the registry cap, channel-based subscription, and construction-time
//! pattern validation end to end.

use argus::engine::{Engine, EngineConfig, EngineError};
use argus::parsing::PatternParser;
use argus::pattern::{GraphPattern, PatternError, Term, TuplePattern};

fn tuple(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn duplicate_query_ids_are_rejected() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();

    engine.register("q", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {}).unwrap();
    let err = engine
        .register("q", parser.parse("?a knows ?b").unwrap(), 0, |_, _| {})
        .unwrap_err();
    assert!(matches!(err, EngineError::QueryAlreadyExists(_)));
    assert_eq!(engine.query_count(), 1);
}

#[test]
fn unregistering_an_unknown_query_fails() {
    let engine: Engine<String, String> = Engine::new();
    let err = engine.unregister("missing").unwrap_err();
    assert!(matches!(err, EngineError::QueryNotFound(_)));
}

#[test]
fn max_queries_cap_is_enforced() {
    let engine: Engine<String, String> = Engine::with_config(EngineConfig {
        max_queries: Some(1),
        ..EngineConfig::default()
    });
    let parser = PatternParser::new().unwrap();

    engine.register("q1", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {}).unwrap();
    let err = engine
        .register("q2", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {})
        .unwrap_err();
    assert!(matches!(err, EngineError::MaxQueriesReached));
}

#[test]
fn channel_registration_delivers_solutions() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();

    let handle = engine.register_channel("q", parser.parse("?x knows ?y").unwrap(), 0).unwrap();
    assert_eq!(handle.query_id, "q");
    assert!(handle.try_receive().is_none());

    assert!(engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
    let solution = handle.try_receive().expect("solution should be waiting");
    assert_eq!(solution.bindings["x"], "Arthur");
    assert_eq!(solution.bindings["y"], "Ford");
    assert_eq!(solution.expires_at, argus::NEVER_EXPIRES);
    assert!(handle.try_receive().is_none());
}

#[test]
fn unregister_stops_delivery() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();

    let handle = engine.register_channel("q", parser.parse("?x knows ?y").unwrap(), 0).unwrap();
    engine.unregister("q").unwrap();

    assert!(!engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
    assert!(handle.try_receive().is_none());
}

#[test]
fn construction_errors_reject_registration_without_mutation() {
    let engine: Engine<String, String> = Engine::new();

    // All-constant single pattern.
    assert_eq!(
        TuplePattern::<String, String>::new(vec![
            Term::Constant("Arthur".to_string()),
            Term::Constant("knows".to_string()),
            Term::Constant("Ford".to_string()),
        ])
        .unwrap_err(),
        PatternError::NoVariables
    );

    // Disconnected conjunction.
    let disconnected = GraphPattern::new(vec![
        TuplePattern::new(vec![
            Term::Variable("x".to_string()),
            Term::Constant("knows".to_string()),
            Term::Variable("y".to_string()),
        ])
        .unwrap(),
        TuplePattern::new(vec![
            Term::Variable("a".to_string()),
            Term::Constant("knows".to_string()),
            Term::Variable("b".to_string()),
        ])
        .unwrap(),
    ]);
    assert_eq!(disconnected.unwrap_err(), PatternError::Disconnected);

    // Nothing was admitted along the way.
    assert_eq!(engine.query_count(), 0);
    assert!(!engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
}

#[test]
fn non_string_value_types_work() {
    // The engine is generic over the variable-name and value types.
    let engine: Engine<u8, u64> = Engine::new();
    let pattern = GraphPattern::new(vec![TuplePattern::new(vec![
        Term::Variable(0u8),
        Term::Constant(42u64),
        Term::Variable(1u8),
    ])
    .unwrap()])
    .unwrap();

    let handle = engine.register_channel("numeric", pattern, 0).unwrap();
    assert!(engine.ingest(&[7, 42, 9], 0));
    let solution = handle.try_receive().unwrap();
    assert_eq!(solution.bindings[&0], 7);
    assert_eq!(solution.bindings[&1], 9);
}
