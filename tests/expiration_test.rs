//! Eviction correctness: finite-TTL tuples and queries disappear once the
//! clock passes their expiration, never-expiring items survive any clock
//! advance, and the lazy heap ends up physically empty.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus::core::now_millis;
use argus::engine::{Engine, EngineConfig};
use argus::parsing::PatternParser;
use argus::Index;

fn tuple(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn expired_partial_results_are_removed_everywhere() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();
    engine.register("knows", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {}).unwrap();

    let now = now_millis();
    engine.ingest_at(&tuple(&["Arthur", "knows", "Ford"]), now + 1_000);
    engine.ingest_at(&tuple(&["Ford", "knows", "Zaphod"]), now + 2_000);

    let helper = &engine.query("knows").unwrap().helpers()[0];
    assert_eq!(helper.index().len(), 2);
    assert_eq!(engine.solutions().heap_len(), 2);

    // Advancing past the maximum TTL clears the store and the heap.
    assert_eq!(engine.evict_expired(now + 5_000), 2);
    assert_eq!(helper.index().len(), 0);
    assert_eq!(engine.solutions().heap_len(), 0);
}

#[test]
fn never_expiring_items_are_untouched_by_eviction() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();
    engine.register("knows", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {}).unwrap();

    engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0);

    // The sentinel never reaches the heap at all.
    assert_eq!(engine.solutions().heap_len(), 0);

    assert_eq!(engine.evict_expired(i64::MAX), 0);
    let helper = &engine.query("knows").unwrap().helpers()[0];
    assert_eq!(helper.index().len(), 1);
}

#[test]
fn expired_query_stops_matching_and_prunes_the_trie() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();

    let received = Arc::new(Mutex::new(Vec::<HashMap<String, String>>::new()));
    let sink = Arc::clone(&received);
    engine
        .register("short-lived", parser.parse("?x knows ?y").unwrap(), 1, move |bindings, _| {
            sink.lock().unwrap().push(bindings);
        })
        .unwrap();
    assert_eq!(engine.query_count(), 1);

    assert!(engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
    assert_eq!(received.lock().unwrap().len(), 1);

    // Evict well past the query's one-second TTL: the trie entry is pruned,
    // so the same tuple no longer matches anything.
    assert_eq!(engine.evict_expired(now_millis() + 10_000), 1);
    assert_eq!(engine.query_count(), 0);
    assert!(!engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[test]
fn mixed_ttls_evict_only_the_expired_partials() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();

    let received = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&received);
    engine
        .register("chain", parser.parse("?x p ?y ; ?y q ?z").unwrap(), 0, move |_, _| {
            *sink.lock().unwrap() += 1;
        })
        .unwrap();

    let now = now_millis();
    engine.ingest_at(&tuple(&["a", "p", "b"]), now + 1_000);
    engine.ingest_at(&tuple(&["c", "p", "d"]), 0);
    engine.evict_expired(now + 5_000);

    // The finite-TTL edge is gone: joining against it yields nothing.
    assert!(engine.ingest(&tuple(&["b", "q", "x"]), 0));
    assert_eq!(*received.lock().unwrap(), 0);

    // The never-expiring edge still joins.
    assert!(engine.ingest(&tuple(&["d", "q", "x"]), 0));
    assert_eq!(*received.lock().unwrap(), 1);
}

#[test]
fn unregister_tombstones_the_heap_entry_in_place() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();
    engine.register("q", parser.parse("?x knows ?y").unwrap(), 3600, |_, _| {}).unwrap();

    engine.unregister("q").unwrap();
    // The heap slot survives as a tombstone until eviction reaches it.
    assert!(engine.query("q").is_none());
    assert!(!engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));

    // Tombstones are discarded without being counted.
    assert_eq!(engine.evict_expired(now_millis() + 7_200_000), 0);
}

#[test]
fn expired_query_id_is_free_for_reregistration() {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();
    engine.register("q", parser.parse("?x knows ?y").unwrap(), 1, |_, _| {}).unwrap();

    std::thread::sleep(Duration::from_millis(1_200));

    // Opportunistic eviction during ingestion reaps the dead registry entry.
    assert!(!engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
    assert_eq!(engine.query_count(), 0);

    // The id is free again, and the new registration is live.
    engine.register("q", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {}).unwrap();
    assert_eq!(engine.query_count(), 1);
    assert!(engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 0));
}

#[test]
fn background_sweeper_evicts_on_its_own() {
    let engine: Engine<String, String> = Engine::with_config(EngineConfig {
        background_sweep: true,
        max_sweep_interval: Duration::from_millis(50),
        max_queries: None,
    });
    let parser = PatternParser::new().unwrap();
    engine.register("knows", parser.parse("?x knows ?y").unwrap(), 0, |_, _| {}).unwrap();

    engine.ingest(&tuple(&["Arthur", "knows", "Ford"]), 1);
    let helper = &engine.query("knows").unwrap().helpers()[0];
    assert_eq!(helper.index().len(), 1);

    std::thread::sleep(Duration::from_millis(2_000));
    assert_eq!(helper.index().len(), 0);
    assert!(engine.solutions().is_empty());
}
