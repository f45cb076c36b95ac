//! Registered standing queries and the composition root bundling the two
//! expiration managers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use crate::core::expiration::ExpirationManager;
use crate::core::Expirable;
use crate::index::{JoinHelper, QueryIndex, Solution};
use crate::pattern::GraphPattern;

/// Callback invoked once per complete solution, with the full variable
/// bindings and the absolute epoch-millisecond expiration of the result.
pub type SolutionCallback<K, V> = dyn Fn(HashMap<K, V>, i64) + Send + Sync;

struct QueryState<K, V> {
    pattern: Option<GraphPattern<K, V>>,
    callback: Option<Arc<SolutionCallback<K, V>>>,
    /// One helper per tuple pattern, attached in pattern order during
    /// registration.
    helpers: Vec<Arc<JoinHelper<K, V>>>,
    owner: Weak<QueryIndex<K, V>>,
}

/// A registered standing query: a graph pattern, an expiration policy and a
/// result callback.
///
/// Lifecycle: *constructed* → *admitted* (after `QueryIndex::add`, helpers
/// attached) → *active* (receiving notifications) → *expired* or *explicitly
/// removed*. Expiry tombstones the query and drops its pattern, callback and
/// helpers so references are released while the query stays addressable in
/// the expiration heap.
pub struct Query<K, V> {
    expires_at: i64,
    tombstone: AtomicBool,
    state: RwLock<QueryState<K, V>>,
}

impl<K, V> Query<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(
        pattern: GraphPattern<K, V>,
        expires_at: i64,
        callback: Arc<SolutionCallback<K, V>>,
    ) -> Arc<Self> {
        Arc::new(Query {
            expires_at,
            tombstone: AtomicBool::new(false),
            state: RwLock::new(QueryState {
                pattern: Some(pattern),
                callback: Some(callback),
                helpers: Vec::new(),
                owner: Weak::new(),
            }),
        })
    }

    /// The graph pattern, while the query is alive.
    pub fn pattern(&self) -> Option<GraphPattern<K, V>> {
        self.state.read().unwrap().pattern.clone()
    }

    /// All helpers attached to this query, in pattern order.
    pub fn helpers(&self) -> Vec<Arc<JoinHelper<K, V>>> {
        self.state.read().unwrap().helpers.clone()
    }

    /// Installs the helper for the pattern at `pattern_index`. Called by the
    /// query index during admission; rebinding is a programming error.
    pub(crate) fn attach_helper(&self, pattern_index: usize, helper: Arc<JoinHelper<K, V>>) {
        let mut state = self.state.write().unwrap();
        assert_eq!(
            state.helpers.len(),
            pattern_index,
            "join helper already bound for pattern {pattern_index}"
        );
        state.helpers.push(helper);
    }

    /// Records the index the query was admitted into, so expiry can prune
    /// its trie entries.
    pub(crate) fn set_owner(&self, owner: Weak<QueryIndex<K, V>>) {
        self.state.write().unwrap().owner = owner;
    }

    /// Delivers one complete solution through the callback, unless the query
    /// has already been tombstoned.
    pub fn deliver(&self, bindings: HashMap<K, V>, expires_at: i64) {
        let callback = {
            let state = self.state.read().unwrap();
            state.callback.clone()
        };
        if let Some(callback) = callback {
            callback(bindings, expires_at);
        }
    }
}

impl<K, V> Expirable for Query<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn expiration_time(&self) -> i64 {
        self.expires_at
    }

    /// Terminal transition: prunes the query's trie entries, detaches its
    /// helpers and releases pattern and callback references. Idempotent.
    fn expire(&self) {
        if self.tombstone.swap(true, Ordering::SeqCst) {
            return;
        }
        let (pattern, helpers, owner) = {
            let mut state = self.state.write().unwrap();
            (state.pattern.take(), std::mem::take(&mut state.helpers), state.owner.clone())
        };
        // Callback dropped after the trie walk so late in-flight deliveries
        // see the tombstone first.
        if let (Some(pattern), Some(index)) = (pattern, owner.upgrade()) {
            index.remove_registration(&pattern, &helpers);
        }
        self.state.write().unwrap().callback = None;
    }

    fn is_tombstone(&self) -> bool {
        self.tombstone.load(Ordering::SeqCst)
    }
}

/// Composition root bundling the query and partial-result expiration
/// managers and exposing combined eviction.
pub struct QueryContext<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    queries: ExpirationManager<Arc<Query<K, V>>>,
    solutions: ExpirationManager<Arc<Solution<V>>>,
}

impl<K, V> QueryContext<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(max_sweep_interval: Duration) -> Self {
        QueryContext {
            queries: ExpirationManager::with_sweep_interval(max_sweep_interval),
            solutions: ExpirationManager::with_sweep_interval(max_sweep_interval),
        }
    }

    pub fn queries(&self) -> &ExpirationManager<Arc<Query<K, V>>> {
        &self.queries
    }

    pub fn solutions(&self) -> &ExpirationManager<Arc<Solution<V>>> {
        &self.solutions
    }

    /// Evicts expired queries and partial results in one pass. Returns the
    /// combined eviction count.
    pub fn evict_expired(&self, now: i64) -> u64 {
        self.queries.evict_expired(now) + self.solutions.evict_expired(now)
    }

    /// Starts both background sweeper threads.
    pub fn start_background_sweepers(&self) {
        self.queries.start_background_sweeper();
        self.solutions.start_background_sweeper();
    }

    /// Stops both sweepers without draining either heap.
    pub fn stop_background_sweepers(&self) {
        self.queries.stop_background_sweeper();
        self.solutions.stop_background_sweeper();
    }
}
