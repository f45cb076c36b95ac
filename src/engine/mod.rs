//! Top-level engine API: query registration, tuple ingestion, retraction and
//! combined eviction, coordinated over the trie and the two expiration
//! managers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::core::expiration::ExpirationManager;
use crate::core::{expiration_from_ttl, now_millis, Expirable, Index};
use crate::index::QueryIndex;
use crate::pattern::{GraphPattern, PatternError};
use crate::query::{Query, QueryContext, SolutionCallback};

pub type QueryId = String;

/// Errors surfaced by engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// Rejected at pattern construction; nothing was mutated.
    Pattern(PatternError),
    QueryNotFound(QueryId),
    QueryAlreadyExists(QueryId),
    MaxQueriesReached,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Pattern(err) => write!(f, "Pattern error: {}", err),
            EngineError::QueryNotFound(id) => write!(f, "Query not found : {}", id),
            EngineError::QueryAlreadyExists(id) => write!(f, "Query already exists : {}", id),
            EngineError::MaxQueriesReached => {
                write!(f, "Maximum number of registered queries reached")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Pattern(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PatternError> for EngineError {
    fn from(err: PatternError) -> Self {
        EngineError::Pattern(err)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Run the background sweeper threads of both expiration managers.
    pub background_sweep: bool,
    /// Upper bound on how long a sweeper sleeps without re-checking.
    pub max_sweep_interval: Duration,
    /// Maximum number of queries that can be registered.
    pub max_queries: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            background_sweep: false,
            max_sweep_interval: Duration::from_secs(1),
            max_queries: None,
        }
    }
}

/// One complete solution as delivered over a [`QueryHandle`] channel.
#[derive(Debug, Clone, Serialize)]
pub struct CompleteSolution<K, V>
where
    K: Eq + Hash,
{
    pub bindings: HashMap<K, V>,
    /// Absolute epoch-millisecond expiration of the result; `0` means never.
    pub expires_at: i64,
}

/// Handle returned by channel-based registration.
pub struct QueryHandle<K, V>
where
    K: Eq + Hash,
{
    pub query_id: QueryId,
    pub receiver: Receiver<CompleteSolution<K, V>>,
}

impl<K, V> QueryHandle<K, V>
where
    K: Eq + Hash,
{
    /// Blocking receive of the next complete solution.
    pub fn receive(&self) -> Option<CompleteSolution<K, V>> {
        self.receiver.recv().ok()
    }

    /// Non-blocking receive of the next complete solution, if available.
    pub fn try_receive(&self) -> Option<CompleteSolution<K, V>> {
        self.receiver.try_recv().ok()
    }
}

/// The continuous query engine.
///
/// Standing queries are registered before data arrives; each ingested tuple
/// is routed through the pattern trie and every complete solution it makes
/// derivable is emitted synchronously before `ingest` returns. Registration
/// and ingestion opportunistically evict expired queries and partial
/// results, so a caller that never starts the background sweepers still gets
/// bounded memory.
pub struct Engine<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    index: Arc<QueryIndex<K, V>>,
    context: QueryContext<K, V>,
    registered: Mutex<HashMap<QueryId, Arc<Query<K, V>>>>,
    config: EngineConfig,
}

impl<K, V> Engine<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let context = QueryContext::new(config.max_sweep_interval);
        if config.background_sweep {
            context.start_background_sweepers();
        }
        Engine {
            index: QueryIndex::new(),
            context,
            registered: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Registers a standing query under `query_id`.
    ///
    /// The callback is invoked synchronously, once per complete solution,
    /// with the full variable bindings and the absolute expiration of the
    /// triggering partial result. `ttl_seconds` of `0` means the query never
    /// expires.
    pub fn register<F>(
        &self,
        query_id: impl Into<QueryId>,
        pattern: GraphPattern<K, V>,
        ttl_seconds: u64,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(HashMap<K, V>, i64) + Send + Sync + 'static,
    {
        self.register_boxed(query_id.into(), pattern, ttl_seconds, Arc::new(callback))
    }

    fn register_boxed(
        &self,
        query_id: QueryId,
        pattern: GraphPattern<K, V>,
        ttl_seconds: u64,
        callback: Arc<SolutionCallback<K, V>>,
    ) -> Result<()> {
        let now = now_millis();
        self.context.evict_expired(now);

        let query = Query::new(pattern, expiration_from_ttl(ttl_seconds, now), callback);

        {
            let mut registered = self.registered.lock().unwrap();
            // Queries expired by the sweeper or by opportunistic eviction are
            // reaped here, freeing their ids and the admission cap.
            registered.retain(|_, query| !query.is_tombstone());
            if registered.contains_key(&query_id) {
                return Err(EngineError::QueryAlreadyExists(query_id));
            }
            if let Some(max) = self.config.max_queries {
                if registered.len() >= max {
                    return Err(EngineError::MaxQueriesReached);
                }
            }
            registered.insert(query_id, Arc::clone(&query));
        }

        self.index.add(&query);
        self.context.queries().add(query);
        Ok(())
    }

    /// Channel-based registration: complete solutions are delivered over an
    /// unbounded channel instead of a callback.
    pub fn register_channel(
        &self,
        query_id: impl Into<QueryId>,
        pattern: GraphPattern<K, V>,
        ttl_seconds: u64,
    ) -> Result<QueryHandle<K, V>> {
        let query_id = query_id.into();
        let (sender, receiver) = mpsc::channel::<CompleteSolution<K, V>>();
        self.register_boxed(
            query_id.clone(),
            pattern,
            ttl_seconds,
            Arc::new(move |bindings, expires_at| {
                // A dropped handle just discards further results.
                let _ = sender.send(CompleteSolution { bindings, expires_at });
            }),
        )?;
        Ok(QueryHandle { query_id, receiver })
    }

    /// Removes a standing query, pruning its trie entries and detaching its
    /// helpers.
    pub fn unregister(&self, query_id: &str) -> Result<()> {
        let query = {
            let mut registered = self.registered.lock().unwrap();
            registered
                .remove(query_id)
                .ok_or_else(|| EngineError::QueryNotFound(query_id.to_string()))?
        };
        // Tombstones the heap entry in place and walks the trie.
        self.context.queries().remove(&query);
        Ok(())
    }

    /// Ingests one tuple with the given TTL (`0` = never expires). Returns
    /// whether any registered pattern matched.
    pub fn ingest(&self, tuple: &[V], ttl_seconds: u64) -> bool {
        let now = now_millis();
        if self.context.evict_expired(now) > 0 {
            self.registered.lock().unwrap().retain(|_, query| !query.is_tombstone());
        }
        self.index.add_tuple(tuple, expiration_from_ttl(ttl_seconds, now), self.context.solutions())
    }

    /// Ingests with an explicit absolute expiration, for callers that manage
    /// their own clock.
    pub fn ingest_at(&self, tuple: &[V], expires_at: i64) -> bool {
        self.index.add_tuple(tuple, expires_at, self.context.solutions())
    }

    /// Retracts previously ingested tuples by value pattern, `None` acting
    /// as a wildcard. Returns whether anything was removed.
    pub fn retract(&self, pattern: &[Option<V>]) -> bool {
        self.index.remove_tuples(pattern) > 0
    }

    /// Evicts everything expired at `now`, queries and partial results
    /// alike. Returns the combined eviction count.
    pub fn evict_expired(&self, now: i64) -> u64 {
        let evicted = self.context.evict_expired(now);
        // Expired queries stay in the registry map until reaped here.
        if evicted > 0 {
            self.registered.lock().unwrap().retain(|_, query| !query.is_tombstone());
        }
        evicted
    }

    /// Number of currently registered, live queries.
    pub fn query_count(&self) -> usize {
        let registered = self.registered.lock().unwrap();
        registered.values().filter(|query| !query.is_tombstone()).count()
    }

    /// The query registered under `query_id`, if any.
    pub fn query(&self, query_id: &str) -> Option<Arc<Query<K, V>>> {
        self.registered.lock().unwrap().get(query_id).cloned()
    }

    /// Access to the partial-result expiration manager, mainly for tests and
    /// memory reporting.
    pub fn solutions(&self) -> &ExpirationManager<Arc<crate::index::Solution<V>>> {
        self.context.solutions()
    }
}

impl<K, V> Default for Engine<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Engine::new()
    }
}

impl<K, V> Drop for Engine<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.context.stop_background_sweepers();
    }
}
