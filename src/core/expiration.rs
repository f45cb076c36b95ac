//! Lazy min-heap eviction for one flavor of expirable item.
//!
//! `remove` never searches the heap: the item is marked a tombstone in place
//! (O(1)) and physically discarded the next time it surfaces at the heap
//! minimum. An optional background sweeper sleeps until the next known
//! expiration, or until it is notified that a sooner-expiring item arrived.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::core::{now_millis, Expirable, Index, NEVER_EXPIRES};

/// One heap slot: the expiration is snapshotted at insertion so heap order
/// stays stable even after the item turns into a tombstone.
struct HeapEntry<T> {
    expires_at: i64,
    item: T,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expires_at.cmp(&other.expires_at)
    }
}

struct Shared<T> {
    heap: Mutex<BinaryHeap<Reverse<HeapEntry<T>>>>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

/// Lazy tombstoned eviction engine, generic over any [`Expirable`] type.
pub struct ExpirationManager<T: Expirable> {
    shared: Arc<Shared<T>>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    /// Upper bound on how long the sweeper sleeps without re-checking.
    max_sweep_interval: Duration,
}

impl<T> ExpirationManager<T>
where
    T: Expirable + 'static,
{
    pub fn new() -> Self {
        Self::with_sweep_interval(Duration::from_secs(1))
    }

    pub fn with_sweep_interval(max_sweep_interval: Duration) -> Self {
        ExpirationManager {
            shared: Arc::new(Shared {
                heap: Mutex::new(BinaryHeap::new()),
                wakeup: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            sweeper_handle: Mutex::new(None),
            max_sweep_interval,
        }
    }

    /// Evicts every item whose expiration is at or before `now`.
    ///
    /// The heap minimum is inspected, not just popped: a tombstone is
    /// discarded without counting, a live item later than `now` stops the
    /// scan immediately (heap order guarantees every remaining item is later
    /// still), and a live expired item is popped, transitioned via
    /// [`Expirable::expire`], and counted.
    pub fn evict_expired(&self, now: i64) -> u64 {
        let mut evicted = 0u64;
        loop {
            // Pop decision under the lock, expire() outside it: the expire
            // transition may call back into other locks (index removal).
            let entry = {
                let mut heap = self.shared.heap.lock().unwrap();
                match heap.peek() {
                    None => break,
                    Some(Reverse(top)) => {
                        if top.item.is_tombstone() {
                            heap.pop();
                            continue;
                        }
                        if top.expires_at > now {
                            break;
                        }
                        let Some(Reverse(entry)) = heap.pop() else { break };
                        entry
                    }
                }
            };
            entry.item.expire();
            evicted += 1;
        }
        evicted
    }

    /// Spawns the background sweep thread. Idempotent.
    pub fn start_background_sweeper(&self) {
        let mut handle_slot = self.sweeper_handle.lock().unwrap();
        if handle_slot.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let max_interval = self.max_sweep_interval;

        let handle = std::thread::spawn(move || {
            let mut heap = shared.heap.lock().unwrap();
            while !shared.shutdown.load(AtomicOrdering::Relaxed) {
                let now = now_millis();
                let wait = match heap.peek() {
                    Some(Reverse(entry)) if entry.expires_at <= now => Duration::ZERO,
                    Some(Reverse(entry)) => {
                        Duration::from_millis((entry.expires_at - now) as u64).min(max_interval)
                    }
                    None => max_interval,
                };

                if !wait.is_zero() {
                    let (guard, _timeout) = shared.wakeup.wait_timeout(heap, wait).unwrap();
                    heap = guard;
                    if shared.shutdown.load(AtomicOrdering::Relaxed) {
                        break;
                    }
                }

                // Inline eviction scan while already holding the heap lock;
                // expired items are expired outside of it.
                let now = now_millis();
                let mut due = Vec::new();
                while let Some(Reverse(top)) = heap.peek() {
                    if top.item.is_tombstone() {
                        heap.pop();
                        continue;
                    }
                    if top.expires_at > now {
                        break;
                    }
                    if let Some(Reverse(entry)) = heap.pop() {
                        due.push(entry.item);
                    }
                }
                drop(heap);
                for item in due {
                    item.expire();
                }
                heap = shared.heap.lock().unwrap();
            }
        });

        *handle_slot = Some(handle);
    }

    /// Stops the background sweeper without draining the heap; pending work
    /// is deferred to the next explicit [`evict_expired`](Self::evict_expired)
    /// call.
    pub fn stop_background_sweeper(&self) {
        self.shared.shutdown.store(true, AtomicOrdering::Relaxed);
        self.shared.wakeup.notify_all();
        let handle = self.sweeper_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                eprintln!("expiration sweeper thread panicked during shutdown");
            }
        }
        self.shared.shutdown.store(false, AtomicOrdering::Relaxed);
    }

    /// Number of heap slots, live and tombstoned alike. Mainly for tests and
    /// memory reporting.
    pub fn heap_len(&self) -> usize {
        self.shared.heap.lock().unwrap().len()
    }
}

impl<T> Index<T> for ExpirationManager<T>
where
    T: Expirable + 'static,
{
    /// Heap insertion. Items carrying the never-expire sentinel are ignored.
    fn add(&self, item: T) -> bool {
        let expires_at = item.expiration_time();
        if expires_at == NEVER_EXPIRES {
            return false;
        }
        {
            let mut heap = self.shared.heap.lock().unwrap();
            heap.push(Reverse(HeapEntry { expires_at, item }));
        }
        // A sooner-expiring item may have shortened the sweeper's deadline.
        self.shared.wakeup.notify_all();
        true
    }

    /// Marks the item a tombstone in place; physical disposal is deferred to
    /// the next heap scan that reaches it.
    fn remove(&self, item: &T) -> bool {
        if item.is_tombstone() {
            return false;
        }
        item.expire();
        true
    }

    fn clear(&self) {
        self.shared.heap.lock().unwrap().clear();
    }

    fn is_empty(&self) -> bool {
        let heap = self.shared.heap.lock().unwrap();
        !heap.iter().any(|Reverse(entry)| !entry.item.is_tombstone())
    }
}

impl<T> Drop for ExpirationManager<T>
where
    T: Expirable,
{
    fn drop(&mut self) {
        self.shared.shutdown.store(true, AtomicOrdering::Relaxed);
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.sweeper_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct TestItem {
        expires_at: i64,
        dead: AtomicBool,
    }

    impl TestItem {
        fn new(expires_at: i64) -> Arc<Self> {
            Arc::new(TestItem { expires_at, dead: AtomicBool::new(false) })
        }
    }

    impl Expirable for TestItem {
        fn expiration_time(&self) -> i64 {
            self.expires_at
        }

        fn expire(&self) {
            self.dead.store(true, AtomicOrdering::SeqCst);
        }

        fn is_tombstone(&self) -> bool {
            self.dead.load(AtomicOrdering::SeqCst)
        }
    }

    #[test]
    fn sentinel_items_are_never_added() {
        let manager: ExpirationManager<Arc<TestItem>> = ExpirationManager::new();
        assert!(!manager.add(TestItem::new(NEVER_EXPIRES)));
        assert!(manager.is_empty());
    }

    #[test]
    fn eviction_stops_at_first_live_future_item() {
        let manager: ExpirationManager<Arc<TestItem>> = ExpirationManager::new();
        let early = TestItem::new(100);
        let late = TestItem::new(200);
        manager.add(Arc::clone(&early));
        manager.add(Arc::clone(&late));

        assert_eq!(manager.evict_expired(150), 1);
        assert!(early.is_tombstone());
        assert!(!late.is_tombstone());
        assert_eq!(manager.heap_len(), 1);
    }

    #[test]
    fn tombstones_are_discarded_without_counting() {
        let manager: ExpirationManager<Arc<TestItem>> = ExpirationManager::new();
        let item = TestItem::new(100);
        manager.add(Arc::clone(&item));
        assert!(manager.remove(&item));
        assert!(manager.is_empty());

        assert_eq!(manager.evict_expired(500), 0);
        assert_eq!(manager.heap_len(), 0);
    }
}
