use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, Weak};

use crate::core::Expirable;
use crate::index::solution_index::SolutionIndex;

/// A partial result: the projected binding of one pattern's variables,
/// derived from one matching input tuple.
///
/// The value array is indexed by the owning pattern's variable-occurrence
/// order (first occurrence per distinct variable name) and never changes
/// after construction; identity is element-wise value equality. The back
/// reference to the owning [`SolutionIndex`] lets an expiring solution remove
/// itself from the store it lives in.
pub struct Solution<V> {
    values: Vec<V>,
    expires_at: i64,
    tombstone: AtomicBool,
    owner: RwLock<Weak<SolutionIndex<V>>>,
}

impl<V> Solution<V> {
    pub fn new(values: Vec<V>, expires_at: i64) -> Self {
        Solution {
            values,
            expires_at,
            tombstone: AtomicBool::new(false),
            owner: RwLock::new(Weak::new()),
        }
    }

    /// Projected values, one per distinct variable of the owning pattern.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Installed by the owning index at insertion time.
    pub(crate) fn set_owner(&self, owner: Weak<SolutionIndex<V>>) {
        *self.owner.write().unwrap() = owner;
    }

    /// Marks the solution dead without touching the owning index. Used when
    /// the index itself already removed it (superseding re-insertion,
    /// value-pattern removal).
    pub(crate) fn mark_tombstone(&self) -> bool {
        !self.tombstone.swap(true, Ordering::SeqCst)
    }
}

impl<V: PartialEq> PartialEq for Solution<V> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl<V: Eq> Eq for Solution<V> {}

impl<V> Expirable for Solution<V>
where
    V: Eq + Hash + Clone + Send + Sync,
{
    fn expiration_time(&self) -> i64 {
        self.expires_at
    }

    /// Tombstones the solution and propagates the removal into the owning
    /// index, so its full set and secondary indices stay free of dead
    /// entries.
    fn expire(&self) {
        if !self.mark_tombstone() {
            return;
        }
        let owner = self.owner.read().unwrap().upgrade();
        if let Some(index) = owner {
            index.remove_solution(self);
        }
    }

    fn is_tombstone(&self) -> bool {
        self.tombstone.load(Ordering::SeqCst)
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Solution<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solution")
            .field("values", &self.values)
            .field("expires_at", &self.expires_at)
            .field("tombstone", &self.tombstone.load(Ordering::Relaxed))
            .finish()
    }
}
