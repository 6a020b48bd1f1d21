use crate::keys::EntityRef;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

/// A sparsely-grown side table keyed by an entity defined elsewhere.
///
/// Unlike `PrimaryMap`, a `SecondaryMap` does not own the entities it is
/// indexed by; it grows on demand and fills newly-visible slots with
/// `V::default()`. Used for attaching derived data (liveness state, block
/// visited-flags, register assignments) to entities owned by a `Function`.
#[derive(Clone)]
pub struct SecondaryMap<K: EntityRef, V: Clone + Default> {
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V: Clone + Default> SecondaryMap<K, V> {
    /// Create a new, empty secondary map.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            default: V::default(),
            unused: PhantomData,
        }
    }

    /// Ensure storage exists up to (but not including) `n` entities.
    pub fn resize(&mut self, n: usize) {
        if n > self.elems.len() {
            self.elems.resize(n, self.default.clone());
        }
    }

    /// Get the value at `k`, or the default if `k` has never been written.
    pub fn get(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }

    /// Clear all stored values back to empty.
    pub fn clear(&mut self) {
        self.elems.clear();
    }

    /// Number of explicitly-stored slots (not the logical entity count).
    pub fn len(&self) -> usize {
        self.elems.len()
    }
}

impl<K: EntityRef, V: Clone + Default> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V: Clone + Default> Index<K> for SecondaryMap<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &V {
        self.get(k)
    }
}

impl<K: EntityRef, V: Clone + Default> IndexMut<K> for SecondaryMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        let idx = k.index();
        if idx >= self.elems.len() {
            self.elems.resize(idx + 1, self.default.clone());
        }
        &mut self.elems[idx]
    }
}
