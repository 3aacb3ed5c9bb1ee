//! Single-slot memoization keyed on an explicit input tuple.
//!
//! Every derived view declares its inputs as the key; the cached value is
//! reused while the key compares equal and recomputed otherwise.

#[derive(Debug)]
pub struct Memo<K, V> {
    slot: Option<(K, V)>,
    computations: u64,
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            slot: None,
            computations: 0,
        }
    }

    /// Return the cached value for `key`, computing it if the key changed.
    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> &V {
        let stale = self.slot.as_ref().map_or(true, |(cached, _)| *cached != key);
        if stale {
            self.computations += 1;
            self.slot = None;
        }
        &self.slot.get_or_insert_with(|| (key, compute())).1
    }

    /// The cached value, if it was computed for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        match &self.slot {
            Some((cached, value)) if cached == key => Some(value),
            _ => None,
        }
    }

    /// Number of times the value has been (re)computed.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

impl<K: PartialEq, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
