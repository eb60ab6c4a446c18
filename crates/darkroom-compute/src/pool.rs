//! Keyed pools for expensive-to-allocate resources.
//!
//! GPU buffers and textures are costly to create and destroy per frame
//! during interactive editing. [`ResourcePool`] retains released resources
//! keyed by their allocation parameters so the next acquisition with the
//! same shape reuses them. [`DoubleBuffered`] pairs two resources for
//! ping-pong compute passes.

use std::collections::HashMap;
use std::hash::Hash;

/// Maximum resources retained per key before releases are dropped.
pub const DEFAULT_MAX_POOL_SIZE: usize = 4;

/// Pool usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Keys with at least one pooled resource.
    pub pool_count: usize,
    /// Total resources currently held across all keys.
    pub total_resources: usize,
    /// Acquisitions served from the pool.
    pub hits: u64,
    /// Acquisitions that found the pool empty.
    pub misses: u64,
}

/// Keyed pool of interchangeable resources.
///
/// Generic over key `K` (allocation parameters) and resource `T` (e.g. a
/// GPU buffer handle). Resources under the same key must be fully
/// interchangeable; the pool hands back an arbitrary one. Each key retains
/// at most [`max_per_key`](Self::max_per_key) resources; releasing into a
/// full pool drops the resource, freeing its backing storage.
pub struct ResourcePool<K, T> {
    entries: HashMap<K, Vec<T>>,
    max_per_key: usize,
    hits: u64,
    misses: u64,
}

impl<K: Copy + Eq + Hash, T> ResourcePool<K, T> {
    /// Pool with the default per-key capacity.
    pub fn new() -> Self {
        Self::with_max_per_key(DEFAULT_MAX_POOL_SIZE)
    }

    /// Pool retaining at most `max_per_key` resources under each key.
    pub fn with_max_per_key(max_per_key: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_per_key,
            hits: 0,
            misses: 0,
        }
    }

    /// Takes a pooled resource for `key`, if one is available.
    pub fn acquire(&mut self, key: K) -> Option<T> {
        match self.entries.get_mut(&key).and_then(Vec::pop) {
            Some(resource) => {
                self.hits += 1;
                Some(resource)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Takes a pooled resource for `key`, or allocates one with `alloc`.
    pub fn acquire_or_else(&mut self, key: K, alloc: impl FnOnce() -> T) -> T {
        match self.acquire(key) {
            Some(resource) => resource,
            None => alloc(),
        }
    }

    /// Returns a resource to the pool under `key`.
    ///
    /// If the key already holds `max_per_key` resources the returned one is
    /// dropped instead of retained.
    pub fn release(&mut self, key: K, resource: T) {
        let slot = self.entries.entry(key).or_default();
        if slot.len() < self.max_per_key {
            slot.push(resource);
        }
    }

    /// Drops every pooled resource.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Current usage counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_count: self.entries.values().filter(|v| !v.is_empty()).count(),
            total_resources: self.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    /// Total resources currently pooled.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// True when nothing is pooled.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Per-key retention bound.
    pub fn max_per_key(&self) -> usize {
        self.max_per_key
    }
}

impl<K: Copy + Eq + Hash, T> Default for ResourcePool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two resources alternating roles across ping-pong compute passes.
///
/// One half is the current read source, the other is the write target for
/// the next pass; [`swap`](Self::swap) exchanges the roles after each pass.
/// The pair is deliberately not poolable: its halves are paired, not
/// fungible. Dropping the pair releases both unconditionally.
#[derive(Debug)]
pub struct DoubleBuffered<T> {
    pair: [T; 2],
    current: usize,
}

impl<T> DoubleBuffered<T> {
    /// Pairs two resources; `a` starts as current.
    pub fn new(a: T, b: T) -> Self {
        Self {
            pair: [a, b],
            current: 0,
        }
    }

    /// The half holding the latest data.
    pub fn current(&self) -> &T {
        &self.pair[self.current]
    }

    /// The half the next pass writes into.
    pub fn next(&self) -> &T {
        &self.pair[1 - self.current]
    }

    /// Mutable access to the current half.
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.pair[self.current]
    }

    /// Mutable access to the next half.
    pub fn next_mut(&mut self) -> &mut T {
        &mut self.pair[1 - self.current]
    }

    /// Promotes the next half to current after a pass completes.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Returns roles to the initial orientation.
    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// Consumes the pair, handing back (current, next).
    pub fn into_inner(self) -> (T, T) {
        let [a, b] = self.pair;
        if self.current == 0 { (a, b) } else { (b, a) }
    }
}
