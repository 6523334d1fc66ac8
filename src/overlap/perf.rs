// Iteration order of these aliases is **not** relied upon for determinism; all
// link lists are built in discovery order and kept in `Vec`s.

#[cfg(feature = "fast-hash")]
pub type FastSet<T> = hashbrown::HashSet<T, ahash::RandomState>;

#[cfg(not(feature = "fast-hash"))]
pub type FastSet<T> = hashbrown::HashSet<T>;

#[cfg(feature = "fast-hash")]
pub type FastMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

#[cfg(not(feature = "fast-hash"))]
pub type FastMap<K, V> = hashbrown::HashMap<K, V>;

/// Empty map with room for `n` entries, whichever hasher is configured.
pub fn map_with_capacity<K, V>(n: usize) -> FastMap<K, V> {
    FastMap::with_capacity_and_hasher(n, Default::default())
}

/// Empty set with room for `n` entries.
pub fn set_with_capacity<T>(n: usize) -> FastSet<T> {
    FastSet::with_capacity_and_hasher(n, Default::default())
}
