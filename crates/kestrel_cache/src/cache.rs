//! Memoization of derived values keyed to the content of watched data.
//!
//! A [`Cache`] records the composite fingerprint of the data it was
//! populated from. Every access recomputes that fingerprint (cheap when
//! nothing is dirty) and drops all entries the moment it changes. The cache
//! never holds on to the data itself: the watched object is passed in on
//! each call, so the owner of both decides how long each lives.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;

use kestrel_common::{Combiner, Element, Fingerprint, HashStrategy};

use crate::error::CacheError;
use crate::store::DataStore;
use crate::tracked::TrackedArray;

/// Something whose content version a [`Cache`] can track.
pub trait Watched {
    /// Returns an id that changes whenever the watched content changes.
    fn cache_id(&self) -> Fingerprint;
}

impl Watched for DataStore {
    fn cache_id(&self) -> Fingerprint {
        self.composite_fingerprint()
    }
}

impl<T: Element> Watched for TrackedArray<T> {
    fn cache_id(&self) -> Fingerprint {
        self.fingerprint()
    }
}

impl<W: Watched + ?Sized> Watched for &W {
    fn cache_id(&self) -> Fingerprint {
        (**self).cache_id()
    }
}

/// A set of watched objects, combined by position.
impl<W: Watched> Watched for [W] {
    fn cache_id(&self) -> Fingerprint {
        let mut combiner = Combiner::new(HashStrategy::Fast);
        for (i, part) in self.iter().enumerate() {
            combiner.mix(&i.to_string(), part.cache_id());
        }
        combiner.finish()
    }
}

/// Whether a cache has been tied to a content version yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No id recorded; the cache has never been used.
    Empty,
    /// Entries (if any) were computed from content with this id.
    Valid(Fingerprint),
}

/// Key-value store of derived results, invalidated on content change.
///
/// Values of any `'static` type can be stored; typed reads that ask for the
/// wrong type fail with [`CacheError::TypeMismatch`].
#[derive(Default)]
pub struct Cache {
    /// Id of the watched content when entries were last validated.
    last_id: Option<Fingerprint>,

    /// Memoized values keyed by name.
    entries: HashMap<String, Box<dyn Any>>,
}

impl Cache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn state(&self) -> CacheState {
        match self.last_id {
            None => CacheState::Empty,
            Some(id) => CacheState::Valid(id),
        }
    }

    /// Returns the id recorded at the last validation.
    pub fn last_id(&self) -> Option<Fingerprint> {
        self.last_id
    }

    /// Brings the cache up to date with `watched`, dropping every entry if
    /// its id moved. Returns the current id.
    pub fn verify<W: Watched + ?Sized>(&mut self, watched: &W) -> Fingerprint {
        let id = watched.cache_id();
        if self.last_id != Some(id) {
            if !self.entries.is_empty() {
                tracing::debug!(
                    old = ?self.last_id,
                    new = ?id,
                    dropped = self.entries.len(),
                    "watched data changed, clearing cache"
                );
            }
            self.entries.clear();
            self.last_id = Some(id);
        }
        id
    }

    fn typed<V: Any>(&self, key: &str) -> Result<&V, CacheError> {
        let entry = self.entries.get(key).ok_or_else(|| CacheError::KeyNotFound {
            key: key.to_string(),
        })?;
        entry
            .downcast_ref::<V>()
            .ok_or_else(|| CacheError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<V>(),
            })
    }

    /// Returns the value stored under `key`, computing and storing it with
    /// `compute` on a miss.
    ///
    /// `compute` runs at most once per key for each content id.
    pub fn get_or_compute<V, W, F>(
        &mut self,
        watched: &W,
        key: &str,
        compute: F,
    ) -> Result<&V, CacheError>
    where
        V: Any,
        W: Watched + ?Sized,
        F: FnOnce() -> V,
    {
        self.verify(watched);
        if self.entries.contains_key(key) {
            tracing::trace!(key, "cache hit");
        } else {
            tracing::trace!(key, "cache miss");
            let value = compute();
            self.entries.insert(key.to_string(), Box::new(value));
        }
        self.typed(key)
    }

    /// Returns the value stored under `key` without computing anything.
    ///
    /// Fails with [`CacheError::KeyNotFound`] if the key is absent, including
    /// when it was just dropped because the watched data changed.
    pub fn get<V: Any, W: Watched + ?Sized>(
        &mut self,
        watched: &W,
        key: &str,
    ) -> Result<&V, CacheError> {
        self.verify(watched);
        self.typed(key)
    }

    /// Stores a value that is already known, for example one produced as a
    /// side effect of a bulk operation.
    pub fn set<V: Any, W: Watched + ?Sized>(
        &mut self,
        watched: &W,
        key: impl Into<String>,
        value: V,
    ) {
        self.verify(watched);
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Returns `true` if `key` holds a value that is valid for `watched`.
    pub fn contains<W: Watched + ?Sized>(&mut self, watched: &W, key: &str) -> bool {
        self.verify(watched);
        self.entries.contains_key(key)
    }

    /// Removes one entry, returning whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry regardless of id.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Runs a mutation of `watched` that is known to leave the entries named
    /// in `retain` valid, and drops everything else.
    ///
    /// The cache is verified before the mutation, so entries that were
    /// already stale are dropped as usual; afterwards the retained entries
    /// are re-tied to the new id. An inaccurate `retain` list is a bug in
    /// the caller and cannot be detected here.
    pub fn declare_mutation<W, R>(
        &mut self,
        watched: &mut W,
        retain: &[&str],
        mutate: impl FnOnce(&mut W) -> R,
    ) -> R
    where
        W: Watched + ?Sized,
    {
        self.verify(&*watched);
        let result = mutate(&mut *watched);

        let keep: HashSet<&str> = retain.iter().copied().collect();
        let before = self.entries.len();
        self.entries.retain(|key, _| keep.contains(key.as_str()));
        self.last_id = Some(watched.cache_id());
        tracing::debug!(
            retained = self.entries.len(),
            dropped = before - self.entries.len(),
            "declared mutation applied"
        );
        result
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates stored keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Cache")
            .field("last_id", &self.last_id)
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn make_store() -> DataStore {
        let mut d = DataStore::new();
        d.set(
            "vertices",
            TrackedArray::from_rows(&[[0.0f64, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
        )
        .unwrap();
        d.set("faces", TrackedArray::from_rows(&[[0i64, 1, 2]])).unwrap();
        d
    }

    #[test]
    fn fresh_cache_is_empty_state() {
        let cache = Cache::new();
        assert_eq!(cache.state(), CacheState::Empty);
        assert!(cache.is_empty());
    }

    #[test]
    fn first_access_records_id() {
        let d = make_store();
        let mut cache = Cache::new();
        cache.get_or_compute(&d, "n", || 1u32).unwrap();
        assert_eq!(cache.state(), CacheState::Valid(d.composite_fingerprint()));
    }

    #[test]
    fn compute_runs_once_per_epoch() {
        let mut d = make_store();
        let mut cache = Cache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            42usize
        };

        assert_eq!(*cache.get_or_compute(&d, "answer", compute).unwrap(), 42);
        assert_eq!(*cache.get_or_compute(&d, "answer", compute).unwrap(), 42);
        assert_eq!(calls.get(), 1);

        d.modify::<f64, _>("vertices", |v| *v += 1.0).unwrap();
        cache.get_or_compute(&d, "answer", compute).unwrap();
        assert_eq!(calls.get(), 2);
        cache.get_or_compute(&d, "answer", compute).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn unchanged_content_keeps_entries() {
        let mut d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "area", 0.5f64);
        // Writes that leave every value as it was.
        d.modify::<i64, _>("faces", |f| *f += 0).unwrap();
        assert_eq!(*cache.get::<f64, _>(&d, "area").unwrap(), 0.5);
    }

    #[test]
    fn change_clears_all_entries() {
        let mut d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "a", 1u8);
        cache.set(&d, "b", 2u8);
        d.modify::<i64, _>("faces", |f| f.set(&[0, 0], 2).unwrap()).unwrap();
        assert!(!cache.contains(&d, "a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn get_missing_key() {
        let d = make_store();
        let mut cache = Cache::new();
        let err = cache.get::<u8, _>(&d, "nope").unwrap_err();
        assert!(matches!(err, CacheError::KeyNotFound { .. }));
    }

    #[test]
    fn get_wrong_type() {
        let d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "edges", vec![[0usize, 1]]);
        let err = cache.get::<String, _>(&d, "edges").unwrap_err();
        assert!(matches!(err, CacheError::TypeMismatch { .. }));
    }

    #[test]
    fn declared_mutation_retains_listed_keys() {
        let mut d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "topology", vec![[0usize, 1], [1, 2], [2, 0]]);
        cache.set(&d, "bounds", [0.0f64, 1.0]);

        cache.declare_mutation(&mut d, &["topology"], |d| {
            d.modify::<f64, _>("vertices", |v| *v += &[5.0, 0.0, 0.0][..])
                .unwrap();
        });

        assert_eq!(
            cache.get::<Vec<[usize; 2]>, _>(&d, "topology").unwrap(),
            &vec![[0, 1], [1, 2], [2, 0]]
        );
        assert!(!cache.contains(&d, "bounds"));
        assert_eq!(cache.last_id(), Some(d.composite_fingerprint()));
    }

    #[test]
    fn declared_mutation_drops_entries_already_stale() {
        let mut d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "topology", 3usize);
        // Undeclared mutation before the declared one.
        d.modify::<i64, _>("faces", |f| f.fill(9)).unwrap();
        cache.declare_mutation(&mut d, &["topology"], |d| {
            d.modify::<f64, _>("vertices", |v| *v *= 2.0).unwrap();
        });
        assert!(!cache.contains(&d, "topology"));
    }

    #[test]
    fn declared_mutation_returns_closure_result() {
        let mut d = make_store();
        let mut cache = Cache::new();
        let n = cache.declare_mutation(&mut d, &[], |d| d.len());
        assert_eq!(n, 2);
    }

    #[test]
    fn invalidate_clears_regardless_of_id() {
        let d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "x", 1i32);
        cache.invalidate();
        assert!(!cache.contains(&d, "x"));
        assert!(matches!(cache.state(), CacheState::Valid(_)));
    }

    #[test]
    fn delete_single_entry() {
        let d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "x", 1i32);
        cache.set(&d, "y", 2i32);
        assert!(cache.delete("x"));
        assert!(!cache.delete("x"));
        assert_eq!(cache.keys().collect::<Vec<_>>(), vec!["y"]);
    }

    #[test]
    fn watch_single_array() {
        let mut v = TrackedArray::new(vec![1.0f32, 2.0]);
        let mut cache = Cache::new();
        cache.set(&v, "sum", 3.0f32);
        v += 1.0;
        assert!(!cache.contains(&v, "sum"));
    }

    #[test]
    fn watch_container_set() {
        let a = make_store();
        let mut b = make_store();
        let mut cache = Cache::new();
        cache.set(&[&a, &b][..], "pair", true);
        assert!(cache.contains(&[&a, &b][..], "pair"));
        b.modify::<i64, _>("faces", |f| f.fill(0)).unwrap();
        assert!(!cache.contains(&[&a, &b][..], "pair"));
    }

    #[test]
    fn debug_lists_sorted_keys() {
        let d = make_store();
        let mut cache = Cache::new();
        cache.set(&d, "b", 1u8);
        cache.set(&d, "a", 1u8);
        let s = format!("{cache:?}");
        assert!(s.contains("[\"a\", \"b\"]"));
    }
}
