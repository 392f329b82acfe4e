//! Named groups of tracked buffers behind one mutability gate.
//!
//! A [`DataStore`] holds the raw arrays describing one geometric object
//! (vertices, faces, ...) and exposes a composite fingerprint over all of
//! them. Buffers are kept in name order so the composite is independent of
//! insertion order.

use std::collections::BTreeMap;

use kestrel_common::{Combiner, Element, Fingerprint, HashStrategy};

use crate::config::StoreConfig;
use crate::error::CacheError;
use crate::tracked::{TrackedArray, TrackedBuffer};

/// A collection of named [`TrackedArray`]s sharing one mutability flag.
///
/// While the store is immutable every mutating entry point returns
/// [`CacheError::ImmutableData`] and leaves the data untouched; reads keep
/// working.
#[derive(Debug)]
pub struct DataStore {
    /// Tracked buffers, keyed and ordered by name.
    containers: BTreeMap<String, Box<dyn TrackedBuffer>>,

    /// Whether mutation through this store is permitted.
    mutable: bool,

    /// Fingerprint strategy applied to every contained buffer.
    strategy: HashStrategy,
}

impl DataStore {
    /// Creates an empty, mutable store using the default strategy.
    pub fn new() -> Self {
        Self::with_strategy(HashStrategy::default())
    }

    /// Creates an empty, mutable store using the given strategy.
    pub fn with_strategy(strategy: HashStrategy) -> Self {
        Self {
            containers: BTreeMap::new(),
            mutable: true,
            strategy,
        }
    }

    /// Creates an empty store configured from a [`StoreConfig`].
    pub fn from_config(config: &StoreConfig) -> Self {
        let mut store = Self::with_strategy(config.strategy);
        store.mutable = config.mutable;
        store
    }

    fn check_mutable(&self, name: &str) -> Result<(), CacheError> {
        if self.mutable {
            return Ok(());
        }
        tracing::debug!(name, "rejected mutation of immutable data store");
        Err(CacheError::ImmutableData {
            name: name.to_string(),
        })
    }

    /// Returns `true` if mutation through this store is permitted.
    pub fn mutable(&self) -> bool {
        self.mutable
    }

    /// Allows or forbids mutation through this store.
    pub fn set_mutable(&mut self, mutable: bool) {
        self.mutable = mutable;
    }

    /// Returns the fingerprint strategy.
    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    /// Changes the fingerprint strategy of the store and every buffer in it.
    ///
    /// This changes how data is summarized, not the data itself, so it is
    /// allowed on immutable stores.
    pub fn set_strategy(&mut self, strategy: HashStrategy) {
        self.strategy = strategy;
        for container in self.containers.values_mut() {
            container.set_strategy(strategy);
        }
    }

    /// Stores `array` under `name`, replacing any previous buffer.
    pub fn set<T: Element>(
        &mut self,
        name: impl Into<String>,
        array: impl Into<TrackedArray<T>>,
    ) -> Result<(), CacheError> {
        self.set_boxed(name, Box::new(array.into()))
    }

    /// Stores an already type-erased buffer under `name`.
    pub fn set_boxed(
        &mut self,
        name: impl Into<String>,
        mut buffer: Box<dyn TrackedBuffer>,
    ) -> Result<(), CacheError> {
        let name = name.into();
        self.check_mutable(&name)?;
        buffer.set_strategy(self.strategy);
        self.containers.insert(name, buffer);
        Ok(())
    }

    /// Returns the buffer stored under `name` as an array of `T`.
    pub fn get<T: Element>(&self, name: &str) -> Result<&TrackedArray<T>, CacheError> {
        self.buffer(name)?
            .as_any()
            .downcast_ref::<TrackedArray<T>>()
            .ok_or_else(|| CacheError::TypeMismatch {
                key: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns mutable access to the buffer stored under `name`.
    ///
    /// Fails with [`CacheError::ImmutableData`] on an immutable store. Any
    /// write through the returned reference flags the buffer dirty.
    pub fn get_mut<T: Element>(&mut self, name: &str) -> Result<&mut TrackedArray<T>, CacheError> {
        self.check_mutable(name)?;
        self.containers
            .get_mut(name)
            .ok_or_else(|| CacheError::KeyNotFound {
                key: name.to_string(),
            })?
            .as_any_mut()
            .downcast_mut::<TrackedArray<T>>()
            .ok_or_else(|| CacheError::TypeMismatch {
                key: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Runs `f` on the buffer stored under `name` and returns its result.
    pub fn modify<T: Element, R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut TrackedArray<T>) -> R,
    ) -> Result<R, CacheError> {
        Ok(f(self.get_mut(name)?))
    }

    /// Returns the type-erased buffer stored under `name`.
    pub fn buffer(&self, name: &str) -> Result<&dyn TrackedBuffer, CacheError> {
        self.containers
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| CacheError::KeyNotFound {
                key: name.to_string(),
            })
    }

    /// Removes the buffer stored under `name`, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> Result<bool, CacheError> {
        self.check_mutable(name)?;
        Ok(self.containers.remove(name).is_some())
    }

    /// Removes every buffer.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.check_mutable("*")?;
        self.containers.clear();
        Ok(())
    }

    /// Returns `true` if a buffer is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    /// Returns the number of stored buffers.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Returns `true` if no stored buffer holds any data.
    pub fn is_empty(&self) -> bool {
        self.containers.values().all(|b| b.is_empty())
    }

    /// Iterates buffer names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }

    /// Returns `true` if any buffer may have changed since it was last
    /// fingerprinted.
    pub fn is_dirty(&self) -> bool {
        self.containers.values().any(|b| b.is_dirty())
    }

    /// Returns the fingerprint of the buffer stored under `name`.
    pub fn fingerprint(&self, name: &str) -> Result<Fingerprint, CacheError> {
        Ok(self.buffer(name)?.fingerprint())
    }

    /// Combines every buffer's fingerprint, keyed by name, into one value.
    ///
    /// Clean buffers contribute their memoized fingerprint, so this is cheap
    /// when nothing changed and proportional to the changed data otherwise.
    pub fn composite_fingerprint(&self) -> Fingerprint {
        let mut combiner = Combiner::new(self.strategy);
        for (name, buffer) in &self.containers {
            combiner.mix(name, buffer.fingerprint());
        }
        combiner.finish()
    }

    /// Combines every buffer's SHA-256 digest into one content address.
    ///
    /// Independent of the store's strategy, so two stores loaded from the
    /// same data agree here even if configured differently.
    pub fn content_digest(&self) -> Fingerprint {
        let mut combiner = Combiner::new(HashStrategy::Sha256);
        for (name, buffer) in &self.containers {
            combiner.mix(name, buffer.content_digest());
        }
        combiner.finish()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DataStore {
    fn clone(&self) -> Self {
        Self {
            containers: self
                .containers
                .iter()
                .map(|(name, buffer)| (name.clone(), buffer.clone_boxed()))
                .collect(),
            mutable: self.mutable,
            strategy: self.strategy,
        }
    }
}
