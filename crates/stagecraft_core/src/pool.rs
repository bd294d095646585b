//! Reference-counted resource pool
//!
//! Expensive objects (materials, textures) are shared between every consumer
//! that asks for the same parameters. An entry is keyed by its
//! [`ResourceKind`] and a signature string derived from the parameters, holds
//! one live value, and is disposed when the last holder releases it.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::PoolError;

/// Namespace of a pooled resource ("material", "texture", ...)
///
/// Two kinds never share entries even if their signatures collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind(&'static str);

impl ResourceKind {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// Canonical signature of a parameter set
///
/// Field order follows the type's declaration order, so equal parameter
/// values always produce equal signatures.
pub fn signature_of<P: Serialize + ?Sized>(params: &P) -> Result<String, PoolError> {
    serde_json::to_string(params).map_err(|e| PoolError::Signature(e.to_string()))
}

/// Outcome of a [`ResourcePool::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other holders remain; the value stays live
    Retained(usize),
    /// The last holder released; the value was disposed
    Disposed,
}

/// Statistics about the pool
#[derive(Clone, Debug, Default)]
pub struct PoolStats {
    /// Number of live entries
    pub entries: usize,
    /// Sum of reference counts over all entries
    pub references: usize,
    /// Acquires served from a live entry
    pub hits: u64,
    /// Acquires that ran the factory
    pub misses: u64,
    /// Values disposed after their last release
    pub disposed: u64,
}

impl PoolStats {
    /// Get the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

struct PoolEntry<R> {
    value: R,
    ref_count: usize,
}

/// Pool of shared resources with per-signature reference counts
pub struct ResourcePool<R> {
    entries: FxHashMap<(ResourceKind, String), PoolEntry<R>>,
    hits: u64,
    misses: u64,
    disposed: u64,
}

impl<R: Clone> ResourcePool<R> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
            disposed: 0,
        }
    }

    /// Acquire the value for `signature`, creating it on first use
    ///
    /// A live entry has its count incremented and its value returned without
    /// calling `factory`. Otherwise `factory` runs; if it fails nothing is
    /// recorded and the error is returned.
    pub fn acquire<F, E>(&mut self, kind: ResourceKind, signature: &str, factory: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
    {
        let key = (kind, signature.to_string());
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.ref_count += 1;
            self.hits += 1;
            tracing::trace!(kind = kind.name(), signature, refs = entry.ref_count, "pool hit");
            return Ok(entry.value.clone());
        }

        let value = factory()?;
        self.misses += 1;
        tracing::debug!(kind = kind.name(), signature, "pool created resource");
        self.entries.insert(
            key,
            PoolEntry {
                value: value.clone(),
                ref_count: 1,
            },
        );
        Ok(value)
    }

    /// Release one reference to `signature`
    ///
    /// When the count reaches zero the entry is removed and `dispose` is
    /// called with the value exactly once. Releasing a signature with no
    /// live entry is reported as [`PoolError::NotAcquired`].
    pub fn release<D>(&mut self, kind: ResourceKind, signature: &str, dispose: D) -> Result<Release, PoolError>
    where
        D: FnOnce(R),
    {
        let key = (kind, signature.to_string());
        let Some(entry) = self.entries.get_mut(&key) else {
            tracing::error!(kind = kind.name(), signature, "release without matching acquire");
            return Err(PoolError::NotAcquired {
                kind,
                signature: signature.to_string(),
            });
        };

        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(Release::Retained(entry.ref_count));
        }

        if let Some(entry) = self.entries.remove(&key) {
            self.disposed += 1;
            tracing::debug!(kind = kind.name(), signature, "pool disposed resource");
            dispose(entry.value);
        }
        Ok(Release::Disposed)
    }

    /// Current reference count for a signature (0 when absent)
    pub fn ref_count(&self, kind: ResourceKind, signature: &str) -> usize {
        self.entries
            .get(&(kind, signature.to_string()))
            .map_or(0, |e| e.ref_count)
    }

    /// Check if a signature has a live entry
    pub fn contains(&self, kind: ResourceKind, signature: &str) -> bool {
        self.entries.contains_key(&(kind, signature.to_string()))
    }

    /// Peek at a live value without taking a reference
    pub fn peek(&self, kind: ResourceKind, signature: &str) -> Option<&R> {
        self.entries
            .get(&(kind, signature.to_string()))
            .map(|e| &e.value)
    }

    /// Get the number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            entries: self.entries.len(),
            references: self.entries.values().map(|e| e.ref_count).sum(),
            hits: self.hits,
            misses: self.misses,
            disposed: self.disposed,
        }
    }
}

impl<R: Clone> Default for ResourcePool<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const MATERIAL: ResourceKind = ResourceKind::new("material");
    const TEXTURE: ResourceKind = ResourceKind::new("texture");

    #[derive(Serialize)]
    struct Params<'a> {
        color: u32,
        opacity: f32,
        texture: Option<&'a str>,
    }

    #[test]
    fn test_acquire_shares_live_entry() {
        let mut pool: ResourcePool<u32> = ResourcePool::new();
        let created = Cell::new(0);

        let make = || -> Result<u32, ()> {
            created.set(created.get() + 1);
            Ok(created.get())
        };

        let a = pool.acquire(MATERIAL, "red", make).unwrap();
        let b = pool.acquire(MATERIAL, "red", make).unwrap();

        assert_eq!(a, b);
        assert_eq!(created.get(), 1);
        assert_eq!(pool.ref_count(MATERIAL, "red"), 2);
    }

    #[test]
    fn test_release_disposes_on_last_holder() {
        let mut pool: ResourcePool<&'static str> = ResourcePool::new();
        let disposed = Cell::new(0);

        pool.acquire(TEXTURE, "grid.jpg", || Ok::<_, ()>("tex#1")).unwrap();
        pool.acquire(TEXTURE, "grid.jpg", || Ok::<_, ()>("tex#2")).unwrap();

        let first = pool.release(TEXTURE, "grid.jpg", |_| disposed.set(disposed.get() + 1));
        assert_eq!(first, Ok(Release::Retained(1)));
        assert_eq!(disposed.get(), 0);

        let second = pool.release(TEXTURE, "grid.jpg", |value| {
            assert_eq!(value, "tex#1");
            disposed.set(disposed.get() + 1);
        });
        assert_eq!(second, Ok(Release::Disposed));
        assert_eq!(disposed.get(), 1);
        assert!(!pool.contains(TEXTURE, "grid.jpg"));
    }

    #[test]
    fn test_reacquire_after_dispose_creates_fresh_value() {
        let mut pool: ResourcePool<u32> = ResourcePool::new();
        let next = Cell::new(0);
        let make = || -> Result<u32, ()> {
            next.set(next.get() + 1);
            Ok(next.get())
        };

        pool.acquire(MATERIAL, "m", make).unwrap();
        pool.release(MATERIAL, "m", |_| {}).unwrap();
        let again = pool.acquire(MATERIAL, "m", make).unwrap();

        assert_eq!(again, 2);
    }

    #[test]
    fn test_release_without_acquire_is_an_error() {
        let mut pool: ResourcePool<u32> = ResourcePool::new();

        let result = pool.release(MATERIAL, "missing", |_| panic!("nothing to dispose"));
        assert_eq!(
            result,
            Err(PoolError::NotAcquired {
                kind: MATERIAL,
                signature: "missing".to_string(),
            })
        );
    }

    #[test]
    fn test_failed_factory_records_nothing() {
        let mut pool: ResourcePool<u32> = ResourcePool::new();

        let result = pool.acquire(MATERIAL, "broken", || Err("invalid opacity"));
        assert_eq!(result, Err("invalid opacity"));
        assert!(pool.is_empty());
        assert_eq!(pool.stats().misses, 0);
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let mut pool: ResourcePool<u32> = ResourcePool::new();

        pool.acquire(MATERIAL, "same", || Ok::<_, ()>(1)).unwrap();
        pool.acquire(TEXTURE, "same", || Ok::<_, ()>(2)).unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.peek(TEXTURE, "same"), Some(&2));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = signature_of(&Params { color: 0xff0000, opacity: 0.5, texture: Some("a.png") }).unwrap();
        let b = signature_of(&Params { color: 0xff0000, opacity: 0.5, texture: Some("a.png") }).unwrap();
        let c = signature_of(&Params { color: 0xff0000, opacity: 0.5, texture: None }).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_stats() {
        let mut pool: ResourcePool<u32> = ResourcePool::new();

        pool.acquire(MATERIAL, "a", || Ok::<_, ()>(1)).unwrap();
        pool.acquire(MATERIAL, "a", || Ok::<_, ()>(1)).unwrap();
        pool.acquire(MATERIAL, "b", || Ok::<_, ()>(2)).unwrap();
        pool.release(MATERIAL, "b", |_| {}).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.references, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.disposed, 1);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 1e-6);
    }
}
