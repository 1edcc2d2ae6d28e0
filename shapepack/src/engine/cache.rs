//! The thread-safe type-to-converter map.

use core::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::converter::ArcConverter;
use crate::hash::FxBuildHasher;
use crate::shape::UnionShape;

/// The per-serializer converter cache.
///
/// Insertions are insert-once: when two threads synthesize the same type
/// concurrently, the first published instance is retained and later
/// writers get it back instead of their own. Both instances are
/// functionally equivalent, so callers must tolerate receiving either.
#[derive(Default)]
pub(crate) struct ConverterCache {
    map: DashMap<TypeId, Box<dyn Any + Send + Sync>, FxBuildHasher>,
}

impl ConverterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached converter for `T`, if any.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<ArcConverter<T>> {
        self.map
            .get(&TypeId::of::<T>())?
            .downcast_ref::<ArcConverter<T>>()
            .cloned()
    }

    /// Publishes a converter for `T` unless one is already present, and
    /// returns the retained instance either way.
    pub fn try_insert<T: Send + Sync + 'static>(
        &self,
        converter: ArcConverter<T>,
    ) -> ArcConverter<T> {
        match self.map.entry(TypeId::of::<T>()) {
            Entry::Occupied(entry) => entry
                .get()
                .downcast_ref::<ArcConverter<T>>()
                .cloned()
                .unwrap_or(converter),
            Entry::Vacant(entry) => {
                entry.insert(Box::new(converter.clone()));
                converter
            }
        }
    }

    /// Drops the cached converter for `T`, forcing re-synthesis on next
    /// use.
    pub fn evict<T: 'static>(&self) {
        self.map.remove(&TypeId::of::<T>());
    }
}

/// Runtime subtype registrations, keyed by base type.
///
/// A registered mapping wholly replaces any shape-declared union for that
/// base at the next synthesis.
#[derive(Default)]
pub(crate) struct SubtypeOverrides {
    map: DashMap<TypeId, Arc<dyn Any + Send + Sync>, FxBuildHasher>,
}

impl SubtypeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<UnionShape<T>>> {
        let entry = self.map.get(&TypeId::of::<T>())?;
        let erased: Arc<dyn Any + Send + Sync> = Arc::clone(entry.value());
        drop(entry);
        erased.downcast::<UnionShape<T>>().ok()
    }

    pub fn set<T: Send + Sync + 'static>(&self, mapping: UnionShape<T>) {
        self.map.insert(TypeId::of::<T>(), Arc::new(mapping));
    }
}
