//! The shape-directed synthesis visitor.
//!
//! `TypeGraph` walks a type's shape and produces its converter, recursively
//! requesting converters for member types. Every finished converter is
//! published to the shared cache under the insert-once rule; types still
//! being synthesized are visible to recursive requests through a forwarding
//! cell, which makes cyclic shapes work.

use core::any::{Any, TypeId};
use core::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use hashbrown::HashMap;
use rancor::{fail, Error};

use super::{ConverterCache, SubtypeOverrides};
use crate::context::SerializationContext;
use crate::converter::{primitive, ArcConverter, Converter, EnumConverter};
use crate::hash::FxBuildHasher;
use crate::object::array::ArrayObjectConverter;
use crate::object::map::{MapObjectConverter, NamedProperty};
use crate::object::properties::{PropertyAccessor, PropertyOps as _};
use crate::object::union::UnionConverter;
use crate::object::{ObjectCtor, ObjectHooks};
use crate::shape::{
    Alias, ObjectShape, Packable, Shape, ShapeKind, UnionShape,
};
use crate::wire::{
    encode_str, MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter,
};

#[derive(Debug)]
struct UnregisteredPrimitive {
    type_name: &'static str,
}

impl fmt::Display for UnregisteredPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} declares a primitive shape but has no registered primitive converter",
            self.type_name
        )
    }
}

impl core::error::Error for UnregisteredPrimitive {}

#[derive(Debug)]
struct ConstructorParamMismatch {
    name: String,
    type_name: &'static str,
}

impl fmt::Display for ConstructorParamMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "constructor parameter `{}` of {} matches no declared property",
            self.name, self.type_name
        )
    }
}

impl core::error::Error for ConstructorParamMismatch {}

#[derive(Debug)]
struct MixedPropertyKeys {
    type_name: &'static str,
}

impl fmt::Display for MixedPropertyKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} assigns integer keys to some properties but not all of them",
            self.type_name
        )
    }
}

impl core::error::Error for MixedPropertyKeys {}

#[derive(Debug)]
struct DuplicatePropertyKey {
    key: u32,
    type_name: &'static str,
}

impl fmt::Display for DuplicatePropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} assigns integer key {} to more than one property",
            self.type_name, self.key
        )
    }
}

impl core::error::Error for DuplicatePropertyKey {}

#[derive(Debug)]
struct DuplicatePropertyName {
    name: String,
    type_name: &'static str,
}

impl fmt::Display for DuplicatePropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} declares property `{}` more than once",
            self.type_name, self.name
        )
    }
}

impl core::error::Error for DuplicatePropertyName {}

#[derive(Debug)]
struct DuplicateAlias {
    alias: Alias,
    base: &'static str,
}

impl fmt::Display for DuplicateAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "union {} registers alias {} more than once",
            self.base, self.alias
        )
    }
}

impl core::error::Error for DuplicateAlias {}

#[derive(Debug)]
struct DuplicateSubtype {
    subtype: &'static str,
    base: &'static str,
}

impl fmt::Display for DuplicateSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "union {} registers subtype {} more than once",
            self.base, self.subtype
        )
    }
}

impl core::error::Error for DuplicateSubtype {}

#[derive(Debug)]
struct UnresolvedForward {
    type_name: &'static str,
}

impl fmt::Display for UnresolvedForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "converter for {} was used before its synthesis completed",
            self.type_name
        )
    }
}

impl core::error::Error for UnresolvedForward {}

/// The forwarding cell published for a type while its converter is still
/// being synthesized. Recursive member references resolve to the cell; the
/// cell delegates to the finished converter once synthesis fills it.
struct ForwardCell<T> {
    inner: OnceLock<ArcConverter<T>>,
}

impl<T: Send + Sync + 'static> ForwardCell<T> {
    fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    fn fill(&self, converter: ArcConverter<T>) {
        let _ = self.inner.set(converter);
    }

    fn resolved(&self) -> Result<&ArcConverter<T>, Error> {
        match self.inner.get() {
            Some(converter) => Ok(converter),
            None => fail!(UnresolvedForward {
                type_name: core::any::type_name::<T>(),
            }),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<T> for ForwardCell<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        self.resolved()?.read(reader, ctx)
    }

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        self.resolved()?.write(value, writer, ctx)
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        self.resolved()?.read_async(reader, ctx).await
    }

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        self.resolved()?.write_async(value, writer, ctx).await
    }

    fn prefer_async(&self) -> bool {
        self.inner
            .get()
            .is_some_and(|converter| converter.prefer_async())
    }
}

/// One synthesis pass: resolves converters against the shared cache,
/// tracking the types currently being built.
pub(crate) struct TypeGraph<'a> {
    cache: &'a ConverterCache,
    overrides: &'a SubtypeOverrides,
    in_progress: HashMap<TypeId, Box<dyn Any + Send + Sync>, FxBuildHasher>,
}

impl<'a> TypeGraph<'a> {
    pub fn new(cache: &'a ConverterCache, overrides: &'a SubtypeOverrides) -> Self {
        Self {
            cache,
            overrides,
            in_progress: HashMap::default(),
        }
    }

    /// Returns the converter for `T`, synthesizing and caching it on first
    /// use.
    ///
    /// Lookup order: the instance cache, the types in progress in this
    /// pass, runtime subtype registrations, the static primitive registry,
    /// and finally `T`'s own shape.
    pub fn converter<T: Packable>(&mut self) -> Result<ArcConverter<T>, Error> {
        if let Some(cached) = self.cache.get::<T>() {
            return Ok(cached);
        }
        if let Some(forward) = self.forward::<T>() {
            return Ok(forward);
        }
        if let Some(mapping) = self.overrides.get::<T>() {
            return self.synthesize(move |graph| build_union(mapping.as_ref(), graph));
        }
        if let Some(primitive) = primitive::lookup::<T>() {
            return Ok(self.cache.try_insert(primitive));
        }
        self.synthesize(|graph| graph.visit(T::shape()))
    }

    fn forward<T: Packable>(&self) -> Option<ArcConverter<T>> {
        let cell = self
            .in_progress
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Arc<ForwardCell<T>>>()?;
        let cell: Arc<ForwardCell<T>> = Arc::clone(cell);
        let converter: ArcConverter<T> = cell;
        Some(converter)
    }

    fn synthesize<T: Packable>(
        &mut self,
        make: impl FnOnce(&mut Self) -> Result<ArcConverter<T>, Error>,
    ) -> Result<ArcConverter<T>, Error> {
        let id = TypeId::of::<T>();
        let cell = Arc::new(ForwardCell::<T>::new());
        self.in_progress.insert(id, Box::new(Arc::clone(&cell)));
        let built = make(self);
        self.in_progress.remove(&id);
        let built = built?;
        cell.fill(Arc::clone(&built));
        Ok(self.cache.try_insert(built))
    }

    fn visit<T: Packable>(&mut self, shape: Shape<T>) -> Result<ArcConverter<T>, Error> {
        match shape.kind {
            ShapeKind::Primitive => match primitive::lookup::<T>() {
                Some(converter) => Ok(converter),
                None => fail!(UnregisteredPrimitive {
                    type_name: core::any::type_name::<T>(),
                }),
            },
            ShapeKind::Nullable(bind)
            | ShapeKind::Sequence(bind)
            | ShapeKind::Dictionary(bind) => bind(self),
            ShapeKind::Enum { to_value, from_value } => Ok(Arc::new(EnumConverter {
                to_value,
                from_value,
            })),
            ShapeKind::Object(object) => self.visit_object(object),
            ShapeKind::Union(union) => build_union(&union, self),
        }
    }

    fn visit_object<T: Send + Sync + 'static>(
        &mut self,
        object: ObjectShape<T>,
    ) -> Result<ArcConverter<T>, Error> {
        let type_name = core::any::type_name::<T>();

        for (i, property) in object.properties.iter().enumerate() {
            if object.properties[..i].iter().any(|p| p.name == property.name) {
                fail!(DuplicatePropertyName {
                    name: property.name.clone(),
                    type_name,
                });
            }
        }

        let ctor = if let Some(default) = object.default_ctor {
            ObjectCtor::Default(default)
        } else if let Some(param) = object.param_ctor {
            for name in &param.params {
                if !object.properties.iter().any(|p| p.name == *name) {
                    fail!(ConstructorParamMismatch {
                        name: name.clone(),
                        type_name,
                    });
                }
            }
            ObjectCtor::Parameterized {
                params: Arc::new(param.params),
                build: param.build,
            }
        } else {
            ObjectCtor::Missing
        };
        let ctor_params: &[String] = match &ctor {
            ObjectCtor::Parameterized { params, .. } => params,
            _ => &[],
        };

        let any_key = object.properties.iter().any(|p| p.key.is_some());
        let mut bound = Vec::with_capacity(object.properties.len());
        for property in object.properties {
            let ops = (property.bind)(self)?;
            let has_param = ctor_params.iter().any(|name| *name == property.name);
            let writable =
                ops.can_write() && !(property.suppress_if_no_ctor_param && !has_param);
            let deliverable = ops.can_read_into() || has_param || property.ctor_param;
            if !writable && !deliverable {
                // Structurally dead: no route onto or off the wire.
                continue;
            }
            let accessor = PropertyAccessor {
                name: property.name,
                prefer_async: property
                    .prefer_async
                    .unwrap_or_else(|| ops.converter_prefers_async()),
                should_serialize: property.should_serialize,
                ctor_param: property.ctor_param || has_param,
                writable,
                ops,
            };
            bound.push((property.key, accessor));
        }

        let any_prefers_async = bound.iter().any(|(_, accessor)| accessor.prefer_async);
        let hooks = ObjectHooks {
            before_serialize: object.before_serialize,
            after_deserialize: object.after_deserialize,
        };

        if any_key {
            let mut slots: Vec<Option<PropertyAccessor<T>>> = Vec::new();
            for (key, accessor) in bound {
                let Some(key) = key else {
                    fail!(MixedPropertyKeys { type_name });
                };
                let index = key as usize;
                if index >= slots.len() {
                    slots.resize_with(index + 1, || None);
                }
                if slots[index].is_some() {
                    fail!(DuplicatePropertyKey { key, type_name });
                }
                slots[index] = Some(accessor);
            }
            let any_predicate = slots
                .iter()
                .flatten()
                .any(|accessor| accessor.should_serialize.is_some());
            Ok(Arc::new(ArrayObjectConverter {
                type_name,
                slots,
                any_predicate,
                ctor,
                hooks,
                any_prefers_async,
            }))
        } else {
            let mut props = Vec::with_capacity(bound.len());
            let mut serial_order = Vec::new();
            let mut by_key = HashMap::default();
            for (_, accessor) in bound {
                let index = props.len();
                if accessor.writable {
                    serial_order.push(index);
                }
                if accessor.can_deliver() {
                    by_key.insert(
                        accessor.name.clone().into_bytes().into_boxed_slice(),
                        index,
                    );
                }
                props.push(NamedProperty {
                    encoded_name: encode_str(&accessor.name).into_boxed_slice(),
                    accessor,
                });
            }
            Ok(Arc::new(MapObjectConverter {
                type_name,
                props,
                serial_order,
                by_key,
                ctor,
                hooks,
                any_prefers_async,
            }))
        }
    }
}

/// Builds the envelope converter for a union declaration.
fn build_union<T: Send + Sync + 'static>(
    union: &UnionShape<T>,
    graph: &mut TypeGraph<'_>,
) -> Result<ArcConverter<T>, Error> {
    let base_type_name = core::any::type_name::<T>();
    let mut any_prefers_async = false;

    let base = match &union.base {
        Some(case) => {
            let converter = (case.bind)(graph)?;
            any_prefers_async |= converter.prefer_async();
            Some((case.type_id, converter))
        }
        None => None,
    };

    let mut by_alias = HashMap::default();
    let mut by_type = HashMap::default();
    for entry in &union.entries {
        let converter = (entry.case.bind)(graph)?;
        any_prefers_async |= converter.prefer_async();
        if by_alias
            .insert(entry.alias.clone(), Arc::clone(&converter))
            .is_some()
        {
            fail!(DuplicateAlias {
                alias: entry.alias.clone(),
                base: base_type_name,
            });
        }
        let duplicate_type = by_type
            .insert(entry.case.type_id, (entry.alias.clone(), converter))
            .is_some()
            || base
                .as_ref()
                .is_some_and(|(base_id, _)| *base_id == entry.case.type_id);
        if duplicate_type {
            fail!(DuplicateSubtype {
                subtype: entry.case.type_name,
                base: base_type_name,
            });
        }
    }

    Ok(Arc::new(UnionConverter {
        base_type_name,
        runtime_type: union.runtime_type.clone(),
        base,
        by_alias,
        by_type,
        any_prefers_async,
    }))
}
