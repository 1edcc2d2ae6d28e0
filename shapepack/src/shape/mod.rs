//! Runtime type descriptions: the input to converter synthesis.
//!
//! A [`Shape`] describes one type: a primitive leaf, a nullable or
//! collection wrapper, an enumeration, an object with properties and
//! constructors, or a closed union of subtypes. Types advertise their shape
//! through [`Packable`], and the synthesis visitor compiles the shape into
//! a converter exactly once per serializer.

mod object;
mod union;

pub use self::object::{ArgBag, ObjectShape, PropertyShape};
pub use self::union::{Alias, UnionShape};

use core::hash::Hash;
use std::collections::HashMap;
use std::sync::Arc;

use rancor::Error;

use crate::converter::collections::{
    DictionaryConverter, NullableConverter, SequenceConverter,
};
use crate::converter::ArcConverter;
use crate::engine::TypeGraph;
use crate::raw::RawBytes;

/// A type that carries a [`Shape`] and can therefore be serialized by this
/// engine.
///
/// Implementations for the primitive leaf types, `Option`, `Vec`, and
/// `HashMap` are built in. User types implement this by describing
/// themselves with the shape builders:
///
/// ```
/// use shapepack::{ObjectShape, Packable, PropertyShape, Shape};
///
/// #[derive(Default)]
/// struct Person {
///     name: String,
/// }
///
/// impl Packable for Person {
///     fn shape() -> Shape<Self> {
///         Shape::object(
///             ObjectShape::new()
///                 .constructor(Person::default)
///                 .property(PropertyShape::new(
///                     "name",
///                     |p: &Person| &p.name,
///                     |p, name| p.name = name,
///                 )),
///         )
///     }
/// }
/// ```
pub trait Packable: Sized + Send + Sync + 'static {
    /// Returns the shape of this type.
    fn shape() -> Shape<Self>;
}

pub(crate) type BindConverter<T> =
    Box<dyn Fn(&mut TypeGraph<'_>) -> Result<ArcConverter<T>, Error> + Send + Sync>;

/// The runtime description of one type.
pub struct Shape<T> {
    pub(crate) kind: ShapeKind<T>,
}

pub(crate) enum ShapeKind<T> {
    Primitive,
    Nullable(BindConverter<T>),
    Sequence(BindConverter<T>),
    Dictionary(BindConverter<T>),
    Enum {
        to_value: Arc<dyn Fn(&T) -> i64 + Send + Sync>,
        from_value: Arc<dyn Fn(i64) -> Option<T> + Send + Sync>,
    },
    Object(ObjectShape<T>),
    Union(UnionShape<T>),
}

impl<T: Send + Sync + 'static> Shape<T> {
    /// The shape of a primitive leaf type served by the static registry.
    pub fn primitive() -> Self {
        Self {
            kind: ShapeKind::Primitive,
        }
    }

    /// The shape of an object with named or integer-keyed properties.
    pub fn object(shape: ObjectShape<T>) -> Self {
        Self {
            kind: ShapeKind::Object(shape),
        }
    }

    /// The shape of a closed union dispatching to subtypes by alias.
    pub fn union(shape: UnionShape<T>) -> Self {
        Self {
            kind: ShapeKind::Union(shape),
        }
    }

    /// The shape of an enumeration encoded as its integer discriminant.
    pub fn enumeration(
        to_value: impl Fn(&T) -> i64 + Send + Sync + 'static,
        from_value: impl Fn(i64) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ShapeKind::Enum {
                to_value: Arc::new(to_value),
                from_value: Arc::new(from_value),
            },
        }
    }
}

impl<P: Packable> Shape<Option<P>> {
    /// The shape of a nullable wrapper around `P`.
    pub fn nullable() -> Self {
        Self {
            kind: ShapeKind::Nullable(Box::new(|graph| {
                let inner = graph.converter::<P>()?;
                let converter: ArcConverter<Option<P>> =
                    Arc::new(NullableConverter { inner });
                Ok(converter)
            })),
        }
    }
}

impl<P: Packable> Shape<Vec<P>> {
    /// The shape of a sequence of `P`.
    pub fn sequence() -> Self {
        Self {
            kind: ShapeKind::Sequence(Box::new(|graph| {
                let element = graph.converter::<P>()?;
                let converter: ArcConverter<Vec<P>> =
                    Arc::new(SequenceConverter { element });
                Ok(converter)
            })),
        }
    }
}

impl<K, V> Shape<HashMap<K, V>>
where
    K: Packable + Eq + Hash,
    V: Packable,
{
    /// The shape of a dictionary from `K` to `V`.
    pub fn dictionary() -> Self {
        Self {
            kind: ShapeKind::Dictionary(Box::new(|graph| {
                let key = graph.converter::<K>()?;
                let value = graph.converter::<V>()?;
                let converter: ArcConverter<HashMap<K, V>> =
                    Arc::new(DictionaryConverter { key, value });
                Ok(converter)
            })),
        }
    }
}

macro_rules! impl_primitive_packable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Packable for $ty {
                fn shape() -> Shape<Self> {
                    Shape::primitive()
                }
            }
        )*
    };
}

impl_primitive_packable!(
    i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, String, (), RawBytes,
);

impl<P: Packable> Packable for Option<P> {
    fn shape() -> Shape<Self> {
        Shape::nullable()
    }
}

impl<P: Packable> Packable for Vec<P> {
    fn shape() -> Shape<Self> {
        Shape::sequence()
    }
}

impl<K, V> Packable for HashMap<K, V>
where
    K: Packable + Eq + Hash,
    V: Packable,
{
    fn shape() -> Shape<Self> {
        Shape::dictionary()
    }
}
