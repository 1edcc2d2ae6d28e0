//! Builders for closed unions of subtypes.

use core::any::TypeId;
use core::fmt;
use std::sync::Arc;

use rancor::Error;

use crate::converter::ArcConverter;
use crate::engine::TypeGraph;
use crate::object::union::CaseConverter;
use crate::shape::Packable;

/// The wire identity of one subtype in a polymorphic envelope: an integer
/// or an interned string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Alias {
    /// An integer alias.
    Int(i64),
    /// A string alias.
    Str(Box<str>),
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "\"{value}\""),
        }
    }
}

impl From<i64> for Alias {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Alias {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Alias {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Alias {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

pub(crate) type BindCase<T> =
    Box<dyn Fn(&mut TypeGraph<'_>) -> Result<ArcConverter<T>, Error> + Send + Sync>;

pub(crate) struct UnionCase<T> {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub bind: BindCase<T>,
}

pub(crate) struct UnionEntry<T> {
    pub alias: Alias,
    pub case: UnionCase<T>,
}

/// The declaration of a closed union: a base case plus aliased subtypes,
/// with a projection from a value to its runtime subtype identity.
///
/// A union value serializes as the two-element envelope
/// `[alias | nil, payload]`. The `nil` slot marks the base case; an alias
/// dispatches to the matching subtype converter.
///
/// ```
/// use core::any::TypeId;
/// use shapepack::{Packable, Shape, UnionShape};
/// # use shapepack::{ObjectShape, PropertyShape};
/// # #[derive(Default)] struct Animal { name: String }
/// # #[derive(Default)] struct Cow { name: String }
/// # impl Packable for Animal {
/// #     fn shape() -> Shape<Self> {
/// #         Shape::object(ObjectShape::new().constructor(Animal::default).property(
/// #             PropertyShape::new("name", |a: &Animal| &a.name, |a, v| a.name = v),
/// #         ))
/// #     }
/// # }
/// # impl Packable for Cow {
/// #     fn shape() -> Shape<Self> {
/// #         Shape::object(ObjectShape::new().constructor(Cow::default).property(
/// #             PropertyShape::new("name", |c: &Cow| &c.name, |c, v| c.name = v),
/// #         ))
/// #     }
/// # }
///
/// enum Creature {
///     Animal(Animal),
///     Cow(Cow),
/// }
///
/// impl Packable for Creature {
///     fn shape() -> Shape<Self> {
///         Shape::union(
///             UnionShape::new()
///                 .runtime_type(|c: &Creature| match c {
///                     Creature::Animal(_) => TypeId::of::<Animal>(),
///                     Creature::Cow(_) => TypeId::of::<Cow>(),
///                 })
///                 .base(
///                     |c: &Creature| match c {
///                         Creature::Animal(a) => Some(a),
///                         _ => None,
///                     },
///                     Creature::Animal,
///                 )
///                 .subtype(
///                     1,
///                     |c: &Creature| match c {
///                         Creature::Cow(cow) => Some(cow),
///                         _ => None,
///                     },
///                     Creature::Cow,
///                 ),
///         )
///     }
/// }
/// ```
pub struct UnionShape<T> {
    pub(crate) runtime_type: Option<Arc<dyn Fn(&T) -> TypeId + Send + Sync>>,
    pub(crate) base: Option<UnionCase<T>>,
    pub(crate) entries: Vec<UnionEntry<T>>,
}

impl<T: Send + Sync + 'static> UnionShape<T> {
    /// Starts an empty union declaration.
    pub fn new() -> Self {
        Self {
            runtime_type: None,
            base: None,
            entries: Vec::new(),
        }
    }

    /// Declares the projection from a value to the [`TypeId`] of its
    /// runtime subtype, used to pick the encode-side converter.
    ///
    /// Without a projection every value encodes through the base case, but
    /// aliased payloads are still decodable.
    pub fn runtime_type(mut self, project: impl Fn(&T) -> TypeId + Send + Sync + 'static) -> Self {
        self.runtime_type = Some(Arc::new(project));
        self
    }

    fn case<S: Packable>(
        downcast: impl Fn(&T) -> Option<&S> + Send + Sync + 'static,
        upcast: impl Fn(S) -> T + Send + Sync + 'static,
    ) -> UnionCase<T> {
        let downcast: Arc<dyn Fn(&T) -> Option<&S> + Send + Sync> = Arc::new(downcast);
        let upcast: Arc<dyn Fn(S) -> T + Send + Sync> = Arc::new(upcast);
        UnionCase {
            type_id: TypeId::of::<S>(),
            type_name: core::any::type_name::<S>(),
            bind: Box::new(move |graph| {
                let converter: ArcConverter<T> = Arc::new(CaseConverter {
                    inner: graph.converter::<S>()?,
                    downcast: downcast.clone(),
                    upcast: upcast.clone(),
                });
                Ok(converter)
            }),
        }
    }

    /// Declares the base case, written with a `nil` alias slot.
    pub fn base<S: Packable>(
        mut self,
        downcast: impl Fn(&T) -> Option<&S> + Send + Sync + 'static,
        upcast: impl Fn(S) -> T + Send + Sync + 'static,
    ) -> Self {
        self.base = Some(Self::case(downcast, upcast));
        self
    }

    /// Declares an aliased subtype.
    pub fn subtype<S: Packable>(
        mut self,
        alias: impl Into<Alias>,
        downcast: impl Fn(&T) -> Option<&S> + Send + Sync + 'static,
        upcast: impl Fn(S) -> T + Send + Sync + 'static,
    ) -> Self {
        self.entries.push(UnionEntry {
            alias: alias.into(),
            case: Self::case(downcast, upcast),
        });
        self
    }
}

impl<T: Send + Sync + 'static> Default for UnionShape<T> {
    fn default() -> Self {
        Self::new()
    }
}
