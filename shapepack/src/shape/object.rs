//! Builders for object shapes: properties, accessors, and constructors.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use rancor::{fail, Error};

use crate::engine::TypeGraph;
use crate::hash::FxBuildHasher;
use crate::object::properties::{BoundProperty, PropertyOps};
use crate::shape::Packable;

#[derive(Debug)]
struct MissingArgument {
    name: String,
}

impl fmt::Display for MissingArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "constructor argument `{}` was not present in the input",
            self.name
        )
    }
}

impl core::error::Error for MissingArgument {}

#[derive(Debug)]
struct ArgumentTypeMismatch {
    name: String,
}

impl fmt::Display for ArgumentTypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "constructor argument `{}` was buffered with a different type",
            self.name
        )
    }
}

impl core::error::Error for ArgumentTypeMismatch {}

/// Property values buffered ahead of a parameterized constructor call.
///
/// The decoder fills the bag from the wire, then hands it to the
/// constructor closure declared with
/// [`ObjectShape::constructor_with`], which pulls its arguments out by
/// name.
pub struct ArgBag {
    values: HashMap<String, Box<dyn Any + Send>, FxBuildHasher>,
}

impl ArgBag {
    pub(crate) fn new() -> Self {
        Self {
            values: HashMap::default(),
        }
    }

    pub(crate) fn insert(&mut self, name: &str, value: Box<dyn Any + Send>) {
        self.values.insert(name.to_string(), value);
    }

    pub(crate) fn take_boxed(&mut self, name: &str) -> Option<Box<dyn Any + Send>> {
        self.values.remove(name)
    }

    /// Removes and returns the buffered value for the named property.
    ///
    /// Fails if the property was absent from the input or was buffered with
    /// a different type than requested.
    pub fn take<P: 'static>(&mut self, name: &str) -> Result<P, Error> {
        let Some(boxed) = self.values.remove(name) else {
            fail!(MissingArgument {
                name: name.to_string(),
            });
        };
        match boxed.downcast::<P>() {
            Ok(value) => Ok(*value),
            Err(_) => fail!(ArgumentTypeMismatch {
                name: name.to_string(),
            }),
        }
    }
}

pub(crate) type BindProperty<T> =
    Box<dyn Fn(&mut TypeGraph<'_>) -> Result<Arc<dyn PropertyOps<T>>, Error> + Send + Sync>;

/// The declaration of one property of an object shape.
///
/// A property pairs accessors with the recursively synthesized converter
/// for the property's type. Optional modifiers control the wire key, the
/// serialization predicate, and async routing.
pub struct PropertyShape<T> {
    pub(crate) name: String,
    pub(crate) key: Option<u32>,
    pub(crate) prefer_async: Option<bool>,
    pub(crate) should_serialize: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    pub(crate) suppress_if_no_ctor_param: bool,
    pub(crate) ctor_param: bool,
    pub(crate) bind: BindProperty<T>,
}

impl<T: Send + Sync + 'static> PropertyShape<T> {
    fn with_bind(name: impl Into<String>, bind: BindProperty<T>) -> Self {
        Self {
            name: name.into(),
            key: None,
            prefer_async: None,
            should_serialize: None,
            suppress_if_no_ctor_param: false,
            ctor_param: false,
            bind,
        }
    }

    /// Declares a read-write property backed by a getter and a setter.
    pub fn new<P: Packable>(
        name: impl Into<String>,
        get: impl Fn(&T) -> &P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self {
        let get: Arc<dyn Fn(&T) -> &P + Send + Sync> = Arc::new(get);
        let set: Arc<dyn Fn(&mut T, P) + Send + Sync> = Arc::new(set);
        Self::with_bind(
            name,
            Box::new(move |graph| {
                let ops: Arc<dyn PropertyOps<T>> = Arc::new(BoundProperty {
                    get: Some(get.clone()),
                    set: Some(set.clone()),
                    converter: graph.converter::<P>()?,
                });
                Ok(ops)
            }),
        )
    }

    /// Declares a serialize-only property backed by a getter.
    ///
    /// Combine with [`constructor_param`](Self::constructor_param) to make
    /// the value reach a parameterized constructor on decode.
    pub fn getter<P: Packable>(
        name: impl Into<String>,
        get: impl Fn(&T) -> &P + Send + Sync + 'static,
    ) -> Self {
        let get: Arc<dyn Fn(&T) -> &P + Send + Sync> = Arc::new(get);
        Self::with_bind(
            name,
            Box::new(move |graph| {
                let ops: Arc<dyn PropertyOps<T>> = Arc::new(BoundProperty {
                    get: Some(get.clone()),
                    set: None,
                    converter: graph.converter::<P>()?,
                });
                Ok(ops)
            }),
        )
    }

    /// Declares a deserialize-only property backed by a setter.
    pub fn setter<P: Packable>(
        name: impl Into<String>,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self {
        let set: Arc<dyn Fn(&mut T, P) + Send + Sync> = Arc::new(set);
        Self::with_bind(
            name,
            Box::new(move |graph| {
                let ops: Arc<dyn PropertyOps<T>> = Arc::new(BoundProperty {
                    get: None,
                    set: Some(set.clone()),
                    converter: graph.converter::<P>()?,
                });
                Ok(ops)
            }),
        )
    }

    /// Assigns an explicit integer wire key. Any keyed property switches
    /// the whole object to the array layout.
    pub fn key(mut self, key: u32) -> Self {
        self.key = Some(key);
        self
    }

    /// Overrides whether async encode and decode route this property
    /// through the async converter operations. Without an override the
    /// property follows its converter's preference.
    pub fn prefer_async(mut self, prefer: bool) -> Self {
        self.prefer_async = Some(prefer);
        self
    }

    /// Attaches a predicate consulted before serializing this property.
    pub fn should_serialize(
        mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_serialize = Some(Arc::new(predicate));
        self
    }

    /// Marks this property as feeding a parameterized constructor on
    /// decode.
    pub fn constructor_param(mut self) -> Self {
        self.ctor_param = true;
        self
    }

    /// Omits this property from serialization when the chosen constructor
    /// has no parameter of the same name.
    pub fn suppress_if_no_constructor_param(mut self) -> Self {
        self.suppress_if_no_ctor_param = true;
        self
    }
}

pub(crate) struct ParamCtor<T> {
    pub params: Vec<String>,
    pub build: Arc<dyn Fn(&mut ArgBag) -> Result<T, Error> + Send + Sync>,
}

/// The declaration of an object: its properties, constructors, and
/// lifecycle hooks.
pub struct ObjectShape<T> {
    pub(crate) properties: Vec<PropertyShape<T>>,
    pub(crate) default_ctor: Option<Arc<dyn Fn() -> T + Send + Sync>>,
    pub(crate) param_ctor: Option<ParamCtor<T>>,
    pub(crate) before_serialize: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    pub(crate) after_deserialize: Option<Arc<dyn Fn(&mut T) + Send + Sync>>,
}

impl<T: Send + Sync + 'static> ObjectShape<T> {
    /// Starts an empty object declaration.
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            default_ctor: None,
            param_ctor: None,
            before_serialize: None,
            after_deserialize: None,
        }
    }

    /// Adds a property. Properties are encoded in declaration order, and
    /// that order is part of the wire contract for the map layout.
    pub fn property(mut self, property: PropertyShape<T>) -> Self {
        self.properties.push(property);
        self
    }

    /// Declares the parameterless constructor used by decode.
    pub fn constructor(mut self, ctor: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.default_ctor = Some(Arc::new(ctor));
        self
    }

    /// Declares a parameterized constructor. Each named parameter must
    /// match a declared property (case-sensitive); decode buffers the
    /// matching property values and hands them to `build` in an
    /// [`ArgBag`].
    pub fn constructor_with<const N: usize>(
        mut self,
        params: [&str; N],
        build: impl Fn(&mut ArgBag) -> Result<T, Error> + Send + Sync + 'static,
    ) -> Self {
        self.param_ctor = Some(ParamCtor {
            params: params.iter().map(|p| p.to_string()).collect(),
            build: Arc::new(build),
        });
        self
    }

    /// Registers a hook invoked on encode before anything is written.
    pub fn before_serialize(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.before_serialize = Some(Arc::new(hook));
        self
    }

    /// Registers a hook invoked on decode after all entries are read.
    pub fn after_deserialize(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.after_deserialize = Some(Arc::new(hook));
        self
    }
}

impl<T: Send + Sync + 'static> Default for ObjectShape<T> {
    fn default() -> Self {
        Self::new()
    }
}
