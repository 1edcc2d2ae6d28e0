//! # shapepack
//!
//! shapepack is a shape-directed MessagePack serialization engine. A type
//! describes itself once, through a [`Shape`] built out of properties,
//! constructors, and subtype declarations; the engine compiles that
//! description into a matched encode/decode pair — a [`Converter`] —
//! caches it by type, and reuses it for every later value.
//!
//! ## Design
//!
//! Unlike derive-based serialization frameworks, the unit of extension
//! here is the *shape*, a runtime value: properties carry accessor
//! closures and optional integer keys, and synthesis walks the shape
//! recursively, requesting converters for member types from a shared,
//! insert-once cache. This is what makes the engine's more particular
//! features compose — conditional serialization, compact array-or-map
//! layout selection, polymorphic envelopes with runtime-registered
//! subtype tables, and async encoding that flushes between properties.
//!
//! Objects encode as maps keyed by property name, or positionally as
//! arrays when properties declare integer keys. Closed unions encode as a
//! two-element envelope `[alias | nil, payload]`. [`RawBytes`] carries
//! pre-encoded values through untouched.
//!
//! ## Example
//!
//! ```
//! use shapepack::{
//!     from_bytes, to_bytes, ObjectShape, Packable, PropertyShape, Shape,
//! };
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! impl Packable for Person {
//!     fn shape() -> Shape<Self> {
//!         Shape::object(
//!             ObjectShape::new()
//!                 .constructor(Person::default)
//!                 .property(PropertyShape::new(
//!                     "name",
//!                     |p: &Person| &p.name,
//!                     |p, name| p.name = name,
//!                 ))
//!                 .property(PropertyShape::new(
//!                     "age",
//!                     |p: &Person| &p.age,
//!                     |p, age| p.age = age,
//!                 )),
//!         )
//!     }
//! }
//!
//! let value = Person {
//!     name: "Alice".to_string(),
//!     age: 34,
//! };
//!
//! let bytes = to_bytes(&value).unwrap();
//! let back: Person = from_bytes(&bytes).unwrap();
//! assert_eq!(back, value);
//! ```
//!
//! For per-instance converter caching, options, hand-written converters,
//! and runtime subtype registration, construct a [`Serializer`] and use
//! its methods instead of the crate-level helpers.

#![deny(
    rustdoc::broken_intra_doc_links,
    missing_docs,
    rustdoc::missing_crate_level_docs
)]

// Re-exports

pub use ::bytes;
pub use ::rancor;
pub use tokio_util::sync::CancellationToken;

// Modules

pub mod context;
pub mod converter;
mod engine;
pub mod hash;
mod object;
pub mod raw;
mod scratch;
pub mod serializer;
pub mod shape;
pub mod wire;

pub use crate::context::SerializationContext;
pub use crate::converter::{ArcConverter, Converter};
pub use crate::raw::RawBytes;
pub use crate::serializer::{from_bytes, to_bytes, Serializer, SerializerOptions};
pub use crate::shape::{
    Alias, ArgBag, ObjectShape, Packable, PropertyShape, Shape, UnionShape,
};
