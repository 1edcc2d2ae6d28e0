//! Converter synthesis: the per-serializer cache and the shape-directed
//! visitor that populates it.

mod cache;
mod synthesis;

pub(crate) use self::cache::{ConverterCache, SubtypeOverrides};
pub(crate) use self::synthesis::TypeGraph;
