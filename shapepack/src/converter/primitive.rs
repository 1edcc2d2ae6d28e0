//! Converters for the primitive leaf types and the static registry that
//! serves them.

use core::any::{Any, TypeId};
use core::fmt;
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use rancor::{fail, Error};

use super::{ArcConverter, Converter};
use crate::context::SerializationContext;
use crate::hash::FxBuildHasher;
use crate::raw::RawBytesConverter;
use crate::wire::{MsgPackReader, MsgPackWriter};

#[derive(Debug)]
struct IntOutOfRange {
    type_name: &'static str,
}

impl fmt::Display for IntOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "integer does not fit in {}", self.type_name)
    }
}

impl core::error::Error for IntOutOfRange {}

macro_rules! signed_converter {
    ($name:ident, $ty:ty) => {
        pub(crate) struct $name;

        #[async_trait::async_trait]
        impl Converter<$ty> for $name {
            fn read(
                &self,
                reader: &mut MsgPackReader<'_>,
                _: &mut SerializationContext,
            ) -> Result<$ty, Error> {
                let value = reader.read_int()?;
                match <$ty>::try_from(value) {
                    Ok(value) => Ok(value),
                    Err(_) => fail!(IntOutOfRange {
                        type_name: stringify!($ty),
                    }),
                }
            }

            fn write(
                &self,
                value: &$ty,
                writer: &mut MsgPackWriter<'_>,
                _: &mut SerializationContext,
            ) -> Result<(), Error> {
                writer.write_int(i64::from(*value));
                Ok(())
            }
        }
    };
}

macro_rules! unsigned_converter {
    ($name:ident, $ty:ty) => {
        pub(crate) struct $name;

        #[async_trait::async_trait]
        impl Converter<$ty> for $name {
            fn read(
                &self,
                reader: &mut MsgPackReader<'_>,
                _: &mut SerializationContext,
            ) -> Result<$ty, Error> {
                let value = reader.read_uint()?;
                match <$ty>::try_from(value) {
                    Ok(value) => Ok(value),
                    Err(_) => fail!(IntOutOfRange {
                        type_name: stringify!($ty),
                    }),
                }
            }

            fn write(
                &self,
                value: &$ty,
                writer: &mut MsgPackWriter<'_>,
                _: &mut SerializationContext,
            ) -> Result<(), Error> {
                writer.write_uint(u64::from(*value));
                Ok(())
            }
        }
    };
}

signed_converter!(I8Converter, i8);
signed_converter!(I16Converter, i16);
signed_converter!(I32Converter, i32);
unsigned_converter!(U8Converter, u8);
unsigned_converter!(U16Converter, u16);
unsigned_converter!(U32Converter, u32);

pub(crate) struct I64Converter;

#[async_trait::async_trait]
impl Converter<i64> for I64Converter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<i64, Error> {
        reader.read_int()
    }

    fn write(
        &self,
        value: &i64,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_int(*value);
        Ok(())
    }
}

pub(crate) struct U64Converter;

#[async_trait::async_trait]
impl Converter<u64> for U64Converter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<u64, Error> {
        reader.read_uint()
    }

    fn write(
        &self,
        value: &u64,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_uint(*value);
        Ok(())
    }
}

pub(crate) struct BoolConverter;

#[async_trait::async_trait]
impl Converter<bool> for BoolConverter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<bool, Error> {
        reader.read_bool()
    }

    fn write(
        &self,
        value: &bool,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_bool(*value);
        Ok(())
    }
}

pub(crate) struct F32Converter;

#[async_trait::async_trait]
impl Converter<f32> for F32Converter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<f32, Error> {
        reader.read_f32()
    }

    fn write(
        &self,
        value: &f32,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_f32(*value);
        Ok(())
    }
}

pub(crate) struct F64Converter;

#[async_trait::async_trait]
impl Converter<f64> for F64Converter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<f64, Error> {
        reader.read_f64()
    }

    fn write(
        &self,
        value: &f64,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_f64(*value);
        Ok(())
    }
}

pub(crate) struct StringConverter;

#[async_trait::async_trait]
impl Converter<String> for StringConverter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<String, Error> {
        Ok(reader.read_str()?.to_string())
    }

    fn write(
        &self,
        value: &String,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_str(value);
        Ok(())
    }
}

pub(crate) struct UnitConverter;

#[async_trait::async_trait]
impl Converter<()> for UnitConverter {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        reader.read_nil()
    }

    fn write(
        &self,
        _: &(),
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_nil();
        Ok(())
    }
}

type Registry = HashMap<TypeId, Box<dyn Any + Send + Sync>, FxBuildHasher>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn put<T: Send + Sync + 'static>(registry: &mut Registry, converter: impl Converter<T> + 'static) {
    let handle: ArcConverter<T> = Arc::new(converter);
    registry.insert(TypeId::of::<T>(), Box::new(handle));
}

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut registry = Registry::default();
        put(&mut registry, I8Converter);
        put(&mut registry, I16Converter);
        put(&mut registry, I32Converter);
        put(&mut registry, I64Converter);
        put(&mut registry, U8Converter);
        put(&mut registry, U16Converter);
        put(&mut registry, U32Converter);
        put(&mut registry, U64Converter);
        put(&mut registry, BoolConverter);
        put(&mut registry, F32Converter);
        put(&mut registry, F64Converter);
        put(&mut registry, StringConverter);
        put(&mut registry, UnitConverter);
        put(&mut registry, RawBytesConverter);
        registry
    })
}

/// Looks up the statically registered converter for `T`, if `T` is one of
/// the primitive leaf types.
pub(crate) fn lookup<T: Send + Sync + 'static>() -> Option<ArcConverter<T>> {
    registry()
        .get(&TypeId::of::<T>())?
        .downcast_ref::<ArcConverter<T>>()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Send + Sync + PartialEq + core::fmt::Debug + 'static>(value: T) -> Vec<u8> {
        let converter = lookup::<T>().unwrap();
        let mut ctx = SerializationContext::default();
        let mut out = Vec::new();
        converter
            .write(&value, &mut MsgPackWriter::new(&mut out), &mut ctx)
            .unwrap();
        let back = converter
            .read(&mut MsgPackReader::new(&out), &mut ctx)
            .unwrap();
        assert_eq!(back, value);
        out
    }

    #[test]
    fn registry_covers_the_leaf_types() {
        assert_eq!(roundtrip(42_i32), [0x2a]);
        roundtrip(i64::MIN);
        roundtrip(u64::MAX);
        roundtrip(true);
        roundtrip(3.5_f64);
        roundtrip("hello".to_string());
        assert!(lookup::<Vec<i32>>().is_none());
    }

    #[test]
    fn narrow_reads_reject_wide_values() {
        let mut out = Vec::new();
        let mut ctx = SerializationContext::default();
        MsgPackWriter::new(&mut out).write_int(300);
        let converter = lookup::<u8>().unwrap();
        let err = converter
            .read(&mut MsgPackReader::new(&out), &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }
}
