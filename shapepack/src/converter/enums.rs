//! The converter for enumerations encoded as their discriminant.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rancor::{fail, Error};

use super::Converter;
use crate::context::SerializationContext;
use crate::wire::{MsgPackReader, MsgPackWriter};

#[derive(Debug)]
struct UnknownDiscriminant {
    value: i64,
    type_name: &'static str,
}

impl fmt::Display for UnknownDiscriminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is not a known discriminant of {}",
            self.value, self.type_name
        )
    }
}

impl core::error::Error for UnknownDiscriminant {}

/// Encodes an enumeration as its integer discriminant.
pub(crate) struct EnumConverter<T> {
    pub to_value: Arc<dyn Fn(&T) -> i64 + Send + Sync>,
    pub from_value: Arc<dyn Fn(i64) -> Option<T> + Send + Sync>,
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<T> for EnumConverter<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _: &mut SerializationContext,
    ) -> Result<T, Error> {
        let value = reader.read_int()?;
        match (self.from_value)(value) {
            Some(out) => Ok(out),
            None => fail!(UnknownDiscriminant {
                value,
                type_name: core::any::type_name::<T>(),
            }),
        }
    }

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        _: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_int((self.to_value)(value));
        Ok(())
    }
}
