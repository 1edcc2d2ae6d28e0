//! The object-as-array converter: properties encoded positionally by
//! integer key, with nil holes.
//!
//! Encode picks between two wire shapes: a (possibly truncated) array, or
//! a `{key → value}` map when enough trailing or interior holes make the
//! map strictly smaller. Decode accepts either shape.

use async_trait::async_trait;
use rancor::Error;

use super::properties::{PropertyAccessor, PropertyOps as _};
use super::{write_steps, ObjectCtor, ObjectHooks, StepPrefix, WireStep};
use crate::context::SerializationContext;
use crate::converter::{read_buffered, Converter};
use crate::scratch::ScratchIndexes;
use crate::shape::ArgBag;
use crate::wire::{
    encoded_uint_len, MsgPackAsyncReader, MsgPackAsyncWriter, MsgPackReader, MsgPackWriter,
    ValueKind, READ_BUDGET,
};

/// Encodes and decodes an object laid out positionally.
///
/// `slots[i]` is the property with wire key `i`; `None` is a hole. The
/// slot list's length is the highest declared key plus one.
pub(crate) struct ArrayObjectConverter<T> {
    pub type_name: &'static str,
    pub slots: Vec<Option<PropertyAccessor<T>>>,
    /// Whether any slot carries a serialization predicate, enabling the
    /// compact-shape selection on encode.
    pub any_predicate: bool,
    pub ctor: ObjectCtor<T>,
    pub hooks: ObjectHooks<T>,
    pub any_prefers_async: bool,
}

impl<T: Send + Sync + 'static> ArrayObjectConverter<T> {
    fn slot(&self, index: usize) -> Option<&PropertyAccessor<T>> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Collects the sorted wire keys of the properties this value wants
    /// encoded.
    fn indexes_to_include(&self, value: &T, out: &mut Vec<u32>) {
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(prop) = slot {
                if prop.writable && prop.passes(value) {
                    out.push(index as u32);
                }
            }
        }
    }

    fn write_full_array(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        writer.write_array_header(self.slots.len() as u32);
        for slot in &self.slots {
            match slot {
                Some(prop) if prop.writable => prop.ops.write(value, writer, ctx)?,
                _ => writer.write_nil(),
            }
        }
        Ok(())
    }

    fn read_array_shape(
        &self,
        target: &mut ReadTarget<'_, T>,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let len = reader.read_array_header()? as usize;
        for index in 0..len {
            target.deliver(self, index, reader, ctx)?;
        }
        Ok(())
    }

    fn read_map_shape(
        &self,
        target: &mut ReadTarget<'_, T>,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        let entries = reader.read_map_header()? as usize;
        for _ in 0..entries {
            let index = reader.read_uint()? as usize;
            target.deliver(self, index, reader, ctx)?;
        }
        Ok(())
    }

    fn read_sync(
        &self,
        target: &mut ReadTarget<'_, T>,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        match reader.peek_kind()? {
            ValueKind::Map => self.read_map_shape(target, reader, ctx),
            _ => self.read_array_shape(target, reader, ctx),
        }
    }
}

/// Where decoded property values land: directly into a default-constructed
/// value, or buffered for a parameterized constructor.
enum ReadTarget<'a, T> {
    Value(&'a mut T),
    Bag(&'a mut ArgBag),
}

impl<T: Send + Sync + 'static> ReadTarget<'_, T> {
    fn deliver(
        &mut self,
        converter: &ArrayObjectConverter<T>,
        index: usize,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        match self {
            Self::Value(value) => match converter.slot(index) {
                Some(prop) if prop.ops.can_read_into() => {
                    prop.ops.read_into(value, reader, ctx)
                }
                _ => reader.skip(ctx),
            },
            Self::Bag(bag) => match converter.slot(index) {
                Some(prop) if prop.can_deliver() => {
                    let arg = prop.ops.read_arg(reader, ctx)?;
                    bag.insert(&prop.name, arg);
                    Ok(())
                }
                _ => reader.skip(ctx),
            },
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Converter<T> for ArrayObjectConverter<T> {
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        self.ctor.fail_if_missing(self.type_name)?;
        ctx.enter()?;
        let mut value = match &self.ctor {
            ObjectCtor::Default(ctor) => {
                let mut value = ctor();
                self.read_sync(&mut ReadTarget::Value(&mut value), reader, ctx)?;
                value
            }
            ObjectCtor::Parameterized { build, .. } => {
                let mut bag = ArgBag::new();
                self.read_sync(&mut ReadTarget::Bag(&mut bag), reader, ctx)?;
                let mut value = build(&mut bag)?;
                for slot in self.slots.iter().flatten() {
                    if slot.ops.can_read_into() {
                        if let Some(arg) = bag.take_boxed(&slot.name) {
                            slot.ops.apply_arg(&mut value, arg)?;
                        }
                    }
                }
                value
            }
            ObjectCtor::Missing => unreachable!("checked above"),
        };
        self.hooks.after(&mut value);
        ctx.leave();
        Ok(value)
    }

    fn write(
        &self,
        value: &T,
        writer: &mut MsgPackWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        self.hooks.before(value);
        ctx.enter()?;

        if !self.any_predicate || self.slots.is_empty() {
            self.write_full_array(value, writer, ctx)?;
            ctx.leave();
            return Ok(());
        }

        let mut include = ScratchIndexes::acquire();
        self.indexes_to_include(value, &mut include);

        if include.is_empty() {
            writer.write_array_header(0);
            ctx.leave();
            return Ok(());
        }

        let last = include[include.len() - 1] as usize;
        let map_overhead = encoded_uint_len(last as u64) * include.len();
        let array_overhead = (last + 1) - include.len();

        if map_overhead < array_overhead {
            writer.write_map_header(include.len() as u32);
            for &index in include.iter() {
                writer.write_uint(u64::from(index));
                match self.slot(index as usize) {
                    // The index list only holds occupied, writable slots.
                    Some(prop) => prop.ops.write(value, writer, ctx)?,
                    None => unreachable!("included index points at a hole"),
                }
            }
        } else {
            writer.write_array_header((last + 1) as u32);
            let mut cursor = 0;
            for index in 0..=last {
                if cursor < include.len() && include[cursor] as usize == index {
                    cursor += 1;
                    match self.slot(index) {
                        Some(prop) => prop.ops.write(value, writer, ctx)?,
                        None => unreachable!("included index points at a hole"),
                    }
                } else {
                    writer.write_nil();
                }
            }
        }

        ctx.leave();
        Ok(())
    }

    async fn read_async(
        &self,
        reader: &mut MsgPackAsyncReader<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<T, Error> {
        let ObjectCtor::Default(ctor) = &self.ctor else {
            // Parameterized decoding buffers every property anyway, so
            // buffer the whole object and decode it in place.
            return read_buffered(self, reader, ctx).await;
        };

        ctx.enter()?;
        let mut value = ctor();

        match reader.peek_kind(ctx).await? {
            ValueKind::Map => {
                let entries = reader.read_map_header(ctx).await? as usize;
                let mut done = 0;

                while done < entries {
                    let available = reader.fill_structures(2, READ_BUDGET, ctx).await?;

                    let (async_index, key_len) = {
                        let mut sub = MsgPackReader::new(reader.buffered());
                        let index = sub.read_uint()? as usize;
                        let prefers = self.slot(index).is_some_and(|prop| {
                            prop.prefer_async && prop.ops.can_read_into()
                        });
                        (prefers.then_some(index), sub.position())
                    };
                    if let Some(index) = async_index {
                        reader.advance(key_len);
                        match self.slot(index) {
                            Some(prop) => {
                                prop.ops.read_into_async(&mut value, reader, ctx).await?;
                            }
                            None => unreachable!("async index points at a hole"),
                        }
                        done += 1;
                        continue;
                    }

                    let pairs = (available / 2).min(entries - done);
                    let (used, processed) = {
                        let mut sub = MsgPackReader::new(reader.buffered());
                        let mut committed = 0;
                        let mut processed = 0;
                        for _ in 0..pairs {
                            let index = sub.read_uint()? as usize;
                            if self.slot(index).is_some_and(|prop| {
                                prop.prefer_async && prop.ops.can_read_into()
                            }) {
                                break;
                            }
                            match self.slot(index) {
                                Some(prop) if prop.ops.can_read_into() => {
                                    prop.ops.read_into(&mut value, &mut sub, ctx)?;
                                }
                                _ => sub.skip(ctx)?,
                            }
                            committed = sub.position();
                            processed += 1;
                        }
                        (committed, processed)
                    };
                    reader.advance(used);
                    done += processed;
                }
            }
            _ => {
                let len = reader.read_array_header(ctx).await? as usize;
                let mut index = 0;

                while index < len {
                    if let Some(prop) = self.slot(index) {
                        if prop.prefer_async && prop.ops.can_read_into() {
                            prop.ops.read_into_async(&mut value, reader, ctx).await?;
                            index += 1;
                            continue;
                        }
                    }

                    // The run of entries decodable without suspending.
                    let run = (index..len)
                        .take_while(|&i| {
                            !self
                                .slot(i)
                                .is_some_and(|prop| prop.prefer_async && prop.ops.can_read_into())
                        })
                        .count();

                    let mut taken = 0;
                    while taken < run {
                        let available = reader.fill_structures(1, READ_BUDGET, ctx).await?;
                        let batch = available.min(run - taken);
                        let used = {
                            let mut sub = MsgPackReader::new(reader.buffered());
                            for _ in 0..batch {
                                match self.slot(index) {
                                    Some(prop) if prop.ops.can_read_into() => {
                                        prop.ops.read_into(&mut value, &mut sub, ctx)?;
                                    }
                                    _ => sub.skip(ctx)?,
                                }
                                index += 1;
                            }
                            sub.position()
                        };
                        reader.advance(used);
                        taken += batch;
                    }
                }
            }
        }

        self.hooks.after(&mut value);
        ctx.leave();
        Ok(value)
    }

    async fn write_async(
        &self,
        value: &T,
        writer: &mut MsgPackAsyncWriter<'_>,
        ctx: &mut SerializationContext,
    ) -> Result<(), Error> {
        self.hooks.before(value);
        ctx.enter()?;

        if !self.any_predicate || self.slots.is_empty() {
            writer
                .sub_writer()
                .write_array_header(self.slots.len() as u32);
            let steps: Vec<WireStep<'_, T>> = self
                .slots
                .iter()
                .map(|slot| WireStep {
                    prefix: StepPrefix::None,
                    prop: slot.as_ref().filter(|prop| prop.writable),
                })
                .collect();
            write_steps(&steps, value, writer, ctx).await?;
            ctx.leave();
            return Ok(());
        }

        let mut include = ScratchIndexes::acquire();
        self.indexes_to_include(value, &mut include);

        if include.is_empty() {
            writer.sub_writer().write_array_header(0);
            writer.flush_if_appropriate(ctx).await?;
            ctx.leave();
            return Ok(());
        }

        let last = include[include.len() - 1] as usize;
        let map_overhead = encoded_uint_len(last as u64) * include.len();
        let array_overhead = (last + 1) - include.len();

        if map_overhead < array_overhead {
            writer.sub_writer().write_map_header(include.len() as u32);
            let steps: Vec<WireStep<'_, T>> = include
                .iter()
                .map(|&index| WireStep {
                    prefix: StepPrefix::Index(index),
                    prop: self.slot(index as usize),
                })
                .collect();
            write_steps(&steps, value, writer, ctx).await?;
        } else {
            writer.sub_writer().write_array_header((last + 1) as u32);
            let mut cursor = 0;
            let steps: Vec<WireStep<'_, T>> = (0..=last)
                .map(|index| {
                    let included = cursor < include.len() && include[cursor] as usize == index;
                    if included {
                        cursor += 1;
                    }
                    WireStep {
                        prefix: StepPrefix::None,
                        prop: if included { self.slot(index) } else { None },
                    }
                })
                .collect();
            write_steps(&steps, value, writer, ctx).await?;
        }

        ctx.leave();
        Ok(())
    }

    fn prefer_async(&self) -> bool {
        self.any_prefers_async
    }
}
