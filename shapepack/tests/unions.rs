use core::any::TypeId;

use shapepack::{
    from_bytes, to_bytes, ObjectShape, Packable, PropertyShape, Serializer, Shape,
    UnionShape,
};

#[derive(Debug, Default, PartialEq)]
struct Animal {
    name: String,
}

impl Packable for Animal {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Animal::default)
                .property(PropertyShape::new(
                    "name",
                    |a: &Animal| &a.name,
                    |a, name| a.name = name,
                )),
        )
    }
}

#[derive(Debug, Default, PartialEq)]
struct Cow {
    name: String,
}

impl Packable for Cow {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Cow::default)
                .property(PropertyShape::new(
                    "name",
                    |c: &Cow| &c.name,
                    |c, name| c.name = name,
                )),
        )
    }
}

#[derive(Debug, PartialEq)]
enum Creature {
    Animal(Animal),
    Cow(Cow),
}

fn creature_union() -> UnionShape<Creature> {
    UnionShape::new()
        .runtime_type(|c: &Creature| match c {
            Creature::Animal(_) => TypeId::of::<Animal>(),
            Creature::Cow(_) => TypeId::of::<Cow>(),
        })
        .base(
            |c: &Creature| match c {
                Creature::Animal(animal) => Some(animal),
                _ => None,
            },
            Creature::Animal,
        )
        .subtype(
            1,
            |c: &Creature| match c {
                Creature::Cow(cow) => Some(cow),
                _ => None,
            },
            Creature::Cow,
        )
}

impl Packable for Creature {
    fn shape() -> Shape<Self> {
        Shape::union(creature_union())
    }
}

fn cow_payload(name: &str) -> Vec<u8> {
    to_bytes(&Cow {
        name: name.to_string(),
    })
    .unwrap()
}

#[test]
fn subtypes_carry_their_alias() {
    let value = Creature::Cow(Cow {
        name: "Bessie".to_string(),
    });
    let bytes = to_bytes(&value).unwrap();

    let mut expected = vec![0x92, 0x01];
    expected.extend_from_slice(&cow_payload("Bessie"));
    assert_eq!(bytes, expected);

    assert_eq!(from_bytes::<Creature>(&bytes).unwrap(), value);
}

#[test]
fn the_base_case_carries_nil() {
    let value = Creature::Animal(Animal {
        name: "Dog".to_string(),
    });
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(bytes[0], 0x92);
    assert_eq!(bytes[1], 0xc0);
    assert_eq!(from_bytes::<Creature>(&bytes).unwrap(), value);
}

#[test]
fn unknown_aliases_are_errors() {
    // [100, {}] — alias 100 was never registered.
    let err = from_bytes::<Creature>(&[0x92, 0x64, 0x80]).unwrap_err();
    assert!(err.to_string().contains("unknown subtype alias 100"));
}

#[test]
fn envelopes_must_have_two_elements() {
    let err = from_bytes::<Creature>(&[0x93, 0x01, 0x80, 0xc0]).unwrap_err();
    assert!(err.to_string().contains("2-element array"));
}

#[derive(Debug, PartialEq)]
enum Message {
    Text(String),
    Blob(Vec<u8>),
}

impl Packable for Message {
    fn shape() -> Shape<Self> {
        Shape::union(
            UnionShape::new()
                .runtime_type(|m: &Message| match m {
                    Message::Text(_) => TypeId::of::<String>(),
                    Message::Blob(_) => TypeId::of::<Vec<u8>>(),
                })
                .subtype(
                    "text",
                    |m: &Message| match m {
                        Message::Text(text) => Some(text),
                        _ => None,
                    },
                    Message::Text,
                )
                .subtype(
                    "blob",
                    |m: &Message| match m {
                        Message::Blob(blob) => Some(blob),
                        _ => None,
                    },
                    Message::Blob,
                ),
        )
    }
}

#[test]
fn string_aliases_work_too() {
    let value = Message::Text("hi".to_string());
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(
        bytes,
        [0x92, 0xa4, b't', b'e', b'x', b't', 0xa2, b'h', b'i']
    );
    assert_eq!(from_bytes::<Message>(&bytes).unwrap(), value);

    let value = Message::Blob(vec![1, 2]);
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(from_bytes::<Message>(&bytes).unwrap(), value);
}

#[test]
fn a_union_without_a_base_rejects_nil_aliases() {
    let err = from_bytes::<Message>(&[0x92, 0xc0, 0xa0]).unwrap_err();
    assert!(err.to_string().contains("no base case"));
}

#[test]
fn runtime_registration_replaces_the_declared_table() {
    let serializer = Serializer::new();

    // Synthesize against the declared table first.
    let declared = serializer
        .to_bytes(&Creature::Cow(Cow {
            name: "Bessie".to_string(),
        }))
        .unwrap();
    assert_eq!(declared[1], 0x01);

    // Re-register the cow under a different alias; the cached converter
    // must be invalidated and the new table used from here on.
    serializer.register_subtypes::<Creature>(
        UnionShape::new()
            .runtime_type(|c: &Creature| match c {
                Creature::Animal(_) => TypeId::of::<Animal>(),
                Creature::Cow(_) => TypeId::of::<Cow>(),
            })
            .base(
                |c: &Creature| match c {
                    Creature::Animal(animal) => Some(animal),
                    _ => None,
                },
                Creature::Animal,
            )
            .subtype(
                7,
                |c: &Creature| match c {
                    Creature::Cow(cow) => Some(cow),
                    _ => None,
                },
                Creature::Cow,
            ),
    );

    let reregistered = serializer
        .to_bytes(&Creature::Cow(Cow {
            name: "Bessie".to_string(),
        }))
        .unwrap();
    assert_eq!(reregistered[1], 0x07);

    // The old alias is unknown to the replacement table.
    let err = serializer.from_bytes::<Creature>(&declared).unwrap_err();
    assert!(err.to_string().contains("unknown subtype alias 1"));
    assert_eq!(
        serializer.from_bytes::<Creature>(&reregistered).unwrap(),
        Creature::Cow(Cow {
            name: "Bessie".to_string(),
        })
    );
}

#[test]
fn registering_a_converter_twice_fails() {
    use rancor::Error;
    use shapepack::{Converter, SerializationContext};
    use shapepack::wire::{MsgPackReader, MsgPackWriter};

    struct UppercaseNames;

    impl Converter<Animal> for UppercaseNames {
        fn read(
            &self,
            reader: &mut MsgPackReader<'_>,
            _: &mut SerializationContext,
        ) -> Result<Animal, Error> {
            Ok(Animal {
                name: reader.read_str()?.to_string(),
            })
        }

        fn write(
            &self,
            value: &Animal,
            writer: &mut MsgPackWriter<'_>,
            _: &mut SerializationContext,
        ) -> Result<(), Error> {
            writer.write_str(&value.name.to_uppercase());
            Ok(())
        }
    }

    let serializer = Serializer::new();
    serializer.register_converter::<Animal>(UppercaseNames).unwrap();

    // The registered converter wins over shape synthesis.
    let bytes = serializer
        .to_bytes(&Animal {
            name: "dog".to_string(),
        })
        .unwrap();
    assert_eq!(bytes, [0xa3, b'D', b'O', b'G']);

    let err = serializer
        .register_converter::<Animal>(UppercaseNames)
        .unwrap_err();
    assert!(err.to_string().contains("already registered"));
}
