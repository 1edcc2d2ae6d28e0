use std::sync::atomic::{AtomicUsize, Ordering};

use shapepack::{
    from_bytes, to_bytes, ObjectShape, Packable, PropertyShape, Serializer,
    SerializerOptions, Shape,
};

#[derive(Debug, Default, PartialEq)]
struct Person {
    name: String,
}

impl Packable for Person {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Person::default)
                .property(PropertyShape::new(
                    "name",
                    |p: &Person| &p.name,
                    |p, name| p.name = name,
                )),
        )
    }
}

/// Array layout with a hole: keys 0 and 2 are occupied, 1 is not.
#[derive(Debug, Default, PartialEq)]
struct Gapped {
    first: String,
    third: String,
}

impl Packable for Gapped {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Gapped::default)
                .property(
                    PropertyShape::new("first", |g: &Gapped| &g.first, |g, v| g.first = v)
                        .key(0),
                )
                .property(
                    PropertyShape::new("third", |g: &Gapped| &g.third, |g, v| g.third = v)
                        .key(2),
                ),
        )
    }
}

/// Array layout, keys 0..=5, every property skipped while zero.
#[derive(Debug, Default, PartialEq, Clone)]
struct Sparse {
    a: i64,
    b: i64,
    c: i64,
    d: i64,
    e: i64,
    f: i64,
}

macro_rules! sparse_property {
    ($key:literal, $field:ident) => {
        PropertyShape::new(
            stringify!($field),
            |s: &Sparse| &s.$field,
            |s, v| s.$field = v,
        )
        .key($key)
        .should_serialize(|s: &Sparse| s.$field != 0)
    };
}

impl Packable for Sparse {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Sparse::default)
                .property(sparse_property!(0, a))
                .property(sparse_property!(1, b))
                .property(sparse_property!(2, c))
                .property(sparse_property!(3, d))
                .property(sparse_property!(4, e))
                .property(sparse_property!(5, f)),
        )
    }
}

#[test]
fn map_object_wire_format() {
    let value = Person {
        name: "Alice".to_string(),
    };
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(
        bytes,
        [0x81, 0xa4, b'n', b'a', b'm', b'e', 0xa5, b'A', b'l', b'i', b'c', b'e']
    );
    assert_eq!(from_bytes::<Person>(&bytes).unwrap(), value);
}

#[test]
fn array_object_encodes_holes_as_nil() {
    let value = Gapped {
        first: "a".to_string(),
        third: "c".to_string(),
    };
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(bytes, [0x93, 0xa1, b'a', 0xc0, 0xa1, b'c']);
    assert_eq!(from_bytes::<Gapped>(&bytes).unwrap(), value);

    // Re-encoding the decoded value reproduces the bytes exactly.
    let decoded: Gapped = from_bytes(&bytes).unwrap();
    assert_eq!(to_bytes(&decoded).unwrap(), bytes);
}

#[test]
fn trailing_and_unknown_array_entries_are_skipped() {
    // Four entries for a three-slot layout; the extra one is ignored.
    let bytes = [0x94, 0xa1, b'a', 0xc0, 0xa1, b'c', 0x2a];
    let value: Gapped = from_bytes(&bytes).unwrap();
    assert_eq!(value.first, "a");
    assert_eq!(value.third, "c");
}

#[test]
fn sparse_encode_picks_a_map_when_it_is_smaller() {
    // Keys {0, 5}: two int keys cost 2 bytes, four nil holes cost 4.
    let value = Sparse {
        a: 7,
        f: 9,
        ..Sparse::default()
    };
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(bytes, [0x82, 0x00, 0x07, 0x05, 0x09]);
    assert_eq!(from_bytes::<Sparse>(&bytes).unwrap(), value);
}

#[test]
fn sparse_encode_picks_an_array_when_it_is_smaller() {
    // Keys {0, 1, 2}: three int keys cost 3 bytes, zero holes cost 0.
    let value = Sparse {
        a: 7,
        b: 8,
        c: 9,
        ..Sparse::default()
    };
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(bytes, [0x93, 0x07, 0x08, 0x09]);
    assert_eq!(from_bytes::<Sparse>(&bytes).unwrap(), value);
}

#[test]
fn sparse_encode_of_nothing_is_an_empty_array() {
    let bytes = to_bytes(&Sparse::default()).unwrap();
    assert_eq!(bytes, [0x90]);
    assert_eq!(from_bytes::<Sparse>(&bytes).unwrap(), Sparse::default());
}

#[test]
fn unknown_map_keys_are_skipped() {
    // {"name": "A", "extra": [1, 2]}
    let bytes = [
        0x82, 0xa4, b'n', b'a', b'm', b'e', 0xa1, b'A', 0xa5, b'e', b'x', b't', b'r',
        b'a', 0x92, 0x01, 0x02,
    ];
    let value: Person = from_bytes(&bytes).unwrap();
    assert_eq!(value.name, "A");
}

static BEFORE_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default, PartialEq)]
struct Probed {
    name: String,
    restored: bool,
}

impl Packable for Probed {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Probed::default)
                .before_serialize(|_: &Probed| {
                    BEFORE_CALLS.fetch_add(1, Ordering::SeqCst);
                })
                .after_deserialize(|p: &mut Probed| p.restored = true)
                .property(PropertyShape::new(
                    "name",
                    |p: &Probed| &p.name,
                    |p, name| p.name = name,
                )),
        )
    }
}

#[test]
fn callbacks_fire_once_per_call() {
    let value = Probed {
        name: "x".to_string(),
        restored: false,
    };
    let before = BEFORE_CALLS.load(Ordering::SeqCst);
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(BEFORE_CALLS.load(Ordering::SeqCst), before + 1);

    let back: Probed = from_bytes(&bytes).unwrap();
    assert!(back.restored);
    assert_eq!(back.name, "x");
}

#[derive(Debug, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl Packable for Point {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor_with(["x", "y"], |args| {
                    Ok(Point {
                        x: args.take("x")?,
                        y: args.take("y")?,
                    })
                })
                .property(PropertyShape::getter("x", |p: &Point| &p.x).constructor_param())
                .property(PropertyShape::getter("y", |p: &Point| &p.y).constructor_param()),
        )
    }
}

#[test]
fn parameterized_constructor_roundtrip() {
    let value = Point { x: -3, y: 12 };
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(from_bytes::<Point>(&bytes).unwrap(), value);
}

#[test]
fn missing_constructor_argument_is_an_error() {
    // {"x": 1} with no "y".
    let bytes = [0x81, 0xa1, b'x', 0x01];
    let err = from_bytes::<Point>(&bytes).unwrap_err();
    assert!(err.to_string().contains("`y`"));
}

#[derive(Debug)]
struct Unbuildable {
    value: i32,
}

impl Packable for Unbuildable {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .property(PropertyShape::getter("value", |u: &Unbuildable| &u.value)),
        )
    }
}

#[test]
fn decoding_without_a_constructor_is_not_supported() {
    let bytes = to_bytes(&Unbuildable { value: 5 }).unwrap();
    let err = from_bytes::<Unbuildable>(&bytes).unwrap_err();
    assert!(err.to_string().contains("no usable constructor"));
}

#[derive(Debug, Default, PartialEq)]
struct Node {
    value: i32,
    children: Vec<Node>,
}

impl Packable for Node {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Node::default)
                .property(PropertyShape::new(
                    "value",
                    |n: &Node| &n.value,
                    |n, v| n.value = v,
                ))
                .property(PropertyShape::new(
                    "children",
                    |n: &Node| &n.children,
                    |n, children| n.children = children,
                )),
        )
    }
}

#[test]
fn recursive_shapes_synthesize_through_a_forwarding_handle() {
    let tree = Node {
        value: 1,
        children: vec![
            Node {
                value: 2,
                children: vec![Node {
                    value: 4,
                    children: Vec::new(),
                }],
            },
            Node {
                value: 3,
                children: Vec::new(),
            },
        ],
    };
    let bytes = to_bytes(&tree).unwrap();
    assert_eq!(from_bytes::<Node>(&bytes).unwrap(), tree);
}

#[test]
fn depth_budget_applies_to_encode_and_decode() {
    let tree = Node {
        value: 1,
        children: vec![Node {
            value: 2,
            children: vec![Node {
                value: 3,
                children: Vec::new(),
            }],
        }],
    };

    let roomy = Serializer::with_options(SerializerOptions::new().max_depth(16));
    let bytes = roomy.to_bytes(&tree).unwrap();

    let tight = Serializer::with_options(SerializerOptions::new().max_depth(3));
    let err = tight.to_bytes(&tree).unwrap_err();
    assert!(err.to_string().contains("nesting depth"));
    let err = tight.from_bytes::<Node>(&bytes).unwrap_err();
    assert!(err.to_string().contains("nesting depth"));
}
