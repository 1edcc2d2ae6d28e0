use shapepack::{
    CancellationToken, ObjectShape, Packable, PropertyShape, RawBytes, Serializer,
    SerializerOptions, Shape,
};

#[derive(Debug, Default, PartialEq)]
struct Record {
    id: u32,
    tags: Vec<String>,
    payload: RawBytes,
}

impl Packable for Record {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Record::default)
                .property(PropertyShape::new(
                    "id",
                    |r: &Record| &r.id,
                    |r, id| r.id = id,
                ))
                .property(PropertyShape::new(
                    "tags",
                    |r: &Record| &r.tags,
                    |r, tags| r.tags = tags,
                ))
                // RawBytes prefers the async operations; this property
                // exercises the batching schedule's async arm.
                .property(PropertyShape::new(
                    "payload",
                    |r: &Record| &r.payload,
                    |r, payload| r.payload = payload,
                )),
        )
    }
}

fn sample() -> Record {
    Record {
        id: 7,
        tags: vec!["alpha".to_string(), "beta".to_string()],
        payload: RawBytes::new(vec![0x92, 0x01, 0xa3, b'r', b'a', b'w']),
    }
}

#[tokio::test]
async fn async_and_sync_encodings_agree() {
    let serializer = Serializer::new();
    let value = sample();

    let sync_bytes = serializer.to_bytes(&value).unwrap();
    let mut async_bytes = Vec::new();
    serializer
        .to_async_writer(&value, &mut async_bytes)
        .await
        .unwrap();
    assert_eq!(async_bytes, sync_bytes);
}

#[tokio::test]
async fn async_roundtrip_with_tiny_flush_watermark() {
    // A one-byte watermark forces a flush offer after every property.
    let serializer =
        Serializer::with_options(SerializerOptions::new().flush_watermark(1));
    let value = sample();

    let mut bytes = Vec::new();
    serializer.to_async_writer(&value, &mut bytes).await.unwrap();
    assert_eq!(bytes, serializer.to_bytes(&value).unwrap());

    let mut source: &[u8] = &bytes;
    let back: Record = serializer.from_async_reader(&mut source).await.unwrap();
    assert_eq!(back, value);
}

#[derive(Debug, Default, PartialEq)]
struct Packet {
    kind: u32,
    body: RawBytes,
}

impl Packable for Packet {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Packet::default)
                .property(
                    PropertyShape::new("kind", |p: &Packet| &p.kind, |p, v| p.kind = v)
                        .key(0)
                        .should_serialize(|p: &Packet| p.kind != 0),
                )
                .property(
                    PropertyShape::new("body", |p: &Packet| &p.body, |p, v| p.body = v)
                        .key(5)
                        .should_serialize(|p: &Packet| !p.body.as_bytes().is_empty()),
                ),
        )
    }
}

#[tokio::test]
async fn async_array_layout_crosses_both_wire_shapes() {
    let serializer = Serializer::with_options(
        SerializerOptions::new().flush_watermark(2),
    );

    // Keys {0, 5} select the map shape.
    let value = Packet {
        kind: 3,
        body: RawBytes::new(vec![0xa2, b'o', b'k']),
    };
    let mut bytes = Vec::new();
    serializer.to_async_writer(&value, &mut bytes).await.unwrap();
    assert_eq!(bytes, serializer.to_bytes(&value).unwrap());
    assert_eq!(bytes[0], 0x82);

    let mut source: &[u8] = &bytes;
    let back: Packet = serializer.from_async_reader(&mut source).await.unwrap();
    assert_eq!(back, value);

    // Synchronously encoded bytes decode through the async reader too.
    let sync_bytes = serializer.to_bytes(&value).unwrap();
    let mut source: &[u8] = &sync_bytes;
    let back: Packet = serializer.from_async_reader(&mut source).await.unwrap();
    assert_eq!(back, value);
}

#[derive(Debug, Default, PartialEq)]
struct Wide {
    a: u32,
    b: u32,
    c: u32,
}

impl Packable for Wide {
    fn shape() -> Shape<Self> {
        Shape::object(
            ObjectShape::new()
                .constructor(Wide::default)
                .property(PropertyShape::new("a", |w: &Wide| &w.a, |w, v| w.a = v).key(0))
                .property(PropertyShape::new("b", |w: &Wide| &w.b, |w, v| w.b = v).key(1))
                .property(PropertyShape::new("c", |w: &Wide| &w.c, |w, v| w.c = v).key(2)),
        )
    }
}

#[tokio::test]
async fn async_full_array_roundtrip() {
    let serializer = Serializer::with_options(
        SerializerOptions::new().flush_watermark(1),
    );
    let value = Wide { a: 1, b: 2, c: 3 };

    let mut bytes = Vec::new();
    serializer.to_async_writer(&value, &mut bytes).await.unwrap();
    assert_eq!(bytes, [0x93, 0x01, 0x02, 0x03]);

    let mut source: &[u8] = &bytes;
    let back: Wide = serializer.from_async_reader(&mut source).await.unwrap();
    assert_eq!(back, value);
}

#[tokio::test]
async fn cancellation_surfaces_at_suspension_points() {
    let serializer = Serializer::new();
    let token = CancellationToken::new();
    token.cancel();

    let mut ctx = serializer.context().with_cancellation(token.clone());
    let mut sink = Vec::new();
    let err = serializer
        .to_async_writer_with(&sample(), &mut sink, &mut ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled"));

    let bytes = serializer.to_bytes(&sample()).unwrap();
    let mut ctx = serializer.context().with_cancellation(token);
    let mut source: &[u8] = &bytes;
    let err = serializer
        .from_async_reader_with::<Record, _>(&mut source, &mut ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled"));
}

#[tokio::test]
async fn truncated_async_input_is_an_eof_error() {
    let serializer = Serializer::new();
    let bytes = serializer.to_bytes(&sample()).unwrap();

    let mut source: &[u8] = &bytes[..bytes.len() - 1];
    let err = serializer
        .from_async_reader::<Record, _>(&mut source)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unexpected end of input"));
}
