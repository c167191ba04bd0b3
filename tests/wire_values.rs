use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use tether::object::{ObjectRef, RemoteObject, object_ref};
use tether::wire::value::{ObjectSpec, WireValue};
use tether::wire::{IncomingObject, WireMode, WireStream, shared_writer};

#[derive(Clone)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn sink_stream() -> (WireStream<Cursor<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let stream = WireStream::new(Cursor::new(Vec::new()), shared_writer(SharedSink(sink.clone())));
    (stream, sink)
}

fn reader_stream(input: &[u8]) -> WireStream<Cursor<Vec<u8>>> {
    WireStream::new(Cursor::new(input.to_vec()), shared_writer(io::sink()))
}

struct Blank;

impl RemoteObject for Blank {
    fn type_tag(&self) -> &str {
        "Blank"
    }

    fn describe(&self) -> ObjectSpec {
        ObjectSpec::new("Blank")
    }
}

fn blank() -> ObjectRef {
    object_ref(Box::new(Blank))
}

#[test]
fn scalars_parse_from_text() {
    assert_eq!(WireValue::parse_text("42").unwrap(), WireValue::Int(42));
    assert_eq!(WireValue::parse_text("-7").unwrap(), WireValue::Int(-7));
    assert_eq!(WireValue::parse_text("3.5").unwrap(), WireValue::Real(3.5));
    assert_eq!(
        WireValue::parse_text("1e3").unwrap(),
        WireValue::Real(1000.0)
    );
    assert_eq!(
        WireValue::parse_text("true").unwrap(),
        WireValue::Bool(true)
    );
    assert_eq!(
        WireValue::parse_text("false").unwrap(),
        WireValue::Bool(false)
    );
    assert_eq!(WireValue::parse_text("null").unwrap(), WireValue::Null);
}

#[test]
fn string_escapes_round_trip() {
    let parsed = WireValue::parse_text("\"a\\nb\\t\\\"quoted\\\" \\\\slash\"").unwrap();
    assert_eq!(
        parsed,
        WireValue::Str("a\nb\t\"quoted\" \\slash".to_string())
    );

    let rendered = parsed.to_string();
    assert_eq!(WireValue::parse_text(&rendered).unwrap(), parsed);
}

#[test]
fn nested_object_literals_parse() {
    let parsed =
        WireValue::parse_text("Net(layers = [ 2 4 ]; act = \"relu\"; inner = Sub(x = 1.5))")
            .unwrap();
    let WireValue::Object(spec) = parsed else {
        panic!("expected object");
    };
    assert_eq!(spec.type_tag, "Net");
    assert_eq!(
        spec.field("layers"),
        Some(&WireValue::List(vec![WireValue::Int(2), WireValue::Int(4)]))
    );
    assert_eq!(
        spec.field("act"),
        Some(&WireValue::Str("relu".to_string()))
    );
    let Some(WireValue::Object(inner)) = spec.field("inner") else {
        panic!("expected inner object");
    };
    assert_eq!(inner.type_tag, "Sub");
    assert_eq!(inner.field("x"), Some(&WireValue::Real(1.5)));
}

#[test]
fn display_output_parses_back_to_the_same_value() {
    let value = WireValue::Object(
        ObjectSpec::new("Mix")
            .with_field("n", WireValue::Int(-4))
            .with_field("x", WireValue::Real(2.0))
            .with_field("items", WireValue::List(vec![WireValue::Bool(true), WireValue::Null])),
    );
    let rendered = value.to_string();
    assert_eq!(WireValue::parse_text(&rendered).unwrap(), value);
}

#[test]
fn malformed_text_is_rejected() {
    assert!(WireValue::parse_text("\"unterminated").is_err());
    assert!(WireValue::parse_text("12 34").is_err());
    assert!(WireValue::parse_text("Foo(").is_err());
    assert!(WireValue::parse_text("Foo(x 1)").is_err());
    assert!(WireValue::parse_text("*3;").is_err());
}

#[test]
fn binary_reply_frames_round_trip() {
    let values = vec![
        WireValue::Int(-12),
        WireValue::Real(0.25),
        WireValue::Str("héllo\nworld".to_string()),
        WireValue::List(vec![WireValue::Bool(true), WireValue::Null]),
        WireValue::Object(ObjectSpec::new("Sub").with_field("x", WireValue::Int(9))),
    ];

    let (mut writer, sink) = sink_stream();
    writer.set_mode(WireMode::Binary);
    writer.write_reply(&values).unwrap();

    let bytes = sink.lock().clone();
    let mut reader = reader_stream(&bytes);
    reader.set_mode(WireMode::Binary);

    let tag = reader.skip_to_marker().unwrap().unwrap();
    assert_eq!(tag, b'R');
    let count = reader.read_count().unwrap();
    assert_eq!(count, values.len());
    for expected in &values {
        assert_eq!(&reader.read_value().unwrap(), expected);
    }
}

#[test]
fn repeated_object_writes_become_backreferences() {
    let obj = blank();
    let (mut stream, sink) = sink_stream();
    stream.write_object(&obj).unwrap();
    stream.write_object(&obj).unwrap();

    let text = String::from_utf8(sink.lock().clone()).unwrap();
    assert_eq!(text, " *1 -> Blank() *1;");
}

#[test]
fn implicit_storage_writes_full_bodies_every_time() {
    let obj = blank();
    let (mut stream, sink) = sink_stream();
    stream.set_implicit_storage(true);
    stream.write_object(&obj).unwrap();
    stream.write_object(&obj).unwrap();

    let text = String::from_utf8(sink.lock().clone()).unwrap();
    assert_eq!(text, " Blank() Blank()");
    assert!(!text.contains('*'));
}

#[test]
fn seeded_outbound_map_writes_handle_backreferences() {
    let obj = blank();
    let (mut stream, sink) = sink_stream();
    stream.seed_copies_maps(10042, &obj);
    stream.write_object(&obj).unwrap();

    let text = String::from_utf8(sink.lock().clone()).unwrap();
    assert_eq!(text, " *10042;");
}

#[test]
fn seeded_inbound_map_resolves_backreferences_to_the_same_object() {
    let obj = blank();
    let mut stream = reader_stream(b"*10042;");
    stream.seed_copies_maps(10042, &obj);

    match stream.read_object().unwrap() {
        IncomingObject::Existing(found) => assert!(Arc::ptr_eq(&found, &obj)),
        IncomingObject::New(_) => panic!("expected an existing object"),
    }
}

#[test]
fn clearing_the_maps_forgets_seeded_references() {
    let obj = blank();
    let mut stream = reader_stream(b"*10042;");
    stream.seed_copies_maps(10042, &obj);
    stream.clear_copies_maps();

    assert!(stream.read_object().is_err());
}

#[test]
fn definitions_introduce_ids_for_later_backreferences() {
    let mut stream = reader_stream(b"*5 -> Blank() *5;");

    let first = stream.read_object().unwrap();
    let IncomingObject::New(incoming) = first else {
        panic!("expected a fresh spec");
    };
    assert_eq!(incoming.wire_id, Some(5));
    assert_eq!(incoming.spec.type_tag, "Blank");

    // The session binds the id after instantiating; emulate that here.
    let obj = blank();
    stream.bind_reference(5, &obj);

    match stream.read_object().unwrap() {
        IncomingObject::Existing(found) => assert!(Arc::ptr_eq(&found, &obj)),
        IncomingObject::New(_) => panic!("expected the bound object"),
    }
}

#[test]
fn binary_object_definitions_and_references_round_trip() {
    let obj = blank();
    let (mut writer, sink) = sink_stream();
    writer.set_mode(WireMode::Binary);
    writer.write_object(&obj).unwrap();
    writer.write_object(&obj).unwrap();

    let bytes = sink.lock().clone();
    let mut reader = reader_stream(&bytes);
    reader.set_mode(WireMode::Binary);

    let IncomingObject::New(incoming) = reader.read_object().unwrap() else {
        panic!("expected a definition");
    };
    assert_eq!(incoming.wire_id, Some(1));
    assert_eq!(incoming.spec.type_tag, "Blank");

    let bound = blank();
    reader.bind_reference(1, &bound);
    match reader.read_object().unwrap() {
        IncomingObject::Existing(found) => assert!(Arc::ptr_eq(&found, &bound)),
        IncomingObject::New(_) => panic!("expected a backreference"),
    }
}
