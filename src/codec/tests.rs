use crate::proto::Endianness;
use crate::signature::Signature;
use crate::value::Value;

use super::{marshal, unmarshal};

fn roundtrip(signature: &str, values: Vec<Value>) {
    let signature = Signature::new(signature).unwrap();

    for endianness in [Endianness::LITTLE, Endianness::BIG] {
        let (bytes, fds) = marshal(signature, &values, endianness).unwrap();
        let (decoded, consumed) = unmarshal(signature, &bytes, &fds, endianness).unwrap();

        assert_eq!(decoded, values, "decode mismatch for `{signature}`");
        assert_eq!(consumed, bytes.len(), "trailing bytes for `{signature}`");

        let (again, _) = marshal(signature, &decoded, endianness).unwrap();
        assert_eq!(again, bytes, "re-marshal mismatch for `{signature}`");
    }
}

#[test]
fn roundtrip_basic() {
    roundtrip(
        "ybnqiuxtd",
        vec![
            Value::Byte(0x10),
            Value::Bool(true),
            Value::Int16(-2),
            Value::Uint16(2),
            Value::Int32(-42),
            Value::Uint32(42),
            Value::Int64(-1234567890123),
            Value::Uint64(1234567890123),
            Value::Double(3.5),
        ],
    );
}

#[test]
fn roundtrip_string_like() {
    roundtrip(
        "sog",
        vec![
            Value::from("Hello World!"),
            Value::ObjectPath(crate::ObjectPath::new("/org/freedesktop/DBus").unwrap().to_owned()),
            Value::Signature(Signature::new("a{sv}").unwrap().to_owned()),
        ],
    );
}

#[test]
fn roundtrip_empty() {
    roundtrip("", vec![]);
}

#[test]
fn roundtrip_containers() {
    roundtrip(
        "a(ai)",
        vec![Value::array(
            Signature::new("(ai)").unwrap(),
            [
                Value::Struct(vec![Value::array(
                    Signature::INT32,
                    [Value::Int32(1), Value::Int32(2)],
                )]),
                Value::Struct(vec![Value::array(Signature::INT32, [])]),
            ],
        )],
    );

    roundtrip(
        "(yv)u",
        vec![
            Value::Struct(vec![
                Value::Byte(8),
                Value::variant(Value::from("inner")),
            ]),
            Value::Uint32(7),
        ],
    );
}

#[test]
fn roundtrip_property_dict() {
    roundtrip(
        "sa{sv}as",
        vec![
            Value::from("org.example.I"),
            Value::dict(
                Signature::STRING,
                Signature::VARIANT,
                [
                    (Value::from("a"), Value::variant(Value::Int32(20))),
                    (Value::from("b"), Value::variant(Value::from("x"))),
                ],
            ),
            Value::array(Signature::STRING, [Value::from("c")]),
        ],
    );
}

#[test]
fn roundtrip_empty_dict() {
    roundtrip("a{sv}", vec![Value::dict(Signature::STRING, Signature::VARIANT, [])]);
}

#[test]
fn alignment_layout() {
    let (bytes, _) = marshal(
        Signature::new("yu").unwrap(),
        &[Value::Byte(0x10), Value::Uint32(42)],
        Endianness::LITTLE,
    )
    .unwrap();

    assert_eq!(bytes, [0x10, 0, 0, 0, 42, 0, 0, 0]);

    // The 64-bit value aligns to offset 8.
    let (bytes, _) = marshal(
        Signature::new("yx").unwrap(),
        &[Value::Byte(1), Value::Int64(2)],
        Endianness::LITTLE,
    )
    .unwrap();

    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[..8], [1, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(&bytes[8..], [2, 0, 0, 0, 0, 0, 0, 0]);

    // An empty array of 8-aligned elements still pads to the element
    // alignment after its length.
    let (bytes, _) = marshal(
        Signature::new("ax").unwrap(),
        &[Value::array(Signature::INT64, [])],
        Endianness::LITTLE,
    )
    .unwrap();

    assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn string_layout() {
    let (bytes, _) = marshal(
        Signature::STRING,
        &[Value::from("foo")],
        Endianness::LITTLE,
    )
    .unwrap();

    assert_eq!(bytes, [3, 0, 0, 0, b'f', b'o', b'o', 0]);

    let (bytes, _) = marshal(Signature::STRING, &[Value::from("foo")], Endianness::BIG).unwrap();

    assert_eq!(bytes, [0, 0, 0, 3, b'f', b'o', b'o', 0]);
}

#[test]
fn fd_indices() {
    let (bytes, fds) = marshal(
        Signature::new("hh").unwrap(),
        &[Value::Fd(5), Value::Fd(7)],
        Endianness::LITTLE,
    )
    .unwrap();

    assert_eq!(bytes, [0, 0, 0, 0, 1, 0, 0, 0]);
    assert_eq!(fds, [5, 7]);

    let (values, _) = unmarshal(
        Signature::new("hh").unwrap(),
        &bytes,
        &fds,
        Endianness::LITTLE,
    )
    .unwrap();

    assert_eq!(values, [Value::Fd(5), Value::Fd(7)]);
}

#[test]
fn malformed_input() {
    // String length runs past the buffer.
    let bytes = [10, 0, 0, 0, b'f'];
    assert!(unmarshal(Signature::STRING, &bytes, &[], Endianness::LITTLE).is_err());

    // Missing nul terminator.
    let bytes = [3, 0, 0, 0, b'f', b'o', b'o', 1];
    assert!(unmarshal(Signature::STRING, &bytes, &[], Endianness::LITTLE).is_err());

    // Invalid UTF-8.
    let bytes = [2, 0, 0, 0, 0xff, 0xfe, 0];
    assert!(unmarshal(Signature::STRING, &bytes, &[], Endianness::LITTLE).is_err());

    // Invalid boolean value.
    let bytes = [2, 0, 0, 0];
    assert!(unmarshal(Signature::BOOLEAN, &bytes, &[], Endianness::LITTLE).is_err());

    // File descriptor index out of bounds.
    let bytes = [1, 0, 0, 0];
    assert!(unmarshal(Signature::UNIX_FD, &bytes, &[], Endianness::LITTLE).is_err());

    // Array length runs past the buffer.
    let bytes = [16, 0, 0, 0, 1, 0, 0, 0];
    assert!(unmarshal(Signature::new("ai").unwrap(), &bytes, &[], Endianness::LITTLE).is_err());
}

#[test]
fn value_count_must_match_signature() {
    assert!(marshal(Signature::STRING, &[], Endianness::LITTLE).is_err());

    assert!(marshal(
        Signature::STRING,
        &[Value::from("a"), Value::from("b")],
        Endianness::LITTLE
    )
    .is_err());

    assert!(marshal(Signature::STRING, &[Value::Uint32(1)], Endianness::LITTLE).is_err());
}
