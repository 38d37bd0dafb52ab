//! Framing of whole messages: the fixed header, the header-field array and
//! the body.
//!
//! A message is a fixed 12-byte prefix (endianness marker, type, flags,
//! protocol version, body length, serial), followed by an `a(yv)` array of
//! optional header fields keyed by small integer codes, padding to an 8-byte
//! boundary, and the body.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::codec::{padding_to, Reader, Writer, MAX_ARRAY_LENGTH, MAX_BODY_LENGTH};
use crate::error::{ErrorKind, Result};
use crate::message::{Message, MessageKind};
use crate::object_path::OwnedObjectPath;
use crate::proto::{Endianness, Flags, HeaderField, MessageType};
use crate::signature::{Signature, SignatureBuf};
use crate::value::Value;

/// The D-Bus major protocol version spoken by this crate.
const PROTOCOL_VERSION: u8 = 1;

/// The fixed header prefix plus the header-field array length.
const FIXED_HEADER: usize = 16;

/// Marshal a whole message using the given serial.
///
/// Returns the message bytes and the file descriptors to transfer alongside
/// the first byte of the message.
pub fn marshal(
    message: &Message,
    serial: NonZeroU32,
    endianness: Endianness,
) -> Result<(Vec<u8>, Vec<RawFd>)> {
    if matches!(message.kind, MessageKind::Signal { .. }) && message.interface.is_none() {
        return Err(ErrorKind::MissingInterface.into());
    }

    let (body, fds) = crate::codec::marshal(&message.signature, &message.body, endianness)?;

    let Ok(body_length) = u32::try_from(body.len()) else {
        return Err(ErrorKind::BodyTooLong(u32::MAX).into());
    };

    if body_length > MAX_BODY_LENGTH {
        return Err(ErrorKind::BodyTooLong(body_length).into());
    }

    let mut buf = Vec::new();
    let mut header_fds = Vec::new();
    let mut w = Writer::new(&mut buf, &mut header_fds, endianness);

    w.put_u8(endianness.0);
    w.put_u8(message.message_type().0);
    w.put_u8(message.flags.0);
    w.put_u8(PROTOCOL_VERSION);
    w.put_u32(body_length);
    w.put_u32(serial.get());

    let length_at = w.len();
    w.put_u32(0);
    w.align(8);
    let fields_start = w.len();

    match &message.kind {
        MessageKind::MethodCall { path, member } => {
            field_str(&mut w, HeaderField::PATH, Signature::OBJECT_PATH, path.as_str());
            field_str(&mut w, HeaderField::MEMBER, Signature::STRING, member);
        }
        MessageKind::MethodReturn { reply_serial } => {
            field_u32(&mut w, HeaderField::REPLY_SERIAL, reply_serial.get());
        }
        MessageKind::Error {
            error_name,
            reply_serial,
        } => {
            field_str(&mut w, HeaderField::ERROR_NAME, Signature::STRING, error_name);
            field_u32(&mut w, HeaderField::REPLY_SERIAL, reply_serial.get());
        }
        MessageKind::Signal { path, member } => {
            field_str(&mut w, HeaderField::PATH, Signature::OBJECT_PATH, path.as_str());
            field_str(&mut w, HeaderField::MEMBER, Signature::STRING, member);
        }
    }

    if let Some(interface) = &message.interface {
        field_str(&mut w, HeaderField::INTERFACE, Signature::STRING, interface);
    }

    if let Some(destination) = &message.destination {
        field_str(&mut w, HeaderField::DESTINATION, Signature::STRING, destination);
    }

    if let Some(sender) = &message.sender {
        field_str(&mut w, HeaderField::SENDER, Signature::STRING, sender);
    }

    if !message.signature.is_empty() {
        field_signature(&mut w, HeaderField::SIGNATURE, &message.signature);
    }

    if !fds.is_empty() {
        field_u32(&mut w, HeaderField::UNIX_FDS, fds.len() as u32);
    }

    let fields_length = (w.len() - fields_start) as u32;

    if fields_length > MAX_ARRAY_LENGTH {
        return Err(ErrorKind::ArrayTooLong(fields_length).into());
    }

    w.patch_u32(length_at, fields_length);
    w.align(8);

    buf.extend_from_slice(&body);
    Ok((buf, fds))
}

fn field_str(w: &mut Writer<'_>, field: HeaderField, signature: &Signature, value: &str) {
    w.align(8);
    w.put_u8(field.0);
    w.write_signature(signature);
    w.write_str(value);
}

fn field_u32(w: &mut Writer<'_>, field: HeaderField, value: u32) {
    w.align(8);
    w.put_u8(field.0);
    w.write_signature(Signature::UINT32);
    w.put_u32(value);
}

fn field_signature(w: &mut Writer<'_>, field: HeaderField, value: &Signature) {
    w.align(8);
    w.put_u8(field.0);
    w.write_signature(Signature::SIGNATURE);
    w.write_signature(value);
}

/// Unmarshal one whole message from the front of `buf`.
///
/// Returns `None` if a full message is not yet present, leaving `buf`
/// untouched so the caller can keep reading. On success, returns the message
/// and the number of bytes it occupied; file descriptors declared by the
/// message are taken from the front of `fds`.
pub fn unmarshal(buf: &[u8], fds: &mut VecDeque<OwnedFd>) -> Result<Option<(Message, usize)>> {
    if buf.len() < FIXED_HEADER {
        return Ok(None);
    }

    let endianness = match buf[0] {
        b'l' => Endianness::LITTLE,
        b'B' => Endianness::BIG,
        raw => return Err(ErrorKind::InvalidEndianness(raw).into()),
    };

    let message_type = buf[1];
    let flags = Flags(buf[2]);

    if buf[3] != PROTOCOL_VERSION {
        return Err(ErrorKind::InvalidProtocolVersion(buf[3]).into());
    }

    let mut r = Reader::new(buf, &[], endianness);
    r.seek(4)?;
    let body_length = r.load_u32()?;
    let serial = r.load_u32()?;
    let fields_length = r.load_u32()?;

    if body_length > MAX_BODY_LENGTH {
        return Err(ErrorKind::BodyTooLong(body_length).into());
    }

    if fields_length > MAX_ARRAY_LENGTH {
        return Err(ErrorKind::ArrayTooLong(fields_length).into());
    }

    let header_end = FIXED_HEADER + fields_length as usize;
    let total = header_end + padding_to(header_end, 8) + body_length as usize;

    if buf.len() < total {
        return Ok(None);
    }

    let Some(serial) = NonZeroU32::new(serial) else {
        return Err(ErrorKind::ZeroSerial.into());
    };

    let mut path = None::<OwnedObjectPath>;
    let mut interface = None::<String>;
    let mut member = None::<String>;
    let mut error_name = None::<String>;
    let mut reply_serial = None::<u32>;
    let mut destination = None::<String>;
    let mut sender = None::<String>;
    let mut signature = SignatureBuf::empty();
    let mut unix_fds = 0u32;

    while r.pos() < header_end {
        r.align(8)?;

        if r.pos() >= header_end {
            break;
        }

        let field = HeaderField(r.load_u8()?);
        let value_signature = r.read_signature()?;

        let mut it = value_signature.iter();

        if it.next().is_none() || it.next().is_some() {
            return Err(ErrorKind::InvalidHeaderField(field).into());
        }

        let value = r.read_single(value_signature)?;

        match (field, value) {
            (HeaderField::PATH, Value::ObjectPath(value)) => path = Some(value),
            (HeaderField::INTERFACE, Value::String(value)) => interface = Some(value),
            (HeaderField::MEMBER, Value::String(value)) => member = Some(value),
            (HeaderField::ERROR_NAME, Value::String(value)) => error_name = Some(value),
            (HeaderField::REPLY_SERIAL, Value::Uint32(value)) => reply_serial = Some(value),
            (HeaderField::DESTINATION, Value::String(value)) => destination = Some(value),
            (HeaderField::SENDER, Value::String(value)) => sender = Some(value),
            (HeaderField::SIGNATURE, Value::Signature(value)) => signature = value,
            (HeaderField::UNIX_FDS, Value::Uint32(value)) => unix_fds = value,
            (
                HeaderField::PATH
                | HeaderField::INTERFACE
                | HeaderField::MEMBER
                | HeaderField::ERROR_NAME
                | HeaderField::REPLY_SERIAL
                | HeaderField::DESTINATION
                | HeaderField::SENDER
                | HeaderField::SIGNATURE
                | HeaderField::UNIX_FDS,
                _,
            ) => return Err(ErrorKind::InvalidHeaderField(field).into()),
            // Unknown header fields must be ignored.
            _ => {}
        }
    }

    if r.pos() != header_end {
        return Err(ErrorKind::BufferUnderflow.into());
    }

    let unix_fds = unix_fds as usize;

    if fds.len() < unix_fds {
        return Err(ErrorKind::MissingFds(unix_fds as u32).into());
    }

    let owned_fds = fds.drain(..unix_fds).collect::<Vec<OwnedFd>>();
    let raw_fds = owned_fds.iter().map(AsRawFd::as_raw_fd).collect::<Vec<RawFd>>();

    let mut br = Reader::new(buf, &raw_fds, endianness);
    br.seek(header_end)?;
    br.align(8)?;
    let body_start = br.pos();
    let body = br.unmarshal_seq(&signature)?;

    if br.pos() - body_start != body_length as usize {
        return Err(ErrorKind::TrailingBodyBytes.into());
    }

    let reply_serial = match reply_serial {
        Some(raw) => match NonZeroU32::new(raw) {
            Some(serial) => Some(serial),
            None => return Err(ErrorKind::ZeroReplySerial.into()),
        },
        None => None,
    };

    let kind = match MessageType(message_type) {
        MessageType::METHOD_CALL => MessageKind::MethodCall {
            path: path.ok_or(ErrorKind::MissingPath)?,
            member: member.ok_or(ErrorKind::MissingMember)?,
        },
        MessageType::METHOD_RETURN => MessageKind::MethodReturn {
            reply_serial: reply_serial.ok_or(ErrorKind::MissingReplySerial)?,
        },
        MessageType::ERROR => MessageKind::Error {
            error_name: error_name.ok_or(ErrorKind::MissingErrorName)?,
            reply_serial: reply_serial.ok_or(ErrorKind::MissingReplySerial)?,
        },
        MessageType::SIGNAL => {
            if interface.is_none() {
                return Err(ErrorKind::MissingInterface.into());
            }

            MessageKind::Signal {
                path: path.ok_or(ErrorKind::MissingPath)?,
                member: member.ok_or(ErrorKind::MissingMember)?,
            }
        }
        _ => return Err(ErrorKind::InvalidMessageType(message_type).into()),
    };

    let message = Message {
        kind,
        serial: Some(serial),
        flags,
        interface,
        destination,
        sender,
        signature,
        body,
        fds: owned_fds,
    };

    Ok(Some((message, total)))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::num::NonZeroU32;

    use crate::{Endianness, Flags, Message, MessageKind, Signature, Value};

    fn serial(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn roundtrip(message: &Message, n: u32) -> Message {
        let (bytes, _) = super::marshal(message, serial(n), Endianness::LITTLE).unwrap();
        let mut fds = VecDeque::new();

        let (decoded, total) = super::unmarshal(&bytes, &mut fds)
            .unwrap()
            .expect("message should be complete");

        assert_eq!(total, bytes.len());
        decoded
    }

    #[test]
    fn method_call_roundtrip() {
        let m = Message::method_call("/org/example", "Echo")
            .unwrap()
            .with_destination("org.example")
            .with_interface("org.example.I")
            .with_body(Signature::STRING, vec![Value::from("hi")]);

        let decoded = roundtrip(&m, 2);

        assert!(matches!(decoded.kind(), MessageKind::MethodCall { .. }));
        assert_eq!(decoded.path().map(|p| p.as_str()), Some("/org/example"));
        assert_eq!(decoded.member(), Some("Echo"));
        assert_eq!(decoded.serial(), Some(serial(2)));
        assert_eq!(decoded.destination(), Some("org.example"));
        assert_eq!(decoded.interface(), Some("org.example.I"));
        assert_eq!(decoded.body(), [Value::from("hi")]);
    }

    #[test]
    fn reply_roundtrips() {
        let call = Message::method_call("/org/example", "Echo")
            .unwrap()
            .with_sender(":1.7")
            .with_serial(serial(9));

        let reply = call
            .method_return()
            .unwrap()
            .with_body(Signature::UINT32, vec![Value::Uint32(42)]);

        let decoded = roundtrip(&reply, 10);
        assert_eq!(decoded.reply_serial(), Some(serial(9)));
        assert_eq!(decoded.destination(), Some(":1.7"));
        assert_eq!(decoded.body(), [Value::Uint32(42)]);

        let error = call
            .error_reply("org.example.Fail")
            .unwrap()
            .with_body(Signature::STRING, vec![Value::from("nope")]);

        let decoded = roundtrip(&error, 11);
        assert_eq!(decoded.error_name(), Some("org.example.Fail"));
        assert_eq!(decoded.reply_serial(), Some(serial(9)));
    }

    #[test]
    fn signal_roundtrip() {
        let m = Message::signal("/s", "Ev")
            .unwrap()
            .with_interface("org.example.S")
            .with_flags(Flags::NO_REPLY_EXPECTED)
            .with_body(Signature::INT32, vec![Value::Int32(1)]);

        let decoded = roundtrip(&m, 3);

        assert!(matches!(decoded.kind(), MessageKind::Signal { .. }));
        assert_eq!(decoded.path().map(|p| p.as_str()), Some("/s"));
        assert_eq!(decoded.member(), Some("Ev"));
        assert_eq!(decoded.interface(), Some("org.example.S"));
        assert!(decoded.flags() & Flags::NO_REPLY_EXPECTED);
    }

    #[test]
    fn signal_requires_interface() {
        let m = Message::signal("/s", "Ev").unwrap();
        assert!(super::marshal(&m, serial(1), Endianness::LITTLE).is_err());
    }

    #[test]
    fn incomplete_buffer_is_kept() {
        let m = Message::method_call("/org/example", "Echo")
            .unwrap()
            .with_body(Signature::STRING, vec![Value::from("hi")]);

        let (bytes, _) = super::marshal(&m, serial(1), Endianness::LITTLE).unwrap();
        let mut fds = VecDeque::new();

        for n in 0..bytes.len() {
            assert!(
                super::unmarshal(&bytes[..n], &mut fds).unwrap().is_none(),
                "unexpected message at {n} of {}",
                bytes.len()
            );
        }

        assert!(super::unmarshal(&bytes, &mut fds).unwrap().is_some());
    }

    #[test]
    fn two_messages_in_one_buffer() {
        let first = Message::signal("/a", "One")
            .unwrap()
            .with_interface("org.example.S");
        let second = Message::signal("/b", "Two")
            .unwrap()
            .with_interface("org.example.S")
            .with_body(Signature::UINT32, vec![Value::Uint32(2)]);

        let (mut bytes, _) = super::marshal(&first, serial(1), Endianness::LITTLE).unwrap();
        let (tail, _) = super::marshal(&second, serial(2), Endianness::LITTLE).unwrap();
        bytes.extend_from_slice(&tail);

        let mut fds = VecDeque::new();
        let (one, consumed) = super::unmarshal(&bytes, &mut fds).unwrap().unwrap();
        assert_eq!(one.member(), Some("One"));

        let (two, rest) = super::unmarshal(&bytes[consumed..], &mut fds).unwrap().unwrap();
        assert_eq!(two.member(), Some("Two"));
        assert_eq!(consumed + rest, bytes.len());
    }

    #[test]
    fn zero_serial_is_rejected() {
        let m = Message::signal("/s", "Ev")
            .unwrap()
            .with_interface("org.example.S");

        let (mut bytes, _) = super::marshal(&m, serial(1), Endianness::LITTLE).unwrap();
        // Zero out the serial field.
        bytes[8..12].fill(0);

        let mut fds = VecDeque::new();
        assert!(super::unmarshal(&bytes, &mut fds).is_err());
    }

    #[test]
    fn big_endian_messages_are_accepted() {
        let m = Message::method_call("/org/example", "Echo")
            .unwrap()
            .with_body(Signature::new("su").unwrap(), vec![Value::from("x"), Value::Uint32(7)]);

        let (bytes, _) = super::marshal(&m, serial(4), Endianness::BIG).unwrap();
        let mut fds = VecDeque::new();

        let (decoded, _) = super::unmarshal(&bytes, &mut fds).unwrap().unwrap();
        assert_eq!(decoded.serial(), Some(serial(4)));
        assert_eq!(decoded.body(), [Value::from("x"), Value::Uint32(7)]);
    }
}
