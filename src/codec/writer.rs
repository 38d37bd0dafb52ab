use std::os::fd::RawFd;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, ErrorKind, Result};
use crate::proto::{Endianness, Type};
use crate::signature::{self, Signature};
use crate::value::Value;

use super::{padding_to, MAX_ARRAY_LENGTH};

/// Encoder for a single alignment context.
pub(crate) struct Writer<'a> {
    buf: &'a mut Vec<u8>,
    fds: &'a mut Vec<RawFd>,
    endianness: Endianness,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        buf: &'a mut Vec<u8>,
        fds: &'a mut Vec<RawFd>,
        endianness: Endianness,
    ) -> Self {
        Self {
            buf,
            fds,
            endianness,
        }
    }

    /// Zero-pad up to the given alignment, relative to the start of the
    /// buffer.
    pub(crate) fn align(&mut self, align: usize) {
        let padding = padding_to(self.buf.len(), align);
        self.buf.resize(self.buf.len() + padding, 0);
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn put_u16(&mut self, value: u16) {
        self.align(2);
        let mut bytes = [0; 2];
        match self.endianness {
            Endianness::BIG => BigEndian::write_u16(&mut bytes, value),
            _ => LittleEndian::write_u16(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.align(4);
        let mut bytes = [0; 4];
        match self.endianness {
            Endianness::BIG => BigEndian::write_u32(&mut bytes, value),
            _ => LittleEndian::write_u32(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    pub(crate) fn put_u64(&mut self, value: u64) {
        self.align(8);
        let mut bytes = [0; 8];
        match self.endianness {
            Endianness::BIG => BigEndian::write_u64(&mut bytes, value),
            _ => LittleEndian::write_u64(&mut bytes, value),
        }
        self.buf.extend_from_slice(&bytes);
    }

    pub(crate) fn patch_u32(&mut self, at: usize, value: u32) {
        let mut bytes = [0; 4];
        match self.endianness {
            Endianness::BIG => BigEndian::write_u32(&mut bytes, value),
            _ => LittleEndian::write_u32(&mut bytes, value),
        }
        self.buf[at..at + 4].copy_from_slice(&bytes);
    }

    /// A 32-bit length, the UTF-8 bytes, and a trailing NUL which is not
    /// counted in the length.
    pub(crate) fn write_str(&mut self, string: &str) {
        self.put_u32(string.len() as u32);
        self.buf.extend_from_slice(string.as_bytes());
        self.buf.push(0);
    }

    /// An 8-bit length, the signature bytes, and a trailing NUL.
    pub(crate) fn write_signature(&mut self, signature: &Signature) {
        self.put_u8(signature.len() as u8);
        self.buf.extend_from_slice(signature.as_bytes());
        self.buf.push(0);
    }

    /// Marshal a value sequence against a signature.
    pub(crate) fn marshal_seq(&mut self, signature: &Signature, values: &[Value]) -> Result<()> {
        let mut values = values.iter();

        for ty in signature.iter() {
            let Some(value) = values.next() else {
                return Err(mismatch(signature, "value sequence is shorter than signature"));
            };

            self.marshal_type(&ty, value)?;
        }

        if values.next().is_some() {
            return Err(mismatch(signature, "value sequence is longer than signature"));
        }

        Ok(())
    }

    /// Marshal one value against a single complete type.
    fn marshal_single(&mut self, signature: &Signature, value: &Value) -> Result<()> {
        let Some(ty) = signature.iter().next() else {
            return Err(mismatch(signature, "empty element signature"));
        };

        self.marshal_type(&ty, value)
    }

    fn marshal_type(&mut self, ty: &signature::Type<'_>, value: &Value) -> Result<()> {
        match (ty, value) {
            (signature::Type::Basic(code), value) => self.marshal_basic(*code, value),
            (signature::Type::Variant, Value::Variant(inner)) => {
                let signature = inner.signature()?;
                self.write_signature(&signature);
                self.marshal_single(&signature, inner)
            }
            (
                signature::Type::Array(elem),
                Value::Array {
                    elem: value_elem,
                    values,
                },
            ) => {
                if **value_elem != **elem {
                    return Err(mismatch(elem, "array element signature differs"));
                }

                self.align(4);
                let length_at = self.buf.len();
                self.put_u32(0);
                self.align(elem.alignment());
                let start = self.buf.len();

                for value in values {
                    self.marshal_single(elem, value)?;
                }

                let length = (self.buf.len() - start) as u32;

                if length > MAX_ARRAY_LENGTH {
                    return Err(ErrorKind::ArrayTooLong(length).into());
                }

                self.patch_u32(length_at, length);
                Ok(())
            }
            (signature::Type::Struct(fields), Value::Struct(values)) => {
                self.align(8);
                self.marshal_seq(fields, values)
            }
            (signature::Type::Dict(key_ty, value_ty), Value::DictEntry(key, value)) => {
                self.align(8);
                self.marshal_single(key_ty, key)?;
                self.marshal_single(value_ty, value)
            }
            (ty, value) => Err(Error::from(ErrorKind::SignatureMismatch(
                format!("cannot marshal {value} as {ty:?}").into(),
            ))),
        }
    }

    fn marshal_basic(&mut self, code: Type, value: &Value) -> Result<()> {
        match (code, value) {
            (Type::BYTE, Value::Byte(v)) => self.put_u8(*v),
            (Type::BOOLEAN, Value::Bool(v)) => self.put_u32(*v as u32),
            (Type::INT16, Value::Int16(v)) => self.put_u16(*v as u16),
            (Type::UINT16, Value::Uint16(v)) => self.put_u16(*v),
            (Type::INT32, Value::Int32(v)) => self.put_u32(*v as u32),
            (Type::UINT32, Value::Uint32(v)) => self.put_u32(*v),
            (Type::INT64, Value::Int64(v)) => self.put_u64(*v as u64),
            (Type::UINT64, Value::Uint64(v)) => self.put_u64(*v),
            (Type::DOUBLE, Value::Double(v)) => self.put_u64(v.to_bits()),
            (Type::STRING, Value::String(v)) => self.write_str(v),
            (Type::OBJECT_PATH, Value::ObjectPath(v)) => self.write_str(v.as_str()),
            (Type::SIGNATURE, Value::Signature(v)) => self.write_signature(v),
            (Type::UNIX_FD, Value::Fd(fd)) => {
                let index = self.fds.len() as u32;
                self.fds.push(*fd);
                self.put_u32(index);
            }
            (code, value) => {
                return Err(Error::from(ErrorKind::SignatureMismatch(
                    format!("cannot marshal {value} as {code:?}").into(),
                )))
            }
        }

        Ok(())
    }
}

fn mismatch(signature: &Signature, what: &str) -> Error {
    Error::from(ErrorKind::SignatureMismatch(
        format!("{what} (signature `{signature}`)").into(),
    ))
}
