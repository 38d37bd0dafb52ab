use std::os::fd::RawFd;
use std::str;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::proto::{Endianness, Type};
use crate::signature::{self, Signature};
use crate::value::Value;

use super::{padding_to, MAX_ARRAY_LENGTH};

/// Decoder over a single alignment context.
///
/// Positions are absolute within the buffer, which must start at the
/// alignment origin of the encoded data.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    endianness: Endianness,
    fds: &'a [RawFd],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], fds: &'a [RawFd], endianness: Endianness) -> Self {
        Self {
            buf,
            pos: 0,
            endianness,
            fds,
        }
    }

    /// The current position in the buffer.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Skip ahead to the given absolute position.
    pub(crate) fn seek(&mut self, pos: usize) -> Result<()> {
        if pos < self.pos || pos > self.buf.len() {
            return Err(ErrorKind::BufferUnderflow.into());
        }

        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let Some(end) = self.pos.checked_add(n) else {
            return Err(ErrorKind::BufferUnderflow.into());
        };

        if end > self.buf.len() {
            return Err(ErrorKind::BufferUnderflow.into());
        }

        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skip padding up to the given alignment.
    pub(crate) fn align(&mut self, align: usize) -> Result<()> {
        let padding = padding_to(self.pos, align);
        self.take(padding)?;
        Ok(())
    }

    pub(crate) fn load_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn load_u16(&mut self) -> Result<u16> {
        self.align(2)?;
        let bytes = self.take(2)?;

        Ok(match self.endianness {
            Endianness::BIG => BigEndian::read_u16(bytes),
            _ => LittleEndian::read_u16(bytes),
        })
    }

    pub(crate) fn load_u32(&mut self) -> Result<u32> {
        self.align(4)?;
        let bytes = self.take(4)?;

        Ok(match self.endianness {
            Endianness::BIG => BigEndian::read_u32(bytes),
            _ => LittleEndian::read_u32(bytes),
        })
    }

    pub(crate) fn load_u64(&mut self) -> Result<u64> {
        self.align(8)?;
        let bytes = self.take(8)?;

        Ok(match self.endianness {
            Endianness::BIG => BigEndian::read_u64(bytes),
            _ => LittleEndian::read_u64(bytes),
        })
    }

    /// Read a length-prefixed, nul-terminated UTF-8 string.
    pub(crate) fn read_str(&mut self) -> Result<&'a str> {
        let len = self.load_u32()? as usize;
        let bytes = self.take(len)?;

        if self.take(1)?[0] != 0 {
            return Err(ErrorKind::NotNullTerminated.into());
        }

        Ok(str::from_utf8(bytes).map_err(Error::from)?)
    }

    /// Read a length-prefixed, nul-terminated signature.
    pub(crate) fn read_signature(&mut self) -> Result<&'a Signature> {
        let len = self.load_u8()? as usize;
        let bytes = self.take(len)?;

        if self.take(1)?[0] != 0 {
            return Err(ErrorKind::NotNullTerminated.into());
        }

        Ok(Signature::new(bytes)?)
    }

    /// Unmarshal a value sequence against a signature.
    pub(crate) fn unmarshal_seq(&mut self, signature: &Signature) -> Result<Vec<Value>> {
        let mut values = Vec::new();

        for ty in signature.iter() {
            values.push(self.read_type(&ty)?);
        }

        Ok(values)
    }

    /// Unmarshal one value against a single complete type.
    pub(crate) fn read_single(&mut self, signature: &Signature) -> Result<Value> {
        let Some(ty) = signature.iter().next() else {
            return Err(ErrorKind::SignatureMismatch("empty element signature".into()).into());
        };

        self.read_type(&ty)
    }

    fn read_type(&mut self, ty: &signature::Type<'_>) -> Result<Value> {
        Ok(match *ty {
            signature::Type::Basic(code) => self.read_basic(code)?,
            signature::Type::Variant => {
                let signature = self.read_signature()?;
                let mut it = signature.iter();

                if it.next().is_none() || it.next().is_some() {
                    return Err(ErrorKind::SignatureMismatch(
                        "variant signature must be a single complete type".into(),
                    )
                    .into());
                }

                Value::Variant(Box::new(self.read_single(signature)?))
            }
            signature::Type::Array(elem) => {
                let length = self.load_u32()?;

                if length > MAX_ARRAY_LENGTH {
                    return Err(ErrorKind::ArrayTooLong(length).into());
                }

                self.align(elem.alignment())?;

                let Some(end) = self.pos.checked_add(length as usize) else {
                    return Err(ErrorKind::BufferUnderflow.into());
                };

                if end > self.buf.len() {
                    return Err(ErrorKind::BufferUnderflow.into());
                }

                let mut values = Vec::new();

                while self.pos < end {
                    values.push(self.read_single(elem)?);
                }

                if self.pos != end {
                    return Err(ErrorKind::BufferUnderflow.into());
                }

                Value::Array {
                    elem: elem.to_owned(),
                    values,
                }
            }
            signature::Type::Struct(fields) => {
                self.align(8)?;
                Value::Struct(self.unmarshal_seq(fields)?)
            }
            signature::Type::Dict(key_ty, value_ty) => {
                self.align(8)?;
                let key = self.read_single(key_ty)?;
                let value = self.read_single(value_ty)?;
                Value::DictEntry(Box::new(key), Box::new(value))
            }
        })
    }

    fn read_basic(&mut self, code: Type) -> Result<Value> {
        Ok(match code {
            Type::BYTE => Value::Byte(self.load_u8()?),
            Type::BOOLEAN => match self.load_u32()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                raw => return Err(ErrorKind::InvalidBool(raw).into()),
            },
            Type::INT16 => Value::Int16(self.load_u16()? as i16),
            Type::UINT16 => Value::Uint16(self.load_u16()?),
            Type::INT32 => Value::Int32(self.load_u32()? as i32),
            Type::UINT32 => Value::Uint32(self.load_u32()?),
            Type::INT64 => Value::Int64(self.load_u64()? as i64),
            Type::UINT64 => Value::Uint64(self.load_u64()?),
            Type::DOUBLE => Value::Double(f64::from_bits(self.load_u64()?)),
            Type::STRING => Value::String(self.read_str()?.to_owned()),
            Type::OBJECT_PATH => {
                let path = self.read_str()?;
                Value::ObjectPath(ObjectPath::new(path)?.to_owned())
            }
            Type::SIGNATURE => Value::Signature(self.read_signature()?.to_owned()),
            Type::UNIX_FD => {
                let index = self.load_u32()?;

                let Some(fd) = self.fds.get(index as usize) else {
                    return Err(ErrorKind::InvalidFdIndex(index).into());
                };

                Value::Fd(*fd)
            }
            code => {
                return Err(
                    ErrorKind::SignatureMismatch(format!("unknown type code {code:?}").into())
                        .into(),
                )
            }
        })
    }
}
