//! Marshalling between value sequences and the binary wire format.
//!
//! The codec is driven by a [`Signature`]: every element aligns its start to
//! the natural alignment of its type, arrays carry 32-bit byte-length
//! prefixes, and unix file descriptors are collected out-of-band with a
//! 32-bit index placed in the stream.

use std::os::fd::RawFd;

use crate::error::Result;
use crate::proto::Endianness;
use crate::signature::Signature;
use crate::value::Value;

pub(crate) use self::writer::Writer;
mod writer;

pub(crate) use self::reader::Reader;
mod reader;

#[cfg(test)]
mod tests;

/// The maximum byte length of a marshalled array.
pub(crate) const MAX_ARRAY_LENGTH: u32 = 1 << 26;

/// The maximum byte length of a message body.
pub(crate) const MAX_BODY_LENGTH: u32 = 1 << 27;

/// The number of padding bytes needed to advance `len` to `align`.
pub(crate) fn padding_to(len: usize, align: usize) -> usize {
    (align - len % align) % align
}

/// Marshal a value sequence against a signature.
///
/// Returns the produced octet stream and the out-of-band file descriptor
/// list. Alignment is relative to the start of the produced stream.
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::{codec, Endianness, Signature, Value};
///
/// let (bytes, fds) = codec::marshal(
///     Signature::new("yu")?,
///     &[Value::Byte(0x10), Value::Uint32(42)],
///     Endianness::LITTLE,
/// )?;
///
/// assert_eq!(bytes, [0x10, 0, 0, 0, 42, 0, 0, 0]);
/// assert!(fds.is_empty());
/// # Ok::<_, tokio_dbus_client::Error>(())
/// ```
pub fn marshal(
    signature: &Signature,
    values: &[Value],
    endianness: Endianness,
) -> Result<(Vec<u8>, Vec<RawFd>)> {
    let mut buf = Vec::new();
    let mut fds = Vec::new();
    Writer::new(&mut buf, &mut fds, endianness).marshal_seq(signature, values)?;
    Ok((buf, fds))
}

/// Unmarshal a value sequence against a signature.
///
/// Returns the decoded values and the number of bytes consumed. Fails if a
/// declared length runs past the buffer or a string invariant is violated.
pub fn unmarshal(
    signature: &Signature,
    bytes: &[u8],
    fds: &[RawFd],
    endianness: Endianness,
) -> Result<(Vec<Value>, usize)> {
    let mut reader = Reader::new(bytes, fds, endianness);
    let values = reader.unmarshal_seq(signature)?;
    Ok((values, reader.pos()))
}
