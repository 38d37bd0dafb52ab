//! The dynamically typed value tree used for message bodies.

use std::fmt;
use std::os::fd::RawFd;

use crate::object_path::OwnedObjectPath;
use crate::signature::{Signature, SignatureBuf, SignatureError};

/// A single D-Bus value.
///
/// A message body is an ordered sequence of values whose shape is given by
/// the body signature. Every wire type has a constructor here, including the
/// recursive containers.
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::{Signature, Value};
///
/// let value = Value::from("Hello World!");
/// assert_eq!(*value.signature()?, *Signature::STRING);
///
/// let dict = Value::dict(Signature::STRING, Signature::VARIANT, []);
/// assert_eq!(value.as_str(), Some("Hello World!"));
/// assert_eq!(dict.signature()?, "a{sv}");
/// # Ok::<_, tokio_dbus_client::SignatureError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// 8-bit unsigned integer (`y`).
    Byte(u8),
    /// Boolean (`b`).
    Bool(bool),
    /// 16-bit signed integer (`n`).
    Int16(i16),
    /// 16-bit unsigned integer (`q`).
    Uint16(u16),
    /// 32-bit signed integer (`i`).
    Int32(i32),
    /// 32-bit unsigned integer (`u`).
    Uint32(u32),
    /// 64-bit signed integer (`x`).
    Int64(i64),
    /// 64-bit unsigned integer (`t`).
    Uint64(u64),
    /// IEEE 754 double (`d`).
    Double(f64),
    /// UTF-8 string (`s`).
    String(String),
    /// Object path (`o`).
    ObjectPath(OwnedObjectPath),
    /// Type signature (`g`).
    Signature(SignatureBuf),
    /// Unix file descriptor (`h`).
    ///
    /// On the wire this is a 32-bit index into the out-of-band descriptor
    /// array of the message. For outgoing messages the descriptor must stay
    /// open until the send has completed; for incoming messages the
    /// descriptor is owned by the [`Message`] the value was read from.
    ///
    /// [`Message`]: crate::Message
    Fd(RawFd),
    /// Array (`a`). The element signature is carried explicitly so that
    /// empty arrays stay typed.
    Array {
        /// The signature of a single element.
        elem: SignatureBuf,
        /// The elements of the array.
        values: Vec<Value>,
    },
    /// Struct (`(...)`).
    Struct(Vec<Value>),
    /// Dict entry (`{kv}`). Only valid as an array element.
    DictEntry(Box<Value>, Box<Value>),
    /// Variant (`v`), a self-describing value.
    Variant(Box<Value>),
}

impl Value {
    /// Construct an array value over the given element signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_client::{Signature, Value};
    ///
    /// let array = Value::array(Signature::INT32, [Value::Int32(1), Value::Int32(2)]);
    /// assert_eq!(array.signature()?, "ai");
    /// # Ok::<_, tokio_dbus_client::SignatureError>(())
    /// ```
    pub fn array<I>(elem: &Signature, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::Array {
            elem: elem.to_owned(),
            values: values.into_iter().collect(),
        }
    }

    /// Construct a dictionary, an array of dict entries.
    pub fn dict<I>(key: &Signature, value: &Signature, entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let mut elem = String::with_capacity(key.len() + value.len() + 2);
        elem.push('{');
        elem.push_str(key.as_str());
        elem.push_str(value.as_str());
        elem.push('}');

        Self::Array {
            // SAFETY: A dict entry over two valid complete types is a valid
            // array element signature.
            elem: unsafe { Signature::new_unchecked(elem.as_bytes()) }.to_owned(),
            values: entries
                .into_iter()
                .map(|(k, v)| Value::DictEntry(Box::new(k), Box::new(v)))
                .collect(),
        }
    }

    /// Construct a variant wrapping the given value.
    pub fn variant(value: Value) -> Self {
        Self::Variant(Box::new(value))
    }

    /// The signature this value marshals as.
    ///
    /// Fails if the tree nests deeper than the signature grammar allows.
    pub fn signature(&self) -> Result<SignatureBuf, SignatureError> {
        let mut out = String::new();
        self.write_signature(&mut out);
        Ok(Signature::new(&out)?.to_owned())
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            Value::Byte(..) => out.push('y'),
            Value::Bool(..) => out.push('b'),
            Value::Int16(..) => out.push('n'),
            Value::Uint16(..) => out.push('q'),
            Value::Int32(..) => out.push('i'),
            Value::Uint32(..) => out.push('u'),
            Value::Int64(..) => out.push('x'),
            Value::Uint64(..) => out.push('t'),
            Value::Double(..) => out.push('d'),
            Value::String(..) => out.push('s'),
            Value::ObjectPath(..) => out.push('o'),
            Value::Signature(..) => out.push('g'),
            Value::Fd(..) => out.push('h'),
            Value::Array { elem, .. } => {
                out.push('a');
                out.push_str(elem.as_str());
            }
            Value::Struct(fields) => {
                out.push('(');

                for field in fields {
                    field.write_signature(out);
                }

                out.push(')');
            }
            Value::DictEntry(key, value) => {
                out.push('{');
                key.write_signature(out);
                value.write_signature(out);
                out.push('}');
            }
            Value::Variant(..) => out.push('v'),
        }
    }

    /// Get the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::ObjectPath(p) => Some(p.as_str()),
            Value::Signature(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Get the value as a `u32`, if it is one.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::Uint32(n) => Some(n),
            _ => None,
        }
    }

    /// Get the value as an `i32`, if it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Int32(n) => Some(n),
            _ => None,
        }
    }

    /// Get the value as a `u64`, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Uint64(n) => Some(n),
            _ => None,
        }
    }

    /// Get the inner value of a variant, if this is one.
    pub fn as_variant(&self) -> Option<&Value> {
        match self {
            Value::Variant(inner) => Some(inner),
            _ => None,
        }
    }

    /// Unwrap a variant into its inner value, returning other values as-is.
    pub fn into_variant(self) -> Value {
        match self {
            Value::Variant(inner) => *inner,
            other => other,
        }
    }

    /// Get the elements of an array, if this is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array { values, .. } => Some(values),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<u32> for Value {
    #[inline]
    fn from(value: u32) -> Self {
        Value::Uint32(value)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => v.fmt(f),
            Value::Bool(v) => v.fmt(f),
            Value::Int16(v) => v.fmt(f),
            Value::Uint16(v) => v.fmt(f),
            Value::Int32(v) => v.fmt(f),
            Value::Uint32(v) => v.fmt(f),
            Value::Int64(v) => v.fmt(f),
            Value::Uint64(v) => v.fmt(f),
            Value::Double(v) => v.fmt(f),
            Value::String(v) => write!(f, "{v:?}"),
            Value::ObjectPath(v) => write!(f, "{v}"),
            Value::Signature(v) => write!(f, "{v}"),
            Value::Fd(v) => write!(f, "fd({v})"),
            Value::Array { values, .. } => {
                let mut entries = f.debug_list();

                for value in values {
                    entries.entry(&format_args!("{value}"));
                }

                entries.finish()
            }
            Value::Struct(fields) => {
                let mut entries = f.debug_list();

                for field in fields {
                    entries.entry(&format_args!("{field}"));
                }

                entries.finish()
            }
            Value::DictEntry(key, value) => write!(f, "{key}: {value}"),
            Value::Variant(inner) => write!(f, "variant({inner})"),
        }
    }
}
