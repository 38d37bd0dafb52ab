//! D-Bus type signatures and their validation.

use std::borrow::Borrow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::str::from_utf8_unchecked;

use crate::proto;

pub(crate) use self::iter::{Iter, Type};
mod iter;

use self::validation::validate;
mod validation;


/// The maximum length of a signature in bytes.
pub(crate) const MAX_SIGNATURE: usize = 255;

/// The maximum nesting depth of a single container kind.
pub(crate) const MAX_CONTAINER_DEPTH: usize = 32;

/// The maximum total nesting depth of containers.
pub(crate) const MAX_DEPTH: usize = MAX_CONTAINER_DEPTH * 2;

/// A borrowed D-Bus signature.
///
/// A signature describes the shape of a value sequence over the wire-type
/// alphabet. The owned variant is [`SignatureBuf`].
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"a{sv}");
///
/// assert!(Signature::new("aai").is_ok());
/// assert!(Signature::new("a").is_err());
/// ```
#[derive(PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// The signature of a single byte.
    pub const BYTE: &'static Signature = Signature::new_const(b"y");

    /// The signature of a boolean.
    pub const BOOLEAN: &'static Signature = Signature::new_const(b"b");

    /// The signature of a 16-bit signed integer.
    pub const INT16: &'static Signature = Signature::new_const(b"n");

    /// The signature of a 16-bit unsigned integer.
    pub const UINT16: &'static Signature = Signature::new_const(b"q");

    /// The signature of a 32-bit signed integer.
    pub const INT32: &'static Signature = Signature::new_const(b"i");

    /// The signature of a 32-bit unsigned integer.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// The signature of a 64-bit signed integer.
    pub const INT64: &'static Signature = Signature::new_const(b"x");

    /// The signature of a 64-bit unsigned integer.
    pub const UINT64: &'static Signature = Signature::new_const(b"t");

    /// The signature of an IEEE 754 double.
    pub const DOUBLE: &'static Signature = Signature::new_const(b"d");

    /// The signature of a nul-terminated string.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// The signature of an object path.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// The signature of a signature.
    pub const SIGNATURE: &'static Signature = Signature::new_const(b"g");

    /// The signature of a variant value.
    pub const VARIANT: &'static Signature = Signature::new_const(b"v");

    /// The signature of a unix file descriptor.
    pub const UNIX_FD: &'static Signature = Signature::new_const(b"h");

    /// Construct a new signature with validation inside of a constant
    /// context.
    ///
    /// This will panic in case the signature is invalid.
    ///
    /// ```compile_fail
    /// use tokio_dbus_client::Signature;
    ///
    /// const BAD: &Signature = Signature::new_const(b"(a)");
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_client::Signature;
    ///
    /// const SIG: &Signature = Signature::new_const(b"i(ai)");
    /// ```
    #[track_caller]
    pub const fn new_const(signature: &[u8]) -> &Signature {
        if validate(signature).is_err() {
            panic!("Invalid D-Bus signature");
        }

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Self::new_unchecked(signature) }
    }

    /// Try to construct a new signature with validation.
    pub fn new<S>(signature: &S) -> Result<&Signature, SignatureError>
    where
        S: ?Sized + AsRef<[u8]>,
    {
        let signature = signature.as_ref();
        validate(signature)?;
        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Ok(Self::new_unchecked(signature)) }
    }

    /// Construct a new signature without validation.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the signature is valid.
    pub(crate) const unsafe fn new_unchecked(signature: &[u8]) -> &Self {
        &*(signature as *const _ as *const Signature)
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the length of the signature in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures the signature is ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the signature as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Iterate over the single complete types of the signature.
    #[inline]
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// The natural alignment of the first complete type, in bytes.
    pub(crate) fn alignment(&self) -> usize {
        match self.0.first() {
            Some(&b) => proto::Type::new(b).alignment(),
            None => 1,
        }
    }
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl ToOwned for Signature {
    type Owned = SignatureBuf;

    #[inline]
    fn to_owned(&self) -> SignatureBuf {
        SignatureBuf(self.as_str().to_owned())
    }
}

impl PartialEq<str> for Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<str> for &Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<&str> for Signature {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<SignatureBuf> for Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        self.0 == *other.0.as_bytes()
    }
}

impl PartialEq<SignatureBuf> for &Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        self.0 == *other.0.as_bytes()
    }
}

/// An owned D-Bus signature.
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::{Signature, SignatureBuf};
///
/// let sig = SignatureBuf::new("a{sv}")?;
/// assert_eq!(&*sig, Signature::new("a{sv}")?);
/// # Ok::<_, tokio_dbus_client::SignatureError>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBuf(String);

impl SignatureBuf {
    /// Construct a new empty signature.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Construct a new owned signature with validation.
    pub fn new<S>(signature: &S) -> Result<Self, SignatureError>
    where
        S: ?Sized + AsRef<[u8]>,
    {
        Ok(Signature::new(signature)?.to_owned())
    }
}

impl Deref for SignatureBuf {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Signature {
        // SAFETY: The contents were validated at construction.
        unsafe { Signature::new_unchecked(self.0.as_bytes()) }
    }
}

impl Borrow<Signature> for SignatureBuf {
    #[inline]
    fn borrow(&self) -> &Signature {
        self
    }
}

impl AsRef<Signature> for SignatureBuf {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl Hash for SignatureBuf {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}

impl From<&Signature> for SignatureBuf {
    #[inline]
    fn from(signature: &Signature) -> Self {
        signature.to_owned()
    }
}

impl PartialEq<Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        *self.0.as_bytes() == other.0
    }
}

impl PartialEq<&Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &&Signature) -> bool {
        *self.0.as_bytes() == other.0
    }
}

impl PartialEq<str> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detailed errors raised when validation of a [`Signature`] fails.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureError {
    pub(super) kind: SignatureErrorKind,
}

impl SignatureError {
    pub(crate) const fn new(kind: SignatureErrorKind) -> Self {
        Self { kind }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SignatureErrorKind {
    UnknownTypeCode(proto::Type),
    SignatureTooLong,
    MissingArrayElementType,
    StructEndedButNotStarted,
    DictEndedButNotStarted,
    StructStartedButNotEnded,
    DictStartedButNotEnded,
    StructHasNoFields,
    DictKeyMustBeBasicType,
    DictEntryHasNoFields,
    DictEntryHasOnlyOneField,
    DictEntryNotInsideArray,
    DictEntryHasTooManyFields,
    ExceededMaximumArrayRecursion,
    ExceededMaximumStructRecursion,
    ExceededMaximumDictRecursion,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignatureErrorKind::UnknownTypeCode(code) => {
                write!(f, "Unknown type code: {code:?}")
            }
            SignatureErrorKind::SignatureTooLong => {
                write!(f, "Signature too long")
            }
            SignatureErrorKind::MissingArrayElementType => {
                write!(f, "Missing array element type")
            }
            SignatureErrorKind::StructEndedButNotStarted => {
                write!(f, "Struct ended but not started")
            }
            SignatureErrorKind::DictEndedButNotStarted => {
                write!(f, "Dict ended but not started")
            }
            SignatureErrorKind::StructStartedButNotEnded => {
                write!(f, "Struct started but not ended")
            }
            SignatureErrorKind::DictStartedButNotEnded => {
                write!(f, "Dict started but not ended")
            }
            SignatureErrorKind::StructHasNoFields => {
                write!(f, "Struct has no fields")
            }
            SignatureErrorKind::DictKeyMustBeBasicType => {
                write!(f, "Dict key must be basic type")
            }
            SignatureErrorKind::DictEntryHasNoFields => {
                write!(f, "Dict entry has no fields")
            }
            SignatureErrorKind::DictEntryHasOnlyOneField => {
                write!(f, "Dict entry has only one field")
            }
            SignatureErrorKind::DictEntryNotInsideArray => {
                write!(f, "Dict entry not inside array")
            }
            SignatureErrorKind::DictEntryHasTooManyFields => {
                write!(f, "Dict entry has too many fields")
            }
            SignatureErrorKind::ExceededMaximumArrayRecursion => {
                write!(f, "Exceeded maximum array recursion")
            }
            SignatureErrorKind::ExceededMaximumStructRecursion => {
                write!(f, "Exceeded maximum struct recursion")
            }
            SignatureErrorKind::ExceededMaximumDictRecursion => {
                write!(f, "Exceeded maximum dict recursion")
            }
        }
    }
}

impl error::Error for SignatureError {}
