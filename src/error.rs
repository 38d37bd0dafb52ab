use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::object_path::ObjectPathError;
use crate::proto;
use crate::signature::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Construct the error used to resolve pending operations when the
    /// connection goes away.
    #[inline]
    pub(crate) fn disconnected() -> Error {
        Self::new(ErrorKind::Disconnected)
    }

    /// Test if the error is a local rejection of a malformed object path.
    pub fn is_invalid_path(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidPath(..))
    }

    /// Test if the error indicates that the connection has been torn down.
    pub fn is_disconnected(&self) -> bool {
        matches!(self.kind, ErrorKind::Disconnected)
    }

    /// Test if the error is a busy rejection from [`call_queue`].
    ///
    /// [`call_queue`]: crate::Connection::call_queue
    pub fn is_busy(&self) -> bool {
        matches!(self.kind, ErrorKind::Busy(..))
    }

    /// Test if the error is a schema lookup failure.
    pub fn is_schema(&self) -> bool {
        matches!(self.kind, ErrorKind::Schema(..))
    }

    /// The error name of a remote error reply, if this is one.
    pub fn remote_name(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Remote { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The first body string of a remote error reply, if this is one and it
    /// carried one.
    pub fn remote_message(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Remote {
                message: Some(message),
                ..
            } => Some(message),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(error: ObjectPathError) -> Self {
        Self::new(ErrorKind::InvalidPath(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::InvalidPath(error) => error.fmt(f),
            ErrorKind::Utf8(error) => error.fmt(f),
            ErrorKind::InvalidAddress => write!(f, "Invalid D-Bus address"),
            ErrorKind::Auth(line) => {
                write!(f, "Unexpected response during authentication: {line}")
            }
            ErrorKind::Disconnected => write!(f, "Connection closed"),
            ErrorKind::Busy(name) => {
                write!(f, "A call queue for `{name}` is already held")
            }
            ErrorKind::Remote { name, message } => match message {
                Some(message) => write!(f, "{name}: {message}"),
                None => write!(f, "{name}"),
            },
            ErrorKind::Schema(what) => write!(f, "Not in schema: {what}"),
            ErrorKind::InvalidEndianness(byte) => {
                write!(f, "Invalid endianness marker `{byte:#04x}`")
            }
            ErrorKind::InvalidProtocolVersion(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::InvalidMessageType(raw) => {
                write!(f, "Invalid message type {raw}")
            }
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::ZeroReplySerial => write!(f, "Zero REPLY_SERIAL header"),
            ErrorKind::MissingPath => write!(f, "Missing required PATH header"),
            ErrorKind::MissingInterface => {
                write!(f, "Missing required INTERFACE header")
            }
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header"),
            ErrorKind::MissingReplySerial => {
                write!(f, "Missing required REPLY_SERIAL header")
            }
            ErrorKind::MissingErrorName => {
                write!(f, "Missing required ERROR_NAME header")
            }
            ErrorKind::InvalidHeaderField(field) => {
                write!(f, "Malformed {field:?} header field")
            }
            ErrorKind::BodyTooLong(length) => {
                write!(f, "Body of length {length} is too long (max is 134217728)")
            }
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::BufferUnderflow => write!(f, "Buffer underflow"),
            ErrorKind::NotNullTerminated => {
                write!(f, "String is not null terminated")
            }
            ErrorKind::InvalidBool(raw) => write!(f, "Invalid boolean value {raw}"),
            ErrorKind::InvalidFdIndex(index) => {
                write!(f, "File descriptor index {index} out of bounds")
            }
            ErrorKind::MissingFds(count) => {
                write!(f, "Message declared {count} file descriptors which did not arrive")
            }
            ErrorKind::TrailingBodyBytes => {
                write!(f, "Message body does not match its declared length")
            }
            ErrorKind::SignatureMismatch(what) => {
                write!(f, "Signature mismatch: {what}")
            }
            ErrorKind::UnexpectedReply(what) => {
                write!(f, "Unexpected reply: {what}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::InvalidPath(error) => Some(error),
            ErrorKind::Utf8(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    InvalidPath(ObjectPathError),
    Utf8(Utf8Error),
    InvalidAddress,
    Auth(Box<str>),
    Disconnected,
    Busy(Box<str>),
    Remote {
        name: Box<str>,
        message: Option<Box<str>>,
    },
    Schema(Box<str>),
    InvalidEndianness(u8),
    InvalidProtocolVersion(u8),
    InvalidMessageType(u8),
    ZeroSerial,
    ZeroReplySerial,
    MissingPath,
    MissingInterface,
    MissingMember,
    MissingReplySerial,
    MissingErrorName,
    InvalidHeaderField(proto::HeaderField),
    BodyTooLong(u32),
    ArrayTooLong(u32),
    BufferUnderflow,
    NotNullTerminated,
    InvalidBool(u32),
    InvalidFdIndex(u32),
    MissingFds(u32),
    TrailingBodyBytes,
    SignatureMismatch(Box<str>),
    UnexpectedReply(Box<str>),
}
