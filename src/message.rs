//! Messages exchanged over the bus.

use std::num::NonZeroU32;
use std::os::fd::OwnedFd;

use crate::error::{ErrorKind, Result};
use crate::object_path::{ObjectPath, OwnedObjectPath};
use crate::proto::{Flags, MessageType};
use crate::signature::{Signature, SignatureBuf};
use crate::value::Value;

/// The kind of a [`Message`] along with its kind-specific routing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageKind {
    /// Method call. This message type may prompt a reply.
    MethodCall {
        /// The path of the object being called.
        path: OwnedObjectPath,
        /// The member being called.
        member: String,
    },
    /// Method reply with returned data.
    MethodReturn {
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// Error reply. If the first argument exists and is a string, it is an
    /// error message.
    Error {
        /// The name of the error.
        error_name: String,
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// Signal emission.
    Signal {
        /// The path of the object the signal is emitted from.
        path: OwnedObjectPath,
        /// The member being signalled.
        member: String,
    },
}

/// A D-Bus message.
///
/// Messages are constructed through the builder methods here, handed to a
/// [`Connection`] for sending, and returned by it on receipt. The serial is
/// assigned by the connection when the message is queued; received messages
/// always carry one.
///
/// [`Connection`]: crate::Connection
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::{Message, MessageKind, Signature, Value};
///
/// let m = Message::method_call("/org/freedesktop/DBus", "Hello")?
///     .with_destination("org.freedesktop.DBus")
///     .with_interface("org.freedesktop.DBus");
///
/// assert!(matches!(m.kind(), MessageKind::MethodCall { .. }));
/// assert_eq!(m.serial(), None);
///
/// let m = m.with_body(Signature::STRING, vec![Value::from("hello")]);
/// assert_eq!(*m.signature(), *Signature::STRING);
/// # Ok::<_, tokio_dbus_client::Error>(())
/// ```
#[derive(Debug)]
pub struct Message {
    pub(crate) kind: MessageKind,
    pub(crate) serial: Option<NonZeroU32>,
    pub(crate) flags: Flags,
    pub(crate) interface: Option<String>,
    pub(crate) destination: Option<String>,
    pub(crate) sender: Option<String>,
    pub(crate) signature: SignatureBuf,
    pub(crate) body: Vec<Value>,
    pub(crate) fds: Vec<OwnedFd>,
}

impl Message {
    fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            serial: None,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            signature: SignatureBuf::empty(),
            body: Vec::new(),
            fds: Vec::new(),
        }
    }

    /// Construct a method call message.
    ///
    /// The path is validated against the object path grammar before anything
    /// touches the socket.
    pub fn method_call(path: &str, member: &str) -> Result<Self> {
        Ok(Self::empty(MessageKind::MethodCall {
            path: ObjectPath::new(path)?.to_owned(),
            member: member.to_owned(),
        }))
    }

    /// Construct a signal message.
    pub fn signal(path: &str, member: &str) -> Result<Self> {
        Ok(Self::empty(MessageKind::Signal {
            path: ObjectPath::new(path)?.to_owned(),
            member: member.to_owned(),
        }))
    }

    /// Construct a method return replying to this message.
    ///
    /// Sender and destination are swapped relative to the call.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroU32;
    ///
    /// use tokio_dbus_client::{Message, MessageKind};
    ///
    /// let call = Message::method_call("/se/example", "Frob")?
    ///     .with_sender(":1.10")
    ///     .with_destination(":1.20")
    ///     .with_serial(NonZeroU32::new(42).unwrap());
    ///
    /// let reply = call.method_return()?;
    /// assert!(matches!(reply.kind(), MessageKind::MethodReturn { .. }));
    /// assert_eq!(reply.destination(), Some(":1.10"));
    /// assert_eq!(reply.sender(), Some(":1.20"));
    /// # Ok::<_, tokio_dbus_client::Error>(())
    /// ```
    pub fn method_return(&self) -> Result<Self> {
        let Some(reply_serial) = self.serial else {
            return Err(ErrorKind::MissingReplySerial.into());
        };

        Ok(Self {
            destination: self.sender.clone(),
            sender: self.destination.clone(),
            ..Self::empty(MessageKind::MethodReturn { reply_serial })
        })
    }

    /// Construct an error reply to this message with the given error name.
    pub fn error_reply(&self, error_name: &str) -> Result<Self> {
        let Some(reply_serial) = self.serial else {
            return Err(ErrorKind::MissingReplySerial.into());
        };

        Ok(Self {
            destination: self.sender.clone(),
            sender: self.destination.clone(),
            ..Self::empty(MessageKind::Error {
                error_name: error_name.to_owned(),
                reply_serial,
            })
        })
    }

    /// Get the kind of the message.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Get the serial of the message, if one has been assigned.
    pub fn serial(&self) -> Option<NonZeroU32> {
        self.serial
    }

    /// Get the flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Modify the flags of the message.
    #[must_use]
    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }

    /// Get the interface of the message.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Modify the interface of the message.
    #[must_use]
    pub fn with_interface(self, interface: &str) -> Self {
        Self {
            interface: Some(interface.to_owned()),
            ..self
        }
    }

    /// Get the destination of the message.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Modify the destination of the message.
    #[must_use]
    pub fn with_destination(self, destination: &str) -> Self {
        Self {
            destination: Some(destination.to_owned()),
            ..self
        }
    }

    /// Get the sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Modify the sender of the message.
    #[must_use]
    pub fn with_sender(self, sender: &str) -> Self {
        Self {
            sender: Some(sender.to_owned()),
            ..self
        }
    }

    /// Get the body signature of the message.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Set the body of the message along with its signature.
    #[must_use]
    pub fn with_body(self, signature: &Signature, body: Vec<Value>) -> Self {
        Self {
            signature: signature.to_owned(),
            body,
            ..self
        }
    }

    /// Get the body of the message.
    pub fn body(&self) -> &[Value] {
        &self.body
    }

    /// Take the body out of the message.
    pub fn into_body(self) -> Vec<Value> {
        self.body
    }

    /// The object path of the message, for kinds which carry one.
    pub fn path(&self) -> Option<&ObjectPath> {
        match &self.kind {
            MessageKind::MethodCall { path, .. } => Some(path),
            MessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The member of the message, for kinds which carry one.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { member, .. } => Some(member),
            MessageKind::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The reply serial of the message, for kinds which carry one.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        match self.kind {
            MessageKind::MethodReturn { reply_serial } => Some(reply_serial),
            MessageKind::Error { reply_serial, .. } => Some(reply_serial),
            _ => None,
        }
    }

    /// The error name of the message, if it is an error reply.
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// Take ownership of the file descriptors received with this message.
    ///
    /// [`Value::Fd`] entries in the body refer to these descriptors by raw
    /// number; once taken, closing them is the caller's responsibility.
    pub fn take_fds(&mut self) -> Vec<OwnedFd> {
        std::mem::take(&mut self.fds)
    }

    /// Modify the serial of the message.
    ///
    /// Serials are normally assigned by the connection when a message is
    /// queued; this is useful when framing messages manually.
    #[must_use]
    pub fn with_serial(self, serial: NonZeroU32) -> Self {
        Self {
            serial: Some(serial),
            ..self
        }
    }

    pub(crate) fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::Message;

    #[test]
    fn path_validation() {
        assert!(Message::method_call("/x", "Echo").is_ok());
        assert!(Message::method_call("relative", "Echo")
            .is_err_and(|e| e.is_invalid_path()));
        assert!(Message::signal("x/y", "Ev").is_err_and(|e| e.is_invalid_path()));
    }

    #[test]
    fn replies_swap_endpoints() {
        let call = Message::method_call("/x", "Echo")
            .unwrap()
            .with_sender(":1.1")
            .with_destination(":1.2")
            .with_serial(NonZeroU32::new(7).unwrap());

        let reply = call.method_return().unwrap();
        assert_eq!(reply.destination(), Some(":1.1"));
        assert_eq!(reply.sender(), Some(":1.2"));
        assert_eq!(reply.reply_serial().map(|s| s.get()), Some(7));

        let error = call.error_reply("org.example.Fail").unwrap();
        assert_eq!(error.error_name(), Some("org.example.Fail"));
        assert_eq!(error.reply_serial().map(|s| s.get()), Some(7));
    }

    #[test]
    fn reply_requires_serial() {
        let call = Message::method_call("/x", "Echo").unwrap();
        assert!(call.method_return().is_err());
    }
}
