//! The connection: socket ownership, authentication, and multiplexing of
//! calls, signals and incoming method invocations.
//!
//! A [`Connection`] is a cheap handle. The socket and every piece of mutable
//! state live on a driver task spawned when the connection is opened; handles
//! talk to it over a command channel, and each suspension point (a reply, a
//! queue item, a send completion) is an explicit future.

use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, oneshot};

use crate::address::Address;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, MessageKind};
use crate::org_freedesktop_dbus as bus;
use crate::proto::Flags;
use crate::sasl::{self, SaslRequest, SaslResponse};
use crate::signature::{Signature, SignatureBuf};
use crate::value::Value;

use self::driver::{Command, Driver};
mod driver;

use self::transport::Transport;
mod transport;

/// An asynchronous connection to a message bus.
///
/// Cloning is cheap; all clones share the same socket and serial space. The
/// connection stays alive until every handle is dropped or [`close`] is
/// called.
///
/// [`close`]: Self::close
///
/// # Examples
///
/// ```no_run
/// use tokio_dbus_client::{Connection, Message, Signature, Value};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> tokio_dbus_client::Result<()> {
/// let c = Connection::session_bus().await?;
///
/// let m = Message::method_call("/org/freedesktop/DBus", "GetNameOwner")?
///     .with_destination("org.freedesktop.DBus")
///     .with_interface("org.freedesktop.DBus")
///     .with_body(Signature::STRING, vec![Value::from("org.freedesktop.DBus")]);
///
/// let reply = c.call(m).await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    unique_name: Arc<OnceLock<Box<str>>>,
}

impl Connection {
    /// Connect to the session bus.
    pub async fn session_bus() -> Result<Self> {
        Self::open(&Address::session()?).await
    }

    /// Connect to the system bus.
    pub async fn system_bus() -> Result<Self> {
        Self::open(&Address::system()?).await
    }

    /// Connect to the bus at the given address.
    pub async fn open(address: &Address) -> Result<Self> {
        Self::start(Transport::connect(address.path())?).await
    }

    /// Establish a connection over an already connected stream.
    ///
    /// This is how tests talk to a mock bus over a socket pair; the full
    /// authentication handshake and Hello exchange still run.
    pub async fn from_stream(stream: UnixStream) -> Result<Self> {
        Self::start(Transport::from_std(stream)?).await
    }

    async fn start(transport: Transport) -> Result<Self> {
        let leftover = authenticate(&transport).await?;

        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(Driver::new(transport, rx, leftover).run());

        let connection = Self {
            commands,
            unique_name: Arc::new(OnceLock::new()),
        };

        connection.hello().await?;
        Ok(connection)
    }

    /// Issue the Hello call which registers the connection on the bus and
    /// learns its assigned unique name.
    async fn hello(&self) -> Result<()> {
        let m = Message::method_call(bus::PATH, "Hello")?
            .with_destination(bus::DESTINATION)
            .with_interface(bus::INTERFACE);

        let Some(reply) = self.call(m).await? else {
            return Err(ErrorKind::UnexpectedReply("no reply to Hello".into()).into());
        };

        let Some(Value::String(name)) = reply.into_body().into_iter().next() else {
            return Err(ErrorKind::UnexpectedReply("Hello did not return a name".into()).into());
        };

        let _ = self.unique_name.set(name.into_boxed_str());
        Ok(())
    }

    /// The unique peer name assigned by the bus, such as `:1.42`.
    pub fn unique_name(&self) -> Option<&str> {
        self.unique_name.get().map(|name| &**name)
    }

    /// Send a method call and wait for its reply.
    ///
    /// A serial is assigned when the message is queued, and a reply slot for
    /// it is registered before the bytes reach the wire. A remote `ERROR`
    /// reply surfaces as an error carrying the remote error name and the
    /// first string of the body.
    ///
    /// When the message carries [`Flags::NO_REPLY_EXPECTED`] this completes
    /// with `None` as soon as the bytes have been handed off.
    pub async fn call(&self, message: Message) -> Result<Option<Message>> {
        if message.flags() & Flags::NO_REPLY_EXPECTED {
            self.send(message).await?;
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        self.command(Command::Call {
            message,
            reply: tx,
        })?;

        let reply = rx.await.map_err(|_| Error::disconnected())??;

        if let MessageKind::Error { .. } = reply.kind() {
            let name = reply.error_name().unwrap_or("").into();
            let message = reply.body().first().and_then(Value::as_str).map(Box::from);
            return Err(ErrorKind::Remote { name, message }.into());
        }

        Ok(Some(reply))
    }

    /// Queue a message for sending and wait until its bytes have been handed
    /// to the kernel. Returns the assigned serial.
    pub async fn send(&self, message: Message) -> Result<NonZeroU32> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Send {
            message,
            done: Some(tx),
        })?;

        rx.await.map_err(|_| Error::disconnected())?
    }

    /// Queue a message without waiting for the send to complete. Used where
    /// no suspension point is available, such as subscription teardown.
    pub(crate) fn send_nowait(&self, message: Message) {
        let _ = self.commands.send(Command::Send {
            message,
            done: None,
        });
    }

    /// Emit a signal from the given path and interface.
    pub async fn emit_signal(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        signature: &Signature,
        body: Vec<Value>,
    ) -> Result<NonZeroU32> {
        let m = Message::signal(path, member)?
            .with_interface(interface)
            .with_body(signature, body);

        self.send(m).await
    }

    /// Acquire a fresh delivery queue for inbound signals.
    ///
    /// While the queue is held, every received `SIGNAL` is delivered to it
    /// and to every other held queue, in receive order. Dropping the queue
    /// removes it and discards anything undelivered.
    pub async fn signal_queue(&self) -> Result<SignalQueue> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::SignalQueue { resp: tx })?;

        let (id, receiver) = rx.await.map_err(|_| Error::disconnected())?;

        Ok(SignalQueue {
            id,
            receiver,
            commands: self.commands.clone(),
        })
    }

    /// Acquire the inbound method call queue for the given destination name,
    /// typically the connection's own unique name or a name obtained through
    /// [`request_name`].
    ///
    /// At most one queue per name can be held at a time; a second
    /// acquisition fails with a busy error.
    ///
    /// [`request_name`]: Self::request_name
    pub async fn call_queue(&self, name: &str) -> Result<CallQueue> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::CallQueue {
            name: name.to_owned(),
            resp: tx,
        })?;

        let receiver = rx.await.map_err(|_| Error::disconnected())??;

        Ok(CallQueue {
            name: name.to_owned(),
            receiver,
            commands: self.commands.clone(),
        })
    }

    /// Run `handler` against an incoming call and send the outcome back to
    /// the caller.
    ///
    /// On success a `METHOD_RETURN` with the handler's signature and body is
    /// queued; on failure an `ERROR` named by the [`ReplyError`] (defaulting
    /// to `org.freedesktop.DBus.Error.AccessDenied`) with the failure text
    /// as its single string argument. Nothing is sent when the call had
    /// [`Flags::NO_REPLY_EXPECTED`].
    pub async fn send_reply<H, F>(&self, call: &Message, handler: H) -> Result<()>
    where
        H: FnOnce(&Message) -> F,
        F: Future<Output = Result<(SignatureBuf, Vec<Value>), ReplyError>>,
    {
        let reply = match handler(call).await {
            Ok((signature, body)) => call.method_return()?.with_body(&signature, body),
            Err(error) => {
                let name = error.name.as_deref().unwrap_or(bus::ERROR_ACCESS_DENIED);

                call.error_reply(name)?
                    .with_body(Signature::STRING, vec![Value::String(error.message)])
            }
        };

        if call.flags() & Flags::NO_REPLY_EXPECTED {
            return Ok(());
        }

        self.send(reply).await?;
        Ok(())
    }

    /// Request a well-known name for this connection.
    pub async fn request_name(&self, name: &str, flags: bus::NameFlag) -> Result<bus::NameReply> {
        const SIGNATURE: &Signature = Signature::new_const(b"su");

        let m = Message::method_call(bus::PATH, "RequestName")?
            .with_destination(bus::DESTINATION)
            .with_interface(bus::INTERFACE)
            .with_body(SIGNATURE, vec![Value::from(name), Value::Uint32(flags.0)]);

        let Some(reply) = self.call(m).await? else {
            return Err(ErrorKind::UnexpectedReply("no reply to RequestName".into()).into());
        };

        let Some(Value::Uint32(raw)) = reply.into_body().into_iter().next() else {
            return Err(
                ErrorKind::UnexpectedReply("RequestName did not return a status".into()).into(),
            );
        };

        Ok(bus::NameReply(raw))
    }

    /// Tear the connection down.
    ///
    /// The socket is shut down in both directions and every pending reply
    /// slot resolves with a disconnection error. Other handles to the same
    /// connection fail from this point on.
    pub async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        if self.commands.send(Command::Close { done: tx }).is_err() {
            // Already gone.
            return Ok(());
        }

        let _ = rx.await;
        Ok(())
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::disconnected())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("unique_name", &self.unique_name())
            .finish_non_exhaustive()
    }
}

/// A scoped delivery queue for inbound signals, acquired through
/// [`Connection::signal_queue`].
pub struct SignalQueue {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Arc<Message>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SignalQueue {
    /// Receive the next signal, or `None` once the connection is gone.
    pub async fn next(&mut self) -> Option<Arc<Message>> {
        self.receiver.recv().await
    }
}

impl Drop for SignalQueue {
    fn drop(&mut self) {
        let _ = self
            .commands
            .send(Command::ReleaseSignalQueue { id: self.id });
    }
}

impl fmt::Debug for SignalQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalQueue")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A scoped queue of inbound method calls for one destination name,
/// acquired through [`Connection::call_queue`].
pub struct CallQueue {
    name: String,
    receiver: mpsc::UnboundedReceiver<Message>,
    commands: mpsc::UnboundedSender<Command>,
}

impl CallQueue {
    /// The destination name this queue is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next incoming call, or `None` once the connection is
    /// gone.
    pub async fn next(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

impl Drop for CallQueue {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::ReleaseCallQueue {
            name: std::mem::take(&mut self.name),
        });
    }
}

impl fmt::Debug for CallQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallQueue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A failure produced by a [`send_reply`] handler, mapped onto a D-Bus
/// error reply.
///
/// [`send_reply`]: Connection::send_reply
#[derive(Debug)]
pub struct ReplyError {
    name: Option<String>,
    message: String,
}

impl ReplyError {
    /// A failure using the default error name.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
        }
    }

    /// A failure with an explicit D-Bus error name.
    pub fn with_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
        }
    }
}

impl From<Error> for ReplyError {
    fn from(error: Error) -> Self {
        Self::new(error.to_string())
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Run the pre-BEGIN authentication handshake: the initial NUL byte,
/// EXTERNAL authentication with the ASCII-hex uid, unix fd negotiation, and
/// the final BEGIN. Returns any bytes read past the last response line.
async fn authenticate(transport: &Transport) -> Result<Vec<u8>> {
    let hex = sasl::external_hex(nix::unistd::getuid().as_raw());
    let mut carry = Vec::new();

    let mut line = vec![0u8];
    sasl::encode(&SaslRequest::AuthExternal(&hex), &mut line);
    transport.send_all(&line).await?;

    match sasl::decode(&transport.recv_line(&mut carry).await?)? {
        SaslResponse::Ok(..) => {}
        other => {
            return Err(ErrorKind::Auth(format!("expected OK, got {other:?}").into()).into());
        }
    }

    line.clear();
    sasl::encode(&SaslRequest::NegotiateUnixFd, &mut line);
    transport.send_all(&line).await?;

    match sasl::decode(&transport.recv_line(&mut carry).await?)? {
        SaslResponse::AgreeUnixFd => {}
        other => {
            return Err(
                ErrorKind::Auth(format!("expected AGREE_UNIX_FD, got {other:?}").into()).into(),
            );
        }
    }

    line.clear();
    sasl::encode(&SaslRequest::Begin, &mut line);
    transport.send_all(&line).await?;

    Ok(carry)
}
