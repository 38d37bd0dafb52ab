//! An asynchronous D-Bus client for Tokio.
//!
//! This crate talks the D-Bus wire protocol over a unix domain socket: it
//! multiplexes concurrent method calls, signal subscriptions and incoming
//! method invocations over one full-duplex stream, passes unix file
//! descriptors out-of-band, and consults remote introspection schemas to
//! fill in call signatures.
//!
//! The layers, bottom up:
//!
//! * [`codec`] and [`frame`] marshal typed [`Value`] sequences and whole
//!   [`Message`]s to and from the binary wire format.
//! * [`Connection`] owns the socket, runs the authentication handshake, and
//!   routes replies, signals and incoming calls to their waiters.
//! * [`Client`] caches per-(peer, path) [`Schema`]s and exposes calls,
//!   signal subscriptions and property access over them; [`Proxy`] binds a
//!   default target and [`MagicClient`] guesses one.
//!
//! # Examples
//!
//! ```no_run
//! use tokio_dbus_client::{Client, Connection};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> tokio_dbus_client::Result<()> {
//! let connection = Connection::session_bus().await?;
//! println!("connected as {:?}", connection.unique_name());
//!
//! let client = Client::new(connection);
//!
//! let id = client
//!     .call(
//!         "org.freedesktop.DBus",
//!         "/org/freedesktop/DBus",
//!         "org.freedesktop.DBus",
//!         "GetId",
//!         vec![],
//!         None,
//!     )
//!     .await?;
//! # Ok(()) }
//! ```

#[macro_use]
mod macros;

#[doc(inline)]
pub use self::address::Address;
mod address;

#[doc(inline)]
pub use self::client::{Client, PropertyWatch, SignalSubscription};
mod client;

pub mod codec;

#[doc(inline)]
pub use self::connection::{CallQueue, Connection, ReplyError, SignalQueue};
mod connection;

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

pub mod frame;

#[doc(inline)]
pub use self::magic::MagicClient;
mod magic;

#[doc(inline)]
pub use self::message::{Message, MessageKind};
mod message;

#[doc(inline)]
pub use self::object_path::{ObjectPath, ObjectPathError, OwnedObjectPath};
mod object_path;

pub mod org_freedesktop_dbus;

#[doc(inline)]
pub use self::proto::{Endianness, Flags};
mod proto;

#[doc(inline)]
pub use self::proxy::Proxy;
mod proxy;

mod sasl;

#[doc(inline)]
pub use self::schema::Schema;
pub mod schema;

#[doc(inline)]
pub use self::signature::{Signature, SignatureBuf, SignatureError};
mod signature;

#[doc(inline)]
pub use self::value::Value;
mod value;
