//! The introspection-driven client layered over a [`Connection`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::{Connection, SignalQueue};
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::org_freedesktop_dbus as bus;
use crate::proto::Flags;
use crate::proxy::Proxy;
use crate::schema::Schema;
use crate::signature::Signature;
use crate::value::Value;

/// A client which consults remote interface schemas to adapt calls to the
/// wire protocol.
///
/// Schemas are fetched once per (peer, path) pair through the peer's
/// introspection method and cached for the lifetime of the client. A
/// reconnect drops the cache implicitly by starting over with a new client.
///
/// # Examples
///
/// ```no_run
/// use tokio_dbus_client::{Client, Connection};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> tokio_dbus_client::Result<()> {
/// let client = Client::new(Connection::session_bus().await?);
///
/// // The body signature is filled in from the schema.
/// let id = client
///     .call(
///         "org.freedesktop.DBus",
///         "/org/freedesktop/DBus",
///         "org.freedesktop.DBus",
///         "GetId",
///         vec![],
///         None,
///     )
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    connection: Connection,
    schemas: Mutex<HashMap<(String, String), Arc<Schema>>>,
}

impl Client {
    /// Construct a new client over the given connection.
    pub fn new(connection: Connection) -> Self {
        Self {
            inner: Arc::new(Inner {
                connection,
                schemas: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// A proxy handle with the given defaults bound.
    pub fn proxy(&self, destination: &str, path: &str, interface: &str) -> Proxy {
        Proxy::new(self.clone(), destination, path, interface)
    }

    /// The schema of the given (peer, path) pair, fetched through
    /// `org.freedesktop.DBus.Introspectable.Introspect` on first use.
    ///
    /// The cache lock is held across the fill, so concurrent misses for the
    /// same key produce a single wire request and share one schema.
    pub async fn introspect(&self, destination: &str, path: &str) -> Result<Arc<Schema>> {
        let key = (destination.to_owned(), path.to_owned());
        let mut schemas = self.inner.schemas.lock().await;

        if let Some(schema) = schemas.get(&key) {
            return Ok(schema.clone());
        }

        let m = Message::method_call(path, "Introspect")?
            .with_destination(destination)
            .with_interface(bus::INTROSPECTABLE);

        let reply = self.call_with_reply(m).await?;

        let Some(Value::String(xml)) = reply.into_body().into_iter().next() else {
            return Err(ErrorKind::UnexpectedReply(
                "Introspect did not return a document".into(),
            )
            .into());
        };

        let schema = Arc::new(Schema::parse(&xml)?);
        schemas.insert(key, schema.clone());
        Ok(schema)
    }

    /// Invoke a method, looking its declaration up in the schema.
    ///
    /// When `signature` is omitted it is computed as the concatenation of
    /// the method's input argument types. The reply is unwrapped according
    /// to the declared returns: nothing for zero, the bare value for one,
    /// and a [`Value::Struct`] of the sequence for more.
    pub async fn call(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        member: &str,
        params: Vec<Value>,
        signature: Option<&Signature>,
    ) -> Result<Option<Value>> {
        let schema = self.introspect(destination, path).await?;

        let Some(iface) = schema.interface(interface) else {
            return Err(missing(format!("interface {interface} at {destination}{path}")));
        };

        let Some(method) = iface.method(member) else {
            return Err(missing(format!(
                "method {interface}.{member} at {destination}{path}"
            )));
        };

        let signature = match signature {
            Some(signature) => signature.to_owned(),
            None => method.input_signature()?,
        };

        let returns = method.returns.len();

        let m = Message::method_call(path, member)?
            .with_destination(destination)
            .with_interface(interface)
            .with_body(&signature, params);

        let reply = self.call_with_reply(m).await?;
        let body = reply.into_body();

        Ok(match returns {
            0 => None,
            1 => body.into_iter().next(),
            _ => Some(Value::Struct(body)),
        })
    }

    /// Subscribe to a signal.
    ///
    /// A non-unique `sender` is resolved through `GetNameOwner` first, a
    /// fresh signal queue is acquired, and a match rule of the form
    /// `type='signal',sender=…,path=…,interface=…,member=…` is registered
    /// on the bus. Dropping the subscription removes the match again.
    pub async fn subscribe_signal(
        &self,
        sender: &str,
        path: &str,
        interface: &str,
        member: &str,
    ) -> Result<SignalSubscription> {
        let sender = if sender.starts_with(':') {
            sender.to_owned()
        } else {
            self.name_owner(sender).await?
        };

        let queue = self.inner.connection.signal_queue().await?;
        let rule = match_rule(&sender, path, interface, member);
        self.add_match(&rule).await?;

        Ok(SignalSubscription {
            connection: self.inner.connection.clone(),
            queue,
            rule,
            sender,
            path: path.to_owned(),
            interface: interface.to_owned(),
            member: member.to_owned(),
        })
    }

    /// Read a property through `org.freedesktop.DBus.Properties.Get`,
    /// unwrapping the variant return to its inner value.
    pub async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Value> {
        const SIGNATURE: &Signature = Signature::new_const(b"ss");

        let m = Message::method_call(path, "Get")?
            .with_destination(destination)
            .with_interface(bus::PROPERTIES)
            .with_body(
                SIGNATURE,
                vec![Value::from(interface), Value::from(property)],
            );

        let reply = self.call_with_reply(m).await?;

        let Some(Value::Variant(inner)) = reply.into_body().into_iter().next() else {
            return Err(ErrorKind::UnexpectedReply("Get did not return a variant".into()).into());
        };

        Ok(*inner)
    }

    /// Write a property through `org.freedesktop.DBus.Properties.Set`,
    /// wrapping the value in a variant.
    ///
    /// When `signature` is omitted the property's type is looked up in the
    /// schema; either way the value must marshal as that type.
    pub async fn set_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
        value: Value,
        signature: Option<&Signature>,
    ) -> Result<()> {
        let expected = match signature {
            Some(signature) => signature.to_owned(),
            None => {
                let schema = self.introspect(destination, path).await?;

                let record = schema
                    .interface(interface)
                    .and_then(|i| i.property(property));

                let Some(record) = record else {
                    return Err(missing(format!(
                        "property {interface}.{property} at {destination}{path}"
                    )));
                };

                record.ty.clone()
            }
        };

        let actual = value.signature()?;

        if actual != *expected {
            return Err(ErrorKind::SignatureMismatch(
                format!("property {property} is `{expected}`, value is `{actual}`").into(),
            )
            .into());
        }

        const SIGNATURE: &Signature = Signature::new_const(b"ssv");

        let m = Message::method_call(path, "Set")?
            .with_destination(destination)
            .with_interface(bus::PROPERTIES)
            .with_body(
                SIGNATURE,
                vec![
                    Value::from(interface),
                    Value::from(property),
                    Value::variant(value),
                ],
            );

        self.call_with_reply(m).await?;
        Ok(())
    }

    /// Observe a property.
    ///
    /// The watch yields the current value first, then follows
    /// `PropertiesChanged`: a new value when the property changes, a null
    /// sentinel when it is invalidated. It ends with the subscription.
    pub async fn watch_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<PropertyWatch> {
        let subscription = self
            .subscribe_signal(destination, path, bus::PROPERTIES, bus::PROPERTIES_CHANGED)
            .await?;

        let current = self
            .get_property(destination, path, interface, property)
            .await?;

        Ok(PropertyWatch {
            subscription,
            interface: interface.to_owned(),
            property: property.to_owned(),
            current: Some(current),
        })
    }

    async fn name_owner(&self, name: &str) -> Result<String> {
        let m = Message::method_call(bus::PATH, "GetNameOwner")?
            .with_destination(bus::DESTINATION)
            .with_interface(bus::INTERFACE)
            .with_body(Signature::STRING, vec![Value::from(name)]);

        let reply = self.call_with_reply(m).await?;

        let Some(Value::String(owner)) = reply.into_body().into_iter().next() else {
            return Err(
                ErrorKind::UnexpectedReply("GetNameOwner did not return a name".into()).into(),
            );
        };

        Ok(owner)
    }

    async fn add_match(&self, rule: &str) -> Result<()> {
        let m = Message::method_call(bus::PATH, "AddMatch")?
            .with_destination(bus::DESTINATION)
            .with_interface(bus::INTERFACE)
            .with_body(Signature::STRING, vec![Value::from(rule)]);

        self.call_with_reply(m).await?;
        Ok(())
    }

    async fn call_with_reply(&self, message: Message) -> Result<Message> {
        match self.inner.connection.call(message).await? {
            Some(reply) => Ok(reply),
            None => Err(ErrorKind::UnexpectedReply("call completed without a reply".into()).into()),
        }
    }
}

fn missing(what: String) -> Error {
    Error::from(ErrorKind::Schema(what.into()))
}

fn match_rule(sender: &str, path: &str, interface: &str, member: &str) -> String {
    format!("type='signal',sender='{sender}',path='{path}',interface='{interface}',member='{member}'")
}

/// An active signal subscription produced by [`Client::subscribe_signal`].
///
/// Yields the bodies of matching signals. On drop, the signal queue is
/// released and `RemoveMatch` with the identical rule string is fired;
/// identical rules are refcounted by the bus.
pub struct SignalSubscription {
    connection: Connection,
    queue: SignalQueue,
    rule: String,
    sender: String,
    path: String,
    interface: String,
    member: String,
}

impl SignalSubscription {
    /// The match rule registered on the bus for this subscription.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// The body of the next matching signal, or `None` once the
    /// subscription can yield no more.
    pub async fn next(&mut self) -> Option<Vec<Value>> {
        loop {
            let message = self.queue.next().await?;

            let matches = message.sender() == Some(self.sender.as_str())
                && message.path().map(|p| p.as_str()) == Some(self.path.as_str())
                && message.interface() == Some(self.interface.as_str())
                && message.member() == Some(self.member.as_str());

            if matches {
                return Some(message.body().to_vec());
            }
        }
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        if let Ok(m) = Message::method_call(bus::PATH, "RemoveMatch") {
            let m = m
                .with_destination(bus::DESTINATION)
                .with_interface(bus::INTERFACE)
                .with_body(Signature::STRING, vec![Value::String(self.rule.clone())])
                .with_flags(Flags::NO_REPLY_EXPECTED);

            self.connection.send_nowait(m);
        }
    }
}

/// An active property watch produced by [`Client::watch_property`].
pub struct PropertyWatch {
    subscription: SignalSubscription,
    interface: String,
    property: String,
    current: Option<Value>,
}

impl PropertyWatch {
    /// The next observation: `Some(Some(value))` for the current or a
    /// changed value, `Some(None)` when the property was invalidated, and
    /// `None` once the watch can yield no more.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        if let Some(value) = self.current.take() {
            return Some(Some(value));
        }

        loop {
            let body = self.subscription.next().await?;
            let mut it = body.into_iter();

            let (
                Some(Value::String(interface)),
                Some(Value::Array {
                    values: changed, ..
                }),
                Some(Value::Array {
                    values: invalidated,
                    ..
                }),
            ) = (it.next(), it.next(), it.next())
            else {
                continue;
            };

            if interface != self.interface {
                continue;
            }

            for entry in changed {
                if let Value::DictEntry(key, value) = entry {
                    if key.as_str() == Some(self.property.as_str()) {
                        return Some(Some(value.into_variant()));
                    }
                }
            }

            if invalidated
                .iter()
                .any(|name| name.as_str() == Some(self.property.as_str()))
            {
                return Some(None);
            }
        }
    }
}
