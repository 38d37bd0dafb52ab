//! A client handle bound to a default destination, path and interface.

use crate::client::{Client, PropertyWatch, SignalSubscription};
use crate::error::Result;
use crate::signature::Signature;
use crate::value::Value;

/// A thin binding over a [`Client`] with (destination, path, interface)
/// defaults pre-filled.
///
/// # Examples
///
/// ```no_run
/// use tokio_dbus_client::{Client, Connection};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> tokio_dbus_client::Result<()> {
/// let client = Client::new(Connection::session_bus().await?);
///
/// let bus = client.proxy(
///     "org.freedesktop.DBus",
///     "/org/freedesktop/DBus",
///     "org.freedesktop.DBus",
/// );
///
/// let id = bus.call("GetId", vec![], None).await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Proxy {
    client: Client,
    destination: String,
    path: String,
    interface: String,
}

impl Proxy {
    pub(crate) fn new(client: Client, destination: &str, path: &str, interface: &str) -> Self {
        Self {
            client,
            destination: destination.to_owned(),
            path: path.to_owned(),
            interface: interface.to_owned(),
        }
    }

    /// The destination this proxy is bound to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The object path this proxy is bound to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The interface this proxy is bound to.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Invoke a method on the bound interface. See [`Client::call`].
    pub async fn call(
        &self,
        member: &str,
        params: Vec<Value>,
        signature: Option<&Signature>,
    ) -> Result<Option<Value>> {
        self.client
            .call(
                &self.destination,
                &self.path,
                &self.interface,
                member,
                params,
                signature,
            )
            .await
    }

    /// Subscribe to a signal on the bound interface. See
    /// [`Client::subscribe_signal`].
    pub async fn subscribe_signal(&self, member: &str) -> Result<SignalSubscription> {
        self.client
            .subscribe_signal(&self.destination, &self.path, &self.interface, member)
            .await
    }

    /// Read a property of the bound interface. See [`Client::get_property`].
    pub async fn get_property(&self, property: &str) -> Result<Value> {
        self.client
            .get_property(&self.destination, &self.path, &self.interface, property)
            .await
    }

    /// Write a property of the bound interface. See [`Client::set_property`].
    pub async fn set_property(
        &self,
        property: &str,
        value: Value,
        signature: Option<&Signature>,
    ) -> Result<()> {
        self.client
            .set_property(
                &self.destination,
                &self.path,
                &self.interface,
                property,
                value,
                signature,
            )
            .await
    }

    /// Observe a property of the bound interface. See
    /// [`Client::watch_property`].
    pub async fn watch_property(&self, property: &str) -> Result<PropertyWatch> {
        self.client
            .watch_property(&self.destination, &self.path, &self.interface, property)
            .await
    }
}
