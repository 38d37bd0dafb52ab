//! A convenience decorator which guesses where a member lives.

use crate::client::{Client, PropertyWatch, SignalSubscription};
use crate::error::{Error, ErrorKind, Result};
use crate::signature::Signature;
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
enum MemberKind {
    Method,
    Property,
    Signal,
}

impl MemberKind {
    fn as_str(self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::Property => "property",
            MemberKind::Signal => "signal",
        }
    }
}

/// A decorator over [`Client`] which fills in a missing object path or
/// interface by walking the peer's introspection node tree depth-first and
/// picking the first spot declaring the requested member.
///
/// This is a convenience for exploration and scripting; when the location
/// of a member is known, prefer [`Client`] or [`Proxy`] which do not probe.
///
/// [`Proxy`]: crate::Proxy
#[derive(Clone)]
pub struct MagicClient {
    client: Client,
}

impl MagicClient {
    /// Construct a new magic client over the given client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Invoke a method, guessing path and interface as needed.
    pub async fn call(
        &self,
        destination: &str,
        path: Option<&str>,
        interface: Option<&str>,
        member: &str,
        params: Vec<Value>,
        signature: Option<&Signature>,
    ) -> Result<Option<Value>> {
        let (path, interface) = self
            .guess(destination, MemberKind::Method, member, path, interface)
            .await?;

        self.client
            .call(destination, &path, &interface, member, params, signature)
            .await
    }

    /// Subscribe to a signal, guessing path and interface as needed.
    pub async fn subscribe_signal(
        &self,
        destination: &str,
        path: Option<&str>,
        interface: Option<&str>,
        member: &str,
    ) -> Result<SignalSubscription> {
        let (path, interface) = self
            .guess(destination, MemberKind::Signal, member, path, interface)
            .await?;

        self.client
            .subscribe_signal(destination, &path, &interface, member)
            .await
    }

    /// Read a property, guessing path and interface as needed.
    pub async fn get_property(
        &self,
        destination: &str,
        path: Option<&str>,
        interface: Option<&str>,
        property: &str,
    ) -> Result<Value> {
        let (path, interface) = self
            .guess(destination, MemberKind::Property, property, path, interface)
            .await?;

        self.client
            .get_property(destination, &path, &interface, property)
            .await
    }

    /// Write a property, guessing path and interface as needed.
    pub async fn set_property(
        &self,
        destination: &str,
        path: Option<&str>,
        interface: Option<&str>,
        property: &str,
        value: Value,
        signature: Option<&Signature>,
    ) -> Result<()> {
        let (path, interface) = self
            .guess(destination, MemberKind::Property, property, path, interface)
            .await?;

        self.client
            .set_property(destination, &path, &interface, property, value, signature)
            .await
    }

    /// Observe a property, guessing path and interface as needed.
    pub async fn watch_property(
        &self,
        destination: &str,
        path: Option<&str>,
        interface: Option<&str>,
        property: &str,
    ) -> Result<PropertyWatch> {
        let (path, interface) = self
            .guess(destination, MemberKind::Property, property, path, interface)
            .await?;

        self.client
            .watch_property(destination, &path, &interface, property)
            .await
    }

    /// Resolve (path, interface) for a member, walking the node tree
    /// depth-first when the path is not given.
    async fn guess(
        &self,
        destination: &str,
        kind: MemberKind,
        member: &str,
        path: Option<&str>,
        interface: Option<&str>,
    ) -> Result<(String, String)> {
        if let Some(path) = path {
            let interface = self
                .guess_interface(destination, path, kind, member, interface)
                .await?;

            return Ok((path.to_owned(), interface));
        }

        let mut stack = vec![String::new()];

        while let Some(prefix) = stack.pop() {
            let path = if prefix.is_empty() { "/" } else { prefix.as_str() };
            let schema = self.client.introspect(destination, path).await?;

            if !schema.interfaces.is_empty() {
                match self
                    .guess_interface(destination, path, kind, member, interface)
                    .await
                {
                    Ok(interface) => return Ok((path.to_owned(), interface)),
                    Err(error) if error.is_schema() => {}
                    Err(error) => return Err(error),
                }
            }

            for child in schema.nodes.iter().rev() {
                stack.push(format!("{prefix}/{child}"));
            }
        }

        Err(self.not_found(destination, kind, member))
    }

    async fn guess_interface(
        &self,
        destination: &str,
        path: &str,
        kind: MemberKind,
        member: &str,
        interface: Option<&str>,
    ) -> Result<String> {
        if let Some(interface) = interface {
            return Ok(interface.to_owned());
        }

        let schema = self.client.introspect(destination, path).await?;

        for iface in &schema.interfaces {
            let declared = match kind {
                MemberKind::Method => iface.method(member).is_some(),
                MemberKind::Property => iface.property(member).is_some(),
                MemberKind::Signal => iface.signal(member).is_some(),
            };

            if declared {
                return Ok(iface.name.clone());
            }
        }

        Err(self.not_found(destination, kind, member))
    }

    fn not_found(&self, destination: &str, kind: MemberKind, member: &str) -> Error {
        Error::from(ErrorKind::Schema(
            format!("no {} {member} anywhere under {destination}", kind.as_str()).into(),
        ))
    }
}
