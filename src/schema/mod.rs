//! Remote interface schemas obtained through introspection.
//!
//! The XML subset modelled here is the one well-behaved peers produce: a
//! root `<node>` declaring `<interface>` elements (methods, properties and
//! signals) and named child `<node>` elements. Member order is preserved on
//! parse and emission, since it determines the default signature used when a
//! caller omits an explicit one.

use std::fmt::Write;

use crate::error::Result;
use crate::signature::{SignatureBuf, SignatureError};

pub(crate) use self::parser::parse;
mod parser;

#[cfg(test)]
mod tests;

/// The introspection schema of one (peer, path) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// The interfaces implemented at the path, in declaration order.
    pub interfaces: Vec<Interface>,
    /// The names of child nodes under the path.
    pub nodes: Vec<String>,
}

impl Schema {
    /// Parse a schema from introspection XML.
    pub fn parse(xml: &str) -> Result<Self> {
        parse(xml)
    }

    /// Look up an interface by name.
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Re-emit the schema as introspection XML.
    ///
    /// For documents in the supported subset this is the inverse of
    /// [`parse`]: the same interfaces and members come out in the same
    /// order with the same attributes.
    ///
    /// [`parse`]: Self::parse
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version='1.0' encoding='utf-8'?>\n<node>");

        for interface in &self.interfaces {
            out.push_str("\n  <interface");
            push_attr(&mut out, "name", &interface.name);

            if interface.methods.is_empty()
                && interface.properties.is_empty()
                && interface.signals.is_empty()
            {
                out.push_str(" />");
                continue;
            }

            out.push('>');

            for method in &interface.methods {
                out.push_str("\n    <method");
                push_attr(&mut out, "name", &method.name);

                if method.args.is_empty() && method.returns.is_empty() {
                    out.push_str(" />");
                    continue;
                }

                out.push('>');

                for arg in &method.args {
                    push_arg(&mut out, arg, Some("in"));
                }

                for arg in &method.returns {
                    push_arg(&mut out, arg, Some("out"));
                }

                out.push_str("\n    </method>");
            }

            for property in &interface.properties {
                out.push_str("\n    <property");
                push_attr(&mut out, "name", &property.name);
                push_attr(&mut out, "type", property.ty.as_str());
                push_attr(&mut out, "access", property.access.as_str());
                out.push_str(" />");
            }

            for signal in &interface.signals {
                out.push_str("\n    <signal");
                push_attr(&mut out, "name", &signal.name);

                if signal.args.is_empty() {
                    out.push_str(" />");
                    continue;
                }

                out.push('>');

                for arg in &signal.args {
                    push_arg(&mut out, arg, None);
                }

                out.push_str("\n    </signal>");
            }

            out.push_str("\n  </interface>");
        }

        for node in &self.nodes {
            out.push_str("\n  <node");
            push_attr(&mut out, "name", node);
            out.push_str(" />");
        }

        out.push_str("\n</node>");
        out
    }
}

fn push_arg(out: &mut String, arg: &Arg, direction: Option<&str>) {
    out.push_str("\n      <arg");

    if let Some(name) = &arg.name {
        push_attr(out, "name", name);
    }

    if let Some(direction) = direction {
        push_attr(out, "direction", direction);
    }

    push_attr(out, "type", arg.ty.as_str());
    out.push_str(" />");
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, " {name}=\"");

    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }

    out.push('"');
}

/// A named collection of methods, properties and signals implemented at
/// some object path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interface {
    /// The name of the interface.
    pub name: String,
    /// Methods, in declaration order.
    pub methods: Vec<Method>,
    /// Properties, in declaration order.
    pub properties: Vec<Property>,
    /// Signals, in declaration order.
    pub signals: Vec<Signal>,
}

impl Interface {
    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a signal by name.
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A method declaration. Arguments which are both input and output appear
/// in both lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Method {
    /// The name of the method.
    pub name: String,
    /// Input arguments, in declaration order.
    pub args: Vec<Arg>,
    /// Output arguments, in declaration order.
    pub returns: Vec<Arg>,
}

impl Method {
    /// The concatenation of the input argument types: the default body
    /// signature for calling this method.
    pub fn input_signature(&self) -> Result<SignatureBuf, SignatureError> {
        let mut signature = String::new();

        for arg in &self.args {
            signature.push_str(arg.ty.as_str());
        }

        SignatureBuf::new(&signature)
    }
}

/// A single argument of a method or signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    /// The optional name of the argument.
    pub name: Option<String>,
    /// The type of the argument, a single complete type.
    pub ty: SignatureBuf,
}

/// A property declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// The name of the property.
    pub name: String,
    /// The type of the property.
    pub ty: SignatureBuf,
    /// How the property may be accessed.
    pub access: Access,
}

/// The access mode of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The property can only be read.
    Read,
    /// The property can only be written.
    Write,
    /// The property can be read and written.
    ReadWrite,
}

impl Access {
    /// The attribute value for this access mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "readwrite",
        }
    }
}

/// A signal declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    /// The name of the signal.
    pub name: String,
    /// Arguments, in declaration order.
    pub args: Vec<Arg>,
}
