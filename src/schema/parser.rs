use xmlparser::{ElementEnd, Token, Tokenizer};

use crate::error::{Error, ErrorKind, Result};
use crate::signature::SignatureBuf;

use super::{Access, Arg, Interface, Method, Property, Schema, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
    InOut,
}

#[derive(Debug, Default)]
struct ArgBuilder {
    name: Option<String>,
    ty: Option<SignatureBuf>,
    direction: Option<Direction>,
}

#[derive(Debug)]
enum State {
    /// The root `<node>` element.
    Root(Schema),
    /// A `<node name="..."/>` child of the root.
    Child(Option<String>),
    Interface(Interface),
    Method(Method),
    Property {
        name: Option<String>,
        ty: Option<SignatureBuf>,
        access: Option<Access>,
    },
    Signal(Signal),
    Arg(ArgBuilder),
    /// An element outside of the supported subset; its whole subtree is
    /// ignored.
    Skip,
}

fn err(what: impl Into<String>) -> Error {
    Error::from(ErrorKind::Schema(what.into().into()))
}

/// Parse introspection XML into a [`Schema`].
pub(crate) fn parse(xml: &str) -> Result<Schema> {
    let mut stack = Vec::<State>::new();
    let mut schema = None::<Schema>;

    for token in Tokenizer::from(xml) {
        let token = token.map_err(|e| err(format!("invalid introspection XML: {e}")))?;

        match token {
            Token::ElementStart { local, .. } => {
                let state = match (stack.last(), local.as_str()) {
                    (_, _) if matches!(stack.last(), Some(State::Skip)) => State::Skip,
                    (None, "node") => State::Root(Schema::default()),
                    (Some(State::Root(..)), "interface") => State::Interface(Interface::default()),
                    (Some(State::Root(..)), "node") => State::Child(None),
                    (Some(State::Interface(..)), "method") => State::Method(Method::default()),
                    (Some(State::Interface(..)), "property") => State::Property {
                        name: None,
                        ty: None,
                        access: None,
                    },
                    (Some(State::Interface(..)), "signal") => State::Signal(Signal::default()),
                    (Some(State::Method(..) | State::Signal(..)), "arg") => {
                        State::Arg(ArgBuilder::default())
                    }
                    // Anything else, such as annotations or nested node
                    // bodies, is outside of the subset and skipped.
                    _ => State::Skip,
                };

                stack.push(state);
            }
            Token::Attribute { local, value, .. } => {
                let (name, value) = (local.as_str(), value.as_str());

                match stack.last_mut() {
                    Some(State::Interface(interface)) if name == "name" => {
                        interface.name = value.to_owned();
                    }
                    Some(State::Method(method)) if name == "name" => {
                        method.name = value.to_owned();
                    }
                    Some(State::Signal(signal)) if name == "name" => {
                        signal.name = value.to_owned();
                    }
                    Some(State::Child(child)) if name == "name" => {
                        *child = Some(value.to_owned());
                    }
                    Some(State::Property { name: slot, .. }) if name == "name" => {
                        *slot = Some(value.to_owned());
                    }
                    Some(State::Property { ty, .. }) if name == "type" => {
                        *ty = Some(parse_type(value)?);
                    }
                    Some(State::Property { access, .. }) if name == "access" => {
                        *access = Some(match value {
                            "read" => Access::Read,
                            "write" => Access::Write,
                            "readwrite" => Access::ReadWrite,
                            other => return Err(err(format!("unsupported access `{other}`"))),
                        });
                    }
                    Some(State::Arg(arg)) if name == "name" => {
                        arg.name = Some(value.to_owned());
                    }
                    Some(State::Arg(arg)) if name == "type" => {
                        arg.ty = Some(parse_type(value)?);
                    }
                    Some(State::Arg(arg)) if name == "direction" => {
                        arg.direction = Some(match value {
                            "in" => Direction::In,
                            "out" => Direction::Out,
                            "inout" => Direction::InOut,
                            other => return Err(err(format!("unsupported direction `{other}`"))),
                        });
                    }
                    // Unknown attributes are ignored.
                    _ => {}
                }
            }
            Token::ElementEnd { end, .. } => {
                if matches!(end, ElementEnd::Open) {
                    continue;
                }

                let Some(top) = stack.pop() else {
                    return Err(err("unbalanced element end"));
                };

                match (stack.last_mut(), top) {
                    (_, State::Skip) => {}
                    (None, State::Root(root)) => {
                        schema = Some(root);
                    }
                    (Some(State::Root(root)), State::Interface(interface)) => {
                        if interface.name.is_empty() {
                            return Err(err("interface without a name"));
                        }

                        root.interfaces.push(interface);
                    }
                    (Some(State::Root(root)), State::Child(name)) => {
                        let Some(name) = name else {
                            return Err(err("child node without a name"));
                        };

                        root.nodes.push(name);
                    }
                    (Some(State::Interface(interface)), State::Method(method)) => {
                        if method.name.is_empty() {
                            return Err(err("method without a name"));
                        }

                        interface.methods.push(method);
                    }
                    (Some(State::Interface(interface)), State::Property { name, ty, access }) => {
                        let (Some(name), Some(ty), Some(access)) = (name, ty, access) else {
                            return Err(err("property without name, type or access"));
                        };

                        interface.properties.push(Property { name, ty, access });
                    }
                    (Some(State::Interface(interface)), State::Signal(signal)) => {
                        if signal.name.is_empty() {
                            return Err(err("signal without a name"));
                        }

                        interface.signals.push(signal);
                    }
                    (Some(State::Method(method)), State::Arg(arg)) => {
                        let Some(ty) = arg.ty else {
                            return Err(err("argument without a type"));
                        };

                        let arg_record = Arg { name: arg.name, ty };

                        match arg.direction.unwrap_or(Direction::In) {
                            Direction::In => method.args.push(arg_record),
                            Direction::Out => method.returns.push(arg_record),
                            Direction::InOut => {
                                method.args.push(arg_record.clone());
                                method.returns.push(arg_record);
                            }
                        }
                    }
                    (Some(State::Signal(signal)), State::Arg(arg)) => {
                        let Some(ty) = arg.ty else {
                            return Err(err("argument without a type"));
                        };

                        signal.args.push(Arg { name: arg.name, ty });
                    }
                    _ => return Err(err("unexpected element nesting")),
                }
            }
            // The declaration, comments, text and processing instructions
            // are not part of the subset.
            _ => {}
        }
    }

    schema.ok_or_else(|| err("no root node element"))
}

fn parse_type(value: &str) -> Result<SignatureBuf> {
    let ty = SignatureBuf::new(value).map_err(|e| err(format!("invalid type `{value}`: {e}")))?;

    let mut it = ty.iter();

    if it.next().is_none() || it.next().is_some() {
        return Err(err(format!(
            "type `{value}` is not a single complete type"
        )));
    }

    Ok(ty)
}
