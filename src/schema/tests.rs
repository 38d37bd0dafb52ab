use crate::signature::SignatureBuf;

use super::{Access, Arg, Interface, Method, Property, Schema, Signal};

const SCHEMA: &str = "<?xml version='1.0' encoding='utf-8'?>
<node>
  <interface name=\"org.freedesktop.DBus\">
    <method name=\"RequestName\">
      <arg direction=\"in\" type=\"s\" />
      <arg direction=\"in\" type=\"u\" />
      <arg direction=\"out\" type=\"u\" />
    </method>
    <method name=\"ReloadConfig\" />
    <property name=\"Features\" type=\"as\" access=\"read\" />
    <signal name=\"NameLost\">
      <arg type=\"s\" />
    </signal>
  </interface>
  <node name=\"foo\" />
</node>";

fn ty(signature: &str) -> SignatureBuf {
    SignatureBuf::new(signature).unwrap()
}

fn unnamed(signature: &str) -> Arg {
    Arg {
        name: None,
        ty: ty(signature),
    }
}

#[test]
fn xml_roundtrip() {
    let schema = Schema::parse(SCHEMA).unwrap();
    assert_eq!(schema.to_xml(), SCHEMA);
}

#[test]
fn constructed_schema_emits_the_same_document() {
    let schema = Schema {
        interfaces: vec![Interface {
            name: "org.freedesktop.DBus".into(),
            methods: vec![
                Method {
                    name: "RequestName".into(),
                    args: vec![unnamed("s"), unnamed("u")],
                    returns: vec![unnamed("u")],
                },
                Method {
                    name: "ReloadConfig".into(),
                    args: vec![],
                    returns: vec![],
                },
            ],
            properties: vec![Property {
                name: "Features".into(),
                ty: ty("as"),
                access: Access::Read,
            }],
            signals: vec![Signal {
                name: "NameLost".into(),
                args: vec![unnamed("s")],
            }],
        }],
        nodes: vec!["foo".into()],
    };

    assert_eq!(schema.to_xml(), SCHEMA);
}

#[test]
fn parsed_structure() {
    let schema = Schema::parse(SCHEMA).unwrap();

    assert_eq!(schema.nodes, ["foo"]);

    let interface = schema.interface("org.freedesktop.DBus").unwrap();
    assert_eq!(interface.methods.len(), 2);

    let method = interface.method("RequestName").unwrap();
    assert_eq!(method.args.len(), 2);
    assert_eq!(method.returns.len(), 1);
    assert_eq!(method.input_signature().unwrap(), "su");

    let method = interface.method("ReloadConfig").unwrap();
    assert_eq!(method.input_signature().unwrap(), "");

    let property = interface.property("Features").unwrap();
    assert_eq!(property.ty, "as");
    assert_eq!(property.access, Access::Read);

    let signal = interface.signal("NameLost").unwrap();
    assert_eq!(signal.args.len(), 1);
}

#[test]
fn default_direction_is_in() {
    let xml = "<node><interface name=\"org.example.I\"><method name=\"M\">\
               <arg type=\"s\" /><arg direction=\"out\" type=\"u\" />\
               </method></interface></node>";

    let schema = Schema::parse(xml).unwrap();
    let method = schema.interface("org.example.I").unwrap().method("M").unwrap();

    assert_eq!(method.args.len(), 1);
    assert_eq!(method.args[0].ty, "s");
    assert_eq!(method.returns.len(), 1);
}

#[test]
fn inout_arguments_appear_in_both_lists() {
    let xml = "<node><interface name=\"org.example.I\"><method name=\"M\">\
               <arg direction=\"inout\" type=\"i\" />\
               </method></interface></node>";

    let schema = Schema::parse(xml).unwrap();
    let method = schema.interface("org.example.I").unwrap().method("M").unwrap();

    assert_eq!(method.args.len(), 1);
    assert_eq!(method.returns.len(), 1);
}

#[test]
fn unknown_elements_are_skipped() {
    let xml = "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n \
               \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n\
               <node><interface name=\"org.example.I\">\
               <annotation name=\"org.freedesktop.DBus.Deprecated\" value=\"true\" />\
               <method name=\"M\"><annotation name=\"x\" value=\"y\" /></method>\
               </interface>\
               <node name=\"child\"><interface name=\"org.example.Inner\" /></node>\
               </node>";

    let schema = Schema::parse(xml).unwrap();

    assert_eq!(schema.interfaces.len(), 1);
    assert!(schema.interface("org.example.I").unwrap().method("M").is_some());
    // Nested node bodies contribute only their name.
    assert_eq!(schema.nodes, ["child"]);
}

#[test]
fn member_order_is_preserved() {
    let xml = "<node><interface name=\"org.example.I\">\
               <method name=\"B\" /><method name=\"A\" /><method name=\"C\" />\
               </interface></node>";

    let schema = Schema::parse(xml).unwrap();
    let names = schema.interface("org.example.I").unwrap().methods.iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>();

    assert_eq!(names, ["B", "A", "C"]);
}

#[test]
fn malformed_documents_are_rejected() {
    assert!(Schema::parse("").is_err());
    assert!(Schema::parse("<node>").is_err());
    assert!(Schema::parse("<node><interface /></node>").is_err());
    assert!(Schema::parse(
        "<node><interface name=\"i\"><property name=\"p\" type=\"s\" /></interface></node>"
    )
    .is_err());
    assert!(Schema::parse(
        "<node><interface name=\"i\"><method name=\"m\"><arg type=\"!!\" /></method></interface></node>"
    )
    .is_err());
}
