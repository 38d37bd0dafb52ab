//! Names and types associated with the `org.freedesktop.DBus` interfaces.

/// Well known destination name of the bus itself.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Well known interface name of the bus itself.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Well known object path of the bus itself.
pub const PATH: &str = "/org/freedesktop/DBus";

/// The introspection interface.
pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";

/// The properties interface.
pub const PROPERTIES: &str = "org.freedesktop.DBus.Properties";

/// The signal emitted by the properties interface when properties change.
pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";

/// The error name used for handler failures without a more specific
/// mapping.
pub const ERROR_ACCESS_DENIED: &str = "org.freedesktop.DBus.Error.AccessDenied";

raw_set! {
    /// The flags to a `RequestName` call.
    #[repr(u32)]
    pub enum NameFlag {
        /// Allow another peer which requests the name with
        /// [`NameFlag::REPLACE_EXISTING`] to take it over.
        ALLOW_REPLACEMENT = 1,
        /// Try to replace the current owner if there is one.
        REPLACE_EXISTING = 2,
        /// Fail the request instead of queueing if the name is taken.
        DO_NOT_QUEUE = 4,
    }
}

raw_enum! {
    /// The reply to a `RequestName` call.
    #[repr(u32)]
    pub enum NameReply {
        /// The caller is now the primary owner of the name.
        PRIMARY_OWNER = 1,
        /// The name already had an owner and the caller was placed in the
        /// wait queue.
        IN_QUEUE = 2,
        /// The name already has an owner and queueing was not requested.
        EXISTS = 3,
        /// The caller already owns the name.
        ALREADY_OWNER = 4,
    }
}
