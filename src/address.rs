//! Bus address discovery and parsing.

use std::env;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";

/// The address of a bus endpoint.
///
/// Addresses take the form `unix:path=<abs-path>[,...]`; only the path is
/// consumed, any `key=value` pairs after the first comma are ignored.
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::Address;
///
/// let address = Address::parse("unix:path=/run/user/1000/bus,guid=abcd")?;
/// assert_eq!(address.path().to_str(), Some("/run/user/1000/bus"));
/// # Ok::<_, tokio_dbus_client::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    path: PathBuf,
}

impl Address {
    /// The address of the session bus.
    ///
    /// Taken from the `DBUS_SESSION_BUS_ADDRESS` environment variable,
    /// defaulting to `/run/user/<uid>/bus`.
    pub fn session() -> Result<Self> {
        match env::var_os(ENV_SESSION_BUS) {
            Some(value) => Self::parse_os(&value),
            None => {
                let uid = nix::unistd::getuid().as_raw();

                Ok(Self {
                    path: PathBuf::from(format!("/run/user/{uid}/bus")),
                })
            }
        }
    }

    /// The address of the system bus.
    ///
    /// Taken from the `DBUS_SYSTEM_BUS_ADDRESS` environment variable,
    /// defaulting to `/run/dbus/system_bus_socket`.
    pub fn system() -> Result<Self> {
        match env::var_os(ENV_SYSTEM_BUS) {
            Some(value) => Self::parse_os(&value),
            None => Ok(Self {
                path: PathBuf::from("/run/dbus/system_bus_socket"),
            }),
        }
    }

    /// Parse an address string.
    pub fn parse(address: &str) -> Result<Self> {
        Self::parse_os(OsStr::new(address))
    }

    fn parse_os(address: &OsStr) -> Result<Self> {
        let bytes = address.as_bytes();

        let Some(rest) = bytes.strip_prefix(b"unix:path=") else {
            return Err(ErrorKind::InvalidAddress.into());
        };

        let path = match rest.iter().position(|&b| b == b',') {
            Some(n) => &rest[..n],
            None => rest,
        };

        if path.is_empty() {
            return Err(ErrorKind::InvalidAddress.into());
        }

        Ok(Self {
            path: PathBuf::from(OsStr::from_bytes(path)),
        })
    }

    /// The unix socket path of this address.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::Address;

    #[test]
    fn parse_addresses() {
        let address = Address::parse("unix:path=/run/dbus/system_bus_socket").unwrap();
        assert_eq!(address.path().to_str(), Some("/run/dbus/system_bus_socket"));

        // Trailing options after the first comma are ignored.
        let address = Address::parse("unix:path=/tmp/bus,guid=0123abcd").unwrap();
        assert_eq!(address.path().to_str(), Some("/tmp/bus"));

        assert!(Address::parse("unix:abstract=/tmp/bus").is_err());
        assert!(Address::parse("tcp:host=localhost").is_err());
        assert!(Address::parse("unix:path=").is_err());
    }
}
