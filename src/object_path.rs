//! Object paths and their validation.

use std::borrow::Borrow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Validate an object path against `^/[A-Za-z0-9_/]*$`.
const fn validate(bytes: &[u8]) -> bool {
    let &[b'/', ref rest @ ..] = bytes else {
        return false;
    };
    let mut rest = rest;

    while let &[b, ref tail @ ..] = rest {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'/' => {}
            _ => return false,
        }

        rest = tail;
    }

    true
}

/// A borrowed object path: a hierarchical identifier for an object hosted by
/// a peer, matching `^/[A-Za-z0-9_/]*$`.
///
/// The owned variant is [`OwnedObjectPath`].
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::ObjectPath;
///
/// const PATH: &ObjectPath = ObjectPath::new_const("/org/freedesktop/DBus");
///
/// assert!(ObjectPath::new("/").is_ok());
/// assert!(ObjectPath::new("relative/path").is_err());
/// ```
#[derive(PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectPath(str);

impl ObjectPath {
    /// Construct a new object path with validation inside of a constant
    /// context.
    ///
    /// This will panic in case the path is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_client::ObjectPath;
    ///
    /// const PATH: &ObjectPath = ObjectPath::new_const("/se/example/Object");
    /// ```
    #[track_caller]
    pub const fn new_const(path: &str) -> &ObjectPath {
        if !validate(path.as_bytes()) {
            panic!("Invalid D-Bus object path");
        }

        // SAFETY: The str is repr transparent over this type.
        unsafe { Self::new_unchecked(path) }
    }

    /// Try to construct a new object path with validation.
    pub fn new(path: &str) -> Result<&ObjectPath, ObjectPathError> {
        if !validate(path.as_bytes()) {
            return Err(ObjectPathError {
                path: path.to_owned().into(),
            });
        }

        // SAFETY: The str is repr transparent over this type.
        unsafe { Ok(Self::new_unchecked(path)) }
    }

    /// Construct a new object path without validation.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the path is valid.
    pub(crate) const unsafe fn new_unchecked(path: &str) -> &Self {
        &*(path as *const _ as *const ObjectPath)
    }

    /// Get the object path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<ObjectPath> for ObjectPath {
    #[inline]
    fn as_ref(&self) -> &ObjectPath {
        self
    }
}

impl ToOwned for ObjectPath {
    type Owned = OwnedObjectPath;

    #[inline]
    fn to_owned(&self) -> OwnedObjectPath {
        OwnedObjectPath(self.0.to_owned())
    }
}

impl PartialEq<str> for ObjectPath {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<&str> for ObjectPath {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == **other
    }
}

/// An owned object path.
///
/// # Examples
///
/// ```
/// use tokio_dbus_client::{ObjectPath, OwnedObjectPath};
///
/// let path = OwnedObjectPath::new("/org/freedesktop/DBus")?;
/// assert_eq!(path.as_str(), "/org/freedesktop/DBus");
/// # Ok::<_, tokio_dbus_client::ObjectPathError>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct OwnedObjectPath(String);

impl OwnedObjectPath {
    /// Construct a new owned object path with validation.
    pub fn new(path: &str) -> Result<Self, ObjectPathError> {
        Ok(ObjectPath::new(path)?.to_owned())
    }
}

impl Deref for OwnedObjectPath {
    type Target = ObjectPath;

    #[inline]
    fn deref(&self) -> &ObjectPath {
        // SAFETY: The contents were validated at construction.
        unsafe { ObjectPath::new_unchecked(&self.0) }
    }
}

impl Borrow<ObjectPath> for OwnedObjectPath {
    #[inline]
    fn borrow(&self) -> &ObjectPath {
        self
    }
}

impl AsRef<ObjectPath> for OwnedObjectPath {
    #[inline]
    fn as_ref(&self) -> &ObjectPath {
        self
    }
}

impl Hash for OwnedObjectPath {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}

impl From<&ObjectPath> for OwnedObjectPath {
    #[inline]
    fn from(path: &ObjectPath) -> Self {
        path.to_owned()
    }
}

impl PartialEq<ObjectPath> for OwnedObjectPath {
    #[inline]
    fn eq(&self, other: &ObjectPath) -> bool {
        *self.0 == other.0
    }
}

impl PartialEq<str> for OwnedObjectPath {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for OwnedObjectPath {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for OwnedObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for OwnedObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error raised when an object path fails validation.
#[derive(Debug, PartialEq, Eq)]
pub struct ObjectPathError {
    path: Box<str>,
}

impl fmt::Display for ObjectPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid D-Bus object path: {:?}", self.path)
    }
}

impl error::Error for ObjectPathError {}

#[cfg(test)]
mod tests {
    use super::ObjectPath;

    #[test]
    fn object_path_grammar() {
        assert!(ObjectPath::new("/").is_ok());
        assert!(ObjectPath::new("/org").is_ok());
        assert!(ObjectPath::new("/org/freedesktop/DBus").is_ok());
        assert!(ObjectPath::new("/a_b/c0").is_ok());
        // The permissive grammar accepts empty and trailing components.
        assert!(ObjectPath::new("//").is_ok());
        assert!(ObjectPath::new("/org/").is_ok());

        assert!(ObjectPath::new("").is_err());
        assert!(ObjectPath::new("org").is_err());
        assert!(ObjectPath::new("relative/path").is_err());
        assert!(ObjectPath::new("/with space").is_err());
        assert!(ObjectPath::new("/with-dash").is_err());
        assert!(ObjectPath::new("/with.dot").is_err());
    }
}
