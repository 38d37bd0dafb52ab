use crate::proto;

use super::Signature;

/// A single complete type yielded by [`Iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Type<'a> {
    /// A basic type identified by its type code.
    Basic(proto::Type),
    /// A variant carrying its own signature inline.
    Variant,
    /// An array over the given element type.
    Array(&'a Signature),
    /// A struct over the given field types.
    Struct(&'a Signature),
    /// A dict entry over the given key and value types. Only ever appears as
    /// an array element.
    Dict(&'a Signature, &'a Signature),
}

/// An iterator over a signature which yields one complete [`Type`] at a time.
pub(crate) struct Iter<'a> {
    rest: &'a [u8],
}

impl<'a> Iter<'a> {
    #[inline]
    pub(super) fn new(signature: &'a Signature) -> Self {
        Self {
            rest: signature.as_bytes(),
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Type<'a>;

    fn next(&mut self) -> Option<Type<'a>> {
        let n = head(self.rest)?;
        let (first, rest) = self.rest.split_at(n);
        self.rest = rest;

        Some(match *first.first()? {
            b'a' => {
                // SAFETY: A trailing slice of a valid complete type is one too.
                Type::Array(unsafe { Signature::new_unchecked(&first[1..]) })
            }
            b'(' => {
                let fields = &first[1..first.len() - 1];
                // SAFETY: Struct fields form a valid sequence of types.
                Type::Struct(unsafe { Signature::new_unchecked(fields) })
            }
            b'{' => {
                let inner = &first[1..first.len() - 1];
                let k = head(inner)?;
                let (key, value) = inner.split_at(k);
                // SAFETY: Key and value are each one valid complete type.
                unsafe {
                    Type::Dict(
                        Signature::new_unchecked(key),
                        Signature::new_unchecked(value),
                    )
                }
            }
            b'v' => Type::Variant,
            b => Type::Basic(proto::Type::new(b)),
        })
    }
}

/// The length in bytes of the first single complete type of `bytes`.
fn head(bytes: &[u8]) -> Option<usize> {
    let mut n = 0;

    while bytes.get(n) == Some(&b'a') {
        n += 1;
    }

    match *bytes.get(n)? {
        b'(' | b'{' => {
            let mut depth = 0usize;

            while let Some(&b) = bytes.get(n) {
                match b {
                    b'(' | b'{' => depth += 1,
                    b')' | b'}' => {
                        depth -= 1;

                        if depth == 0 {
                            return Some(n + 1);
                        }
                    }
                    _ => {}
                }

                n += 1;
            }

            None
        }
        _ => Some(n + 1),
    }
}
