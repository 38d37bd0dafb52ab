use crate::proto::Type;

use super::{SignatureError, SignatureErrorKind, MAX_CONTAINER_DEPTH, MAX_DEPTH, MAX_SIGNATURE};

const NONE: u8 = 0;
const ARRAY: u8 = 1;
const STRUCT: u8 = 2;
const DICT: u8 = 3;

/// Validate a signature against the D-Bus grammar.
///
/// The container stack is kept in a pair of fixed arrays so that validation
/// can run in a constant context.
pub(super) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    use SignatureErrorKind::*;

    if bytes.len() > MAX_SIGNATURE {
        return Err(SignatureError::new(SignatureTooLong));
    }

    let mut kind = [NONE; MAX_DEPTH];
    let mut count = [0u8; MAX_DEPTH];
    let mut depth = 0usize;
    let mut arrays = 0usize;
    let mut structs = 0usize;
    let mut n = 0usize;

    while n < bytes.len() {
        let t = Type::new(bytes[n]);
        n += 1;

        let mut is_basic = match t {
            Type::BYTE
            | Type::BOOLEAN
            | Type::INT16
            | Type::UINT16
            | Type::INT32
            | Type::UINT32
            | Type::INT64
            | Type::UINT64
            | Type::DOUBLE
            | Type::STRING
            | Type::OBJECT_PATH
            | Type::SIGNATURE
            | Type::UNIX_FD => true,
            // A variant is a single complete type, but not a basic one.
            Type::VARIANT => false,
            Type::ARRAY => {
                if depth == MAX_DEPTH || arrays == MAX_CONTAINER_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumArrayRecursion));
                }

                kind[depth] = ARRAY;
                count[depth] = 0;
                depth += 1;
                arrays += 1;
                continue;
            }
            Type::OPEN_PAREN => {
                if depth == MAX_DEPTH || structs == MAX_CONTAINER_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumStructRecursion));
                }

                kind[depth] = STRUCT;
                count[depth] = 0;
                depth += 1;
                structs += 1;
                continue;
            }
            Type::CLOSE_PAREN => {
                if depth == 0 {
                    return Err(SignatureError::new(StructEndedButNotStarted));
                }

                if kind[depth - 1] == ARRAY {
                    return Err(SignatureError::new(MissingArrayElementType));
                }

                if kind[depth - 1] != STRUCT {
                    return Err(SignatureError::new(StructEndedButNotStarted));
                }

                depth -= 1;
                structs -= 1;

                if count[depth] == 0 {
                    return Err(SignatureError::new(StructHasNoFields));
                }

                false
            }
            Type::OPEN_BRACE => {
                if depth == MAX_DEPTH {
                    return Err(SignatureError::new(ExceededMaximumDictRecursion));
                }

                kind[depth] = DICT;
                count[depth] = 0;
                depth += 1;
                continue;
            }
            Type::CLOSE_BRACE => {
                if depth == 0 {
                    return Err(SignatureError::new(DictEndedButNotStarted));
                }

                if kind[depth - 1] == ARRAY {
                    return Err(SignatureError::new(MissingArrayElementType));
                }

                if kind[depth - 1] != DICT {
                    return Err(SignatureError::new(DictEndedButNotStarted));
                }

                depth -= 1;

                match count[depth] {
                    0 => return Err(SignatureError::new(DictEntryHasNoFields)),
                    1 => return Err(SignatureError::new(DictEntryHasOnlyOneField)),
                    2 => {}
                    _ => return Err(SignatureError::new(DictEntryHasTooManyFields)),
                }

                if depth == 0 || kind[depth - 1] != ARRAY {
                    return Err(SignatureError::new(DictEntryNotInsideArray));
                }

                false
            }
            t => return Err(SignatureError::new(UnknownTypeCode(t))),
        };

        // A complete element also completes every array stacked on top of it.
        while depth > 0 && kind[depth - 1] == ARRAY {
            depth -= 1;
            arrays -= 1;
            is_basic = false;
        }

        if depth > 0 {
            if kind[depth - 1] == DICT && count[depth - 1] == 0 && !is_basic {
                return Err(SignatureError::new(DictKeyMustBeBasicType));
            }

            count[depth - 1] += 1;
        }
    }

    if depth > 0 {
        return Err(match kind[depth - 1] {
            ARRAY => SignatureError::new(MissingArrayElementType),
            STRUCT => SignatureError::new(StructStartedButNotEnded),
            _ => SignatureError::new(DictStartedButNotEnded),
        });
    }

    Ok(())
}
