//! The client side of the line-based authentication protocol which precedes
//! binary message framing.
//!
//! The exchange is `AUTH EXTERNAL <hex-uid>` answered by `OK <guid>`,
//! `NEGOTIATE_UNIX_FD` answered by `AGREE_UNIX_FD`, and finally `BEGIN`,
//! after which the stream switches to message framing.

use crate::error::{Error, ErrorKind, Result};

/// A command sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaslRequest<'a> {
    /// EXTERNAL authentication with the ASCII-hex encoded uid.
    AuthExternal(&'a str),
    /// Request unix file descriptor passing.
    NegotiateUnixFd,
    /// Switch to binary message framing.
    Begin,
}

/// A response received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SaslResponse {
    /// Authentication succeeded; carries the server GUID.
    Ok(String),
    /// The server agreed to unix file descriptor passing.
    AgreeUnixFd,
}

/// Append the line for the given request, including the terminator.
pub(crate) fn encode(request: &SaslRequest<'_>, buf: &mut Vec<u8>) {
    match request {
        SaslRequest::AuthExternal(hex) => {
            buf.extend_from_slice(b"AUTH EXTERNAL ");
            buf.extend_from_slice(hex.as_bytes());
        }
        SaslRequest::NegotiateUnixFd => buf.extend_from_slice(b"NEGOTIATE_UNIX_FD"),
        SaslRequest::Begin => buf.extend_from_slice(b"BEGIN"),
    }

    buf.extend_from_slice(b"\r\n");
}

/// Decode one response line, with the terminator already stripped.
pub(crate) fn decode(line: &[u8]) -> Result<SaslResponse> {
    let (command, rest) = match line.iter().position(|&b| b == b' ') {
        Some(n) => (&line[..n], &line[n + 1..]),
        None => (line, &line[..0]),
    };

    match command {
        b"OK" => Ok(SaslResponse::Ok(
            String::from_utf8_lossy(rest).into_owned(),
        )),
        b"AGREE_UNIX_FD" => Ok(SaslResponse::AgreeUnixFd),
        _ => Err(Error::new(ErrorKind::Auth(
            String::from_utf8_lossy(line).into(),
        ))),
    }
}

/// ASCII-hex encoding of the decimal string form of a uid, as EXTERNAL
/// authentication wants it.
pub(crate) fn external_hex(uid: u32) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let decimal = uid.to_string();
    let mut out = String::with_capacity(decimal.len() * 2);

    for &b in decimal.as_bytes() {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0xf) as usize] as char);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, external_hex, SaslRequest, SaslResponse};

    #[test]
    fn hex_encoding() {
        assert_eq!(external_hex(0), "30");
        assert_eq!(external_hex(1000), "31303030");
        assert_eq!(external_hex(u32::MAX), "34323934393637323935");
    }

    #[test]
    fn encode_lines() {
        let mut buf = Vec::new();
        encode(&SaslRequest::AuthExternal("31303030"), &mut buf);
        assert_eq!(buf, b"AUTH EXTERNAL 31303030\r\n");

        buf.clear();
        encode(&SaslRequest::NegotiateUnixFd, &mut buf);
        assert_eq!(buf, b"NEGOTIATE_UNIX_FD\r\n");

        buf.clear();
        encode(&SaslRequest::Begin, &mut buf);
        assert_eq!(buf, b"BEGIN\r\n");
    }

    #[test]
    fn decode_lines() {
        assert_eq!(
            decode(b"OK 1234deadbeef").unwrap(),
            SaslResponse::Ok("1234deadbeef".into())
        );
        assert_eq!(decode(b"AGREE_UNIX_FD").unwrap(), SaslResponse::AgreeUnixFd);
        assert!(decode(b"REJECTED EXTERNAL").is_err());
        assert!(decode(b"ERROR").is_err());
    }
}
