use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use tokio::io::unix::AsyncFd;

use crate::error::Result;

/// Bytes read from the socket per readiness event.
const RECV_CHUNK: usize = 1 << 16;

/// Room reserved for received descriptors per read.
const MAX_FDS_PER_READ: usize = 16;

/// The unix socket of a connection, in non-blocking mode, registered with
/// the reactor.
pub(crate) struct Transport {
    pub(crate) io: AsyncFd<UnixStream>,
}

impl Transport {
    /// Connect to the unix socket at the given path.
    pub(crate) fn connect(path: &Path) -> Result<Self> {
        Self::from_std(UnixStream::connect(path)?)
    }

    /// Wrap an already connected stream.
    pub(crate) fn from_std(stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;

        Ok(Self {
            io: AsyncFd::new(stream)?,
        })
    }

    /// Shut the socket down in both directions.
    pub(crate) fn shutdown(&self) {
        let _ = self.io.get_ref().shutdown(Shutdown::Both);
    }

    /// Send a whole buffer, waiting for writability as needed. Only used
    /// before the switch to message framing.
    pub(crate) async fn send_all(&self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            let mut guard = self.io.writable().await?;

            match guard.try_io(|io| (&mut io.get_ref()).write(bytes)) {
                Ok(Ok(n)) => bytes = &bytes[n..],
                Ok(Err(e)) => return Err(e),
                Err(_) => {}
            }
        }

        Ok(())
    }

    /// Receive one line terminated by `\n`, with the terminator stripped.
    /// Bytes past the line end are left in `carry`.
    pub(crate) async fn recv_line(&self, carry: &mut Vec<u8>) -> io::Result<Vec<u8>> {
        loop {
            if let Some(n) = carry.iter().position(|&b| b == b'\n') {
                let mut line = carry.drain(..=n).collect::<Vec<u8>>();

                while matches!(line.last(), Some(b'\r' | b'\n')) {
                    line.pop();
                }

                return Ok(line);
            }

            let mut guard = self.io.readable().await?;

            let res = guard.try_io(|io| {
                let mut chunk = [0u8; 256];
                let n = (&mut io.get_ref()).read(&mut chunk)?;

                if n == 0 {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }

                carry.extend_from_slice(&chunk[..n]);
                Ok(n)
            });

            match res {
                Ok(Ok(..)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {}
            }
        }
    }
}

/// Perform one bounded `recvmsg`, appending bytes to `buf` and received
/// descriptors to `fds`. Returns the number of bytes read; zero means the
/// peer closed the stream.
pub(crate) fn recv_step(
    stream: &UnixStream,
    buf: &mut Vec<u8>,
    fds: &mut VecDeque<OwnedFd>,
) -> io::Result<usize> {
    let mut chunk = [0u8; RECV_CHUNK];
    let mut cmsg = nix::cmsg_space!([RawFd; MAX_FDS_PER_READ]);

    let n = {
        let mut iov = [IoSliceMut::new(&mut chunk)];

        let msg = recvmsg::<()>(
            stream.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg),
            MsgFlags::MSG_CMSG_CLOEXEC,
        )
        .map_err(nix_to_io)?;

        for cmsg in msg.cmsgs().map_err(nix_to_io)? {
            if let ControlMessageOwned::ScmRights(received) = cmsg {
                for fd in received {
                    // SAFETY: Ownership of descriptors received over
                    // SCM_RIGHTS transfers to the receiving process.
                    fds.push_back(unsafe { OwnedFd::from_raw_fd(fd) });
                }
            }
        }

        msg.bytes
    };

    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

/// Perform one `sendmsg` with the given descriptors attached.
pub(crate) fn send_step(stream: &UnixStream, bytes: &[u8], fds: &[RawFd]) -> io::Result<usize> {
    let iov = [IoSlice::new(bytes)];
    let rights = [ControlMessage::ScmRights(fds)];

    let cmsgs: &[ControlMessage<'_>] = if fds.is_empty() { &[] } else { &rights };

    sendmsg::<()>(
        stream.as_raw_fd(),
        &iov,
        cmsgs,
        MsgFlags::empty(),
        None,
    )
    .map_err(nix_to_io)
}

fn nix_to_io(errno: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}
