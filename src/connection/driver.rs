use std::collections::{HashMap, VecDeque};
use std::io;
use std::num::NonZeroU32;
use std::os::fd::{OwnedFd, RawFd};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, ErrorKind, Result};
use crate::frame;
use crate::message::{Message, MessageKind};
use crate::proto::Endianness;

use super::transport::{recv_step, send_step, Transport};

/// Requests from connection handles to the driver task.
pub(super) enum Command {
    /// Queue a message for sending. `done` resolves with the assigned serial
    /// once the bytes have been handed to the kernel.
    Send {
        message: Message,
        done: Option<oneshot::Sender<Result<NonZeroU32>>>,
    },
    /// Queue a method call and register a reply slot for its serial.
    Call {
        message: Message,
        reply: oneshot::Sender<Result<Message>>,
    },
    /// Acquire a fresh signal delivery queue.
    SignalQueue {
        resp: oneshot::Sender<(u64, mpsc::UnboundedReceiver<Arc<Message>>)>,
    },
    ReleaseSignalQueue {
        id: u64,
    },
    /// Acquire the inbound call queue for the given destination name.
    CallQueue {
        name: String,
        resp: oneshot::Sender<Result<mpsc::UnboundedReceiver<Message>>>,
    },
    ReleaseCallQueue {
        name: String,
    },
    /// Tear the connection down.
    Close {
        done: oneshot::Sender<()>,
    },
}

/// One outbound message. Descriptors ride only the first fragment; on a
/// partial send the remaining tail is retried without them.
struct Chunk {
    bytes: Vec<u8>,
    offset: usize,
    fds: Vec<RawFd>,
    serial: NonZeroU32,
    done: Option<oneshot::Sender<Result<NonZeroU32>>>,
}

/// The task owning the socket and all connection state.
///
/// Every mutation of the pending-reply table, the queues and the serial
/// counter happens on this single task, which is what makes the handles
/// lock-free.
pub(super) struct Driver {
    transport: Transport,
    commands: mpsc::UnboundedReceiver<Command>,
    recv_buf: Vec<u8>,
    recv_fds: VecDeque<OwnedFd>,
    send_queue: VecDeque<Chunk>,
    serial: u32,
    replies: HashMap<NonZeroU32, oneshot::Sender<Result<Message>>>,
    signal_queues: Vec<(u64, mpsc::UnboundedSender<Arc<Message>>)>,
    call_queues: HashMap<String, mpsc::UnboundedSender<Message>>,
    next_queue: u64,
    closing: bool,
    close_done: Option<oneshot::Sender<()>>,
}

impl Driver {
    pub(super) fn new(
        transport: Transport,
        commands: mpsc::UnboundedReceiver<Command>,
        leftover: Vec<u8>,
    ) -> Self {
        Self {
            transport,
            commands,
            recv_buf: leftover,
            recv_fds: VecDeque::new(),
            send_queue: VecDeque::new(),
            serial: 0,
            replies: HashMap::new(),
            signal_queues: Vec::new(),
            call_queues: HashMap::new(),
            next_queue: 0,
            closing: false,
            close_done: None,
        }
    }

    pub(super) async fn run(mut self) {
        if let Err(error) = self.run_inner().await {
            tracing::debug!(%error, "connection terminated");
        }

        self.teardown();
        self.transport.shutdown();

        if let Some(done) = self.close_done.take() {
            let _ = done.send(());
        }
    }

    async fn run_inner(&mut self) -> Result<()> {
        loop {
            if self.closing && (self.close_done.is_some() || self.send_queue.is_empty()) {
                return Ok(());
            }

            tokio::select! {
                command = self.commands.recv(), if !self.closing => {
                    match command {
                        Some(command) => self.handle_command(command),
                        // Every handle is gone; flush what is queued and
                        // stop.
                        None => self.closing = true,
                    }
                }
                guard = self.transport.io.readable() => {
                    let mut guard = guard.map_err(Error::from)?;

                    let n = match guard.try_io(|io| {
                        recv_step(io.get_ref(), &mut self.recv_buf, &mut self.recv_fds)
                    }) {
                        Ok(Ok(0)) => {
                            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                        }
                        Ok(Ok(n)) => n,
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => 0,
                    };

                    drop(guard);

                    if n > 0 {
                        self.dispatch_frames()?;
                    }
                }
                guard = self.transport.io.writable(), if !self.send_queue.is_empty() => {
                    let mut guard = guard.map_err(Error::from)?;

                    let finished = if let Some(chunk) = self.send_queue.front_mut() {
                        match guard.try_io(|io| {
                            send_step(io.get_ref(), &chunk.bytes[chunk.offset..], &chunk.fds)
                        }) {
                            Ok(Ok(n)) => {
                                chunk.offset += n;
                                chunk.fds.clear();
                                chunk.offset == chunk.bytes.len()
                            }
                            Ok(Err(e)) => return Err(e.into()),
                            Err(_) => false,
                        }
                    } else {
                        false
                    };

                    if finished {
                        if let Some(chunk) = self.send_queue.pop_front() {
                            if let Some(done) = chunk.done {
                                let _ = done.send(Ok(chunk.serial));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Get the next serial. Serials are never zero and never reused until
    /// the counter wraps.
    fn next_serial(&mut self) -> NonZeroU32 {
        loop {
            let Some(serial) = NonZeroU32::new(self.serial.wrapping_add(1)) else {
                self.serial = 1;
                continue;
            };

            self.serial = serial.get();
            break serial;
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { message, done } => {
                let serial = self.next_serial();

                match frame::marshal(&message, serial, Endianness::LITTLE) {
                    Ok((bytes, fds)) => self.send_queue.push_back(Chunk {
                        bytes,
                        offset: 0,
                        fds,
                        serial,
                        done,
                    }),
                    Err(error) => {
                        if let Some(done) = done {
                            let _ = done.send(Err(error));
                        }
                    }
                }
            }
            Command::Call { message, reply } => {
                let serial = self.next_serial();

                match frame::marshal(&message, serial, Endianness::LITTLE) {
                    Ok((bytes, fds)) => {
                        // The reply slot must exist before the bytes can hit
                        // the wire.
                        self.replies.insert(serial, reply);

                        self.send_queue.push_back(Chunk {
                            bytes,
                            offset: 0,
                            fds,
                            serial,
                            done: None,
                        });
                    }
                    Err(error) => {
                        let _ = reply.send(Err(error));
                    }
                }
            }
            Command::SignalQueue { resp } => {
                let id = self.next_queue;
                self.next_queue += 1;
                let (tx, rx) = mpsc::unbounded_channel();
                self.signal_queues.push((id, tx));
                let _ = resp.send((id, rx));
            }
            Command::ReleaseSignalQueue { id } => {
                self.signal_queues.retain(|(queue, _)| *queue != id);
            }
            Command::CallQueue { name, resp } => {
                if self.call_queues.contains_key(&name) {
                    let _ = resp.send(Err(ErrorKind::Busy(name.into()).into()));
                } else {
                    let (tx, rx) = mpsc::unbounded_channel();
                    self.call_queues.insert(name, tx);
                    let _ = resp.send(Ok(rx));
                }
            }
            Command::ReleaseCallQueue { name } => {
                self.call_queues.remove(&name);
            }
            Command::Close { done } => {
                self.closing = true;
                self.close_done = Some(done);
            }
        }
    }

    /// Drain every complete message out of the receive buffer.
    fn dispatch_frames(&mut self) -> Result<()> {
        while let Some((message, total)) = frame::unmarshal(&self.recv_buf, &mut self.recv_fds)? {
            self.recv_buf.drain(..total);
            self.route(message);
        }

        Ok(())
    }

    fn route(&mut self, message: Message) {
        match &message.kind {
            MessageKind::MethodReturn { reply_serial } | MessageKind::Error { reply_serial, .. } => {
                let reply_serial = *reply_serial;

                match self.replies.remove(&reply_serial) {
                    Some(slot) => {
                        if slot.send(Ok(message)).is_err() {
                            tracing::warn!(
                                serial = reply_serial.get(),
                                "dropping reply for an abandoned call"
                            );
                        }
                    }
                    None => {
                        tracing::warn!(
                            serial = reply_serial.get(),
                            "dropping reply with unmatched serial"
                        );
                    }
                }
            }
            MessageKind::MethodCall { .. } => {
                let queue = message
                    .destination
                    .as_deref()
                    .and_then(|name| self.call_queues.get(name));

                let Some(queue) = queue else {
                    tracing::debug!(
                        destination = message.destination.as_deref().unwrap_or(""),
                        "dropping call for unregistered destination"
                    );
                    return;
                };

                if queue.send(message).is_err() {
                    tracing::debug!("dropping call, queue receiver is gone");
                }
            }
            MessageKind::Signal { .. } => {
                let message = Arc::new(message);

                self.signal_queues
                    .retain(|(_, queue)| queue.send(message.clone()).is_ok());
            }
        }
    }

    /// Resolve every pending reply slot and drop the queues so awaiting
    /// callers unblock.
    fn teardown(&mut self) {
        for (_, slot) in self.replies.drain() {
            let _ = slot.send(Err(Error::disconnected()));
        }

        for chunk in self.send_queue.drain(..) {
            if let Some(done) = chunk.done {
                let _ = done.send(Err(Error::disconnected()));
            }
        }

        self.signal_queues.clear();
        self.call_queues.clear();
    }
}
