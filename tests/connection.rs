//! End-to-end tests against an in-process mock bus speaking over a unix
//! socket pair.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::os::unix::net::UnixStream as StdUnixStream;

use anyhow::{ensure, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

use tokio_dbus_client::{
    frame, Client, Connection, Endianness, Message, ReplyError, Signature, SignatureBuf, Value,
};

const BUS_NAME: &str = "org.freedesktop.DBus";

/// The server half of a socket pair, accepting the authentication handshake
/// and framing messages with the crate's own codec.
struct MockBus {
    stream: UnixStream,
    buf: Vec<u8>,
    fds: VecDeque<std::os::fd::OwnedFd>,
    serial: u32,
}

impl MockBus {
    async fn accept(stream: StdUnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;

        let mut bus = Self {
            stream: UnixStream::from_std(stream)?,
            buf: Vec::new(),
            fds: VecDeque::new(),
            serial: 0,
        };

        let line = bus.read_line().await?;
        ensure!(
            line.starts_with(b"\0AUTH EXTERNAL "),
            "unexpected auth line"
        );
        bus.stream.write_all(b"OK 1234deadbeefdeadbeefdeadbeef12\r\n").await?;

        let line = bus.read_line().await?;
        ensure!(line == b"NEGOTIATE_UNIX_FD", "unexpected negotiate line");
        bus.stream.write_all(b"AGREE_UNIX_FD\r\n").await?;

        let line = bus.read_line().await?;
        ensure!(line == b"BEGIN", "unexpected begin line");

        Ok(bus)
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(n) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line = self.buf.drain(..=n).collect::<Vec<u8>>();

                while matches!(line.last(), Some(b'\r' | b'\n')) {
                    line.pop();
                }

                return Ok(line);
            }

            let mut chunk = [0u8; 256];
            let n = self.stream.read(&mut chunk).await?;
            ensure!(n > 0, "client closed during authentication");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn next_message(&mut self) -> Result<Message> {
        loop {
            if let Some((message, total)) = frame::unmarshal(&self.buf, &mut self.fds)? {
                self.buf.drain(..total);
                return Ok(message);
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            ensure!(n > 0, "client closed the stream");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        self.serial += 1;
        let serial = NonZeroU32::new(self.serial).context("serial overflow")?;
        let (bytes, _) = frame::marshal(&message, serial, Endianness::LITTLE)?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    async fn handle_hello(&mut self, unique_name: &str) -> Result<()> {
        let call = self.next_message().await?;
        ensure!(call.member() == Some("Hello"), "expected Hello");
        ensure!(call.serial() == NonZeroU32::new(1), "Hello must be serial 1");

        let reply = call
            .method_return()?
            .with_sender(BUS_NAME)
            .with_body(Signature::STRING, vec![Value::from(unique_name)]);

        self.send(reply).await
    }

    /// Expect an `AddMatch` call and acknowledge it.
    async fn handle_add_match(&mut self) -> Result<String> {
        let call = self.next_message().await?;
        ensure!(call.member() == Some("AddMatch"), "expected AddMatch");
        ensure!(call.destination() == Some(BUS_NAME));

        let rule = call.body().first().and_then(Value::as_str).map(str::to_owned);
        let reply = call.method_return()?.with_sender(BUS_NAME);
        self.send(reply).await?;

        rule.context("AddMatch without a rule")
    }
}

/// Open a connection against a mock which has already answered Hello.
async fn connect(unique_name: &'static str) -> Result<(Connection, MockBus)> {
    let (client_end, server_end) = StdUnixStream::pair()?;

    let server: JoinHandle<Result<MockBus>> = tokio::spawn(async move {
        let mut bus = MockBus::accept(server_end).await?;
        bus.handle_hello(unique_name).await?;
        Ok(bus)
    });

    let connection = Connection::from_stream(client_end).await?;
    let bus = server.await??;
    Ok((connection, bus))
}

#[tokio::test]
async fn hello_exchange() -> Result<()> {
    let (connection, _bus) = connect(":1.42").await?;
    assert_eq!(connection.unique_name(), Some(":1.42"));
    Ok(())
}

#[tokio::test]
async fn simple_call() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        let call = bus.next_message().await?;
        ensure!(call.destination() == Some("org.example"));
        ensure!(call.path().map(|p| p.as_str()) == Some("/x"));
        ensure!(call.interface() == Some("org.example.I"));
        ensure!(call.member() == Some("Echo"));
        ensure!(call.body() == [Value::from("hi")]);
        ensure!(call.serial() == NonZeroU32::new(2), "first user call is serial 2");

        let reply = call
            .method_return()?
            .with_body(Signature::STRING, vec![Value::from("hi")]);

        bus.send(reply).await
    });

    let m = Message::method_call("/x", "Echo")?
        .with_destination("org.example")
        .with_interface("org.example.I")
        .with_body(Signature::STRING, vec![Value::from("hi")]);

    let reply = connection.call(m).await?.context("expected a reply")?;
    assert_eq!(reply.body(), [Value::from("hi")]);

    server.await??;
    Ok(())
}

#[tokio::test]
async fn remote_errors_are_mapped() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        let call = bus.next_message().await?;

        let reply = call
            .error_reply("org.example.Fail")?
            .with_body(Signature::STRING, vec![Value::from("nope")]);

        bus.send(reply).await
    });

    let m = Message::method_call("/x", "Echo")?
        .with_destination("org.example")
        .with_interface("org.example.I");

    let error = connection.call(m).await.unwrap_err();
    assert_eq!(error.remote_name(), Some("org.example.Fail"));
    assert_eq!(error.remote_message(), Some("nope"));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn invalid_paths_fail_locally() -> Result<()> {
    let (connection, _bus) = connect(":1.42").await?;

    let error = connection
        .emit_signal("no/leading/slash", "org.example.S", "Ev", Signature::EMPTY, vec![])
        .await
        .unwrap_err();

    assert!(error.is_invalid_path());
    Ok(())
}

#[tokio::test]
async fn replies_resolve_out_of_issue_order() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        let first = bus.next_message().await?;
        let second = bus.next_message().await?;
        ensure!(first.member() == Some("A"));
        ensure!(second.member() == Some("B"));

        // Answer in reverse order.
        let reply = second
            .method_return()?
            .with_body(Signature::STRING, vec![Value::from("b")]);
        bus.send(reply).await?;

        let reply = first
            .method_return()?
            .with_body(Signature::STRING, vec![Value::from("a")]);
        bus.send(reply).await
    });

    let a = Message::method_call("/x", "A")?.with_destination("org.example");
    let b = Message::method_call("/x", "B")?.with_destination("org.example");

    let (ra, rb) = tokio::join!(connection.call(a), connection.call(b));

    assert_eq!(ra?.context("reply a")?.body(), [Value::from("a")]);
    assert_eq!(rb?.context("reply b")?.body(), [Value::from("b")]);

    server.await??;
    Ok(())
}

#[tokio::test]
async fn signal_subscription_filters_and_orders() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;
    let client = Client::new(connection);

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        let rule = bus.handle_add_match().await?;
        ensure!(
            rule == "type='signal',sender=':1.7',path='/s',interface='org.example.S',member='Ev'",
            "unexpected rule {rule}"
        );

        let signal = Message::signal("/s", "Ev")?
            .with_interface("org.example.S")
            .with_sender(":1.7")
            .with_body(Signature::INT32, vec![Value::Int32(1)]);
        bus.send(signal).await?;

        // Same path and interface, different member: not delivered.
        let other = Message::signal("/s", "Other")?
            .with_interface("org.example.S")
            .with_sender(":1.7");
        bus.send(other).await?;

        let signal = Message::signal("/s", "Ev")?
            .with_interface("org.example.S")
            .with_sender(":1.7")
            .with_body(Signature::INT32, vec![Value::Int32(2)]);
        bus.send(signal).await
    });

    let mut subscription = client
        .subscribe_signal(":1.7", "/s", "org.example.S", "Ev")
        .await?;

    assert_eq!(subscription.next().await, Some(vec![Value::Int32(1)]));
    assert_eq!(subscription.next().await, Some(vec![Value::Int32(2)]));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn signal_fanout_reaches_every_queue() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;

    let mut first = connection.signal_queue().await?;
    let mut second = connection.signal_queue().await?;

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        for n in [1, 2] {
            let signal = Message::signal("/s", "Ev")?
                .with_interface("org.example.S")
                .with_body(Signature::INT32, vec![Value::Int32(n)]);
            bus.send(signal).await?;
        }

        Ok(())
    });

    for queue in [&mut first, &mut second] {
        for n in [1, 2] {
            let message = queue.next().await.context("queue ended early")?;
            assert_eq!(message.body(), [Value::Int32(n)]);
        }
    }

    server.await??;
    Ok(())
}

#[tokio::test]
async fn property_watch_sequence() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;
    let client = Client::new(connection);

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        bus.handle_add_match().await?;

        let get = bus.next_message().await?;
        ensure!(get.member() == Some("Get"));
        ensure!(get.interface() == Some("org.freedesktop.DBus.Properties"));
        ensure!(get.body() == [Value::from("org.example.W"), Value::from("v")]);

        let reply = get
            .method_return()?
            .with_body(Signature::VARIANT, vec![Value::variant(Value::Int32(10))]);
        bus.send(reply).await?;

        let changed_signature = SignatureBuf::new("sa{sv}as")?;

        let changed = Message::signal("/w", "PropertiesChanged")?
            .with_interface("org.freedesktop.DBus.Properties")
            .with_sender(":1.9")
            .with_body(
                &changed_signature,
                vec![
                    Value::from("org.example.W"),
                    Value::dict(
                        Signature::STRING,
                        Signature::VARIANT,
                        [(Value::from("v"), Value::variant(Value::Int32(20)))],
                    ),
                    Value::array(Signature::STRING, []),
                ],
            );
        bus.send(changed).await?;

        let invalidated = Message::signal("/w", "PropertiesChanged")?
            .with_interface("org.freedesktop.DBus.Properties")
            .with_sender(":1.9")
            .with_body(
                &changed_signature,
                vec![
                    Value::from("org.example.W"),
                    Value::dict(Signature::STRING, Signature::VARIANT, []),
                    Value::array(Signature::STRING, [Value::from("v")]),
                ],
            );
        bus.send(invalidated).await
    });

    let mut watch = client.watch_property(":1.9", "/w", "org.example.W", "v").await?;

    assert_eq!(watch.next().await, Some(Some(Value::Int32(10))));
    assert_eq!(watch.next().await, Some(Some(Value::Int32(20))));
    assert_eq!(watch.next().await, Some(None));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn schema_driven_call() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;
    let client = Client::new(connection);

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        let introspect = bus.next_message().await?;
        ensure!(introspect.member() == Some("Introspect"));
        ensure!(introspect.interface() == Some("org.freedesktop.DBus.Introspectable"));

        let xml = "<node><interface name=\"org.example.I\"><method name=\"Echo\">\
                   <arg direction=\"in\" type=\"s\" /><arg direction=\"out\" type=\"s\" />\
                   </method></interface></node>";

        let reply = introspect
            .method_return()?
            .with_body(Signature::STRING, vec![Value::from(xml)]);
        bus.send(reply).await?;

        let call = bus.next_message().await?;
        ensure!(call.member() == Some("Echo"));
        // The body signature was filled in from the schema.
        ensure!(*call.signature() == *Signature::STRING);

        let reply = call
            .method_return()?
            .with_body(Signature::STRING, vec![Value::from("hi")]);
        bus.send(reply).await
    });

    let result = client
        .call(
            "org.example",
            "/x",
            "org.example.I",
            "Echo",
            vec![Value::from("hi")],
            None,
        )
        .await?;

    // One declared return: the singleton is unwrapped.
    assert_eq!(result, Some(Value::from("hi")));

    // Unknown members fail against the cached schema without new traffic.
    let error = client
        .call("org.example", "/x", "org.example.I", "Nope", vec![], None)
        .await
        .unwrap_err();
    assert!(error.is_schema());

    server.await??;
    Ok(())
}

#[tokio::test]
async fn call_queue_routing_and_replies() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;

    let mut queue = connection.call_queue(":1.42").await?;

    // Only one queue per name at a time.
    let error = connection.call_queue(":1.42").await.unwrap_err();
    assert!(error.is_busy());

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        let call = Message::method_call("/obj", "Frob")?
            .with_destination(":1.42")
            .with_sender(":1.7")
            .with_body(Signature::UINT32, vec![Value::Uint32(5)]);
        bus.send(call).await?;

        let reply = bus.next_message().await?;
        ensure!(reply.destination() == Some(":1.7"));
        ensure!(reply.reply_serial().is_some());
        ensure!(reply.body() == [Value::Uint32(6)]);

        // A second call whose handler fails maps onto an error reply.
        let call = Message::method_call("/obj", "Frob")?
            .with_destination(":1.42")
            .with_sender(":1.7");
        bus.send(call).await?;

        let reply = bus.next_message().await?;
        ensure!(reply.error_name() == Some("org.freedesktop.DBus.Error.AccessDenied"));
        ensure!(reply.body() == [Value::from("out of cheese")]);

        Ok(())
    });

    let call = queue.next().await.context("expected an incoming call")?;
    assert_eq!(call.member(), Some("Frob"));
    assert_eq!(call.body(), [Value::Uint32(5)]);

    connection
        .send_reply(&call, |_| async {
            Ok((SignatureBuf::new("u").unwrap(), vec![Value::Uint32(6)]))
        })
        .await?;

    let call = queue.next().await.context("expected a second call")?;

    connection
        .send_reply(&call, |_| async {
            Err(ReplyError::new("out of cheese"))
        })
        .await?;

    server.await??;
    Ok(())
}

#[tokio::test]
async fn close_unblocks_pending_calls() -> Result<()> {
    let (connection, mut bus) = connect(":1.42").await?;

    let server: JoinHandle<Result<()>> = tokio::spawn(async move {
        // Swallow whatever arrives and hold the socket open until the
        // client tears down.
        while bus.next_message().await.is_ok() {}
        Ok(())
    });

    let pending = {
        let connection = connection.clone();

        tokio::spawn(async move {
            let m = Message::method_call("/x", "Never")
                .unwrap()
                .with_destination("org.example");

            connection.call(m).await
        })
    };

    // Give the call a chance to reach the wire before tearing down.
    tokio::task::yield_now().await;
    connection.close().await?;

    let error = pending.await?.unwrap_err();
    assert!(error.is_disconnected());

    let m = Message::method_call("/x", "After")?.with_destination("org.example");
    assert!(connection.call(m).await.is_err());

    server.await??;
    Ok(())
}
