//! End-to-end tests for the relay bridge.
//!
//! Each test drives the public facade with raw client bytes and an
//! in-memory broker on the far side of the connector.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use stomp_relay::protocol::{encode_frame, headers, Command, DecodeBuffer, Frame};
use stomp_relay::transport::{BrokerConnection, BrokerConnector, ClientTransport, CloseReason};
use stomp_relay::{Payload, RelayBridge, RelayError, Result, SessionMessage, SessionState};

/// Route bridge tracing through the test harness, honoring `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client transport double that records every outgoing chunk.
struct RecordingTransport {
    id: String,
    chunks: Mutex<Vec<Bytes>>,
    closed: Mutex<Option<CloseReason>>,
}

impl RecordingTransport {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            chunks: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
        })
    }

    fn decoded(&self) -> Vec<Frame> {
        let mut decoder = DecodeBuffer::new();
        let mut frames = Vec::new();
        for chunk in self.chunks.lock().unwrap().iter() {
            frames.extend(decoder.push(chunk).unwrap());
        }
        frames
    }

    fn close_reason(&self) -> Option<CloseReason> {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl ClientTransport for RecordingTransport {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        self.chunks.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&self, reason: CloseReason) {
        *self.closed.lock().unwrap() = Some(reason);
    }
}

/// Client transport whose writes never complete.
struct StalledTransport {
    id: String,
}

#[async_trait]
impl ClientTransport for StalledTransport {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn send(&self, _frame: Bytes) -> Result<()> {
        std::future::pending().await
    }

    async fn close(&self, _reason: CloseReason) {}
}

/// Connector double handing out pre-built duplex streams, one per session.
struct TestConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
}

#[async_trait]
impl BrokerConnector for TestConnector {
    async fn connect(&self, _session_id: &str) -> Result<BrokerConnection> {
        let stream = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(RelayError::ConnectionClosed)?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(BrokerConnection::new(reader, writer))
    }
}

/// The broker end of one relay leg.
struct TestBroker {
    stream: DuplexStream,
    decoder: DecodeBuffer,
    pending: Vec<Frame>,
}

impl TestBroker {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            decoder: DecodeBuffer::new(),
            pending: Vec::new(),
        }
    }

    /// Read until a full non-heartbeat frame arrives from the relay.
    async fn next_frame(&mut self) -> Frame {
        loop {
            self.pending.retain(|f| !f.is_heartbeat());
            if !self.pending.is_empty() {
                return self.pending.remove(0);
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "broker stream closed while waiting for a frame");
            self.pending.extend(self.decoder.push(&buf[..n]).unwrap());
        }
    }

    /// Assert nothing frame-worthy arrives for the given duration.
    async fn expect_quiet(&mut self, dur: Duration) {
        assert!(self.pending.is_empty(), "frames already pending");
        let mut buf = [0u8; 1024];
        match tokio::time::timeout(dur, self.stream.read(&mut buf)).await {
            Err(_) => {}
            Ok(Ok(0)) => panic!("broker stream closed during quiet period"),
            Ok(Ok(n)) => {
                let frames = self.decoder.push(&buf[..n]).unwrap();
                assert!(frames.is_empty(), "unexpected frames: {:?}", frames);
            }
            Ok(Err(e)) => panic!("broker read failed: {}", e),
        }
    }

    async fn send_frame(&mut self, frame: Frame) {
        self.stream.write_all(&encode_frame(&frame)).await.unwrap();
    }
}

/// One connector plus the matching broker ends, in hand-out order.
fn broker_pair(sessions: usize) -> (Arc<TestConnector>, Vec<TestBroker>) {
    init_tracing();
    let mut streams = VecDeque::new();
    let mut brokers = Vec::new();
    for _ in 0..sessions {
        let (near, far) = tokio::io::duplex(64 * 1024);
        streams.push_back(near);
        brokers.push(TestBroker::new(far));
    }
    let connector = Arc::new(TestConnector {
        streams: Mutex::new(streams),
    });
    (connector, brokers)
}

/// Poll the transport until it has decoded at least `count` frames.
async fn client_frames(transport: &RecordingTransport, count: usize) -> Vec<Frame> {
    for _ in 0..100 {
        let frames = transport.decoded();
        if frames.len() >= count {
            return frames;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "client never received {} frames, got {:?}",
        count,
        transport.decoded()
    );
}

/// Run the STOMP handshake for one session and wait for the CONNECTED.
async fn handshake(
    bridge: &RelayBridge,
    broker: &mut TestBroker,
    session_id: &str,
) -> Arc<RecordingTransport> {
    let transport = RecordingTransport::new(session_id);
    bridge.session_started(transport.clone()).await;

    let connect = Frame::new(Command::Connect).header(headers::ACCEPT_VERSION, "1.2");
    bridge
        .on_data(session_id, &encode_frame(&connect))
        .await
        .unwrap();

    let forwarded = broker.next_frame().await;
    assert_eq!(forwarded.command, Command::Connect);

    broker
        .send_frame(Frame::new(Command::Connected).header(headers::VERSION, "1.2"))
        .await;

    let frames = client_frames(&transport, 1).await;
    assert_eq!(frames[0].command, Command::Connected);
    transport
}

/// Full CONNECT handshake: frame to the broker, CONNECTED back to the client.
#[tokio::test]
async fn test_connect_handshake() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);

    let transport = RecordingTransport::new("s1");
    bridge.session_started(transport.clone()).await;

    let connect = Frame::new(Command::Connect)
        .header(headers::ACCEPT_VERSION, "1.1,1.2")
        .header(headers::HEART_BEAT, "10000,10000");
    bridge.on_data("s1", &encode_frame(&connect)).await.unwrap();

    // The relay pins heartbeats off on the broker leg but keeps the rest.
    let forwarded = broker.next_frame().await;
    assert_eq!(forwarded.command, Command::Connect);
    assert_eq!(forwarded.headers.get(headers::ACCEPT_VERSION), Some("1.1,1.2"));
    assert_eq!(forwarded.headers.get(headers::HEART_BEAT), Some("0,0"));

    broker
        .send_frame(Frame::new(Command::Connected).header(headers::VERSION, "1.2"))
        .await;

    let frames = client_frames(&transport, 1).await;
    assert_eq!(frames[0].command, Command::Connected);
    assert_eq!(frames[0].headers.get(headers::VERSION), Some("1.2"));
    assert_eq!(frames[0].headers.get(headers::HEART_BEAT), Some("0,0"));

    assert_eq!(bridge.session_state("s1").await, Some(SessionState::Ready));
}

/// Frames sent after the handshake reach the broker unchanged.
#[tokio::test]
async fn test_frames_forwarded_after_handshake() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);
    handshake(&bridge, &mut broker, "s1").await;

    let send = Frame::new(Command::Send)
        .header(headers::DESTINATION, "/queue/orders")
        .with_body("order-42");
    bridge.on_data("s1", &encode_frame(&send)).await.unwrap();

    let forwarded = broker.next_frame().await;
    assert_eq!(forwarded.command, Command::Send);
    assert_eq!(forwarded.headers.get(headers::DESTINATION), Some("/queue/orders"));
    assert_eq!(forwarded.body.as_ref(), b"order-42");
}

/// A send racing the handshake waits for the rendezvous to complete.
#[tokio::test]
async fn test_send_waits_for_rendezvous() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = Arc::new(RelayBridge::builder().connector(connector).build());
    let mut broker = brokers.remove(0);

    let transport = RecordingTransport::new("s1");
    bridge.session_started(transport.clone()).await;

    let connect = Frame::new(Command::Connect).header(headers::ACCEPT_VERSION, "1.2");
    bridge.on_data("s1", &encode_frame(&connect)).await.unwrap();
    assert_eq!(broker.next_frame().await.command, Command::Connect);

    // SEND arrives before the broker acknowledged; it must block, not drop.
    let racing_bridge = bridge.clone();
    let send = encode_frame(
        &Frame::new(Command::Send)
            .header(headers::DESTINATION, "/queue/a")
            .with_body("early"),
    );
    let racing = tokio::spawn(async move { racing_bridge.on_data("s1", &send).await });

    broker.expect_quiet(Duration::from_millis(50)).await;

    broker
        .send_frame(Frame::new(Command::Connected).header(headers::VERSION, "1.2"))
        .await;
    racing.await.unwrap().unwrap();

    let forwarded = broker.next_frame().await;
    assert_eq!(forwarded.command, Command::Send);
    assert_eq!(forwarded.body.as_ref(), b"early");
}

/// Client heartbeats are absorbed, never forwarded to the broker.
#[tokio::test]
async fn test_client_heartbeats_not_forwarded() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);
    handshake(&bridge, &mut broker, "s1").await;

    bridge.on_data("s1", b"\n").await.unwrap();
    broker.expect_quiet(Duration::from_millis(50)).await;

    let send = Frame::new(Command::Send).header(headers::DESTINATION, "/queue/a");
    bridge.on_data("s1", &encode_frame(&send)).await.unwrap();
    assert_eq!(broker.next_frame().await.command, Command::Send);
}

/// Broker MESSAGE frames come back through the client transport.
#[tokio::test]
async fn test_broker_message_delivered_to_client() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);
    let transport = handshake(&bridge, &mut broker, "s1").await;

    broker
        .send_frame(
            Frame::new(Command::Message)
                .header(headers::SUBSCRIPTION, "sub-1")
                .header(headers::DESTINATION, "/topic/prices")
                .with_body("tick"),
        )
        .await;

    let frames = client_frames(&transport, 2).await;
    assert_eq!(frames[1].command, Command::Message);
    assert_eq!(frames[1].headers.get(headers::SUBSCRIPTION), Some("sub-1"));
    assert_eq!(frames[1].body.as_ref(), b"tick");
}

/// An unsupported accept-version produces a wire ERROR and a close.
#[tokio::test]
async fn test_unsupported_version_rejected() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);

    let transport = RecordingTransport::new("s1");
    bridge.session_started(transport.clone()).await;

    let connect = Frame::new(Command::Connect).header(headers::ACCEPT_VERSION, "2.0");
    bridge.on_data("s1", &encode_frame(&connect)).await.unwrap();

    // The relay leg accepts anything; the version check happens when the
    // CONNECTED is rendered for the client.
    assert_eq!(broker.next_frame().await.command, Command::Connect);
    broker.send_frame(Frame::new(Command::Connected)).await;

    let frames = client_frames(&transport, 1).await;
    assert_eq!(frames[0].command, Command::Error);
    assert!(frames[0].headers.get(headers::MESSAGE).unwrap().contains("2.0"));
    assert_eq!(transport.close_reason(), Some(CloseReason::ProtocolError));
}

/// Overrunning the decode buffer is fatal for the session.
#[tokio::test]
async fn test_buffer_overflow_is_fatal() {
    let (connector, _brokers) = broker_pair(1);
    let bridge = RelayBridge::builder()
        .connector(connector)
        .buffer_size_limit(64)
        .build();

    let transport = RecordingTransport::new("s1");
    bridge.session_started(transport.clone()).await;

    // Unterminated body larger than the limit.
    let mut data = b"SEND\ndestination:/queue/a\n\n".to_vec();
    data.extend(std::iter::repeat(b'x').take(100));
    let err = bridge.on_data("s1", &data).await.unwrap_err();
    assert!(matches!(err, RelayError::BufferOverflow { limit: 64 }));

    let frames = client_frames(&transport, 1).await;
    assert_eq!(frames[0].command, Command::Error);
    assert!(frames[0].headers.get(headers::MESSAGE).unwrap().contains("64"));
    assert_eq!(transport.close_reason(), Some(CloseReason::ProtocolError));
}

/// Ending a session synthesizes a DISCONNECT on the broker leg.
#[tokio::test]
async fn test_session_end_synthesizes_disconnect() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);
    handshake(&bridge, &mut broker, "s1").await;

    bridge.session_ended("s1").await;

    assert_eq!(broker.next_frame().await.command, Command::Disconnect);
    assert_eq!(bridge.session_state("s1").await, None);
    assert_eq!(bridge.session_count().await, 0);
}

/// Host-queued messages reach the client through the same delivery queue as
/// broker traffic.
#[tokio::test]
async fn test_send_to_client() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);
    let transport = handshake(&bridge, &mut broker, "s1").await;

    bridge
        .send_to_client(
            SessionMessage::new("s1")
                .with_command(Command::Message)
                .with_header(headers::SUBSCRIPTION, "sub-1")
                .with_payload(Payload::Bytes("from-host".into())),
        )
        .await
        .unwrap();

    let frames = client_frames(&transport, 2).await;
    assert_eq!(frames[1].command, Command::Message);
    assert_eq!(frames[1].body.as_ref(), b"from-host");
}

/// publish() defaults the command to SEND.
#[tokio::test]
async fn test_publish_defaults_to_send() {
    let (connector, mut brokers) = broker_pair(1);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker = brokers.remove(0);
    handshake(&bridge, &mut broker, "s1").await;

    bridge
        .publish(
            SessionMessage::new("s1")
                .with_header(headers::DESTINATION, "/queue/a")
                .with_payload(Payload::Bytes("data".into())),
        )
        .await;

    let forwarded = broker.next_frame().await;
    assert_eq!(forwarded.command, Command::Send);
    assert_eq!(forwarded.body.as_ref(), b"data");
}

/// Two sessions run over independent broker legs.
#[tokio::test]
async fn test_sessions_are_independent() {
    let (connector, mut brokers) = broker_pair(2);
    let bridge = RelayBridge::builder().connector(connector).build();
    let mut broker_b = brokers.remove(1);
    let mut broker_a = brokers.remove(0);

    handshake(&bridge, &mut broker_a, "sa").await;
    handshake(&bridge, &mut broker_b, "sb").await;
    assert_eq!(bridge.session_count().await, 2);

    let send_a = Frame::new(Command::Send)
        .header(headers::DESTINATION, "/queue/a")
        .with_body("for-a");
    bridge.on_data("sa", &encode_frame(&send_a)).await.unwrap();

    let send_b = Frame::new(Command::Send)
        .header(headers::DESTINATION, "/queue/b")
        .with_body("for-b");
    bridge.on_data("sb", &encode_frame(&send_b)).await.unwrap();

    assert_eq!(broker_a.next_frame().await.body.as_ref(), b"for-a");
    assert_eq!(broker_b.next_frame().await.body.as_ref(), b"for-b");

    // Tearing one down leaves the other alone.
    bridge.session_ended("sa").await;
    assert_eq!(bridge.session_state("sa").await, None);
    assert_eq!(bridge.session_state("sb").await, Some(SessionState::Ready));
}

/// A stalled client write blocks only its own session's deliveries.
#[tokio::test]
async fn test_stalled_client_does_not_block_other_sessions() {
    let (connector, _brokers) = broker_pair(0);
    let bridge = RelayBridge::builder().connector(connector).build();

    let stalled = Arc::new(StalledTransport {
        id: "sa".to_string(),
    });
    bridge.session_started(stalled).await;
    let healthy = RecordingTransport::new("sb");
    bridge.session_started(healthy.clone()).await;

    // Wedge sa's delivery worker inside the write and leave a second event
    // sitting in its queue behind it.
    for body in ["stuck", "stuck-too"] {
        bridge
            .send_to_client(
                SessionMessage::new("sa")
                    .with_command(Command::Message)
                    .with_header(headers::SUBSCRIPTION, "sub-1")
                    .with_payload(Payload::Bytes(body.into())),
            )
            .await
            .unwrap();
    }

    bridge
        .send_to_client(
            SessionMessage::new("sb")
                .with_command(Command::Message)
                .with_header(headers::SUBSCRIPTION, "sub-1")
                .with_payload(Payload::Bytes("through".into())),
        )
        .await
        .unwrap();

    let frames = client_frames(&healthy, 1).await;
    assert_eq!(frames[0].command, Command::Message);
    assert_eq!(frames[0].body.as_ref(), b"through");
}
