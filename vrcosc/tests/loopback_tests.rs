// tests/loopback_tests.rs
//
// End-to-end runs over 127.0.0.1 with OS-assigned ports.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use vrcosc::codec;
use vrcosc::{
    InputButton, ListenOptions, MessageKind, OscError, OscMessage, OscPacket, OscTransport,
    OscValue,
};

const WAIT: Duration = Duration::from_secs(2);

async fn listening_transport() -> Result<(OscTransport, SocketAddr), OscError> {
    let transport = OscTransport::new();
    let addr = transport.listen(ListenOptions::default().port(0)).await?;
    Ok((transport, addr))
}

async fn raw_receiver() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

async fn recv_message(socket: &UdpSocket) -> OscMessage {
    let mut buf = [0u8; 1024];
    let (n, _) = timeout(WAIT, socket.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")
        .unwrap();
    codec::decode_message(&buf[..n]).unwrap()
}

#[tokio::test]
async fn test_parameter_handler_end_to_end() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(receiver.try_add_method("GlassesToggle", move |msg| {
        let _ = tx.send(msg.clone());
    }));

    let sender = OscTransport::new();
    sender.connect(addr.port())?;
    sender.send_parameter("GlassesToggle", true)?;

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.kind(), MessageKind::AvatarParameter);
    assert_eq!(msg.parameter_name(), Some("GlassesToggle"));
    assert_eq!(msg.value(), Some(&OscValue::Bool(true)));
    assert!(msg.get::<bool>()?);

    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_jump_press_and_release_on_the_wire() -> Result<(), OscError> {
    let (socket, port) = raw_receiver().await;
    let sender = OscTransport::new();
    sender.connect(port)?;

    sender.send_input(InputButton::Jump, true)?;
    sender.send_input(InputButton::Jump, false)?;

    let press = recv_message(&socket).await;
    let release = recv_message(&socket).await;
    assert_eq!(press.address(), "/input/Jump");
    assert_eq!(press.arguments(), &[OscValue::Int(1)]);
    assert_eq!(release.arguments(), &[OscValue::Int(0)]);
    Ok(())
}

#[tokio::test]
async fn test_chatbox_on_the_wire() -> Result<(), OscError> {
    let (socket, port) = raw_receiver().await;
    let sender = OscTransport::new();
    sender.connect(port)?;

    sender.send_chatbox_async("Hello World 1", true, false).await?;
    let msg = recv_message(&socket).await;
    assert_eq!(msg.address(), "/chatbox/input");
    assert_eq!(
        msg.arguments(),
        &[
            OscValue::from("Hello World 1"),
            OscValue::Bool(true),
            OscValue::Bool(false),
        ]
    );

    sender.send_chatbox_typing_async(true).await?;
    let typing = recv_message(&socket).await;
    assert_eq!(typing.address(), "/chatbox/typing");
    assert_eq!(typing.arguments(), &[OscValue::Bool(true)]);
    Ok(())
}

#[tokio::test]
async fn test_blocking_sends_arrive_in_order() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(128);

    let sender = OscTransport::new();
    sender.connect(addr.port())?;
    for i in 0..50 {
        sender.send_parameter("Counter", i)?;
    }

    for expected in 0..50 {
        let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.get::<i32>()?, expected);
    }
    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_datagram_is_dropped_and_loop_survives() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(8);

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // "/a" ",i" followed by only two of the four payload bytes.
    let truncated = b"/a\0\0,i\0\0\x00\x01";
    raw.send_to(truncated, addr).await.unwrap();
    raw.send_to(b"not osc at all", addr).await.unwrap();

    let valid = codec::encode_message(&OscMessage::new("/a", vec![OscValue::Int(7)])?)?;
    raw.send_to(&valid, addr).await.unwrap();

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.address(), "/a");
    assert_eq!(msg.arguments(), &[OscValue::Int(7)]);

    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_avatar_change_and_builtin_parameters() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(8);
    let viseme_hits = Arc::new(AtomicUsize::new(0));
    let hits = viseme_hits.clone();
    receiver.try_add_method("Viseme", move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    let sender = OscTransport::new();
    sender.connect(addr.port())?;
    sender.send_to(
        "/avatar/change",
        vec![OscValue::from("avtr_c38a1615-5bf5-42b4-84eb-a8b6c37cbd11")],
    )?;
    sender.send_parameter("Viseme", 3)?;
    sender.send_to("/tracking/vrsystem/head/pose", vec![OscValue::Float(1.0)])?;

    let change = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(change.kind(), MessageKind::AvatarChange);
    assert_eq!(
        change.avatar_id(),
        Some("avtr_c38a1615-5bf5-42b4-84eb-a8b6c37cbd11")
    );

    let viseme = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(viseme.kind(), MessageKind::DefaultParameter);
    assert_eq!(viseme.parameter_name(), Some("Viseme"));

    let other = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(other.kind(), MessageKind::Unknown);

    assert_eq!(viseme_hits.load(Ordering::SeqCst), 1);
    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_panicking_handler_keeps_loop_alive() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    receiver.try_add_method("Explode", |_| panic!("boom"));
    let (_id, mut rx) = receiver.router().subscribe_channel(8);

    let sender = OscTransport::new();
    sender.connect(addr.port())?;
    sender.send_parameter("Explode", true)?;
    sender.send_parameter("Explode", false)?;

    for _ in 0..2 {
        let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.parameter_name(), Some("Explode"));
    }
    assert!(receiver.is_listening().await);
    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_close_stops_delivery_and_frees_port() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(8);

    receiver.close().await;
    receiver.close().await;
    assert!(receiver.local_endpoint().await.is_none());

    let sender = OscTransport::new();
    sender.connect(addr.port())?;
    sender.send_parameter("Late", true)?;
    sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    // The port is free again once close() has returned.
    let again = receiver
        .listen(ListenOptions::default().port(addr.port()))
        .await?;
    assert_eq!(again, addr);
    sender.send_parameter("Again", true)?;
    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.parameter_name(), Some("Again"));

    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_relisten_moves_to_new_port() -> Result<(), OscError> {
    let (receiver, first) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(8);
    let second = receiver.listen(ListenOptions::default().port(0)).await?;
    assert_eq!(receiver.local_endpoint().await, Some(second));

    let sender = OscTransport::new();
    if first != second {
        sender.connect(first.port())?;
        sender.send_parameter("Old", true)?;
    }
    sender.connect(second.port())?;
    sender.send_parameter("New", true)?;

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.parameter_name(), Some("New"));

    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_rosc_encoded_datagram_is_dispatched() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(8);

    let packet = rosc::OscPacket::Message(rosc::OscMessage {
        addr: "/avatar/parameters/GlassesColor".to_string(),
        args: vec![rosc::OscType::Float(0.75)],
    });
    let bytes = rosc::encoder::encode(&packet).unwrap();
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(&bytes, addr).await.unwrap();

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.parameter_name(), Some("GlassesColor"));
    assert_eq!(msg.get::<f32>()?, 0.75);

    receiver.close().await;
    Ok(())
}

#[tokio::test]
async fn test_oversized_bundle_is_dropped_whole() -> Result<(), OscError> {
    let first = OscMessage::new("/avatar/parameters/AAAAAAAAAAAAAA", vec![OscValue::Int(1)])?;
    let second = OscMessage::new("/avatar/parameters/B", vec![OscValue::Int(2)])?;
    let first_len = codec::encode_message(&first)?.len();
    let bundle = codec::encode_packet(&OscPacket::Bundle {
        time_tag: 1,
        content: vec![OscPacket::Message(first), OscPacket::Message(second)],
    })?;

    // "#bundle\0" + time tag + size prefix + first element: a buffer this size
    // would hold a well-formed one-message bundle if the tail were cut off.
    let buffer_size = 8 + 8 + 4 + first_len;
    assert!(bundle.len() > buffer_size + 1);

    let receiver = OscTransport::new();
    let (_id, mut rx) = receiver.router().subscribe_channel(8);
    let addr = receiver
        .listen(ListenOptions::default().port(0).buffer_size(buffer_size))
        .await?;

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(&bundle, addr).await.unwrap();
    let ok = codec::encode_message(&OscMessage::new("/ok", vec![])?)?;
    raw.send_to(&ok, addr).await.unwrap();

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg.address(), "/ok");
    assert!(rx.try_recv().is_err());

    receiver.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nothing_dispatched_after_close_is_requested() -> Result<(), OscError> {
    let (receiver, addr) = listening_transport().await?;
    let (_id, mut rx) = receiver.router().subscribe_channel(8);
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    receiver.try_add_method("Slow", move |_| {
        let _ = started_tx.send(());
        std::thread::sleep(Duration::from_millis(300));
    });

    let sender = OscTransport::new();
    sender.connect(addr.port())?;
    sender.send_parameter("Slow", true)?;

    // The receive loop is now stuck in the handler; queue more behind it.
    timeout(WAIT, started_rx.recv()).await.unwrap().unwrap();
    sender.send_parameter("Queued1", true)?;
    sender.send_parameter("Queued2", true)?;
    sleep(Duration::from_millis(20)).await;

    receiver.close().await;

    let first = rx.try_recv().unwrap();
    assert_eq!(first.parameter_name(), Some("Slow"));
    assert!(rx.try_recv().is_err());
    Ok(())
}
