//! vrcosc/src/transport.rs
//!
//! UDP transport. Sending and receiving are independent: `connect` binds an
//! ephemeral send socket aimed at one remote endpoint, `listen` binds a separate
//! socket and runs the receive loop that feeds the [`OscRouter`].

use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket,
};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{self, OscPacket, TIME_TAG_IMMEDIATE};
use crate::message::OscMessage;
use crate::router::{OscRouter, SubscriptionId};
use crate::value::OscValue;
use crate::{DEFAULT_LISTEN_PORT, OscError, Result};

/// Receive buffer used when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Pause after a socket receive error so a persistent failure cannot spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Where and how the receive loop listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub buffer_size: usize,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_LISTEN_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ListenOptions {
    pub fn new(bind_addr: IpAddr, port: u16) -> Self {
        Self {
            bind_addr,
            port,
            ..Self::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bind_addr(mut self, bind_addr: IpAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

struct SendTarget {
    socket: Arc<StdUdpSocket>,
    remote: SocketAddr,
}

struct Listener {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// One OSC endpoint pair: an optional send target and an optional receive loop.
pub struct OscTransport {
    router: Arc<OscRouter>,
    target: Mutex<Option<SendTarget>>,
    listener: tokio::sync::Mutex<Option<Listener>>,
}

impl Default for OscTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl OscTransport {
    pub fn new() -> Self {
        Self::with_router(Arc::new(OscRouter::new()))
    }

    /// Builds a transport that dispatches into an existing router.
    pub fn with_router(router: Arc<OscRouter>) -> Self {
        Self {
            router,
            target: Mutex::new(None),
            listener: tokio::sync::Mutex::new(None),
        }
    }

    pub fn router(&self) -> &Arc<OscRouter> {
        &self.router
    }

    /// See [`OscRouter::try_add_method`].
    pub fn try_add_method<F>(&self, name: &str, handler: F) -> bool
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.router.try_add_method(name, handler)
    }

    /// See [`OscRouter::subscribe`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.router.subscribe(callback)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Targets `127.0.0.1:<port>`. See [`connect_to`](Self::connect_to).
    pub fn connect(&self, port: u16) -> Result<SocketAddr> {
        self.connect_to(&Ipv4Addr::LOCALHOST.to_string(), port)
    }

    /// Binds a fresh ephemeral send socket and aims it at `host:port`.
    /// Calling it again replaces the previous target.
    pub fn connect_to(&self, host: &str, port: u16) -> Result<SocketAddr> {
        if port == 0 {
            return Err(OscError::Configuration("remote port must not be 0".into()));
        }
        let remote = resolve(host, port)?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = StdUdpSocket::bind(local)
            .map_err(|e| OscError::Configuration(format!("Failed to bind OSC send socket: {e}")))?;

        let previous = self.target.lock().replace(SendTarget {
            socket: Arc::new(socket),
            remote,
        });
        match previous {
            Some(old) if old.remote != remote => {
                info!("OSC send target changed {} => {}", old.remote, remote)
            }
            _ => info!("OSC send target set to {}", remote),
        }
        Ok(remote)
    }

    pub fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.target.lock().as_ref().map(|t| t.remote)
    }

    /// Encodes `packet` and takes a handle on the current send socket.
    fn prepare(&self, packet: &OscPacket) -> Result<(Arc<StdUdpSocket>, SocketAddr, Vec<u8>)> {
        let bytes = codec::encode_packet(packet)?;
        let guard = self.target.lock();
        let target = guard.as_ref().ok_or(OscError::NotConnected)?;
        Ok((target.socket.clone(), target.remote, bytes))
    }

    /// Sends one datagram, blocking the calling thread for the write.
    pub fn send_packet(&self, packet: &OscPacket) -> Result<()> {
        let (socket, remote, bytes) = self.prepare(packet)?;
        write_datagram(&socket, remote, &bytes)
    }

    /// Same as [`send_packet`](Self::send_packet), with the write moved to
    /// tokio's blocking pool. Two un-awaited async sends are not ordered.
    pub async fn send_packet_async(&self, packet: &OscPacket) -> Result<()> {
        let (socket, remote, bytes) = self.prepare(packet)?;
        tokio::task::spawn_blocking(move || write_datagram(&socket, remote, &bytes))
            .await
            .map_err(|e| OscError::Io(std::io::Error::other(e)))?
    }

    pub fn send_message(&self, msg: &OscMessage) -> Result<()> {
        self.send_packet(&OscPacket::Message(msg.clone()))
    }

    pub async fn send_message_async(&self, msg: &OscMessage) -> Result<()> {
        self.send_packet_async(&OscPacket::Message(msg.clone())).await
    }

    /// Sends `args` to an arbitrary address.
    pub fn send_to(&self, address: &str, args: Vec<OscValue>) -> Result<()> {
        self.send_message(&OscMessage::new(address, args)?)
    }

    pub async fn send_to_async(&self, address: &str, args: Vec<OscValue>) -> Result<()> {
        self.send_message_async(&OscMessage::new(address, args)?).await
    }

    /// Sends several messages as one immediate bundle datagram.
    pub fn send_bundle(&self, messages: Vec<OscMessage>) -> Result<()> {
        self.send_packet(&OscPacket::Bundle {
            time_tag: TIME_TAG_IMMEDIATE,
            content: messages.into_iter().map(OscPacket::Message).collect(),
        })
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Starts the receive loop on `options`, returning the bound address.
    ///
    /// A loop that is already running is stopped first, and its socket
    /// released, before the new one binds. Bind failures are returned here.
    pub async fn listen(&self, options: ListenOptions) -> Result<SocketAddr> {
        if options.buffer_size == 0 {
            return Err(OscError::Configuration("buffer_size must be greater than zero".into()));
        }

        let mut guard = self.listener.lock().await;
        if let Some(previous) = guard.take() {
            debug!("Restarting OSC listener previously on {}", previous.local_addr);
            stop_listener(previous).await;
        }

        let bind = options.socket_addr();
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| OscError::Configuration(format!("Failed to bind OSC port {bind}: {e}")))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| OscError::Configuration(format!("Failed to read bound address: {e}")))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_loop(
            socket,
            self.router.clone(),
            stop_rx,
            options.buffer_size,
        ));

        info!("OSC listening on UDP {}", local_addr);
        *guard = Some(Listener {
            stop_tx,
            handle,
            local_addr,
        });
        Ok(local_addr)
    }

    /// The address the receive loop is bound to, if it is running.
    pub async fn local_endpoint(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|l| l.local_addr)
    }

    pub async fn is_listening(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    /// Stops the receive loop and releases both sockets. Safe to call repeatedly.
    ///
    /// Returns once the loop has exited, so nothing is dispatched after this
    /// resolves and the listen port can be bound again.
    pub async fn close(&self) {
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            let addr = listener.local_addr;
            stop_listener(listener).await;
            info!("OSC listener on {} closed", addr);
        }
        if let Some(target) = self.target.lock().take() {
            debug!("Released OSC send socket for {}", target.remote);
        }
    }
}

impl Drop for OscTransport {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            let _ = listener.stop_tx.send(true);
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| OscError::Configuration(format!("Cannot resolve '{host}': {e}")))?
        .collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| OscError::Configuration(format!("'{host}' resolved to no addresses")))
}

fn write_datagram(socket: &StdUdpSocket, remote: SocketAddr, bytes: &[u8]) -> Result<()> {
    let sent = socket.send_to(bytes, remote)?;
    trace!("Sent {} bytes to {}", sent, remote);
    Ok(())
}

async fn stop_listener(listener: Listener) {
    // Fails only if the loop already exited and dropped its receiver.
    let _ = listener.stop_tx.send(true);
    if let Err(e) = listener.handle.await {
        if e.is_panic() {
            error!("OSC receive loop panicked: {:?}", e);
        }
    }
}

async fn receive_loop(
    socket: UdpSocket,
    router: Arc<OscRouter>,
    mut stop_rx: watch::Receiver<bool>,
    buffer_size: usize,
) {
    // One spare byte: a datagram that fills it was larger than `buffer_size`
    // and has been truncated by the OS.
    let mut buf = vec![0u8; buffer_size + 1];
    loop {
        let received = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            res = socket.recv_from(&mut buf) => res,
        };

        let (size, peer) = match received {
            Ok(v) => v,
            Err(e) => {
                // Windows surfaces ICMP port-unreachable from earlier sends here.
                warn!("OSC receive error: {}", e);
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => continue,
                }
            }
        };

        if *stop_rx.borrow() {
            break;
        }
        if size > buffer_size {
            debug!(
                "Dropping oversized OSC datagram from {} (buffer is {} bytes)",
                peer, buffer_size
            );
            continue;
        }
        handle_datagram(&buf[..size], peer, &router, &stop_rx);
    }
    debug!("OSC receive loop exited");
}

fn handle_datagram(
    data: &[u8],
    peer: SocketAddr,
    router: &OscRouter,
    stop_rx: &watch::Receiver<bool>,
) {
    match codec::decode_packet(data) {
        Ok(packet) => {
            for msg in packet.into_messages() {
                if *stop_rx.borrow() {
                    return;
                }
                router.dispatch(&msg);
            }
        }
        Err(e) => {
            debug!("Dropping malformed OSC datagram ({} bytes) from {}: {}", data.len(), peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn loopback_any_port() -> ListenOptions {
        ListenOptions::default().port(0)
    }

    #[test]
    fn test_listen_options_defaults() {
        let opts = ListenOptions::default();
        assert_eq!(opts.socket_addr(), "127.0.0.1:9001".parse().unwrap());
        assert_eq!(opts.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_send_before_connect_fails() {
        let transport = OscTransport::new();
        assert!(matches!(
            transport.send_to("/a", vec![OscValue::Int(1)]),
            Err(OscError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_replaces_target() {
        let transport = OscTransport::new();
        assert_eq!(
            transport.connect(9000).unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        transport.connect_to("127.0.0.1", 9100).unwrap();
        assert_eq!(
            transport.remote_endpoint(),
            Some("127.0.0.1:9100".parse().unwrap())
        );
    }

    #[test]
    fn test_connect_rejects_bad_parameters() {
        let transport = OscTransport::new();
        assert!(matches!(transport.connect(0), Err(OscError::Configuration(_))));
        assert!(matches!(
            transport.connect_to("not a host name!", 9000),
            Err(OscError::Configuration(_))
        ));
        assert!(transport.remote_endpoint().is_none());
    }

    #[tokio::test]
    async fn test_listen_reports_port_in_use() {
        let blocker = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let transport = OscTransport::new();
        let result = transport.listen(ListenOptions::default().port(port)).await;
        assert!(matches!(result, Err(OscError::Configuration(_))));
        assert!(!transport.is_listening().await);
    }

    #[tokio::test]
    async fn test_zero_buffer_is_rejected() {
        let transport = OscTransport::new();
        let result = transport.listen(loopback_any_port().buffer_size(0)).await;
        assert!(matches!(result, Err(OscError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = OscTransport::new();
        transport.listen(loopback_any_port()).await.unwrap();
        transport.connect(9000).unwrap();
        assert!(transport.is_listening().await);

        transport.close().await;
        transport.close().await;

        assert!(!transport.is_listening().await);
        assert!(transport.local_endpoint().await.is_none());
        assert!(transport.remote_endpoint().is_none());
    }

    #[tokio::test]
    async fn test_relisten_on_same_port_after_restart() {
        let transport = OscTransport::new();
        let first = transport.listen(loopback_any_port()).await.unwrap();
        let second = transport
            .listen(ListenOptions::default().port(first.port()))
            .await
            .unwrap();
        assert_eq!(first, second);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_loopback_delivery() {
        let receiver = OscTransport::new();
        let (_id, mut rx) = receiver.router().subscribe_channel(8);
        let addr = receiver.listen(loopback_any_port()).await.unwrap();

        let sender = OscTransport::new();
        sender.connect(addr.port()).unwrap();
        sender.send_to("/test/lib/float", vec![OscValue::Float(0.5)]).unwrap();
        sender
            .send_to_async("/test/lib/async", vec![OscValue::Bool(true)])
            .await
            .unwrap();

        let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.address(), "/test/lib/float");
        assert_eq!(first.get::<f32>().unwrap(), 0.5);

        let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.address(), "/test/lib/async");
        assert_eq!(second.value(), Some(&OscValue::Bool(true)));

        receiver.close().await;
    }

    #[tokio::test]
    async fn test_bundle_is_dispatched_as_messages() {
        let receiver = OscTransport::new();
        let (_id, mut rx) = receiver.router().subscribe_channel(8);
        let addr = receiver.listen(loopback_any_port()).await.unwrap();

        let sender = OscTransport::new();
        sender.connect(addr.port()).unwrap();
        sender
            .send_bundle(vec![
                OscMessage::new("/avatar/parameters/A", vec![OscValue::Int(1)]).unwrap(),
                OscMessage::new("/avatar/parameters/B", vec![OscValue::Int(2)]).unwrap(),
            ])
            .unwrap();

        let a = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let b = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(a.parameter_name(), Some("A"));
        assert_eq!(b.parameter_name(), Some("B"));

        receiver.close().await;
    }
}
