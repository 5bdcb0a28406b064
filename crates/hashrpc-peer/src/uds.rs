//! Unix domain socket transports.
//!
//! Streams run in non-blocking mode and carry one envelope per framed packet.
//! `send` queues packets per connection; `poll` flushes those queues, sweeps the
//! listener and every connection until something happens or the timeout passes.
//! A peer whose queue overflows `max_pending` or stalls past `write_timeout` is
//! disconnected.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

use hashrpc_channel::PeerId;
use hashrpc_frame::{FrameError, PacketConfig, PacketReader, PacketWriter};
use hashrpc_transport::{RpcStream, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};
use crate::transport::{Transport, TransportEvent, SERVER_PEER};

/// Sleep between sweeps while waiting for activity.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

struct Connection {
    reader: PacketReader<RpcStream>,
    writer: PacketWriter<RpcStream>,
}

impl Connection {
    fn open(stream: RpcStream, config: &PacketConfig) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: PacketReader::with_config(reader_stream, config.clone()),
            writer: PacketWriter::with_config(stream, config.clone()),
        })
    }

    /// Read every complete packet currently available.
    ///
    /// Returns `false` once the connection is finished.
    fn drain(&mut self, peer: PeerId, out: &mut VecDeque<TransportEvent>) -> bool {
        loop {
            match self.reader.try_read_packet() {
                Ok(Some(data)) => out.push_back(TransportEvent::Received { peer, data }),
                Ok(None) => return true,
                Err(FrameError::ConnectionClosed) => {
                    debug!(peer, "connection closed by peer");
                    return false;
                }
                Err(err) => {
                    warn!(peer, error = %err, "dropping connection after read error");
                    return false;
                }
            }
        }
    }

    /// Queue `packet`. Errors other than an oversized packet mean the link is done.
    fn send(&mut self, packet: &[u8]) -> hashrpc_frame::Result<()> {
        self.writer.enqueue(packet)
    }

    /// Push queued bytes. Returns `false` once the connection is finished.
    fn flush(&mut self, peer: PeerId) -> bool {
        match self.writer.flush_queue() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    peer,
                    error = %err,
                    queued = self.writer.queued(),
                    "dropping connection after write error"
                );
                false
            }
        }
    }

    fn close(&self) {
        if let Err(err) = self.writer.get_ref().shutdown() {
            debug!(error = %err, "shutdown failed");
        }
    }
}

fn wait_step(deadline: Instant) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    std::thread::sleep(IDLE_SLEEP.min(deadline - now));
    true
}

/// Listening side: accepts many clients on one socket path.
pub struct UdsServer {
    listener: UnixDomainSocket,
    connections: BTreeMap<PeerId, Connection>,
    next_peer: PeerId,
    config: PacketConfig,
    pending: VecDeque<TransportEvent>,
}

impl UdsServer {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_config(path, PacketConfig::default())
    }

    pub fn bind_with_config(path: impl AsRef<Path>, config: PacketConfig) -> Result<Self> {
        Ok(Self::from_listener(UnixDomainSocket::bind(path)?, config))
    }

    pub fn from_listener(listener: UnixDomainSocket, config: PacketConfig) -> Self {
        Self {
            listener,
            connections: BTreeMap::new(),
            next_peer: SERVER_PEER + 1,
            config,
            pending: VecDeque::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    fn accept_pending(&mut self) -> Result<()> {
        while let Some(stream) = self.listener.try_accept()? {
            let peer = self.allocate_peer();

            match stream.peer_credentials() {
                Some(creds) => info!(
                    peer,
                    uid = creds.uid,
                    gid = creds.gid,
                    pid = creds.pid,
                    "client connected"
                ),
                None => info!(peer, "client connected"),
            }

            match Connection::open(stream, &self.config) {
                Ok(conn) => {
                    self.connections.insert(peer, conn);
                    self.pending.push_back(TransportEvent::Connected(peer));
                }
                Err(err) => warn!(peer, error = %err, "failed to set up connection"),
            }
        }
        Ok(())
    }

    /// Next free peer id. Ids still held by a live connection are skipped after
    /// wraparound.
    fn allocate_peer(&mut self) -> PeerId {
        loop {
            let peer = self.next_peer;
            self.next_peer = self.next_peer.wrapping_add(1).max(SERVER_PEER + 1);
            if !self.connections.contains_key(&peer) {
                return peer;
            }
        }
    }

    fn sweep(&mut self) -> Result<()> {
        self.accept_pending()?;

        let mut closed = Vec::new();
        for (&peer, conn) in &mut self.connections {
            if !conn.flush(peer) || !conn.drain(peer, &mut self.pending) {
                closed.push(peer);
            }
        }
        for peer in closed {
            self.drop_connection(peer);
        }
        Ok(())
    }

    fn drop_connection(&mut self, peer: PeerId) {
        if let Some(conn) = self.connections.remove(&peer) {
            conn.close();
            self.pending.push_back(TransportEvent::Disconnected(peer));
        }
    }
}

impl Transport for UdsServer {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.sweep()?;
            if !self.pending.is_empty() || !wait_step(deadline) {
                return Ok(self.pending.drain(..).collect());
            }
        }
    }

    fn send(&mut self, peer: PeerId, packet: &[u8]) -> Result<()> {
        let conn = self
            .connections
            .get_mut(&peer)
            .ok_or(PeerError::UnknownPeer(peer))?;
        match conn.send(packet) {
            Ok(()) => Ok(()),
            Err(err @ FrameError::PayloadTooLarge { .. }) => Err(err.into()),
            Err(err) => {
                warn!(peer, error = %err, "dropping connection after write error");
                self.drop_connection(peer);
                Err(err.into())
            }
        }
    }

    fn disconnect(&mut self, peer: PeerId) -> Result<()> {
        if let Some(conn) = self.connections.remove(&peer) {
            conn.close();
            info!(peer, "client disconnected");
            self.pending.push_back(TransportEvent::Disconnected(peer));
        }
        Ok(())
    }
}

/// Connecting side: one link to a listening [`UdsServer`].
pub struct UdsClient {
    connection: Option<Connection>,
    pending: VecDeque<TransportEvent>,
}

impl UdsClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(path, PacketConfig::default())
    }

    pub fn connect_with_config(path: impl AsRef<Path>, config: PacketConfig) -> Result<Self> {
        let stream = UnixDomainSocket::connect(path)?;
        Self::from_stream(stream, config)
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: RpcStream, config: PacketConfig) -> Result<Self> {
        let connection = Connection::open(stream, &config)?;
        let mut pending = VecDeque::new();
        pending.push_back(TransportEvent::Connected(SERVER_PEER));
        Ok(Self {
            connection: Some(connection),
            pending,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Bytes sent but not yet accepted by the socket. `poll` keeps flushing them.
    pub fn queued(&self) -> usize {
        self.connection.as_ref().map_or(0, |conn| conn.writer.queued())
    }

    fn lost(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            self.pending
                .push_back(TransportEvent::Disconnected(SERVER_PEER));
        }
    }
}

impl Transport for UdsClient {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            let open = match self.connection.as_mut() {
                Some(conn) => {
                    conn.flush(SERVER_PEER) && conn.drain(SERVER_PEER, &mut self.pending)
                }
                None => true,
            };
            if !open {
                self.lost();
            }
            if !self.pending.is_empty() || self.connection.is_none() || !wait_step(deadline) {
                return Ok(self.pending.drain(..).collect());
            }
        }
    }

    fn send(&mut self, _peer: PeerId, packet: &[u8]) -> Result<()> {
        let conn = self.connection.as_mut().ok_or(PeerError::NotConnected)?;
        match conn.send(packet) {
            Ok(()) => Ok(()),
            Err(err @ FrameError::PayloadTooLarge { .. }) => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "connection lost during write");
                self.lost();
                Err(err.into())
            }
        }
    }

    fn disconnect(&mut self, _peer: PeerId) -> Result<()> {
        self.lost();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bytes::Bytes;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/hrpc-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("server.sock")
    }

    fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn poll_until<T: Transport>(transport: &mut T, want: usize) -> Vec<TransportEvent> {
        let deadline = Instant::now() + WAIT;
        let mut events = Vec::new();
        while events.len() < want && Instant::now() < deadline {
            events.extend(
                transport
                    .poll(Duration::from_millis(20))
                    .expect("poll should succeed"),
            );
        }
        events
    }

    #[test]
    fn packets_flow_both_ways() {
        let path = make_sock_path("flow");
        let mut server = UdsServer::bind(&path).expect("server should bind");
        let mut client = UdsClient::connect(&path).expect("client should connect");

        let events = poll_until(&mut server, 1);
        let peer = match events.as_slice() {
            [TransportEvent::Connected(peer)] => *peer,
            other => panic!("unexpected events: {other:?}"),
        };

        client.send(SERVER_PEER, b"ping").expect("client send");
        let events = poll_until(&mut server, 1);
        assert_eq!(
            events,
            vec![TransportEvent::Received {
                peer,
                data: Bytes::from_static(b"ping")
            }]
        );

        server.send(peer, b"pong").expect("server send");
        let events = poll_until(&mut client, 2);
        assert_eq!(
            events,
            vec![
                TransportEvent::Connected(SERVER_PEER),
                TransportEvent::Received {
                    peer: SERVER_PEER,
                    data: Bytes::from_static(b"pong")
                },
            ]
        );

        drop(server);
        cleanup(&path);
    }

    #[test]
    fn client_close_is_reported() {
        let path = make_sock_path("close");
        let mut server = UdsServer::bind(&path).expect("server should bind");
        let client = UdsClient::connect(&path).expect("client should connect");

        let connected = poll_until(&mut server, 1);
        assert!(matches!(connected.as_slice(), [TransportEvent::Connected(_)]));
        drop(client);

        let events = poll_until(&mut server, 1);
        assert!(matches!(events.as_slice(), [TransportEvent::Disconnected(_)]));
        assert!(matches!(
            server.send(1, b"late"),
            Err(PeerError::UnknownPeer(1))
        ));

        drop(server);
        cleanup(&path);
    }

    #[test]
    fn server_disconnect_closes_client() {
        let path = make_sock_path("kick");
        let mut server = UdsServer::bind(&path).expect("server should bind");
        let mut client = UdsClient::connect(&path).expect("client should connect");

        let peer = match poll_until(&mut server, 1).as_slice() {
            [TransportEvent::Connected(peer)] => *peer,
            other => panic!("unexpected events: {other:?}"),
        };
        server.disconnect(peer).expect("disconnect");
        assert_eq!(
            server.poll(Duration::ZERO).expect("poll"),
            vec![TransportEvent::Disconnected(peer)]
        );

        let events = poll_until(&mut client, 2);
        assert_eq!(
            events,
            vec![
                TransportEvent::Connected(SERVER_PEER),
                TransportEvent::Disconnected(SERVER_PEER)
            ]
        );
        assert!(!client.is_connected());
        assert!(matches!(
            client.send(SERVER_PEER, b"x"),
            Err(PeerError::NotConnected)
        ));

        drop(server);
        cleanup(&path);
    }

    #[test]
    fn oversized_send_keeps_connection() {
        let path = make_sock_path("big");
        let config = PacketConfig::default().with_max_packet_size(8);
        let mut server = UdsServer::bind(&path).expect("server should bind");
        let mut client =
            UdsClient::connect_with_config(&path, config).expect("client should connect");

        assert!(matches!(
            client.send(SERVER_PEER, &[0u8; 9]),
            Err(PeerError::Frame(FrameError::PayloadTooLarge { .. }))
        ));
        assert!(client.is_connected());

        let _ = poll_until(&mut server, 1);
        drop(server);
        cleanup(&path);
    }

    #[test]
    fn peer_ids_skip_live_connections_after_wraparound() {
        let path = make_sock_path("ids");
        let mut server = UdsServer::bind(&path).expect("server should bind");
        let _first = UdsClient::connect(&path).expect("client should connect");
        assert_eq!(
            poll_until(&mut server, 1),
            vec![TransportEvent::Connected(1)]
        );

        server.next_peer = PeerId::MAX;
        let _second = UdsClient::connect(&path).expect("client should connect");
        let _third = UdsClient::connect(&path).expect("client should connect");
        assert_eq!(
            poll_until(&mut server, 2),
            vec![
                TransportEvent::Connected(PeerId::MAX),
                TransportEvent::Connected(2),
            ]
        );
        assert_eq!(server.connections.len(), 3);

        drop(server);
        cleanup(&path);
    }
}
