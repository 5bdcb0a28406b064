use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hashrpc_channel::{BodyCodec, JsonBody, PeerId, ServerChannel};
use hashrpc_hash::Message;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::EndpointConfig;
use crate::error::{PeerError, Result};
use crate::events::ConnectionEvents;
use crate::transport::{Transport, TransportEvent};

/// Accepts peers on a transport and dispatches their messages to a
/// [`ServerChannel`].
pub struct Server<T: Transport, C: BodyCodec = JsonBody> {
    transport: T,
    channel: ServerChannel<C>,
    events: ConnectionEvents,
    connections: BTreeSet<PeerId>,
    config: EndpointConfig,
}

impl<T: Transport, C: BodyCodec> Server<T, C> {
    pub fn new(transport: T, channel: ServerChannel<C>) -> Self {
        Self::with_config(transport, channel, EndpointConfig::default())
    }

    pub fn with_config(transport: T, channel: ServerChannel<C>, config: EndpointConfig) -> Self {
        Self {
            transport,
            channel,
            events: ConnectionEvents::new(),
            connections: BTreeSet::new(),
            config,
        }
    }

    pub fn channel(&self) -> &ServerChannel<C> {
        &self.channel
    }

    /// Mutable access for registering handlers or changing the hash width.
    pub fn channel_mut(&mut self) -> &mut ServerChannel<C> {
        &mut self.channel
    }

    pub fn events_mut(&mut self) -> &mut ConnectionEvents {
        &mut self.events
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Connected peers in ascending id order.
    pub fn connections(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.connections.iter().copied()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.connections.contains(&peer)
    }

    /// Send `message` to one connected peer.
    pub fn send<M: Message + Serialize>(&mut self, peer: PeerId, message: &M) -> Result<()> {
        if !self.is_connected(peer) {
            return Err(PeerError::UnknownPeer(peer));
        }
        let packet = self.channel.encode_message(message)?;
        self.transport.send(peer, &packet)
    }

    /// Send `message` to each listed peer once.
    ///
    /// Duplicates and peers that are not connected are skipped; nothing is
    /// encoded when no target remains. Returns the number of peers reached.
    pub fn broadcast<M, I>(&mut self, peers: I, message: &M) -> Result<usize>
    where
        M: Message + Serialize,
        I: IntoIterator<Item = PeerId>,
    {
        let mut seen = HashSet::new();
        let targets: Vec<PeerId> = peers
            .into_iter()
            .filter(|peer| seen.insert(*peer) && self.connections.contains(peer))
            .collect();
        self.send_to_all(targets, message)
    }

    /// Send `message` to every connected peer.
    pub fn broadcast_all<M: Message + Serialize>(&mut self, message: &M) -> Result<usize> {
        let targets: Vec<PeerId> = self.connections.iter().copied().collect();
        self.send_to_all(targets, message)
    }

    /// Close the link to `peer`. Returns `false` if it was not connected.
    ///
    /// Disconnect subscribers run immediately.
    pub fn disconnect(&mut self, peer: PeerId) -> Result<bool> {
        if !self.connections.contains(&peer) {
            return Ok(false);
        }
        self.transport.disconnect(peer)?;
        self.connections.remove(&peer);
        info!(peer, "disconnected peer");
        self.events.emit_disconnected(peer);
        Ok(true)
    }

    /// Wait up to the configured poll timeout and process what arrives.
    ///
    /// Returns the number of transport events handled.
    pub fn poll(&mut self) -> Result<usize> {
        self.poll_timeout(self.config.poll_timeout)
    }

    pub fn poll_timeout(&mut self, timeout: Duration) -> Result<usize> {
        let events = self.transport.poll(timeout)?;
        let count = events.len();
        for event in events {
            self.handle(event);
        }
        Ok(count)
    }

    /// Poll until `stop` is set, pausing one tick between polls.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        info!(
            poll_timeout = ?self.config.poll_timeout,
            tick = ?self.config.tick,
            "server loop started"
        );
        while !stop.load(Ordering::Relaxed) {
            self.poll()?;
            std::thread::sleep(self.config.tick);
        }
        info!(connections = self.connections.len(), "server loop stopped");
        Ok(())
    }

    fn send_to_all<M: Message + Serialize>(
        &mut self,
        targets: Vec<PeerId>,
        message: &M,
    ) -> Result<usize> {
        if targets.is_empty() {
            return Ok(0);
        }
        let packet = self.channel.encode_message(message)?;
        let mut reached = 0;
        for peer in targets {
            match self.transport.send(peer, &packet) {
                Ok(()) => reached += 1,
                Err(err) => warn!(peer, error = %err, "broadcast send failed"),
            }
        }
        Ok(reached)
    }

    fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(peer) => {
                if self.connections.insert(peer) {
                    info!(peer, "peer connected");
                    self.events.emit_connected(peer);
                }
            }
            TransportEvent::Disconnected(peer) => {
                if self.connections.remove(&peer) {
                    info!(peer, "peer disconnected");
                    self.events.emit_disconnected(peer);
                } else {
                    trace!(peer, "disconnect for unknown peer");
                }
            }
            TransportEvent::Received { peer, data } => {
                if !self.connections.contains(&peer) {
                    debug!(peer, "packet from unknown peer");
                    return;
                }
                let outcome = self.channel.invoke_handler(peer, &data);
                trace!(peer, ?outcome, "packet dispatched");
            }
        }
    }
}

impl<T: Transport, C: BodyCodec> std::fmt::Debug for Server<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("channel", &self.channel)
            .field("connections", &self.connections)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;

    use super::*;
    use crate::loopback::{LoopbackClient, LoopbackServer};
    use crate::transport::SERVER_PEER;

    const WAIT: Duration = Duration::from_millis(50);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Notice {
        text: String,
    }

    impl Message for Notice {
        const NAME: &'static str = "Lobby.Notice";
    }

    fn notice(text: &str) -> Notice {
        Notice {
            text: text.to_string(),
        }
    }

    fn server_with_clients(n: usize) -> (Server<LoopbackServer>, Vec<LoopbackClient>) {
        let transport = LoopbackServer::new();
        let connector = transport.connector();
        let clients = (0..n)
            .map(|_| connector.connect().expect("connect"))
            .collect();
        let mut server = Server::new(transport, ServerChannel::<JsonBody>::new());
        server.poll_timeout(WAIT).expect("poll");
        (server, clients)
    }

    fn received(client: &mut LoopbackClient) -> usize {
        client
            .poll(WAIT)
            .expect("poll")
            .iter()
            .filter(|event| matches!(event, TransportEvent::Received { .. }))
            .count()
    }

    #[test]
    fn tracks_connections_and_notifies_subscribers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = LoopbackServer::new();
        let connector = transport.connector();
        let mut server = Server::new(transport, ServerChannel::<JsonBody>::new());
        {
            let log = Arc::clone(&log);
            server
                .events_mut()
                .on_connected(move |peer| log.lock().unwrap().push((true, peer)));
        }
        {
            let log = Arc::clone(&log);
            server
                .events_mut()
                .on_disconnected(move |peer| log.lock().unwrap().push((false, peer)));
        }

        let a = connector.connect().expect("connect");
        let b = connector.connect().expect("connect");
        server.poll_timeout(WAIT).expect("poll");
        assert_eq!(server.connection_count(), 2);

        let a_id = a.peer_id();
        drop(a);
        server.poll_timeout(WAIT).expect("poll");
        assert!(!server.is_connected(a_id));
        assert_eq!(server.connections().collect::<Vec<_>>(), vec![b.peer_id()]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![(true, a_id), (true, b.peer_id()), (false, a_id)]
        );
    }

    #[test]
    fn dispatches_received_packets_with_sender() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut server, mut clients) = server_with_clients(1);
        {
            let seen = Arc::clone(&seen);
            server
                .channel_mut()
                .register_handler::<Notice, _>(move |peer, n| {
                    seen.lock().unwrap().push((peer, n.text))
                })
                .expect("register");
        }

        let packet = server
            .channel()
            .encode_message(&notice("hi"))
            .expect("encode");
        clients[0].send(SERVER_PEER, &packet).expect("send");
        server.poll_timeout(WAIT).expect("poll");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(clients[0].peer_id(), "hi".to_string())]
        );
    }

    #[test]
    fn send_to_unknown_peer_fails() {
        let (mut server, _clients) = server_with_clients(0);
        assert!(matches!(
            server.send(42, &notice("x")),
            Err(PeerError::UnknownPeer(42))
        ));
    }

    #[test]
    fn broadcast_dedups_and_skips_unknown_peers() {
        let (mut server, mut clients) = server_with_clients(2);
        let a = clients[0].peer_id();

        let reached = server
            .broadcast([a, a, 999, a], &notice("once"))
            .expect("broadcast");
        assert_eq!(reached, 1);
        assert_eq!(received(&mut clients[0]), 1);
        assert_eq!(received(&mut clients[1]), 0);

        assert_eq!(server.broadcast([999], &notice("none")).expect("broadcast"), 0);
        assert_eq!(server.broadcast_all(&notice("all")).expect("broadcast"), 2);
        assert_eq!(received(&mut clients[0]), 1);
        assert_eq!(received(&mut clients[1]), 1);
    }

    #[test]
    fn disconnect_runs_subscribers_once() {
        let count = Arc::new(Mutex::new(0));
        let (mut server, mut clients) = server_with_clients(1);
        let peer = clients[0].peer_id();
        {
            let count = Arc::clone(&count);
            server
                .events_mut()
                .on_disconnected(move |_| *count.lock().unwrap() += 1);
        }

        assert!(server.disconnect(peer).expect("disconnect"));
        assert!(!server.disconnect(peer).expect("disconnect"));
        server.poll_timeout(WAIT).expect("poll");
        assert_eq!(*count.lock().unwrap(), 1);

        let events = clients[0].poll(WAIT).expect("poll");
        assert!(events.contains(&TransportEvent::Disconnected(SERVER_PEER)));
    }

    #[test]
    fn run_stops_when_flag_is_set() {
        let (mut server, _clients) = server_with_clients(0);
        let stop = AtomicBool::new(true);
        server.run(&stop).expect("run");
    }

    /// Loopback transport whose disconnect always fails.
    struct StuckDisconnect(LoopbackServer);

    impl Transport for StuckDisconnect {
        fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>> {
            self.0.poll(timeout)
        }

        fn send(&mut self, peer: PeerId, packet: &[u8]) -> Result<()> {
            self.0.send(peer, packet)
        }

        fn disconnect(&mut self, _peer: PeerId) -> Result<()> {
            Err(PeerError::NotConnected)
        }
    }

    #[test]
    fn failed_disconnect_keeps_peer_tracked() {
        let count = Arc::new(Mutex::new(0));
        let transport = LoopbackServer::new();
        let client = transport.connector().connect().expect("connect");
        let channel = ServerChannel::<JsonBody>::new();
        let mut server = Server::new(StuckDisconnect(transport), channel);
        server.poll_timeout(WAIT).expect("poll");
        {
            let count = Arc::clone(&count);
            server
                .events_mut()
                .on_disconnected(move |_| *count.lock().unwrap() += 1);
        }

        let peer = client.peer_id();
        assert!(matches!(server.disconnect(peer), Err(PeerError::NotConnected)));
        assert!(server.is_connected(peer));
        assert_eq!(*count.lock().unwrap(), 0);
    }
}
