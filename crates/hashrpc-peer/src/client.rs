use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hashrpc_channel::{BodyCodec, ClientChannel, JsonBody};
use hashrpc_hash::Message;
use serde::Serialize;
use tracing::{info, trace};

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::events::ConnectionEvents;
use crate::transport::{Transport, TransportEvent, SERVER_PEER};

/// One link to a server, dispatching its messages to a [`ClientChannel`].
pub struct Client<T: Transport, C: BodyCodec = JsonBody> {
    transport: T,
    channel: ClientChannel<C>,
    events: ConnectionEvents,
    connected: bool,
    config: EndpointConfig,
}

impl<T: Transport, C: BodyCodec> Client<T, C> {
    pub fn new(transport: T, channel: ClientChannel<C>) -> Self {
        Self::with_config(transport, channel, EndpointConfig::default())
    }

    pub fn with_config(transport: T, channel: ClientChannel<C>, config: EndpointConfig) -> Self {
        Self {
            transport,
            channel,
            events: ConnectionEvents::new(),
            connected: false,
            config,
        }
    }

    pub fn channel(&self) -> &ClientChannel<C> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut ClientChannel<C> {
        &mut self.channel
    }

    pub fn events_mut(&mut self) -> &mut ConnectionEvents {
        &mut self.events
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connection state as of the last poll.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Send `message` to the server.
    pub fn send<M: Message + Serialize>(&mut self, message: &M) -> Result<()> {
        let packet = self.channel.encode_message(message)?;
        self.transport.send(SERVER_PEER, &packet)
    }

    /// Close the link. Disconnect subscribers run immediately.
    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect(SERVER_PEER)?;
        if std::mem::replace(&mut self.connected, false) {
            info!("disconnected from server");
            self.events.emit_disconnected(SERVER_PEER);
        }
        Ok(())
    }

    /// Wait up to the configured poll timeout and process what arrives.
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

    /// Poll until `stop` is set or the connection ends.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        self.poll()?;
        while self.connected && !stop.load(Ordering::Relaxed) {
            self.poll()?;
            std::thread::sleep(self.config.tick);
        }
        Ok(())
    }

    fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(peer) => {
                if !std::mem::replace(&mut self.connected, true) {
                    info!("connected to server");
                    self.events.emit_connected(peer);
                }
            }
            TransportEvent::Disconnected(peer) => {
                if std::mem::replace(&mut self.connected, false) {
                    info!("server closed the connection");
                    self.events.emit_disconnected(peer);
                }
            }
            TransportEvent::Received { data, .. } => {
                let outcome = self.channel.invoke_handler(&data);
                trace!(?outcome, "packet dispatched");
            }
        }
    }
}

impl<T: Transport, C: BodyCodec> std::fmt::Debug for Client<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("channel", &self.channel)
            .field("connected", &self.connected)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;

    use super::*;
    use crate::error::PeerError;
    use crate::loopback::{LoopbackClient, LoopbackServer};

    const WAIT: Duration = Duration::from_millis(50);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Score {
        points: u32,
    }

    impl Message for Score {
        const NAME: &'static str = "Match.Score";
    }

    fn connected_pair() -> (LoopbackServer, Client<LoopbackClient>) {
        let mut server = LoopbackServer::new();
        let link = server.connector().connect().expect("connect");
        let mut client = Client::new(link, ClientChannel::<JsonBody>::new());
        client.poll_timeout(WAIT).expect("poll");
        server.poll(WAIT).expect("poll");
        (server, client)
    }

    #[test]
    fn becomes_connected_after_first_poll() {
        let (_server, client) = connected_pair();
        assert!(client.is_connected());
    }

    #[test]
    fn dispatches_server_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut server, mut client) = connected_pair();
        {
            let seen = Arc::clone(&seen);
            client
                .channel_mut()
                .register_handler::<Score, _>(move |s| seen.lock().unwrap().push(s.points))
                .expect("register");
        }

        let peer = client.transport().peer_id();
        let packet = client
            .channel()
            .encode_message(&Score { points: 3 })
            .expect("encode");
        server.send(peer, &packet).expect("send");
        client.poll_timeout(WAIT).expect("poll");

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn send_reaches_server() {
        let (mut server, mut client) = connected_pair();
        client.send(&Score { points: 1 }).expect("send");

        let events = server.poll(WAIT).expect("poll");
        assert!(matches!(events.as_slice(), [TransportEvent::Received { .. }]));
    }

    #[test]
    fn disconnect_notifies_once_and_blocks_sends() {
        let count = Arc::new(Mutex::new(0));
        let (_server, mut client) = connected_pair();
        {
            let count = Arc::clone(&count);
            client
                .events_mut()
                .on_disconnected(move |_| *count.lock().unwrap() += 1);
        }

        client.disconnect().expect("disconnect");
        client.poll_timeout(WAIT).expect("poll");
        assert!(!client.is_connected());
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(matches!(
            client.send(&Score { points: 0 }),
            Err(PeerError::NotConnected)
        ));
    }

    #[test]
    fn run_returns_when_server_goes_away() {
        let (server, mut client) = connected_pair();
        drop(server);
        let stop = AtomicBool::new(false);
        client.run(&stop).expect("run");
        assert!(!client.is_connected());
    }
}
