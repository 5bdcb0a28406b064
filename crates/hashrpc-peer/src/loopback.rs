//! In-process transport backed by channels.
//!
//! Useful for tests and for running a server and its clients in one process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hashrpc_channel::PeerId;
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::transport::{Transport, TransportEvent, SERVER_PEER};

enum ToServer {
    Connect { peer: PeerId, reply: Sender<ToClient> },
    Packet { peer: PeerId, data: Bytes },
    Disconnect(PeerId),
}

enum ToClient {
    Packet(Bytes),
    Disconnected,
}

/// Server side of the loopback transport.
pub struct LoopbackServer {
    inbox: Receiver<ToServer>,
    outbox: Sender<ToServer>,
    peers: HashMap<PeerId, Sender<ToClient>>,
    next_peer: Arc<AtomicU32>,
    pending: VecDeque<TransportEvent>,
}

impl LoopbackServer {
    pub fn new() -> Self {
        let (outbox, inbox) = mpsc::channel();
        Self {
            inbox,
            outbox,
            peers: HashMap::new(),
            next_peer: Arc::new(AtomicU32::new(SERVER_PEER + 1)),
            pending: VecDeque::new(),
        }
    }

    /// A handle that opens client connections to this server.
    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            outbox: self.outbox.clone(),
            next_peer: Arc::clone(&self.next_peer),
        }
    }

    fn apply(&mut self, message: ToServer) {
        match message {
            ToServer::Connect { peer, reply } => {
                self.peers.insert(peer, reply);
                self.pending.push_back(TransportEvent::Connected(peer));
            }
            ToServer::Packet { peer, data } => {
                if self.peers.contains_key(&peer) {
                    self.pending
                        .push_back(TransportEvent::Received { peer, data });
                }
            }
            ToServer::Disconnect(peer) => {
                if self.peers.remove(&peer).is_some() {
                    self.pending.push_back(TransportEvent::Disconnected(peer));
                }
            }
        }
    }
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackServer {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>> {
        if self.pending.is_empty() {
            // `outbox` keeps the channel open, so only a timeout can end the wait.
            if let Ok(message) = self.inbox.recv_timeout(timeout) {
                self.apply(message);
            }
        }
        while let Ok(message) = self.inbox.try_recv() {
            self.apply(message);
        }
        Ok(self.pending.drain(..).collect())
    }

    fn send(&mut self, peer: PeerId, packet: &[u8]) -> Result<()> {
        let link = self.peers.get(&peer).ok_or(PeerError::UnknownPeer(peer))?;
        if link
            .send(ToClient::Packet(Bytes::copy_from_slice(packet)))
            .is_err()
        {
            debug!(peer, "loopback client gone");
            self.peers.remove(&peer);
            self.pending.push_back(TransportEvent::Disconnected(peer));
            return Err(PeerError::UnknownPeer(peer));
        }
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) -> Result<()> {
        if let Some(link) = self.peers.remove(&peer) {
            let _ = link.send(ToClient::Disconnected);
            self.pending.push_back(TransportEvent::Disconnected(peer));
        }
        Ok(())
    }
}

/// Opens loopback client connections. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct LoopbackConnector {
    outbox: Sender<ToServer>,
    next_peer: Arc<AtomicU32>,
}

impl LoopbackConnector {
    /// Connect a new client. The server sees it on its next poll.
    pub fn connect(&self) -> Result<LoopbackClient> {
        let peer = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (reply, inbox) = mpsc::channel();
        self.outbox
            .send(ToServer::Connect { peer, reply })
            .map_err(|_| PeerError::NotConnected)?;

        let mut pending = VecDeque::new();
        pending.push_back(TransportEvent::Connected(SERVER_PEER));
        Ok(LoopbackClient {
            peer,
            outbox: self.outbox.clone(),
            inbox,
            connected: true,
            pending,
        })
    }
}

/// Client side of the loopback transport.
pub struct LoopbackClient {
    peer: PeerId,
    outbox: Sender<ToServer>,
    inbox: Receiver<ToClient>,
    connected: bool,
    pending: VecDeque<TransportEvent>,
}

impl LoopbackClient {
    /// The id the server knows this client by.
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    fn lost(&mut self) {
        if self.connected {
            self.connected = false;
            self.pending
                .push_back(TransportEvent::Disconnected(SERVER_PEER));
        }
    }

    fn apply(&mut self, message: ToClient) {
        match message {
            ToClient::Packet(data) => self.pending.push_back(TransportEvent::Received {
                peer: SERVER_PEER,
                data,
            }),
            ToClient::Disconnected => self.lost(),
        }
    }
}

impl Transport for LoopbackClient {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>> {
        if self.pending.is_empty() && self.connected {
            match self.inbox.recv_timeout(timeout) {
                Ok(message) => self.apply(message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.lost(),
            }
        }
        loop {
            match self.inbox.try_recv() {
                Ok(message) => self.apply(message),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.lost();
                    break;
                }
            }
        }
        Ok(self.pending.drain(..).collect())
    }

    fn send(&mut self, _peer: PeerId, packet: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(PeerError::NotConnected);
        }
        let data = Bytes::copy_from_slice(packet);
        if self
            .outbox
            .send(ToServer::Packet {
                peer: self.peer,
                data,
            })
            .is_err()
        {
            self.lost();
            return Err(PeerError::NotConnected);
        }
        Ok(())
    }

    fn disconnect(&mut self, _peer: PeerId) -> Result<()> {
        if self.connected {
            let _ = self.outbox.send(ToServer::Disconnect(self.peer));
            self.lost();
        }
        Ok(())
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        if self.connected {
            let _ = self.outbox.send(ToServer::Disconnect(self.peer));
        }
    }
}
