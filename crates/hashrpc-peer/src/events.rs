use hashrpc_channel::PeerId;

/// Callback run when a peer connects or disconnects.
pub type ConnectionCallback = Box<dyn FnMut(PeerId) + Send>;

/// Handle returned by a subscription; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber lists for connection lifecycle events.
///
/// Callbacks run synchronously, in subscription order, from the endpoint's poll.
#[derive(Default)]
pub struct ConnectionEvents {
    next_id: u64,
    connected: Vec<(SubscriptionId, ConnectionCallback)>,
    disconnected: Vec<(SubscriptionId, ConnectionCallback)>,
}

impl ConnectionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(PeerId) + Send + 'static,
    {
        let id = self.allocate();
        self.connected.push((id, Box::new(callback)));
        id
    }

    pub fn on_disconnected<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(PeerId) + Send + 'static,
    {
        let id = self.allocate();
        self.disconnected.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.connected.len() + self.disconnected.len();
        self.connected.retain(|(sub, _)| *sub != id);
        self.disconnected.retain(|(sub, _)| *sub != id);
        before != self.connected.len() + self.disconnected.len()
    }

    pub fn clear(&mut self) {
        self.connected.clear();
        self.disconnected.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.connected.len() + self.disconnected.len()
    }

    pub(crate) fn emit_connected(&mut self, peer: PeerId) {
        for (_, callback) in &mut self.connected {
            callback(peer);
        }
    }

    pub(crate) fn emit_disconnected(&mut self, peer: PeerId) {
        for (_, callback) in &mut self.disconnected {
            callback(peer);
        }
    }

    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

impl std::fmt::Debug for ConnectionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEvents")
            .field("connected", &self.connected.len())
            .field("disconnected", &self.disconnected.len())
            .finish()
    }
}
