use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use hashrpc_frame::{decode_envelope, Envelope, RpcHashWidth};
use hashrpc_hash::{Message, MessageId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::body::{BodyCodec, JsonBody};
use crate::error::{ChannelError, Result};
use crate::handler::{self, Inbound, Outbound, PeerId, Role};
use crate::registry::{Dispatch, DispatchRegistry};

/// What to do when a handler is registered for a message that already has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Overwrite the existing handler and log a warning.
    #[default]
    Replace,
    /// Keep the existing handler and return [`ChannelError::DuplicateHandler`].
    Reject,
}

/// Channel behavior settings.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// Width of command ids on this link. Both endpoints must agree.
    pub rpc_hash_width: RpcHashWidth,
    pub duplicates: DuplicatePolicy,
}

impl ChannelConfig {
    pub fn with_rpc_hash_width(mut self, width: RpcHashWidth) -> Self {
        self.rpc_hash_width = width;
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }
}

/// Decodes incoming envelopes and dispatches them to typed handlers.
///
/// `R` picks the role (server or client side), `C` the body codec. A channel has
/// no internal locking; registration takes `&mut self`, dispatch takes `&self`.
pub struct MessageChannel<R: Role, C: BodyCodec = JsonBody> {
    registry: DispatchRegistry<R>,
    config: ChannelConfig,
    codec: PhantomData<fn() -> C>,
}

/// Channel that receives from many peers.
pub type ServerChannel<C = JsonBody> = MessageChannel<Inbound, C>;

/// Channel that receives from one server.
pub type ClientChannel<C = JsonBody> = MessageChannel<Outbound, C>;

impl<R: Role, C: BodyCodec> MessageChannel<R, C> {
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            registry: DispatchRegistry::new(),
            config,
            codec: PhantomData,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn rpc_hash_width(&self) -> RpcHashWidth {
        self.config.rpc_hash_width
    }

    /// Switch the command id width used for incoming and outgoing envelopes.
    ///
    /// Registered handlers stay valid.
    pub fn change_rpc_hash_width(&mut self, width: RpcHashWidth) {
        if width != self.config.rpc_hash_width {
            info!(from = %self.config.rpc_hash_width, to = %width, "rpc hash width changed");
        }
        self.config.rpc_hash_width = width;
    }

    /// Remove the handler for `T`. Returns `true` if one was registered.
    pub fn unregister_handler<T: Message>(&mut self) -> bool {
        let removed = self.registry.unregister(T::message_id());
        debug!(msg_type = T::NAME, removed, "unregistered handler");
        removed
    }

    /// Remove every handler.
    pub fn clear_handlers(&mut self) {
        let count = self.registry.len();
        self.registry.clear();
        debug!(count, "cleared handlers");
    }

    pub fn has_handler<T: Message>(&self) -> bool {
        self.registry.contains(T::message_id())
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &DispatchRegistry<R> {
        &self.registry
    }

    /// Register an already-erased handler under `id`, honoring the duplicate policy.
    pub fn register_erased(
        &mut self,
        name: &str,
        id: MessageId,
        handler: R::Handler,
    ) -> Result<()> {
        if self.config.duplicates == DuplicatePolicy::Reject && self.registry.contains(id) {
            return Err(ChannelError::DuplicateHandler {
                name: name.to_string(),
                id,
            });
        }
        self.registry.register(id, handler);
        debug!(
            msg_type = name,
            id32 = id.id32,
            id64 = id.id64,
            "registered handler"
        );
        Ok(())
    }

    /// Build the envelope for `message` at the current width.
    pub fn envelope_for<T: Message + Serialize>(&self, message: &T) -> Result<Envelope> {
        let body = C::encode(message)?;
        Ok(Envelope::for_message(
            self.config.rpc_hash_width,
            T::message_id(),
            body,
        ))
    }

    /// Encode `message` into packet bytes ready for a transport.
    pub fn encode_message<T: Message + Serialize>(&self, message: &T) -> Result<Bytes> {
        Ok(self.envelope_for(message)?.encode()?)
    }

    /// Register every handler of `group`.
    pub fn register_group<G>(&mut self, group: &std::sync::Arc<G>) -> Result<()>
    where
        G: HandlerGroup<R, C> + ?Sized,
    {
        std::sync::Arc::clone(group).register_handlers(self)
    }

    /// Remove every handler `group` registers. Returns how many were present.
    pub fn unregister_group<G>(&mut self, group: &G) -> usize
    where
        G: HandlerGroup<R, C> + ?Sized,
    {
        let mut count = 0;
        for id in group.message_ids() {
            let removed = self.registry.unregister(id);
            debug!(
                id32 = id.id32,
                id64 = id.id64,
                removed,
                "unregistered group handler"
            );
            count += usize::from(removed);
        }
        count
    }

    fn dispatch(&self, sender: R::Sender, bytes: &[u8]) -> Dispatch {
        match decode_envelope(bytes) {
            Ok(envelope) => self.registry.invoke(
                self.config.rpc_hash_width,
                &envelope.command,
                &envelope.payload,
                sender,
            ),
            Err(err) => {
                debug!(?sender, len = bytes.len(), error = %err, "dropping undecodable envelope");
                Dispatch::Dropped
            }
        }
    }
}

impl<C: BodyCodec> MessageChannel<Inbound, C> {
    /// Register `callback` for messages of type `T` from any peer.
    pub fn register_handler<T, F>(&mut self, callback: F) -> Result<()>
    where
        T: Message + DeserializeOwned,
        F: Fn(PeerId, T) + Send + Sync + 'static,
    {
        let handler = handler::inbound::<T, C, F>(callback);
        self.register_erased(T::NAME, T::message_id(), handler)
    }

    /// Decode a packet received from `sender` and run its handler.
    pub fn invoke_handler(&self, sender: PeerId, bytes: &[u8]) -> Dispatch {
        self.dispatch(sender, bytes)
    }
}

impl<C: BodyCodec> MessageChannel<Outbound, C> {
    /// Register `callback` for messages of type `T` from the server.
    pub fn register_handler<T, F>(&mut self, callback: F) -> Result<()>
    where
        T: Message + DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler = handler::outbound::<T, C, F>(callback);
        self.register_erased(T::NAME, T::message_id(), handler)
    }

    /// Decode a packet received from the server and run its handler.
    pub fn invoke_handler(&self, bytes: &[u8]) -> Dispatch {
        self.dispatch((), bytes)
    }
}

impl<R: Role, C: BodyCodec> Default for MessageChannel<R, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Role, C: BodyCodec> fmt::Debug for MessageChannel<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("codec", &C::NAME)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

/// A listener object that registers its own set of handlers.
///
/// Handlers usually capture a clone of the group's `Arc` so they can reach its state.
pub trait HandlerGroup<R: Role, C: BodyCodec = JsonBody> {
    fn register_handlers(
        self: std::sync::Arc<Self>,
        channel: &mut MessageChannel<R, C>,
    ) -> Result<()>;

    /// Ids of every message this group handles.
    fn message_ids(&self) -> Vec<MessageId>;
}
