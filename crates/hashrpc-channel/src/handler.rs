//! Type-erased handlers.
//!
//! A channel either receives from many peers (the server side, [`Inbound`]) or from
//! a single remote endpoint (the client side, [`Outbound`]). The role decides the
//! handler signature; the registry only ever stores the erased callables.

use std::fmt;
use std::sync::Arc;

use hashrpc_hash::Message;
use serde::de::DeserializeOwned;

use crate::body::BodyCodec;

/// Identifies a connected peer on the server side.
pub type PeerId = u32;

/// Erased server-side handler: sender plus raw body bytes.
pub type InboundHandler = Arc<dyn Fn(PeerId, &[u8]) + Send + Sync>;

/// Erased client-side handler: raw body bytes.
pub type OutboundHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Which end of a link a channel serves.
pub trait Role: 'static {
    /// Who a received message is attributed to.
    type Sender: Copy + fmt::Debug;
    /// The erased callable stored per message id.
    type Handler: Clone;

    fn call(handler: &Self::Handler, sender: Self::Sender, payload: &[u8]);
}

/// Server side: messages arrive from many peers.
#[derive(Debug)]
pub enum Inbound {}

/// Client side: messages arrive from the one connected server.
#[derive(Debug)]
pub enum Outbound {}

impl Role for Inbound {
    type Sender = PeerId;
    type Handler = InboundHandler;

    fn call(handler: &Self::Handler, sender: PeerId, payload: &[u8]) {
        handler(sender, payload)
    }
}

impl Role for Outbound {
    type Sender = ();
    type Handler = OutboundHandler;

    fn call(handler: &Self::Handler, _sender: (), payload: &[u8]) {
        handler(payload)
    }
}

/// Wrap a typed server callback: decode the body with `C`, then call it.
///
/// Bodies that fail to decode are logged and dropped.
pub fn inbound<T, C, F>(callback: F) -> InboundHandler
where
    T: Message + DeserializeOwned,
    C: BodyCodec,
    F: Fn(PeerId, T) + Send + Sync + 'static,
{
    Arc::new(move |peer: PeerId, payload: &[u8]| match C::decode::<T>(payload) {
        Ok(message) => callback(peer, message),
        Err(err) => tracing::warn!(
            msg_type = T::NAME,
            codec = C::NAME,
            peer,
            error = %err,
            "dropping message with undecodable body"
        ),
    })
}

/// Wrap a typed client callback: decode the body with `C`, then call it.
///
/// Bodies that fail to decode are logged and dropped.
pub fn outbound<T, C, F>(callback: F) -> OutboundHandler
where
    T: Message + DeserializeOwned,
    C: BodyCodec,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |payload: &[u8]| match C::decode::<T>(payload) {
        Ok(message) => callback(message),
        Err(err) => tracing::warn!(
            msg_type = T::NAME,
            codec = C::NAME,
            error = %err,
            "dropping message with undecodable body"
        ),
    })
}
