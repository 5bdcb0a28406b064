use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use tracing::trace;

use crate::name::name_key;
use crate::xxhash::{hash32, hash64, DEFAULT_SEED};

/// The pair of identifiers derived from one message type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// Identifier used when the link runs with 4-byte commands.
    pub id32: u32,
    /// Identifier used when the link runs with 8-byte commands.
    pub id64: u64,
}

impl MessageId {
    /// Derive identifiers for `name` with the default seed.
    pub fn from_name(name: &str) -> Self {
        Self::from_name_with_seed(name, DEFAULT_SEED)
    }

    /// Derive identifiers for `name` with an explicit seed.
    ///
    /// Both endpoints of a link must use the same seed.
    pub fn from_name_with_seed(name: &str, seed: u32) -> Self {
        let key = name_key(name);
        Self {
            id32: hash32(&key, seed),
            id64: hash64(&key, u64::from(seed)),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}/{:#018x}", self.id32, self.id64)
    }
}

/// A value that can travel as an RPC message.
///
/// `NAME` is the stable, fully-qualified name both endpoints agree on. Renaming it
/// changes the wire identifier.
///
/// ```
/// use hashrpc_hash::{Message, MessageId};
///
/// struct Ping;
///
/// impl Message for Ping {
///     const NAME: &'static str = "Game.PingMessage";
/// }
///
/// assert_eq!(Ping::message_id(), MessageId::from_name("Game.PingMessage"));
/// ```
pub trait Message: 'static {
    /// Stable fully-qualified message name.
    const NAME: &'static str;

    /// Identifiers for this type, computed once per process.
    fn message_id() -> MessageId
    where
        Self: Sized,
    {
        cached_id::<Self>()
    }
}

type IdCache = RwLock<HashMap<TypeId, MessageId>>;

fn id_cache() -> &'static IdCache {
    static CACHE: OnceLock<IdCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn cached_id<T: Message>() -> MessageId {
    let type_id = TypeId::of::<T>();

    {
        let cache = id_cache()
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = cache.get(&type_id) {
            return *id;
        }
    }

    let id = MessageId::from_name(T::NAME);
    trace!(msg_type = T::NAME, id32 = id.id32, id64 = id.id64, "computed message id");

    let mut cache = id_cache()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *cache.entry(type_id).or_insert(id)
}

/// Number of message types whose identifiers have been cached so far.
pub fn cached_id_count() -> usize {
    id_cache()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PingMessage;

    impl Message for PingMessage {
        const NAME: &'static str = "Game.PingMessage";
    }

    struct PongMessage;

    impl Message for PongMessage {
        const NAME: &'static str = "Game.PongMessage";
    }

    #[test]
    fn golden_ping_identifiers() {
        let id = MessageId::from_name("Game.PingMessage");
        assert_eq!(id.id32, 0xdce6_9529);
        assert_eq!(id.id64, 0x40c9_b614_3c4f_083d);
    }

    #[test]
    fn other_known_names() {
        assert_eq!(
            MessageId::from_name("Game.PongMessage"),
            MessageId {
                id32: 0x1b17_387f,
                id64: 0x6436_ccbc_5fb7_428e,
            }
        );
        assert_eq!(
            MessageId::from_name("Chat.Say"),
            MessageId {
                id32: 0x088b_f10a,
                id64: 0xbbf6_44b9_caa7_559f,
            }
        );
    }

    #[test]
    fn trait_id_matches_name_and_is_cached() {
        let first = PingMessage::message_id();
        let second = PingMessage::message_id();
        assert_eq!(first, second);
        assert_eq!(first, MessageId::from_name(PingMessage::NAME));
        assert!(cached_id_count() >= 1);
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        let ping = PingMessage::message_id();
        let pong = PongMessage::message_id();
        assert_ne!(ping.id32, pong.id32);
        assert_ne!(ping.id64, pong.id64);
    }

    #[test]
    fn seed_is_part_of_identity() {
        assert_ne!(
            MessageId::from_name_with_seed("Game.PingMessage", 0),
            MessageId::from_name_with_seed("Game.PingMessage", 42)
        );
    }

    #[test]
    fn display_shows_both_widths() {
        let id = MessageId {
            id32: 0x1,
            id64: 0x2,
        };
        assert_eq!(id.to_string(), "0x00000001/0x0000000000000002");
    }
}
