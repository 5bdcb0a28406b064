//! Deterministic message identifiers derived from type names.
//!
//! Every message type is routed by a pair of integers computed from its stable name:
//! a 32-bit id for links running 4-byte commands and a 64-bit id for links running
//! 8-byte commands. Both come from seeded XXH32/XXH64 over the name key, so they are
//! identical across processes, platforms, and restarts.

pub mod identity;
pub mod name;
pub mod xxhash;

pub use identity::{cached_id_count, Message, MessageId};
pub use name::name_key;
pub use xxhash::{hash32, hash64, DEFAULT_SEED};
