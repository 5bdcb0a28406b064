use std::collections::HashMap;
use std::fmt;

use hashrpc_frame::{CommandId, RpcHashWidth};
use hashrpc_hash::MessageId;
use tracing::{debug, trace, warn};

use crate::handler::Role;

/// Outcome of handing one packet to a channel.
///
/// Purely informational: none of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler was found and called.
    Handled(CommandId),
    /// The envelope was valid but nothing is registered for its command.
    Unknown(CommandId),
    /// The envelope or its command bytes could not be decoded.
    Dropped,
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// Handlers keyed by both identifier widths.
///
/// Every registration lands in both maps, so the width used for lookups can change
/// at any time without re-registering.
pub struct DispatchRegistry<R: Role> {
    by_id32: HashMap<u32, R::Handler>,
    by_id64: HashMap<u64, R::Handler>,
}

impl<R: Role> DispatchRegistry<R> {
    pub fn new() -> Self {
        Self {
            by_id32: HashMap::new(),
            by_id64: HashMap::new(),
        }
    }

    /// Insert `handler` for `id` under both widths.
    ///
    /// An existing entry is overwritten; returns `true` when that happened.
    pub fn register(&mut self, id: MessageId, handler: R::Handler) -> bool {
        let replaced32 = self.by_id32.insert(id.id32, handler.clone()).is_some();
        let replaced64 = self.by_id64.insert(id.id64, handler).is_some();
        let replaced = replaced32 || replaced64;
        if replaced {
            warn!(id32 = id.id32, id64 = id.id64, "replaced existing handler");
        } else {
            trace!(id32 = id.id32, id64 = id.id64, "handler inserted");
        }
        replaced
    }

    /// Remove `id` from both widths. Returns `true` if either entry existed.
    pub fn unregister(&mut self, id: MessageId) -> bool {
        let removed32 = self.by_id32.remove(&id.id32).is_some();
        let removed64 = self.by_id64.remove(&id.id64).is_some();
        removed32 || removed64
    }

    pub fn clear(&mut self) {
        self.by_id32.clear();
        self.by_id64.clear();
    }

    /// True if `id` has a handler under either width.
    pub fn contains(&self, id: MessageId) -> bool {
        self.by_id32.contains_key(&id.id32) || self.by_id64.contains_key(&id.id64)
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.by_id32.len().max(self.by_id64.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_id32.is_empty() && self.by_id64.is_empty()
    }

    /// Handler for an already-parsed command id.
    pub fn lookup(&self, command: CommandId) -> Option<&R::Handler> {
        match command {
            CommandId::Id32(id) => self.by_id32.get(&id),
            CommandId::Id64(id) => self.by_id64.get(&id),
        }
    }

    /// Parse `command` at `width` and call the matching handler, if any.
    pub fn invoke(
        &self,
        width: RpcHashWidth,
        command: &[u8],
        payload: &[u8],
        sender: R::Sender,
    ) -> Dispatch {
        let command = match width.parse_command(command) {
            Ok(command) => command,
            Err(err) => {
                debug!(%width, error = %err, "dropping envelope with bad command");
                return Dispatch::Dropped;
            }
        };

        match self.lookup(command) {
            Some(handler) => {
                trace!(%command, ?sender, len = payload.len(), "dispatching");
                R::call(handler, sender, payload);
                Dispatch::Handled(command)
            }
            None => {
                trace!(%command, ?sender, "no handler for command");
                Dispatch::Unknown(command)
            }
        }
    }
}

impl<R: Role> Default for DispatchRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Role> fmt::Debug for DispatchRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("id32_entries", &self.by_id32.len())
            .field("id64_entries", &self.by_id64.len())
            .finish()
    }
}
