//! The per-flow context table.
//!
//! Contexts are keyed by CID. A new flow takes the lowest free CID;
//! when the channel maximum is reached the least recently used context
//! is evicted and its CID reused. All live contexts are dropped with
//! the table, which releases every profile payload.

use ahash::{HashMap, HashMapExt};
use codec::headers::PacketHeaders;

use crate::{
    packet::{Mode, RohcProfile, State},
    profiles::ProfileContext,
};

/// The profile-independent part of a context: identity, operating mode
/// and state-machine position.
pub struct ContextCore {
    pub cid: u16,
    pub mode: Mode,
    pub state: State,
}

pub struct Context {
    pub core: ContextCore,
    /// Monotonic tick of the last compressed packet, for LRU eviction.
    pub last_used: u64,
    pub specific: ProfileContext,
}

#[derive(Default)]
pub struct ContextTable {
    contexts: HashMap<u16, Context>,
    tick: u64,
}

impl ContextTable {
    pub fn new() -> Self {
        Self {
            contexts: HashMap::with_capacity(16),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get_mut(&mut self, cid: u16) -> Option<&mut Context> {
        self.contexts.get_mut(&cid)
    }

    /// Find the live context of `profile` that accepts `headers`.
    pub fn find(&self, profile: RohcProfile, headers: &PacketHeaders<'_>) -> Option<u16> {
        self.contexts
            .values()
            .find(|context| {
                context.specific.profile() == profile && context.specific.matches(headers)
            })
            .map(|context| context.core.cid)
    }

    /// Mark a context as freshly used.
    pub fn touch(&mut self, cid: u16) {
        self.tick += 1;
        let tick = self.tick;

        if let Some(context) = self.contexts.get_mut(&cid) {
            context.last_used = tick;
        }
    }

    /// Install a new context, evicting the least recently used one if
    /// every CID up to `max_cid` is taken.
    pub fn insert(&mut self, max_cid: u16, specific: ProfileContext) -> u16 {
        let cid = match (0..=max_cid).find(|cid| !self.contexts.contains_key(cid)) {
            Some(cid) => cid,
            None => {
                let cid = self
                    .contexts
                    .values()
                    .min_by_key(|context| context.last_used)
                    .map(|context| context.core.cid)
                    .unwrap_or(0);

                log::debug!("all CIDs in use, recycling cid={}", cid);
                self.contexts.remove(&cid);
                cid
            }
        };

        self.tick += 1;
        self.contexts.insert(
            cid,
            Context {
                core: ContextCore {
                    cid,
                    mode: Mode::Unidirectional,
                    state: State::Ir,
                },
                last_used: self.tick,
                specific,
            },
        );

        cid
    }
}
