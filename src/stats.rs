//! Session-scoped chatter statistics: the in-memory write-back cache and
//! the per-message update engine.
//!
//! The cache is the single source of truth between flushes. Each user slot
//! is either `Present` (a merged aggregate with a dirty flag) or `Loading`
//! (a store read-through is in flight; messages arriving meanwhile queue on
//! the slot and are folded in when the read resolves, so the cache is
//! populated exactly once per miss).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use chatty_core::text::word_count;
use chatty_storage::db::{call_blocking, ChatterStat};

use crate::runtime::AppState;

/// One qualifying message's contribution to a chatter's aggregates.
#[derive(Debug, Clone)]
pub struct MessageDelta {
    pub display_name: String,
    pub xp: i64,
    pub words: i64,
    pub emotes: i64,
}

impl MessageDelta {
    /// Subscribers earn double xp; words are whitespace tokens (min 1).
    pub fn from_message(display_name: &str, text: &str, elevated: bool, emotes: i64) -> Self {
        MessageDelta {
            display_name: display_name.to_string(),
            xp: if elevated { 2 } else { 1 },
            words: word_count(text) as i64,
            emotes,
        }
    }
}

enum CacheSlot {
    /// A read-through for this user is in flight; deltas queue here.
    Loading { pending: Vec<MessageDelta> },
    /// Merged aggregate. `seq` counts mutations so the flusher can tell
    /// whether an entry changed under an in-flight write.
    Present {
        stat: ChatterStat,
        dirty: bool,
        seq: u64,
    },
}

#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Pure in-memory merge; no I/O needed.
    Merged,
    /// A load for this user is already in flight; the delta was queued.
    QueuedBehindLoad,
    /// First sighting of this user; the caller must perform the one-time
    /// read-through and then call `complete_load`.
    LoadNeeded,
}

pub struct ChatterCache {
    session_id: i64,
    slots: Mutex<HashMap<i64, CacheSlot>>,
}

impl ChatterCache {
    pub fn new(session_id: i64) -> Self {
        ChatterCache {
            session_id,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<i64, CacheSlot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Folds one message into the user's slot.
    pub fn apply(&self, user_id: i64, delta: MessageDelta) -> ApplyOutcome {
        let mut slots = self.lock_slots();
        match slots.get_mut(&user_id) {
            Some(CacheSlot::Present { stat, dirty, seq }) => {
                merge(stat, &delta);
                *dirty = true;
                *seq += 1;
                ApplyOutcome::Merged
            }
            Some(CacheSlot::Loading { pending }) => {
                pending.push(delta);
                ApplyOutcome::QueuedBehindLoad
            }
            None => {
                slots.insert(
                    user_id,
                    CacheSlot::Loading {
                        pending: vec![delta],
                    },
                );
                ApplyOutcome::LoadNeeded
            }
        }
    }

    /// Installs the aggregate for a finished read-through: the persisted row
    /// (or a zeroed aggregate when the user has no history this session)
    /// plus every delta queued while the load was in flight.
    pub fn complete_load(&self, user_id: i64, prior: Option<ChatterStat>) {
        let mut slots = self.lock_slots();
        let pending = match slots.remove(&user_id) {
            Some(CacheSlot::Loading { pending }) => pending,
            // Only the task that got LoadNeeded calls this, so a Present
            // slot here would be an upstream logic error; keep it intact.
            Some(present) => {
                slots.insert(user_id, present);
                return;
            }
            None => Vec::new(),
        };

        let mut stat = prior.unwrap_or(ChatterStat {
            user_id,
            session_id: self.session_id,
            display_name: String::new(),
            line_count: 0,
            xp: 0,
            word_count: 0,
            emote_count: 0,
        });
        let seq = pending.len() as u64;
        for delta in &pending {
            merge(&mut stat, delta);
        }
        slots.insert(
            user_id,
            CacheSlot::Present {
                stat,
                dirty: true,
                seq,
            },
        );
    }

    /// Current aggregate for a user, if fully loaded.
    pub fn get(&self, user_id: i64) -> Option<ChatterStat> {
        match self.lock_slots().get(&user_id) {
            Some(CacheSlot::Present { stat, .. }) => Some(stat.clone()),
            _ => None,
        }
    }

    /// Every dirty aggregate together with its mutation sequence number.
    pub fn dirty_snapshot(&self) -> Vec<(ChatterStat, u64)> {
        self.lock_slots()
            .values()
            .filter_map(|slot| match slot {
                CacheSlot::Present {
                    stat,
                    dirty: true,
                    seq,
                } => Some((stat.clone(), *seq)),
                _ => None,
            })
            .collect()
    }

    /// Clears the dirty flag after a successful persist, unless the entry
    /// was mutated again since the snapshot was taken.
    pub fn confirm_flushed(&self, user_id: i64, seq: u64) {
        if let Some(CacheSlot::Present {
            dirty,
            seq: current,
            ..
        }) = self.lock_slots().get_mut(&user_id)
        {
            if *current == seq {
                *dirty = false;
            }
        }
    }
}

fn merge(stat: &mut ChatterStat, delta: &MessageDelta) {
    stat.line_count += 1;
    stat.xp += delta.xp;
    stat.word_count += delta.words;
    stat.emote_count += delta.emotes;
    stat.display_name.clone_from(&delta.display_name);
}

/// Update Engine entry point: folds one qualifying message into the cache.
/// A cache hit merges synchronously; a miss starts the read-through on its
/// own task so the event loop is never blocked on store I/O.
pub async fn record_message(state: &Arc<AppState>, user_id: i64, delta: MessageDelta) {
    if let ApplyOutcome::LoadNeeded = state.cache.apply(user_id, delta) {
        let state = state.clone();
        tokio::spawn(async move {
            hydrate(&state, user_id).await;
        });
    }
}

/// One-time read-through for a cache miss. A store failure here must not
/// take down the hot path: it is logged and the user starts from a zeroed
/// aggregate for this session.
async fn hydrate(state: &AppState, user_id: i64) {
    let session_id = state.session_id;
    let prior = match call_blocking(state.db.clone(), move |db| {
        db.get_chatter(user_id, session_id)
    })
    .await
    {
        Ok(row) => row,
        Err(e) => {
            warn!("Chatter lookup failed for user {user_id}: {e}; treating as new this session");
            None
        }
    };
    state.cache.complete_load(user_id, prior);
}
