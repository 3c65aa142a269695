//! Write-back flusher: persists dirty cache entries on a fixed interval and
//! once more, awaited, during graceful shutdown.

use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tracing::{info, warn};

use chatty_storage::db::{call_blocking, Database};

use crate::error::ChattyError;
use crate::runtime::AppState;
use crate::stats::ChatterCache;

pub fn spawn_flusher(state: Arc<AppState>) {
    tokio::spawn(async move {
        info!(
            "Flusher started (interval: {}s)",
            state.config.flush_interval_secs
        );
        let mut ticker =
            tokio::time::interval(Duration::from_secs(state.config.flush_interval_secs));
        // If a pass falls behind, skip missed ticks instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Consume the immediate first tick; nothing is dirty at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match flush_once(state.db.clone(), &state.cache).await {
                Ok(0) => {}
                Ok(written) => info!("Flushed {written} chatter record(s)"),
                Err(e) => warn!("Periodic flush failed: {e}"),
            }
        }
    });
}

/// One full write-back pass: every dirty entry is upserted to the store and
/// its dirty flag cleared, unless it was mutated again while its write was
/// in flight. Clean entries cost nothing. Returns the number of rows
/// written, so back-to-back calls with no intervening events return 0 the
/// second time.
pub async fn flush_once(db: Arc<Database>, cache: &ChatterCache) -> Result<usize, ChattyError> {
    let snapshot = cache.dirty_snapshot();
    let mut written = 0usize;
    for (stat, seq) in snapshot {
        let user_id = stat.user_id;
        let row = stat.clone();
        call_blocking(db.clone(), move |db| db.upsert_chatter(&row)).await?;
        cache.confirm_flushed(user_id, seq);
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_state;
    use crate::stats::MessageDelta;

    #[tokio::test]
    async fn test_flush_persists_dirty_entries() {
        let (state, dir) = test_state(1);
        let _ = state
            .cache
            .apply(7, MessageDelta::from_message("Alice", "gg wp", true, 1));
        state.cache.complete_load(7, None);

        let written = flush_once(state.db.clone(), &state.cache).await.unwrap();
        assert_eq!(written, 1);

        let row = state.db.get_chatter(7, 1).unwrap().unwrap();
        assert_eq!(row.display_name, "Alice");
        assert_eq!(row.line_count, 1);
        assert_eq!(row.xp, 2);
        assert_eq!(row.word_count, 2);
        assert_eq!(row.emote_count, 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_flush_is_idempotent_without_new_events() {
        let (state, dir) = test_state(1);
        let _ = state
            .cache
            .apply(1, MessageDelta::from_message("Bob", "hello", false, 0));
        state.cache.complete_load(1, None);

        assert_eq!(flush_once(state.db.clone(), &state.cache).await.unwrap(), 1);
        // No events in between: second pass finds nothing dirty.
        assert_eq!(flush_once(state.db.clone(), &state.cache).await.unwrap(), 0);

        let row = state.db.get_chatter(1, 1).unwrap().unwrap();
        assert_eq!(row.line_count, 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_entries_dirtied_after_flush_are_flushed_again() {
        let (state, dir) = test_state(1);
        let _ = state
            .cache
            .apply(1, MessageDelta::from_message("Bob", "one", false, 0));
        state.cache.complete_load(1, None);
        flush_once(state.db.clone(), &state.cache).await.unwrap();

        let _ = state
            .cache
            .apply(1, MessageDelta::from_message("Bob", "two more", false, 0));
        assert_eq!(flush_once(state.db.clone(), &state.cache).await.unwrap(), 1);

        let row = state.db.get_chatter(1, 1).unwrap().unwrap();
        assert_eq!(row.line_count, 2);
        assert_eq!(row.word_count, 3);
        let _ = std::fs::remove_dir_all(dir);
    }
}
