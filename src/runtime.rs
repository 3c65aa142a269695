use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info};

use chatty_storage::db::Database;

use crate::config::Config;
use crate::console;
use crate::flusher::{flush_once, spawn_flusher};
use crate::stats::ChatterCache;
use crate::twitch::{start_twitch_bot, TwitchSender};

pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub cache: ChatterCache,
    pub session_id: i64,
    pub verbose: AtomicBool,
}

pub async fn run(config: Config, db: Arc<Database>, session_id: i64) -> anyhow::Result<()> {
    let verbose = AtomicBool::new(config.verbose);
    let state = Arc::new(AppState {
        cache: ChatterCache::new(session_id),
        db,
        session_id,
        verbose,
        config,
    });

    spawn_flusher(state.clone());

    let sender = Arc::new(TwitchSender::new());
    let twitch_state = state.clone();
    let twitch_sender = sender.clone();
    info!("Starting Twitch chat transport (session {session_id})");
    tokio::spawn(async move {
        start_twitch_bot(twitch_state, twitch_sender).await;
    });

    tokio::select! {
        _ = console::run_console(state.clone()) => {
            info!("Console requested shutdown");
        }
        res = tokio::signal::ctrl_c() => {
            res.map_err(|e| anyhow!("Failed to listen for Ctrl-C: {e}"))?;
            info!("Ctrl-C received; shutting down");
        }
    }

    // Last chance to persist: anything still dirty is lost otherwise.
    match flush_once(state.db.clone(), &state.cache).await {
        Ok(written) => {
            info!("Final flush persisted {written} chatter record(s)");
            Ok(())
        }
        Err(e) => {
            error!("Final flush failed; unpersisted statistics were lost: {e}");
            Err(anyhow!("final flush failed: {e}"))
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state(session_id: i64) -> (Arc<AppState>, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("chatty_test_{}", uuid::Uuid::new_v4()));
    let db = Database::new(dir.to_str().unwrap()).unwrap();
    let state = Arc::new(AppState {
        config: Config::test_defaults(),
        db: Arc::new(db),
        cache: ChatterCache::new(session_id),
        session_id,
        verbose: AtomicBool::new(false),
    });
    (state, dir)
}
