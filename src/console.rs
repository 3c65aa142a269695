//! Operator console: line-oriented commands on stdin.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use chatty_storage::db::call_blocking;

use crate::runtime::AppState;

#[derive(Debug, PartialEq, Eq)]
enum ConsoleAction {
    Quit,
    Continue,
}

/// Runs until the operator asks to quit or stdin closes.
pub async fn run_console(state: Arc<AppState>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if dispatch(&state, line.trim()).await == ConsoleAction::Quit {
            return;
        }
    }
}

async fn dispatch(state: &AppState, input: &str) -> ConsoleAction {
    let cmd = input.to_ascii_lowercase();

    if cmd.starts_with("quit") || cmd.starts_with("exit") {
        return ConsoleAction::Quit;
    }

    if cmd.starts_with("stats") {
        let session_id = state.session_id;
        match call_blocking(state.db.clone(), move |db| db.top_chatters(session_id, 5)).await {
            Ok(rows) if rows.is_empty() => {
                println!("No chatter statistics for session {session_id} yet.");
            }
            Ok(rows) => {
                for (idx, row) in rows.iter().enumerate() {
                    println!(
                        "{:>2}. {:<25} lines={:<6} xp={:<6} words={:<7} emotes={}",
                        idx + 1,
                        row.display_name,
                        row.line_count,
                        row.xp,
                        row.word_count,
                        row.emote_count
                    );
                }
            }
            Err(e) => println!("Failed to query stats: {e}"),
        }
        return ConsoleAction::Continue;
    }

    if cmd.starts_with("verbose") {
        let enabled = !state.verbose.fetch_xor(true, Ordering::Relaxed);
        println!(
            "Verbose logging {}",
            if enabled { "enabled" } else { "disabled" }
        );
        return ConsoleAction::Continue;
    }

    if cmd.is_empty() {
        return ConsoleAction::Continue;
    }

    println!("Command not found!");
    ConsoleAction::Continue
}
