//! Startup session choice.
//!
//! A session is a logical run boundary: statistics reset per session but
//! persist per `(user, session)`. The choice happens exactly once, before
//! the chat transport connects, and the chosen id is immutable for the
//! process lifetime.

use std::io::Write;
use std::sync::Arc;

use chatty_storage::db::{call_blocking, Database};

use crate::error::ChattyError;

/// The active session id given the highest persisted one and the operator's
/// answer: a fresh store starts at 1, otherwise continue or increment.
pub fn resolve_session(latest: Option<i64>, start_new: bool) -> i64 {
    match latest {
        None => 1,
        Some(prev) if start_new => prev + 1,
        Some(prev) => prev,
    }
}

fn wants_new_session(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Queries the store for the most recent session and, when one exists,
/// blocks on stdin for the operator's decision.
pub async fn choose_session(db: Arc<Database>) -> Result<i64, ChattyError> {
    let latest = call_blocking(db, |db| db.latest_session_id()).await?;

    let Some(prev) = latest else {
        return Ok(resolve_session(None, false));
    };

    let answer = prompt("Do you want to start a new session? (y/N) ")?;
    let start_new = wants_new_session(&answer);
    if start_new {
        println!("A new session has been started!");
    } else {
        println!("Existing session data is being used.");
    }
    Ok(resolve_session(Some(prev), start_new))
}

fn prompt(question: &str) -> Result<String, ChattyError> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer)
}
