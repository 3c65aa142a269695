//! Chat commands. All of them are read/write queries against the store and
//! deliberately bypass the cache: rankings reflect flushed data only.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use chatty_storage::db::call_blocking;

use crate::runtime::AppState;
use crate::twitch::ChatEvent;

pub enum CommandOutcome {
    /// Recognized command; send this reply to the channel.
    Reply(String),
    /// Recognized command with nothing to say (includes malformed
    /// arguments, which are ignored without any reply or mutation).
    Silent,
    /// Not a command; the message accrues statistics normally.
    NotACommand,
}

fn add_quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^!aq (.*)@(.*)$").expect("static regex"))
}

fn delete_quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^!dq ([0-9]+)").expect("static regex"))
}

pub async fn handle_chat_command(state: &AppState, event: &ChatEvent) -> CommandOutcome {
    let text = event.text.trim();
    let lower = text.to_ascii_lowercase();

    if lower.starts_with("!stats") {
        let user_id = event.user_id;
        return match call_blocking(state.db.clone(), move |db| db.user_totals(user_id)).await {
            Ok(Some(totals)) => CommandOutcome::Reply(format!(
                "{} has earned {} xp saying {} words.",
                totals.display_name, totals.xp, totals.word_count
            )),
            Ok(None) => {
                CommandOutcome::Reply("You haven't said anything yet today.".to_string())
            }
            Err(e) => {
                warn!("!stats query failed: {e}");
                CommandOutcome::Silent
            }
        };
    }

    // Checked before !top so the shorter prefix does not shadow it.
    if lower.starts_with("!topall") {
        return match call_blocking(state.db.clone(), |db| db.top_chatters_all_time(10)).await {
            Ok(rows) => CommandOutcome::Reply(format!(
                "The most chatty people all time are: {}",
                rows.iter()
                    .map(|c| format!("{} ({})", c.display_name, c.xp))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Err(e) => {
                warn!("!topall query failed: {e}");
                CommandOutcome::Silent
            }
        };
    }

    if lower.starts_with("!top") {
        let session_id = state.session_id;
        return match call_blocking(state.db.clone(), move |db| db.top_chatters(session_id, 10))
            .await
        {
            Ok(rows) => CommandOutcome::Reply(format!(
                "The most chatty people today are: {}",
                rows.iter()
                    .map(|c| format!("{} ({})", c.display_name, c.xp))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Err(e) => {
                warn!("!top query failed: {e}");
                CommandOutcome::Silent
            }
        };
    }

    if lower.starts_with("!aq") {
        let Some(caps) = add_quote_re().captures(text) else {
            return CommandOutcome::Silent;
        };
        let body = caps[1].trim().to_string();
        let author = caps[2].trim().to_string();
        if body.is_empty() || author.is_empty() {
            return CommandOutcome::Silent;
        }
        match call_blocking(state.db.clone(), move |db| db.add_quote(&body, &author)).await {
            Ok(id) => info!("A new quote has been added! (#{id})"),
            Err(e) => warn!("!aq insert failed: {e}"),
        }
        return CommandOutcome::Silent;
    }

    if lower.starts_with("!dq") {
        let Some(caps) = delete_quote_re().captures(text) else {
            return CommandOutcome::Silent;
        };
        let Ok(quote_id) = caps[1].parse::<i64>() else {
            return CommandOutcome::Silent;
        };
        return match call_blocking(state.db.clone(), move |db| db.delete_quote(quote_id)).await {
            Ok(_) => CommandOutcome::Reply(format!("Quote #{quote_id} has been deleted.")),
            Err(e) => {
                warn!("!dq delete failed: {e}");
                CommandOutcome::Silent
            }
        };
    }

    if lower.starts_with("!quote") {
        return match call_blocking(state.db.clone(), |db| db.random_quote()).await {
            Ok(Some(q)) => CommandOutcome::Reply(format!(
                "\"{}\" @{} (#{})",
                q.body, q.author_name, q.quote_id
            )),
            Ok(None) => CommandOutcome::Reply(
                "I can't find any quotes in the database. Try adding some with !aq.".to_string(),
            ),
            Err(e) => {
                warn!("!quote query failed: {e}");
                CommandOutcome::Silent
            }
        };
    }

    CommandOutcome::NotACommand
}
