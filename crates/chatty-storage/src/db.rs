use rusqlite::OptionalExtension;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chatty_core::error::ChattyError;

pub struct Database {
    conn: Mutex<Connection>,
}

/// Runs a database closure on the blocking pool so rusqlite work never
/// stalls the async event loop.
pub async fn call_blocking<T, F>(db: std::sync::Arc<Database>, f: F) -> Result<T, ChattyError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T, ChattyError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| ChattyError::Task(format!("DB task join error: {e}")))?
}

/// Per-user, per-session statistics aggregate. One logical row exists per
/// `(user_id, session_id)` pair, in the cache and in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatterStat {
    pub user_id: i64,
    pub session_id: i64,
    pub display_name: String,
    pub line_count: i64,
    pub xp: i64,
    pub word_count: i64,
    pub emote_count: i64,
}

/// All-time totals for one user, summed across sessions.
#[derive(Debug, Clone)]
pub struct ChatterTotals {
    pub display_name: String,
    pub xp: i64,
    pub word_count: i64,
}

/// One ranking entry for the all-time leaderboard.
#[derive(Debug, Clone)]
pub struct RankedChatter {
    pub display_name: String,
    pub xp: i64,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub quote_id: i64,
    pub body: String,
    pub author_name: String,
}

impl Database {
    pub fn new(data_dir: &str) -> Result<Self, ChattyError> {
        let db_path = Path::new(data_dir).join("chatty.db");
        std::fs::create_dir_all(data_dir)?;

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chatters (
                user_id INTEGER NOT NULL,
                session_id INTEGER NOT NULL,
                display_name TEXT NOT NULL,
                line_count INTEGER NOT NULL DEFAULT 0,
                xp INTEGER NOT NULL DEFAULT 0,
                word_count INTEGER NOT NULL DEFAULT 0,
                emote_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, session_id)
            );

            CREATE TABLE IF NOT EXISTS quotes (
                quote_id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL,
                author_name TEXT NOT NULL
            );",
        )?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Highest session id ever persisted, or None for a fresh database.
    pub fn latest_session_id(&self) -> Result<Option<i64>, ChattyError> {
        let conn = self.lock_conn();
        let id = conn
            .query_row(
                "SELECT session_id FROM chatters ORDER BY session_id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn get_chatter(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Option<ChatterStat>, ChattyError> {
        let conn = self.lock_conn();
        let stat = conn
            .query_row(
                "SELECT user_id, session_id, display_name, line_count, xp, word_count, emote_count
                 FROM chatters WHERE user_id = ?1 AND session_id = ?2",
                params![user_id, session_id],
                map_chatter_row,
            )
            .optional()?;
        Ok(stat)
    }

    /// Writes the fully merged aggregate for `(user_id, session_id)`. The new
    /// row replaces the prior one wholesale; fields are never merged here —
    /// the cache already holds the merged values.
    pub fn upsert_chatter(&self, stat: &ChatterStat) -> Result<(), ChattyError> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO chatters (user_id, session_id, display_name, line_count, xp, word_count, emote_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, session_id) DO UPDATE SET
                display_name = excluded.display_name,
                line_count = excluded.line_count,
                xp = excluded.xp,
                word_count = excluded.word_count,
                emote_count = excluded.emote_count",
            params![
                stat.user_id,
                stat.session_id,
                stat.display_name,
                stat.line_count,
                stat.xp,
                stat.word_count,
                stat.emote_count
            ],
        )?;
        Ok(())
    }

    /// All-time totals for one user across every session (`!stats`).
    pub fn user_totals(&self, user_id: i64) -> Result<Option<ChatterTotals>, ChattyError> {
        let conn = self.lock_conn();
        let totals = conn
            .query_row(
                "SELECT display_name, SUM(xp), SUM(word_count)
                 FROM chatters WHERE user_id = ?1 GROUP BY user_id",
                params![user_id],
                |row| {
                    Ok(ChatterTotals {
                        display_name: row.get(0)?,
                        xp: row.get(1)?,
                        word_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(totals)
    }

    /// Top chatters of a single session, ordered by xp descending (`!top`
    /// and the console `stats` command).
    pub fn top_chatters(
        &self,
        session_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatterStat>, ChattyError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, session_id, display_name, line_count, xp, word_count, emote_count
             FROM chatters WHERE session_id = ?1 ORDER BY xp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], map_chatter_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All-time top chatters, grouped by user id and ordered by summed xp
    /// descending (`!topall`).
    pub fn top_chatters_all_time(&self, limit: usize) -> Result<Vec<RankedChatter>, ChattyError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT display_name, SUM(xp) AS total_xp
             FROM chatters GROUP BY user_id ORDER BY total_xp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RankedChatter {
                display_name: row.get(0)?,
                xp: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn add_quote(&self, body: &str, author_name: &str) -> Result<i64, ChattyError> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO quotes (body, author_name) VALUES (?1, ?2)",
            params![body, author_name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns true when a quote with the given id existed and was removed.
    pub fn delete_quote(&self, quote_id: i64) -> Result<bool, ChattyError> {
        let conn = self.lock_conn();
        let changed = conn.execute("DELETE FROM quotes WHERE quote_id = ?1", params![quote_id])?;
        Ok(changed > 0)
    }

    pub fn random_quote(&self) -> Result<Option<Quote>, ChattyError> {
        let conn = self.lock_conn();
        let quote = conn
            .query_row(
                "SELECT quote_id, body, author_name FROM quotes ORDER BY RANDOM() LIMIT 1",
                [],
                |row| {
                    Ok(Quote {
                        quote_id: row.get(0)?,
                        body: row.get(1)?,
                        author_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(quote)
    }
}

fn map_chatter_row(row: &rusqlite::Row<'_>) -> Result<ChatterStat, rusqlite::Error> {
    Ok(ChatterStat {
        user_id: row.get(0)?,
        session_id: row.get(1)?,
        display_name: row.get(2)?,
        line_count: row.get(3)?,
        xp: row.get(4)?,
        word_count: row.get(5)?,
        emote_count: row.get(6)?,
    })
}
