pub mod commands;
pub mod config;
pub mod console;
pub mod flusher;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod twitch;

pub use chatty_core::error;
pub use chatty_core::text;
pub use chatty_storage::db;
