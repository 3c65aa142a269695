use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChattyError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Chat transport error: {0}")]
    Transport(String),

    #[error("Task error: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let e = ChattyError::Config("missing oauth_token".into());
        assert_eq!(e.to_string(), "Config error: missing oauth_token");

        let e = ChattyError::Transport("connection reset".into());
        assert_eq!(e.to_string(), "Chat transport error: connection reset");

        let e = ChattyError::Task("join failed".into());
        assert_eq!(e.to_string(), "Task error: join failed");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let e: ChattyError = io_err.into();
        assert!(e.to_string().contains("not found"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let sql_err = rusqlite::Error::QueryReturnedNoRows;
        let e: ChattyError = sql_err.into();
        assert!(e.to_string().starts_with("Database error"));
    }
}
