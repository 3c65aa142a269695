use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ChattyError;

fn default_irc_server() -> String {
    "irc.chat.twitch.tv".into()
}
fn default_irc_port() -> u16 {
    6697
}
fn default_irc_tls() -> bool {
    true
}
fn default_data_dir() -> String {
    "./chatty.data".into()
}
fn default_flush_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Twitch login name of the bot account.
    pub bot_username: String,
    /// OAuth token for the bot account; the `oauth:` prefix is optional in
    /// the file and added during normalization.
    pub oauth_token: String,
    /// Channels to join, e.g. `["#somestreamer"]`.
    pub channels: Vec<String>,
    #[serde(default = "default_irc_server")]
    pub irc_server: String,
    #[serde(default = "default_irc_port")]
    pub irc_port: u16,
    #[serde(default = "default_irc_tls")]
    pub irc_tls: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Log every qualifying message at startup; toggleable from the console.
    #[serde(default)]
    pub verbose: bool,
}

impl Config {
    pub fn resolve_config_path() -> Result<Option<PathBuf>, ChattyError> {
        if let Ok(custom) = std::env::var("CHATTY_CONFIG") {
            if std::path::Path::new(&custom).exists() {
                return Ok(Some(PathBuf::from(custom)));
            }
            return Err(ChattyError::Config(format!(
                "CHATTY_CONFIG points to non-existent file: {custom}"
            )));
        }

        if std::path::Path::new("./chatty.config.yaml").exists() {
            return Ok(Some(PathBuf::from("./chatty.config.yaml")));
        }
        if std::path::Path::new("./chatty.config.yml").exists() {
            return Ok(Some(PathBuf::from("./chatty.config.yml")));
        }
        Ok(None)
    }

    /// Load config from YAML file.
    pub fn load() -> Result<Self, ChattyError> {
        let yaml_path = Self::resolve_config_path()?;

        if let Some(path) = yaml_path {
            let path_str = path.to_string_lossy().to_string();
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ChattyError::Config(format!("Failed to read {path_str}: {e}")))?;
            return Self::from_yaml_str(&content);
        }

        Err(ChattyError::Config(
            "No chatty.config.yaml found. Create one with bot_username, oauth_token and channels."
                .into(),
        ))
    }

    /// Parse and validate a YAML config document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ChattyError> {
        let mut config: Config = serde_yaml::from_str(content)
            .map_err(|e| ChattyError::Config(format!("Failed to parse config: {e}")))?;
        config.post_deserialize()?;
        Ok(config)
    }

    /// Apply post-deserialization normalization and validation.
    fn post_deserialize(&mut self) -> Result<(), ChattyError> {
        self.bot_username = self.bot_username.trim().to_lowercase();
        if self.bot_username.is_empty() {
            return Err(ChattyError::Config("bot_username must be set".into()));
        }

        self.oauth_token = self.oauth_token.trim().to_string();
        if self.oauth_token.is_empty() {
            return Err(ChattyError::Config("oauth_token must be set".into()));
        }
        if !self.oauth_token.starts_with("oauth:") {
            self.oauth_token = format!("oauth:{}", self.oauth_token);
        }

        self.channels = self
            .channels
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .map(|c| {
                if c.starts_with('#') {
                    c
                } else {
                    format!("#{c}")
                }
            })
            .collect();
        if self.channels.is_empty() {
            return Err(ChattyError::Config(
                "channels must list at least one channel to join".into(),
            ));
        }

        if self.irc_server.trim().is_empty() {
            self.irc_server = default_irc_server();
        }
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.flush_interval_secs == 0 {
            return Err(ChattyError::Config(
                "flush_interval_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Minimal valid config for tests.
    #[cfg(test)]
    pub(crate) fn test_defaults() -> Self {
        Config {
            bot_username: "chatty_bot".into(),
            oauth_token: "oauth:test-token".into(),
            channels: vec!["#testchannel".into()],
            irc_server: default_irc_server(),
            irc_port: default_irc_port(),
            irc_tls: default_irc_tls(),
            data_dir: default_data_dir(),
            flush_interval_secs: default_flush_interval_secs(),
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::test_defaults();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.bot_username, config.bot_username);
        assert_eq!(parsed.channels, config.channels);
    }

    #[test]
    fn test_defaults_applied_for_missing_fields() {
        let yaml = r#"
bot_username: SomeBot
oauth_token: abc123
channels: ["somestreamer"]
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.irc_server, "irc.chat.twitch.tv");
        assert_eq!(config.irc_port, 6697);
        assert!(config.irc_tls);
        assert_eq!(config.flush_interval_secs, 30);
        assert!(!config.verbose);
    }

    #[test]
    fn test_normalization() {
        let yaml = r#"
bot_username: " MixedCase "
oauth_token: abc123
channels: ["SomeStreamer", " #Other "]
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.bot_username, "mixedcase");
        assert_eq!(config.oauth_token, "oauth:abc123");
        assert_eq!(config.channels, vec!["#somestreamer", "#other"]);
    }

    #[test]
    fn test_oauth_prefix_not_duplicated() {
        let yaml = r##"
bot_username: bot
oauth_token: "oauth:abc123"
channels: ["#c"]
"##;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.oauth_token, "oauth:abc123");
        assert_eq!(config.channels, vec!["#c"]);
    }

    #[test]
    fn test_empty_channels_rejected() {
        let yaml = r#"
bot_username: bot
oauth_token: abc123
channels: ["  "]
"#;
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let yaml = r##"
bot_username: bot
oauth_token: abc123
channels: ["#c"]
flush_interval_secs: 0
"##;
        assert!(Config::from_yaml_str(yaml).is_err());
    }
}
