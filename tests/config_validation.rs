//! Integration tests for configuration loading and validation.

use chatty::config::Config;

#[test]
fn minimal_yaml_is_accepted_with_defaults() {
    let yaml = r#"
bot_username: chatty_bot
oauth_token: abc123
channels: ["somestreamer"]
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.bot_username, "chatty_bot");
    assert_eq!(config.oauth_token, "oauth:abc123");
    assert_eq!(config.channels, vec!["#somestreamer"]);
    assert_eq!(config.irc_server, "irc.chat.twitch.tv");
    assert_eq!(config.irc_port, 6697);
    assert!(config.irc_tls);
    assert_eq!(config.data_dir, "./chatty.data");
    assert_eq!(config.flush_interval_secs, 30);
    assert!(!config.verbose);
}

#[test]
fn overrides_are_honored() {
    let yaml = r##"
bot_username: chatty_bot
oauth_token: "oauth:abc123"
channels: ["#a", "#b"]
irc_server: localhost
irc_port: 6667
irc_tls: false
data_dir: /tmp/chatty-test
flush_interval_secs: 5
verbose: true
"##;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.channels.len(), 2);
    assert_eq!(config.irc_server, "localhost");
    assert_eq!(config.irc_port, 6667);
    assert!(!config.irc_tls);
    assert_eq!(config.flush_interval_secs, 5);
    assert!(config.verbose);
}

#[test]
fn missing_required_fields_are_rejected() {
    let missing_token = r##"
bot_username: chatty_bot
oauth_token: ""
channels: ["#a"]
"##;
    assert!(Config::from_yaml_str(missing_token).is_err());

    let missing_username = r##"
bot_username: "  "
oauth_token: abc
channels: ["#a"]
"##;
    assert!(Config::from_yaml_str(missing_username).is_err());

    let no_channels = r#"
bot_username: bot
oauth_token: abc
channels: []
"#;
    assert!(Config::from_yaml_str(no_channels).is_err());
}

#[test]
fn malformed_yaml_is_a_config_error() {
    let err = Config::from_yaml_str("{{not yaml").unwrap_err();
    assert!(err.to_string().starts_with("Config error"));
}
