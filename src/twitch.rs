//! Twitch IRC chat transport: connection handshake, IRCv3 tag parsing and
//! delivery of qualifying chat events to the statistics engine.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use native_tls::TlsConnector as NativeTlsConnector;
use tokio::io::{split, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use tracing::{error, info, warn};

use chatty_core::error::ChattyError;
use chatty_core::text::{split_text, word_count};

use crate::commands::{handle_chat_command, CommandOutcome};
use crate::runtime::AppState;
use crate::stats::{record_message, MessageDelta};

const TWITCH_MESSAGE_MAX_LEN: usize = 450;

/// A chat message that made it past transport-level filtering. Self-authored
/// messages and non-channel targets never become events.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub target: String,
    pub user_id: i64,
    pub display_name: String,
    pub text: String,
    pub is_subscriber: bool,
    pub emote_count: i64,
}

/// Handle for sending chat lines; usable while a connection is up.
pub struct TwitchSender {
    command_tx: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
}

impl Default for TwitchSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitchSender {
    pub fn new() -> Self {
        TwitchSender {
            command_tx: Arc::new(RwLock::new(None)),
        }
    }

    async fn set_command_tx(&self, tx: mpsc::UnboundedSender<String>) {
        *self.command_tx.write().await = Some(tx);
    }

    async fn clear_command_tx(&self) {
        *self.command_tx.write().await = None;
    }

    async fn send_raw(&self, line: String) -> Result<(), String> {
        let tx = self.command_tx.read().await.clone();
        let Some(tx) = tx else {
            return Err("Twitch chat is not connected".to_string());
        };
        tx.send(line)
            .map_err(|_| "Twitch connection writer is not available".to_string())
    }

    pub async fn send_text(&self, target: &str, text: &str) -> Result<(), String> {
        let sanitized = sanitize_chat_text(text);
        for chunk in split_text(&sanitized, TWITCH_MESSAGE_MAX_LEN) {
            self.send_raw(format!("PRIVMSG {target} :{chunk}")).await?;
        }
        Ok(())
    }
}

pub async fn start_twitch_bot(state: Arc<AppState>, sender: Arc<TwitchSender>) {
    let reconnect_delay = std::time::Duration::from_secs(5);
    loop {
        if let Err(e) = run_twitch_connection(state.clone(), sender.clone()).await {
            warn!("{}", ChattyError::Transport(e));
        }
        sender.clear_command_tx().await;
        tokio::time::sleep(reconnect_delay).await;
    }
}

type BoxedIo = Box<dyn AsyncReadWrite + Unpin + Send>;
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

async fn run_twitch_connection(
    state: Arc<AppState>,
    sender: Arc<TwitchSender>,
) -> Result<(), String> {
    let cfg = &state.config;
    let addr = format!("{}:{}", cfg.irc_server, cfg.irc_port);
    info!(
        "Twitch: connecting to {addr} ({})",
        if cfg.irc_tls { "tls" } else { "plain" }
    );
    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| format!("Twitch connect failed for {addr}: {e}"))?;

    let stream: BoxedIo = if cfg.irc_tls {
        let connector = NativeTlsConnector::new()
            .map_err(|e| format!("Twitch TLS connector init failed: {e}"))?;
        let connector = TokioTlsConnector::from(connector);
        let tls_stream = connector
            .connect(&cfg.irc_server, tcp_stream)
            .await
            .map_err(|e| format!("Twitch TLS handshake failed: {e}"))?;
        Box::new(tls_stream)
    } else {
        Box::new(tcp_stream)
    };

    let (read_half, mut write_half) = split(stream);
    let mut lines = BufReader::new(read_half).lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    sender.set_command_tx(tx.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            write_half
                .write_all(line.as_bytes())
                .await
                .map_err(|e| format!("Twitch write failed: {e}"))?;
            write_half
                .write_all(b"\r\n")
                .await
                .map_err(|e| format!("Twitch write failed: {e}"))?;
        }
        Ok::<(), String>(())
    });

    let _ = tx.send("CAP REQ :twitch.tv/tags twitch.tv/commands".to_string());
    let _ = tx.send(format!("PASS {}", cfg.oauth_token));
    let _ = tx.send(format!("NICK {}", cfg.bot_username));

    let mut joined_channels = false;
    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        let line = line.trim_end_matches('\r');

        if let Some(payload) = line.strip_prefix("PING ") {
            let _ = tx.send(format!("PONG {payload}"));
            continue;
        }

        let Some(msg) = parse_irc_line(line) else {
            continue;
        };

        match msg.command {
            "001" if !joined_channels => {
                joined_channels = true;
                info!("Connected to {addr}");
                for channel in &cfg.channels {
                    let _ = tx.send(format!("JOIN {channel}"));
                }
                continue;
            }
            "NOTICE" => {
                if let Some(trailing) = msg.trailing {
                    if trailing.contains("Login authentication failed") {
                        return Err("Twitch login authentication failed".to_string());
                    }
                }
                continue;
            }
            "RECONNECT" => return Err("Twitch requested a reconnect".to_string()),
            "PRIVMSG" => {}
            _ => continue,
        }

        let Some(event) = chat_event_from(&msg, &cfg.bot_username) else {
            continue;
        };
        // Events are handled one at a time, in arrival order; only a cache
        // miss's read-through leaves the loop (on its own task).
        handle_chat_message(&state, &sender, event).await;
    }

    // Release both sender clones so the writer task can drain and exit.
    sender.clear_command_tx().await;
    drop(tx);
    match writer.await {
        Ok(Ok(())) => Err("Twitch read stream ended".to_string()),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(format!("Twitch writer join error: {e}")),
    }
}

async fn handle_chat_message(state: &Arc<AppState>, sender: &Arc<TwitchSender>, event: ChatEvent) {
    let text = event.text.trim();

    if text.starts_with('!') {
        match handle_chat_command(state, &event).await {
            CommandOutcome::Reply(reply) => {
                if let Err(e) = sender.send_text(&event.target, &reply).await {
                    error!("Twitch: failed to send reply: {e}");
                }
                return;
            }
            CommandOutcome::Silent => return,
            // Unrecognized "!" text accrues statistics like any message.
            CommandOutcome::NotACommand => {}
        }
    }

    if state.verbose.load(Ordering::Relaxed) {
        info!(
            "{} C: {} W: {} E: {} <{}> {}",
            event.target,
            text.chars().count(),
            word_count(text),
            event.emote_count,
            event.display_name,
            text
        );
    }

    let delta =
        MessageDelta::from_message(&event.display_name, text, event.is_subscriber, event.emote_count);
    record_message(state, event.user_id, delta).await;
}

struct ParsedIrcMessage<'a> {
    tags: Option<&'a str>,
    prefix: Option<&'a str>,
    command: &'a str,
    params: Vec<&'a str>,
    trailing: Option<&'a str>,
}

fn parse_irc_line(line: &str) -> Option<ParsedIrcMessage<'_>> {
    let mut rest = line.trim();
    if rest.is_empty() {
        return None;
    }

    let mut tags = None;
    if let Some(body) = rest.strip_prefix('@') {
        let space = body.find(' ')?;
        tags = Some(&body[..space]);
        rest = body[space + 1..].trim_start();
    }

    let mut prefix = None;
    if let Some(body) = rest.strip_prefix(':') {
        let space = body.find(' ')?;
        prefix = Some(&body[..space]);
        rest = body[space + 1..].trim_start();
    }

    let (head, trailing) = if let Some(idx) = rest.find(" :") {
        (&rest[..idx], Some(&rest[idx + 2..]))
    } else {
        (rest, None)
    };

    let mut it = head.split_whitespace();
    let command = it.next()?;
    let params = it.collect::<Vec<_>>();

    Some(ParsedIrcMessage {
        tags,
        prefix,
        command,
        params,
        trailing,
    })
}

fn nick_from_prefix(prefix: &str) -> Option<&str> {
    let nick = prefix.split('!').next().unwrap_or(prefix).trim();
    if nick.is_empty() {
        None
    } else {
        Some(nick)
    }
}

/// IRCv3 message tags, with values unescaped.
fn parse_tags(raw: &str) -> HashMap<&str, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.is_empty() {
                None
            } else {
                Some((key, unescape_tag_value(value)))
            }
        })
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Total emote occurrences in an `emotes` tag, e.g.
/// `25:0-4,6-10/1902:12-16` has three.
fn emote_occurrences(emotes_tag: &str) -> i64 {
    emotes_tag
        .split('/')
        .filter(|group| !group.is_empty())
        .map(|group| {
            group
                .split_once(':')
                .map(|(_, positions)| positions.split(',').filter(|p| !p.is_empty()).count())
                .unwrap_or(0)
        })
        .sum::<usize>() as i64
}

fn is_subscriber(tags: &HashMap<&str, String>) -> bool {
    if tags.get("subscriber").map(String::as_str) == Some("1") {
        return true;
    }
    tags.get("badges")
        .map(|badges| badges.split(',').any(|b| b.starts_with("subscriber/")))
        .unwrap_or(false)
}

/// Builds a qualifying chat event from a PRIVMSG, or None when the message
/// must not accrue statistics (self-authored, non-channel target, missing
/// identity tags, empty text).
fn chat_event_from(msg: &ParsedIrcMessage<'_>, bot_nick: &str) -> Option<ChatEvent> {
    let prefix = msg.prefix?;
    let sender_nick = nick_from_prefix(prefix)?;
    if sender_nick.eq_ignore_ascii_case(bot_nick) {
        return None;
    }

    let target = msg.params.first().copied()?;
    if !target.starts_with('#') {
        return None;
    }

    let text = msg.trailing.unwrap_or("").trim();
    if text.is_empty() {
        return None;
    }

    let tags = parse_tags(msg.tags?);
    let user_id = tags.get("user-id")?.parse::<i64>().ok()?;
    let display_name = match tags.get("display-name") {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => sender_nick.to_string(),
    };
    let emote_count = tags
        .get("emotes")
        .map(|raw| emote_occurrences(raw))
        .unwrap_or(0);

    Some(ChatEvent {
        target: target.to_string(),
        user_id,
        display_name,
        text: text.to_string(),
        is_subscriber: is_subscriber(&tags),
        emote_count,
    })
}

fn sanitize_chat_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\r' | '\n' | '\0' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "@badge-info=;badges=subscriber/6;display-name=Alice;emotes=25:0-4,6-10/1902:12-16;subscriber=1;user-id=117 :alice!alice@alice.tmi.twitch.tv PRIVMSG #somechannel :Kappa Kappa Keepo hi";

    #[test]
    fn test_parse_irc_line_with_tags() {
        let parsed = parse_irc_line(SAMPLE).unwrap();
        assert!(parsed.tags.unwrap().contains("user-id=117"));
        assert_eq!(parsed.prefix, Some("alice!alice@alice.tmi.twitch.tv"));
        assert_eq!(parsed.command, "PRIVMSG");
        assert_eq!(parsed.params, vec!["#somechannel"]);
        assert_eq!(parsed.trailing, Some("Kappa Kappa Keepo hi"));
    }

    #[test]
    fn test_parse_irc_line_without_tags() {
        let parsed = parse_irc_line(":tmi.twitch.tv 001 chatty_bot :Welcome, GLHF!").unwrap();
        assert_eq!(parsed.command, "001");
        assert!(parsed.tags.is_none());
    }

    #[test]
    fn test_chat_event_from_privmsg() {
        let parsed = parse_irc_line(SAMPLE).unwrap();
        let event = chat_event_from(&parsed, "chatty_bot").unwrap();
        assert_eq!(event.user_id, 117);
        assert_eq!(event.display_name, "Alice");
        assert_eq!(event.target, "#somechannel");
        assert_eq!(event.text, "Kappa Kappa Keepo hi");
        assert!(event.is_subscriber);
        assert_eq!(event.emote_count, 3);
    }

    #[test]
    fn test_self_messages_do_not_qualify() {
        let parsed = parse_irc_line(SAMPLE).unwrap();
        assert!(chat_event_from(&parsed, "alice").is_none());
    }

    #[test]
    fn test_non_channel_targets_do_not_qualify() {
        let line = "@display-name=Bob;user-id=9 :bob!bob@bob.tmi.twitch.tv PRIVMSG chatty_bot :psst";
        let parsed = parse_irc_line(line).unwrap();
        assert!(chat_event_from(&parsed, "chatty_bot").is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_nick() {
        let line = "@display-name=;user-id=9 :bob!bob@bob.tmi.twitch.tv PRIVMSG #c :hello";
        let parsed = parse_irc_line(line).unwrap();
        let event = chat_event_from(&parsed, "chatty_bot").unwrap();
        assert_eq!(event.display_name, "bob");
    }

    #[test]
    fn test_subscriber_from_badge_only() {
        let line =
            "@badges=subscriber/3;subscriber=0;user-id=9 :b!b@b.tmi.twitch.tv PRIVMSG #c :hey";
        let parsed = parse_irc_line(line).unwrap();
        assert!(chat_event_from(&parsed, "chatty_bot").unwrap().is_subscriber);
    }

    #[test]
    fn test_emote_occurrences() {
        assert_eq!(emote_occurrences("25:0-4,6-10/1902:12-16"), 3);
        assert_eq!(emote_occurrences("25:0-4"), 1);
        assert_eq!(emote_occurrences(""), 0);
    }

    #[test]
    fn test_unescape_tag_value() {
        assert_eq!(unescape_tag_value(r"hello\sworld"), "hello world");
        assert_eq!(unescape_tag_value(r"semi\:colon"), "semi;colon");
        assert_eq!(unescape_tag_value(r"back\\slash"), "back\\slash");
    }

    #[test]
    fn test_sanitize_chat_text_strips_line_breaks() {
        assert_eq!(sanitize_chat_text("a\r\nb\0c"), "a  b c");
    }
}
