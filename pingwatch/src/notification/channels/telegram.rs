//! Telegram Bot API notification channel.
//!
//! Sends messages via the Telegram Bot API (`POST /bot<token>/sendMessage`).
//! Handles 429 rate limits by respecting the `parameters.retry_after` field
//! returned in the JSON response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::notification::events::NotificationEvent;
use crate::utils::http_client;
use crate::{Error, Result};

/// Maximum number of attempts for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Longest `retry_after` we are willing to sleep for.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Placeholder values shipped in sample configs.
pub(crate) const PLACEHOLDER_TOKEN: &str = "YOUR_BOT_TOKEN";
pub(crate) const PLACEHOLDER_CHAT_ID: &str = "YOUR_CHAT_ID";

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Parse mode for message formatting (HTML, Markdown, MarkdownV2).
    pub parse_mode: String,
    /// Bot API base URL.
    pub api_base: String,
}

fn default_parse_mode() -> String {
    "HTML".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            parse_mode: default_parse_mode(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl TelegramConfig {
    /// Reject missing or placeholder credentials.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let token = self.bot_token.trim();
        if token.is_empty() || token == PLACEHOLDER_TOKEN {
            return Err(Error::config("telegram.bot_token is not set"));
        }
        let chat_id = self.chat_id.trim();
        if chat_id.is_empty() || chat_id == PLACEHOLDER_CHAT_ID {
            return Err(Error::config("telegram.chat_id is not set"));
        }
        if !matches!(self.parse_mode.as_str(), "HTML" | "Markdown" | "MarkdownV2") {
            return Err(Error::config(format!(
                "telegram.parse_mode must be HTML, Markdown or MarkdownV2, got '{}'",
                self.parse_mode
            )));
        }
        Ok(())
    }
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel whose requests are bounded by `request_timeout`.
    pub fn new(config: TelegramConfig, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            config,
            client: http_client::build_client(request_timeout)?,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token.trim(),
            method
        )
    }

    /// Build the message text for an event.
    fn build_message(&self, event: &NotificationEvent) -> String {
        let priority = event.priority();
        let event_type = event.event_type();

        let text = match self.config.parse_mode.as_str() {
            "MarkdownV2" => {
                let title = escape_markdown_v2(&event.title());
                let description = escape_markdown_v2(&event.description());
                let footer = escape_markdown_v2(&format!("{event_type} | {priority}"));
                format!("*{title}*\n\n{description}\n\n_{footer}_")
            }
            "Markdown" => {
                // Legacy Markdown cannot escape inside an entity, so the footer stays plain.
                let title = escape_markdown(&event.title());
                let description = escape_markdown(&event.description());
                let footer = escape_markdown(&format!("{event_type} | {priority}"));
                format!("*{title}*\n\n{description}\n\n{footer}")
            }
            _ => {
                let title = escape_html(&event.title());
                let description = escape_html(&event.description());
                format!("<b>{title}</b>\n\n{description}\n\n<i>{event_type} | {priority}</i>")
            }
        };

        truncate_message(&text, TELEGRAM_MESSAGE_LIMIT)
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = self.method_url("sendMessage");
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| {
                    // reqwest errors embed the URL, which carries the bot token.
                    Error::notification(format!("Telegram request failed: {}", e.without_url()))
                })?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();

                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::notification(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after
                    .unwrap_or(Duration::from_secs(1))
                    .min(MAX_RETRY_AFTER);
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let description = api_error_description(response).await;
            warn!("Telegram sendMessage failed: {} - {}", status, description);
            return Err(Error::notification(format!(
                "Telegram sendMessage failed: {} - {}",
                status, description
            )));
        }
    }
}

async fn api_error_description(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or(body)
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let text = self.build_message(event);
        let payload = json!({
            "chat_id": self.config.chat_id.trim(),
            "text": text,
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": true,
        });

        self.send_with_retry(&payload).await?;

        debug!("Telegram notification sent: {}", event.event_type());
        Ok(())
    }

    async fn verify(&self) -> Result<String> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| {
                Error::notification(format!("Telegram getMe failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let description = api_error_description(response).await;
            return Err(Error::notification(format!(
                "Telegram getMe rejected: {} - {}",
                status, description
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            Error::notification(format!("Telegram getMe returned invalid JSON: {}", e.without_url()))
        })?;

        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = body
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            return Err(Error::notification(format!(
                "Telegram getMe rejected: {description}"
            )));
        }

        let username = body
            .get("result")
            .and_then(|r| r.get("username"))
            .and_then(|u| u.as_str())
            .unwrap_or("N/A");
        Ok(format!("@{username}"))
    }
}

/// Escape text for Telegram's HTML parse mode.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for Telegram's legacy Markdown parse mode.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape text for Telegram's MarkdownV2 parse mode.
fn escape_markdown_v2(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
        '\\',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Truncate a message to fit within the Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Host;
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn enabled_config() -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token: "123:ABC".to_string(),
            chat_id: "456".to_string(),
            ..Default::default()
        }
    }

    /// Serve one HTTP response and hand back the raw request.
    async fn one_shot_server(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (base, handle)
    }

    #[test]
    fn test_telegram_config_default() {
        let config = TelegramConfig::default();
        assert!(config.enabled);
        assert!(config.bot_token.is_empty());
        assert!(config.chat_id.is_empty());
        assert_eq!(config.parse_mode, "HTML");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_validate_rejects_placeholders() {
        let mut config = enabled_config();
        assert!(config.validate().is_ok());

        config.bot_token = PLACEHOLDER_TOKEN.to_string();
        assert!(config.validate().is_err());

        config.bot_token = "123:ABC".to_string();
        config.chat_id = PLACEHOLDER_CHAT_ID.to_string();
        assert!(config.validate().is_err());

        config.chat_id = "456".to_string();
        config.parse_mode = "BBCode".to_string();
        assert!(config.validate().is_err());

        let disabled = TelegramConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_telegram_channel_enabled() {
        let channel = TelegramChannel::new(enabled_config(), Duration::from_secs(5)).unwrap();
        assert!(channel.is_enabled());

        let channel =
            TelegramChannel::new(TelegramConfig::default(), Duration::from_secs(5)).unwrap();
        assert!(!channel.is_enabled());
    }

    #[test]
    fn test_build_message_html_escapes_host_fields() {
        let channel = TelegramChannel::new(enabled_config(), Duration::from_secs(5)).unwrap();
        let event = NotificationEvent::HostDown {
            host: Host::new("<lab & co>", "10.0.0.1"),
            failed_probes: 3,
            timestamp: Utc::now(),
        };

        let msg = channel.build_message(&event);
        assert!(msg.starts_with("<b>"));
        assert!(msg.contains("&lt;lab &amp; co&gt;"));
        assert!(msg.contains("10.0.0.1"));
        assert!(!msg.contains("<lab"));
    }

    /// Count markers not preceded by a backslash.
    fn unescaped(text: &str, marker: char) -> usize {
        let mut count = 0;
        let mut escaped = false;
        for c in text.chars() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == marker {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_build_message_host_down_in_every_parse_mode() {
        let event = NotificationEvent::HostDown {
            host: Host::new("db_primary", "10.0.0.5"),
            failed_probes: 3,
            timestamp: Utc::now(),
        };

        for mode in ["HTML", "Markdown", "MarkdownV2"] {
            let config = TelegramConfig {
                parse_mode: mode.to_string(),
                ..enabled_config()
            };
            assert!(config.validate().is_ok(), "{mode}");
            let msg = TelegramChannel::new(config, Duration::from_secs(5))
                .unwrap()
                .build_message(&event);

            match mode {
                "HTML" => {
                    assert!(msg.contains("db_primary"));
                    assert!(msg.ends_with("<i>host_down | critical</i>"));
                }
                _ => {
                    assert!(msg.contains("db\\_primary"), "{mode}: {msg}");
                    assert!(msg.contains("host\\_down"), "{mode}: {msg}");
                    // Styled spans must come in pairs.
                    assert_eq!(unescaped(&msg, '_') % 2, 0, "{mode}: {msg}");
                    assert_eq!(unescaped(&msg, '*') % 2, 0, "{mode}: {msg}");
                }
            }
        }
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("db_primary"), "db\\_primary");
        assert_eq!(escape_markdown("[lab] *x* `y`"), "\\[lab] \\*x\\* \\`y\\`");
        assert_eq!(escape_markdown("10.0.0.1 (core)"), "10.0.0.1 (core)");
    }

    #[test]
    fn test_escape_markdown_v2() {
        assert_eq!(escape_markdown_v2("10.0.0.1"), "10\\.0\\.0\\.1");
        assert_eq!(escape_markdown_v2("a_b"), "a\\_b");
    }

    #[test]
    fn test_truncate_message() {
        let short = "hello";
        assert_eq!(truncate_message(short, 100), "hello");

        let long: String = "a".repeat(5000);
        let truncated = truncate_message(&long, TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.ends_with("[truncated]"));
    }

    #[tokio::test]
    async fn test_send_posts_chat_and_text() {
        let (base, server) = one_shot_server("200 OK", r#"{"ok":true,"result":{}}"#).await;
        let channel = TelegramChannel::new(
            TelegramConfig {
                api_base: base,
                ..enabled_config()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        channel
            .send(&NotificationEvent::Test {
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /bot123:ABC/sendMessage"));
        assert!(request.contains(r#""chat_id":"456""#));
        assert!(request.contains("Test notification"));
    }

    #[tokio::test]
    async fn test_send_surfaces_api_error() {
        let (base, server) = one_shot_server(
            "400 Bad Request",
            r#"{"ok":false,"description":"Bad Request: chat not found"}"#,
        )
        .await;
        let channel = TelegramChannel::new(
            TelegramConfig {
                api_base: base,
                ..enabled_config()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let err = channel
            .send(&NotificationEvent::Test {
                timestamp: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_returns_username() {
        let (base, server) = one_shot_server(
            "200 OK",
            r#"{"ok":true,"result":{"id":1,"is_bot":true,"username":"pingwatch_bot"}}"#,
        )
        .await;
        let channel = TelegramChannel::new(
            TelegramConfig {
                api_base: base,
                ..enabled_config()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(channel.verify().await.unwrap(), "@pingwatch_bot");
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /bot123:ABC/getMe"));
    }
}
