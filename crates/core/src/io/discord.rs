//! Discord REST transport.
//!
//! Outbound calls go through the v10 HTTP API. Inbound messages are obtained
//! by polling one channel with `after=<last seen id>` and pushed into the
//! runtime's input channel.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::input::InputSender;
use super::transport::{ChatTransport, TransportError};
use crate::types::{Author, ChannelId, Identity, IncomingMessage, MessageHandle, MessageId, UserId};

const API_BASE: &str = "https://discord.com/api/v10";
/// Discord caps `limit` on the messages endpoint at 100.
const MAX_PAGE: usize = 100;

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    author: RawUser,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mentions: Vec<RawUser>,
    #[serde(default)]
    message_reference: Option<RawReference>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Serialize)]
struct ContentBody<'a> {
    content: &'a str,
}

fn snowflake<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, TransportError> {
    raw.parse()
        .map_err(|_| TransportError::Malformed(format!("{field}: not a snowflake: {raw:?}")))
}

impl RawUser {
    fn into_author(self) -> Result<Author, TransportError> {
        let display_name = self
            .global_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(self.username);
        Ok(Author { id: snowflake("author.id", &self.id)?, display_name, is_bot: self.bot })
    }
}

impl TryFrom<RawMessage> for IncomingMessage {
    type Error = TransportError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let mentions = raw
            .mentions
            .iter()
            .map(|u| snowflake::<UserId>("mentions.id", &u.id))
            .collect::<Result<Vec<_>, _>>()?;
        let referenced_message_id = raw
            .message_reference
            .and_then(|r| r.message_id)
            .map(|id| snowflake("message_reference.message_id", &id))
            .transpose()?;
        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            id: snowflake("id", &raw.id)?,
            channel_id: snowflake("channel_id", &raw.channel_id)?,
            author: raw.author.into_author()?,
            content: raw.content,
            mentions,
            referenced_message_id,
            timestamp,
        })
    }
}

// ── Client ──────────────────────────────────────────────────────

/// Authenticated Discord REST client.
pub struct DiscordClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, API_BASE)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bot {}", self.token))
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Rejected { status, body })
    }

    /// Who the token belongs to.
    pub async fn identity(&self) -> Result<Identity, TransportError> {
        let resp = self.auth(self.client.get(self.url("/users/@me"))).send().await?;
        let user: RawUser = Self::checked(resp).await?.json().await?;
        let author = user.into_author()?;
        Ok(Identity { user_id: author.id, name: author.display_name })
    }

    /// Messages newer than `after` (or the latest page), newest first.
    async fn messages(
        &self,
        channel: ChannelId,
        limit: usize,
        after: Option<MessageId>,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        let mut query = vec![("limit", limit.clamp(1, MAX_PAGE).to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        let resp = self
            .auth(self.client.get(self.url(&format!("/channels/{channel}/messages"))))
            .query(&query)
            .send()
            .await?;
        let raw: Vec<RawMessage> = Self::checked(resp).await?.json().await?;

        let mut out = Vec::with_capacity(raw.len());
        for message in raw {
            match IncomingMessage::try_from(message) {
                Ok(m) => out.push(m),
                Err(e) => tracing::warn!(error = %e, "dropping malformed message"),
            }
        }
        // Discord returns newest first for plain pages; `after` pages are not guaranteed.
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }
}

#[async_trait]
impl ChatTransport for DiscordClient {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<MessageHandle, TransportError> {
        let resp = self
            .auth(self.client.post(self.url(&format!("/channels/{channel}/messages"))))
            .json(&ContentBody { content: text })
            .send()
            .await?;
        let raw: RawMessage = Self::checked(resp).await?.json().await?;
        Ok(MessageHandle { channel_id: channel, message_id: snowflake("id", &raw.id)? })
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), TransportError> {
        let path = format!("/channels/{}/messages/{}", handle.channel_id, handle.message_id);
        let resp = self
            .auth(self.client.patch(self.url(&path)))
            .json(&ContentBody { content: text })
            .send()
            .await?;
        Self::checked(resp).await?;
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        self.messages(channel, limit, None).await
    }
}

// ── Poller ──────────────────────────────────────────────────────

/// Poll `channel` and forward new messages, oldest first, until cancelled.
/// The first poll only records the newest id so the backlog is not replayed.
pub async fn poll_channel(
    client: &DiscordClient,
    channel: ChannelId,
    interval: Duration,
    tx: InputSender,
    token: CancellationToken,
) -> Result<(), TransportError> {
    let mut last_seen = client.messages(channel, 1, None).await?.first().map(|m| m.id);
    tracing::info!(channel = %channel, last_seen = ?last_seen, "polling channel");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let batch = match client.messages(channel, MAX_PAGE, last_seen).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "poll failed");
                continue;
            }
        };

        for message in batch.into_iter().rev() {
            if last_seen.is_some_and(|seen| message.id <= seen) {
                continue;
            }
            last_seen = Some(message.id);
            if tx.send(message).await.is_err() {
                return Err(TransportError::Closed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<IncomingMessage, TransportError> {
        let raw: RawMessage = serde_json::from_str(json).unwrap();
        IncomingMessage::try_from(raw)
    }

    #[test]
    fn converts_full_message() {
        let msg = parse(
            r#"{
                "id": "1100",
                "channel_id": "77",
                "author": {"id": "5", "username": "taro_99", "global_name": "Taro"},
                "content": "<@99> こんにちは",
                "mentions": [{"id": "99", "username": "nadeko", "bot": true}],
                "message_reference": {"message_id": "1000", "channel_id": "77"},
                "timestamp": "2024-05-01T12:00:00.000000+00:00"
            }"#,
        )
        .unwrap();

        assert_eq!(msg.id, MessageId(1100));
        assert_eq!(msg.channel_id, ChannelId(77));
        assert_eq!(msg.author.display_name, "Taro");
        assert!(!msg.author.is_bot);
        assert_eq!(msg.mentions, vec![UserId(99)]);
        assert_eq!(msg.referenced_message_id, Some(MessageId(1000)));
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let msg = parse(
            r#"{"id": "1", "channel_id": "2",
                "author": {"id": "3", "username": "hanako", "global_name": null, "bot": true}}"#,
        )
        .unwrap();
        assert_eq!(msg.author.display_name, "hanako");
        assert!(msg.author.is_bot);
        assert!(msg.content.is_empty());
        assert!(msg.referenced_message_id.is_none());
    }

    #[test]
    fn rejects_bad_snowflake() {
        let err =
            parse(r#"{"id": "x1", "channel_id": "2", "author": {"id": "3", "username": "a"}}"#);
        assert!(matches!(err, Err(TransportError::Malformed(_))));
    }

    #[test]
    fn urls_use_base() {
        let client = DiscordClient::with_base_url("t", "http://localhost:9/api/");
        assert_eq!(client.url("/users/@me"), "http://localhost:9/api/users/@me");
    }
}
