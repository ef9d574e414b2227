//! Terminal-backed chat transport.
//!
//! Wraps [`MemoryTransport`] so history, edits and ambient sampling behave as
//! they would in a real channel, and echoes every bot message to stdout.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nadeko_core::io::memory::MemoryTransport;
use nadeko_core::io::{ChatTransport, TransportError};
use nadeko_core::types::{Author, ChannelId, Identity, IncomingMessage, MessageHandle, UserId};

/// The single channel every console message is posted to.
pub const CONSOLE_CHANNEL: ChannelId = ChannelId(1);

pub struct ConsoleTransport {
    inner: MemoryTransport,
    bot_name: String,
}

impl ConsoleTransport {
    pub fn new(identity: &Identity) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryTransport::new(Author {
                id: identity.user_id,
                display_name: identity.name.clone(),
                is_bot: true,
            }),
            bot_name: identity.name.clone(),
        })
    }

    /// Turn a typed line into an inbound message and record it in the channel.
    /// `@name` is rewritten to the bot's mention token.
    pub fn inbound(&self, identity: &Identity, speaker: &Speaker, line: &str) -> IncomingMessage {
        let alias = format!("@{}", identity.name);
        let content = line.replace(&alias, &identity.user_id.mention());
        let mentions = if identity
            .address_tokens()
            .iter()
            .any(|t| content.contains(t.as_str()))
        {
            vec![identity.user_id]
        } else {
            Vec::new()
        };

        let message = IncomingMessage {
            id: self.inner.next_message_id(),
            channel_id: CONSOLE_CHANNEL,
            author: Author {
                id: speaker.id,
                display_name: speaker.name.clone(),
                is_bot: false,
            },
            content,
            mentions,
            referenced_message_id: None,
            timestamp: Utc::now(),
        };
        self.inner.record(message.clone());
        message
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<MessageHandle, TransportError> {
        let handle = self.inner.send(channel, text).await?;
        println!("\r[{}] {}: {}", handle.message_id, self.bot_name, text);
        Ok(handle)
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), TransportError> {
        self.inner.edit(handle, text).await?;
        println!("\r[{}] {} (edited): {}", handle.message_id, self.bot_name, text);
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        self.inner.fetch_history(channel, limit).await
    }
}

/// Who is typing. Each distinct name gets its own user id.
#[derive(Debug, Clone)]
pub struct Speaker {
    pub id: UserId,
    pub name: String,
}

/// Speakers seen so far, in order of first appearance.
#[derive(Debug)]
pub struct Speakers {
    known: Vec<Speaker>,
    current: usize,
}

impl Speakers {
    pub fn new(first: &str) -> Self {
        Self {
            known: vec![Speaker { id: UserId(100), name: first.to_owned() }],
            current: 0,
        }
    }

    pub fn current(&self) -> &Speaker {
        &self.known[self.current]
    }

    /// Switch to `name`, registering it on first use.
    pub fn switch(&mut self, name: &str) -> &Speaker {
        self.current = match self.known.iter().position(|s| s.name == name) {
            Some(i) => i,
            None => {
                let id = UserId(100 + self.known.len() as u64);
                self.known.push(Speaker { id, name: name.to_owned() });
                self.known.len() - 1
            }
        };
        self.current()
    }
}
