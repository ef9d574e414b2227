//! In-process chat transport.
//!
//! Keeps every channel's messages in memory. Backs the console client and
//! the test suite; failure switches simulate an unreliable chat service.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use super::transport::{ChatTransport, TransportError};
use crate::types::{Author, ChannelId, IncomingMessage, MessageHandle, MessageId};

/// Something the transport did on our behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Sent { handle: MessageHandle, text: String },
    Edited { handle: MessageHandle, text: String },
}

pub struct MemoryTransport {
    me: Author,
    next_id: AtomicU64,
    channels: Mutex<HashMap<ChannelId, Vec<IncomingMessage>>>,
    outbound: Mutex<Vec<Outbound>>,
    fail_send: AtomicBool,
    fail_history: AtomicBool,
}

impl MemoryTransport {
    /// `me` is the author recorded on messages this transport sends.
    pub fn new(me: Author) -> Self {
        Self {
            me,
            next_id: AtomicU64::new(1_000),
            channels: Mutex::new(HashMap::new()),
            outbound: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
        }
    }

    /// Allocate a fresh message id.
    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Append an inbound message to its channel's history.
    pub fn record(&self, message: IncomingMessage) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.entry(message.channel_id).or_default().push(message);
        }
    }

    /// Everything sent or edited so far, in order.
    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Current text of every message we sent, in send order.
    pub fn sent_texts(&self) -> Vec<String> {
        let Ok(channels) = self.channels.lock() else {
            return Vec::new();
        };
        let mut mine: Vec<&IncomingMessage> = channels
            .values()
            .flatten()
            .filter(|m| m.author.id == self.me.id)
            .collect();
        mine.sort_by_key(|m| m.id);
        mine.into_iter().map(|m| m.content.clone()).collect()
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    fn push_outbound(&self, event: Outbound) {
        if let Ok(mut out) = self.outbound.lock() {
            out.push(event);
        }
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<MessageHandle, TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let id = self.next_message_id();
        self.record(IncomingMessage {
            id,
            channel_id: channel,
            author: self.me.clone(),
            content: text.to_owned(),
            mentions: Vec::new(),
            referenced_message_id: None,
            timestamp: Utc::now(),
        });
        let handle = MessageHandle { channel_id: channel, message_id: id };
        self.push_outbound(Outbound::Sent { handle, text: text.to_owned() });
        Ok(handle)
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), TransportError> {
        {
            let mut channels = self.channels.lock().map_err(|_| TransportError::Closed)?;
            let message = channels
                .get_mut(&handle.channel_id)
                .and_then(|msgs| msgs.iter_mut().find(|m| m.id == handle.message_id))
                .ok_or_else(|| {
                    TransportError::Malformed(format!("unknown message {}", handle.message_id))
                })?;
            message.content = text.to_owned();
        }
        self.push_outbound(Outbound::Edited { handle: *handle, text: text.to_owned() });
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(TransportError::Http("history unavailable".into()));
        }
        let channels = self.channels.lock().map_err(|_| TransportError::Closed)?;
        Ok(channels
            .get(&channel)
            .map(|msgs| msgs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn bot() -> Author {
        Author { id: UserId(99), display_name: "nadeko".into(), is_bot: true }
    }

    fn human(id: MessageId, text: &str) -> IncomingMessage {
        IncomingMessage {
            id,
            channel_id: ChannelId(1),
            author: Author { id: UserId(1), display_name: "taro".into(), is_bot: false },
            content: text.into(),
            mentions: vec![],
            referenced_message_id: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn send_then_edit_updates_history() {
        let t = MemoryTransport::new(bot());
        let handle = t.send(ChannelId(1), "thinking").await.unwrap();
        t.edit(&handle, "done").await.unwrap();

        assert_eq!(t.sent_texts(), vec!["done".to_string()]);
        assert_eq!(t.outbound().len(), 2);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_bounded() {
        let t = MemoryTransport::new(bot());
        for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
            t.record(human(MessageId(i as u64), text));
        }
        let history = t.fetch_history(ChannelId(1), 2).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["three", "two"]);
    }

    #[tokio::test]
    async fn failure_switches() {
        let t = MemoryTransport::new(bot());
        t.set_fail_send(true);
        assert!(t.send(ChannelId(1), "x").await.is_err());
        t.set_fail_history(true);
        assert!(t.fetch_history(ChannelId(1), 5).await.is_err());
        let handle = MessageHandle { channel_id: ChannelId(1), message_id: MessageId(1) };
        assert!(t.edit(&handle, "x").await.is_err());
    }
}
