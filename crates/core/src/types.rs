use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Snowflake ids ───────────────────────────────────────────────

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

snowflake!(
    /// A chat user (human or bot).
    UserId
);
snowflake!(ChannelId);
snowflake!(MessageId);

impl UserId {
    /// The in-text address token for this user, e.g. `<@42>`.
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

// ── Messages ────────────────────────────────────────────────────

/// Who wrote a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
    pub is_bot: bool,
}

/// Inbound chat message, validated at the transport boundary.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: Author,
    pub content: String,
    /// Users addressed by this message.
    pub mentions: Vec<UserId>,
    /// Set when this message replies to / quotes another message.
    pub referenced_message_id: Option<MessageId>,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    /// True if `user` is among the addressed users.
    pub fn mentions_user(&self, user: UserId) -> bool {
        self.mentions.contains(&user)
    }
}

/// Reference to a message we sent, used for in-place edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// One line of sampled channel history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: String,
    pub text: String,
}

impl fmt::Display for ConversationTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

/// The assistant's own identity on the chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub name: String,
}

impl Identity {
    /// Every textual form that addresses the assistant.
    pub fn address_tokens(&self) -> [String; 2] {
        [format!("<@{}>", self.user_id), format!("<@!{}>", self.user_id)]
    }

    /// True if the message addresses the assistant.
    pub fn is_addressed_by(&self, msg: &IncomingMessage) -> bool {
        msg.mentions_user(self.user_id)
            || self.address_tokens().iter().any(|t| msg.content.contains(t.as_str()))
    }

    /// Remove all address tokens and trim.
    pub fn strip_address(&self, content: &str) -> String {
        let mut text = content.to_owned();
        for token in self.address_tokens() {
            text = text.replace(token.as_str(), "");
        }
        text.trim().to_owned()
    }
}

// ── Dispatch outcome ────────────────────────────────────────────

/// Which handling path a message took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Authored by a bot or by ourselves.
    Ignored,
    /// Handled by the puzzle state machine.
    Puzzle,
    /// Quoted a puzzle prompt; mention handling suppressed.
    QuotedPuzzle,
    /// Addressed us with nothing to ask.
    EmptyMention,
    /// Addressed us with a question that was answered.
    Answered,
    /// Offered to ambient participation.
    Ambient { sent: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str, mentions: Vec<UserId>) -> IncomingMessage {
        IncomingMessage {
            id: MessageId(1),
            channel_id: ChannelId(2),
            author: Author { id: UserId(3), display_name: "taro".into(), is_bot: false },
            content: content.into(),
            mentions,
            referenced_message_id: None,
            timestamp: Utc::now(),
        }
    }

    fn identity() -> Identity {
        Identity { user_id: UserId(99), name: "nadeko".into() }
    }

    #[test]
    fn strips_both_address_forms() {
        let id = identity();
        assert_eq!(id.strip_address("<@99> 今日の天気は？"), "今日の天気は？");
        assert_eq!(id.strip_address("  <@!99>  "), "");
        assert_eq!(id.strip_address("<@99><@!99> hi"), "hi");
    }

    #[test]
    fn other_mentions_are_kept() {
        assert_eq!(identity().strip_address("<@99> ask <@5>"), "ask <@5>");
    }

    #[test]
    fn addressed_by_mention_list_or_token() {
        let id = identity();
        assert!(id.is_addressed_by(&message("hello", vec![UserId(99)])));
        assert!(id.is_addressed_by(&message("<@!99> hello", vec![])));
        assert!(!id.is_addressed_by(&message("hello <@5>", vec![UserId(5)])));
    }

    #[test]
    fn snowflakes_parse_and_display() {
        let id: MessageId = "968900402072387675".parse().unwrap();
        assert_eq!(id, MessageId(968900402072387675));
        assert_eq!(UserId(7).mention(), "<@7>");
        assert!("abc".parse::<ChannelId>().is_err());
    }

    #[test]
    fn turn_renders_speaker_line() {
        let turn = ConversationTurn { speaker: "taro".into(), text: "こんにちは".into() };
        assert_eq!(turn.to_string(), "taro: こんにちは");
    }
}
