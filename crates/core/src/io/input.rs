use tokio::sync::mpsc;

use crate::types::IncomingMessage;

/// Input channel sender. Transports push inbound messages here.
pub type InputSender = mpsc::Sender<IncomingMessage>;
/// Input channel receiver, drained by the runtime.
pub type InputReceiver = mpsc::Receiver<IncomingMessage>;

/// Create an input channel with the given buffer size.
pub fn channel(buffer: usize) -> (InputSender, InputReceiver) {
    mpsc::channel(buffer)
}

/// Submit an inbound message to the runtime.
pub async fn submit(
    tx: &InputSender,
    message: IncomingMessage,
) -> Result<(), mpsc::error::SendError<IncomingMessage>> {
    tx.send(message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Author, ChannelId, MessageId, UserId};

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            id: MessageId(1),
            channel_id: ChannelId(1),
            author: Author { id: UserId(1), display_name: "taro".into(), is_bot: false },
            content: content.into(),
            mentions: vec![],
            referenced_message_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn submit_delivers_message() {
        let (tx, mut rx) = channel(4);
        submit(&tx, message("hello")).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.content, "hello");
    }

    #[tokio::test]
    async fn channel_respects_buffer() {
        let (tx, _rx) = channel(2);
        tx.send(message("a")).await.unwrap();
        tx.send(message("b")).await.unwrap();
        // Third send would block; use try_send to verify
        assert!(tx.try_send(message("c")).is_err());
    }

    #[tokio::test]
    async fn submit_fails_when_runtime_gone() {
        let (tx, rx) = channel(1);
        drop(rx);
        assert!(submit(&tx, message("late")).await.is_err());
    }
}
