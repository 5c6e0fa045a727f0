use crate::types::{InboundMessage, MessageId, OutboundMessage};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel identifier, e.g. "telegram".
    fn channel_id(&self) -> &str;

    /// Start receiving messages. Push to tx for each inbound message.
    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()>;

    /// Send a message to a specific user/chat on this platform.
    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()>;

    /// Replace the content (and buttons) of a message this adapter sent earlier.
    async fn edit(
        &self,
        _recipient_id: &str,
        _message_id: &MessageId,
        _message: OutboundMessage,
    ) -> Result<()> {
        Err(anyhow::anyhow!("edit is not supported by this channel"))
    }

    /// Tell the platform a button press was handled.
    async fn acknowledge_action(&self, _action_token: &str) -> Result<()> {
        Ok(())
    }

    /// Send typing state updates where supported.
    async fn send_typing(&self, _recipient_id: &str) -> Result<()> {
        Err(anyhow::anyhow!(
            "send_typing is not supported by this channel"
        ))
    }

    fn supports_actions(&self) -> bool {
        false
    }

    fn supports_typing_events(&self) -> bool {
        false
    }
}
