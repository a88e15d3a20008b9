use super::types::{BotIdentity, InboundMessage, Update};
use crate::error::ConnectionError;
use async_trait::async_trait;
use std::time::Duration;

/// Long-poll chat message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Verify the credential and open a session
    async fn connect(&self) -> Result<BotIdentity, ConnectionError>;

    /// Wait up to `timeout` for updates after `offset`
    async fn poll(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, ConnectionError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ConnectionError>;
}

/// Receives messages from the supervisor's dispatch worker, one at a time
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage);
}
