use super::transport::MessageBus;
use super::types::{BotIdentity, InboundMessage, Update};
use crate::application::SubmitterIdentity;
use crate::error::ConnectionError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Scriptable message bus for testing without a network.
///
/// Connect and poll results are consumed in the order they were pushed. With
/// nothing scripted, `connect` succeeds and `poll` idles briefly and returns
/// an empty batch, like a quiet long-poll.
pub struct MockMessageBus {
    connect_results: Mutex<VecDeque<Result<BotIdentity, ConnectionError>>>,
    poll_results: Mutex<VecDeque<Result<Vec<Update>, ConnectionError>>>,
    sent: Mutex<Vec<(i64, String)>>,
    offsets: Mutex<Vec<Option<i64>>>,
    connect_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    next_update_id: AtomicI64,
    fail_sends: AtomicBool,
    send_delay: Mutex<Duration>,
    idle_poll: Duration,
}

impl Default for MockMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessageBus {
    pub fn new() -> Self {
        Self {
            connect_results: Mutex::new(VecDeque::new()),
            poll_results: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            offsets: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            next_update_id: AtomicI64::new(1),
            fail_sends: AtomicBool::new(false),
            send_delay: Mutex::new(Duration::ZERO),
            idle_poll: Duration::from_millis(10),
        }
    }

    pub fn identity() -> BotIdentity {
        BotIdentity {
            id: 1,
            username: Some("mock_bot".to_string()),
        }
    }

    pub fn push_connect_result(&self, result: Result<BotIdentity, ConnectionError>) {
        self.connect_results.lock().push_back(result);
    }

    pub fn push_connect_error(&self, error: ConnectionError) {
        self.push_connect_result(Err(error));
    }

    pub fn push_poll_result(&self, result: Result<Vec<Update>, ConnectionError>) {
        self.poll_results.lock().push_back(result);
    }

    pub fn push_poll_error(&self, error: ConnectionError) {
        self.push_poll_result(Err(error));
    }

    /// Queue a single text message from `from` as the next poll batch
    pub fn push_text_message(&self, from: SubmitterIdentity, text: &str) -> i64 {
        let update_id = self.next_update_id.fetch_add(1, Ordering::SeqCst);
        let message = InboundMessage {
            update_id,
            message_id: update_id,
            chat_id: from.chat_id,
            from,
            text: Some(text.to_string()),
            date: Utc::now(),
        };

        self.push_poll_result(Ok(vec![Update {
            update_id,
            message: Some(message),
        }]));
        update_id
    }

    /// Make every `send_message` fail with a transport error
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Delay every `send_message` by `delay`, like a slow Bot API
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    pub fn sent_messages(&self) -> Vec<(i64, String)> {
        self.sent.lock().clone()
    }

    /// Offsets passed to `poll`, in call order
    pub fn polled_offsets(&self) -> Vec<Option<i64>> {
        self.offsets.lock().clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for MockMessageBus {
    async fn connect(&self) -> Result<BotIdentity, ConnectionError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.connect_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::identity()))
    }

    async fn poll(
        &self,
        offset: Option<i64>,
        _timeout: Duration,
    ) -> Result<Vec<Update>, ConnectionError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().push(offset);

        let scripted = self.poll_results.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                tokio::time::sleep(self.idle_poll).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ConnectionError> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport {
                details: "mock send failure".to_string(),
            });
        }

        debug!("Mock message to {}: {}", chat_id, text);
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }
}
