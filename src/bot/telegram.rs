use super::transport::MessageBus;
use super::types::{BotIdentity, InboundMessage, Update};
use crate::application::SubmitterIdentity;
use crate::config::BotConfig;
use crate::error::ConnectionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Telegram Bot API client over HTTPS long polling
pub struct TelegramBotApi {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    request_timeout: Duration,
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Deserialize)]
struct RawUser {
    id: i64,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Deserialize)]
struct RawMessage {
    message_id: i64,
    from: Option<RawUser>,
    chat: RawChat,
    date: i64,
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
}

#[derive(Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

impl RawUpdate {
    fn into_update(self) -> Update {
        let update_id = self.update_id;
        let message = self.message.and_then(|raw| {
            // Channel posts carry no sender and are not applications
            let from = raw.from?;
            Some(InboundMessage {
                update_id,
                message_id: raw.message_id,
                chat_id: raw.chat.id,
                from: SubmitterIdentity {
                    user_id: from.id,
                    chat_id: raw.chat.id,
                    username: from.username,
                    first_name: from.first_name,
                    last_name: from.last_name,
                },
                text: raw.text,
                date: DateTime::<Utc>::from_timestamp(raw.date, 0).unwrap_or_else(Utc::now),
            })
        });

        Update { update_id, message }
    }
}

impl TelegramBotApi {
    pub fn new(config: &BotConfig) -> Result<Self, ConnectionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("applybot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConnectionError::Transport {
                details: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<B, T>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, ConnectionError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        trace!("Bot API call: {}", method);

        let response = self
            .http_client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let raw = response.bytes().await.map_err(map_transport_error)?;
        let envelope: Option<Envelope<T>> = serde_json::from_slice(&raw).ok();

        match envelope {
            Some(Envelope {
                ok: true,
                result: Some(result),
                ..
            }) if status.is_success() => Ok(result),
            Some(envelope) => {
                let code = envelope.error_code.unwrap_or(status.as_u16());
                let description = envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string());
                Err(map_api_error(code, description))
            }
            None if !status.is_success() => Err(map_api_error(
                status.as_u16(),
                status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            )),
            None => Err(ConnectionError::MalformedResponse {
                details: format!("{} returned an unreadable body", method),
            }),
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> ConnectionError {
    if error.is_timeout() {
        ConnectionError::Timeout
    } else {
        // Strip the URL, it carries the token
        ConnectionError::Transport {
            details: error.without_url().to_string(),
        }
    }
}

fn map_api_error(code: u16, description: String) -> ConnectionError {
    match StatusCode::from_u16(code).ok() {
        Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::NOT_FOUND) => {
            ConnectionError::InvalidCredential {
                details: description,
            }
        }
        Some(StatusCode::CONFLICT) => ConnectionError::Conflict {
            details: description,
        },
        _ => ConnectionError::Api { code, description },
    }
}

#[async_trait]
impl MessageBus for TelegramBotApi {
    async fn connect(&self) -> Result<BotIdentity, ConnectionError> {
        let me: RawUser = self
            .call("getMe", &serde_json::json!({}), self.request_timeout)
            .await?;

        Ok(BotIdentity {
            id: me.id,
            username: me.username,
        })
    }

    async fn poll(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, ConnectionError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message"],
        };

        let raw: Vec<RawUpdate> = self
            .call("getUpdates", &request, timeout + self.request_timeout)
            .await?;

        if !raw.is_empty() {
            debug!("Received {} updates", raw.len());
        }

        Ok(raw.into_iter().map(RawUpdate::into_update).collect())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ConnectionError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessageRequest { chat_id, text },
                self.request_timeout,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_classification() {
        assert!(matches!(
            map_api_error(401, "Unauthorized".into()),
            ConnectionError::InvalidCredential { .. }
        ));
        assert!(matches!(
            map_api_error(404, "Not Found".into()),
            ConnectionError::InvalidCredential { .. }
        ));
        assert!(matches!(
            map_api_error(409, "terminated by other getUpdates request".into()),
            ConnectionError::Conflict { .. }
        ));
        assert!(matches!(
            map_api_error(502, "Bad Gateway".into()),
            ConnectionError::Api { code: 502, .. }
        ));
    }

    #[test]
    fn test_update_parsing() {
        let body = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 100,
                    "message": {
                        "message_id": 7,
                        "from": {"id": 42, "is_bot": false, "first_name": "Ann", "username": "ann"},
                        "chat": {"id": 4200, "type": "private"},
                        "date": 1700000000,
                        "text": "Name: Ann"
                    }
                },
                {
                    "update_id": 101,
                    "message": {
                        "message_id": 8,
                        "chat": {"id": -5, "type": "channel"},
                        "date": 1700000001
                    }
                },
                {"update_id": 102}
            ]
        }"#;

        let envelope: Envelope<Vec<RawUpdate>> = serde_json::from_str(body).unwrap();
        assert!(envelope.ok);
        let updates: Vec<Update> = envelope
            .result
            .unwrap()
            .into_iter()
            .map(RawUpdate::into_update)
            .collect();

        assert_eq!(updates.len(), 3);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat_id, 4200);
        assert_eq!(message.from.user_id, 42);
        assert_eq!(message.from.username.as_deref(), Some("ann"));
        assert_eq!(message.text.as_deref(), Some("Name: Ann"));
        assert_eq!(message.date.timestamp(), 1_700_000_000);
        assert!(updates[1].message.is_none());
        assert!(updates[2].message.is_none());
    }

    #[test]
    fn test_method_url() {
        let mut config = crate::config::ApplybotConfig::default().bot;
        config.token = "123:abc".to_string();
        config.api_base_url = "https://api.telegram.org/".to_string();
        let api = TelegramBotApi::new(&config).unwrap();
        assert_eq!(
            api.method_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }
}
