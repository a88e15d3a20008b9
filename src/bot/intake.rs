use super::transport::{MessageBus, MessageHandler};
use super::types::InboundMessage;
use crate::application::{normalize_field_name, ApplicationContent, WorkflowCoordinator};
use crate::error::ApplybotError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Turns chat messages into application submissions and replies to the sender
pub struct IntakeHandler {
    coordinator: Arc<WorkflowCoordinator>,
    bus: Arc<dyn MessageBus>,
}

impl IntakeHandler {
    pub fn new(coordinator: Arc<WorkflowCoordinator>, bus: Arc<dyn MessageBus>) -> Self {
        Self { coordinator, bus }
    }

    fn form_template(&self) -> String {
        let mut text = String::from(
            "To apply, send one message with each field on its own line:\n\n",
        );
        for field in self.coordinator.required_fields() {
            text.push_str(&format!("{}: ...\n", display_field(field)));
        }
        text
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.bus.send_message(chat_id, text).await {
            warn!("Failed to reply to chat {}: {}", chat_id, e);
        }
    }

    async fn submit(&self, message: &InboundMessage, text: &str) -> String {
        let content = parse_application_form(text);

        match self
            .coordinator
            .submit(content, message.from.clone())
            .await
        {
            Ok(id) => format!(
                "Thank you! Your application has been received.\nReference: {}",
                id
            ),
            Err(ApplybotError::Validation { missing }) => {
                let fields: Vec<String> = missing.iter().map(|f| display_field(f)).collect();
                format!(
                    "Your application is missing: {}\n\n{}",
                    fields.join(", "),
                    self.form_template()
                )
            }
            Err(e) => {
                error!(
                    "Failed to submit application from chat {}: {}",
                    message.chat_id, e
                );
                "Sorry, we could not save your application. Please try again later."
                    .to_string()
            }
        }
    }
}

#[async_trait]
impl MessageHandler for IntakeHandler {
    async fn handle(&self, message: InboundMessage) {
        let Some(text) = message.text.as_deref().map(str::trim) else {
            debug!("Ignoring non-text message {}", message.message_id);
            return;
        };

        let command = text
            .split_whitespace()
            .next()
            .map(|word| word.split('@').next().unwrap_or(word));

        let reply = match command {
            Some("/start") | Some("/help") => self.form_template(),
            _ if text.is_empty() => return,
            _ => self.submit(&message, text).await,
        };

        self.reply(message.chat_id, &reply).await;
    }
}

fn display_field(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

/// Parse `Field: value` lines. Any other line, including one whose colon
/// belongs to a URL or a sentence, continues the previous field's value;
/// text before the first field is ignored.
pub fn parse_application_form(text: &str) -> ApplicationContent {
    let mut content = ApplicationContent::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(':') {
            Some((key, value)) if is_field_label(key, value) => {
                let key = normalize_field_name(key);
                content.insert(key.clone(), value.trim().to_string());
                current = Some(key);
            }
            _ => {
                if let Some(value) = current.as_ref().and_then(|key| content.get_mut(key)) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(line);
                }
            }
        }
    }

    content
}

const MAX_LABEL_WORDS: usize = 4;

/// A field label is a short run of words and never the scheme of a URL
fn is_field_label(key: &str, value: &str) -> bool {
    let key = key.trim();
    !key.is_empty()
        && !value.starts_with("//")
        && key.split_whitespace().count() <= MAX_LABEL_WORDS
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c.is_whitespace() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_form() {
        let content = parse_application_form("Name: Jane Doe\nContact: @jane\nAbout: Hi");
        assert_eq!(content.get("name").map(String::as_str), Some("Jane Doe"));
        assert_eq!(content.get("contact").map(String::as_str), Some("@jane"));
        assert_eq!(content.get("about").map(String::as_str), Some("Hi"));
    }

    #[test]
    fn test_parse_multiline_value() {
        let content = parse_application_form(
            "Hello!\nName: Jane\nAbout: First line\nsecond line\n\nContact Info: https://x.y",
        );
        assert_eq!(content.len(), 3);
        assert_eq!(
            content.get("about").map(String::as_str),
            Some("First line\nsecond line")
        );
        assert_eq!(
            content.get("contact_info").map(String::as_str),
            Some("https://x.y")
        );
    }

    #[test]
    fn test_value_may_contain_colons() {
        let content = parse_application_form("Contact: https://example.com:8080");
        assert_eq!(
            content.get("contact").map(String::as_str),
            Some("https://example.com:8080")
        );
    }

    #[test]
    fn test_url_line_continues_previous_field() {
        let content = parse_application_form(
            "Name: Jane\nAbout: my blog\nhttps://blog.example.com\nContact: @jane",
        );
        assert_eq!(content.len(), 3);
        assert_eq!(
            content.get("about").map(String::as_str),
            Some("my blog\nhttps://blog.example.com")
        );
        assert!(!content.contains_key("https"));
    }

    #[test]
    fn test_sentence_with_colon_continues_previous_field() {
        let content = parse_application_form(
            "About: I run a few projects\nthe one I care about most is this one: a parser",
        );
        assert_eq!(content.len(), 1);
        assert_eq!(
            content.get("about").map(String::as_str),
            Some("I run a few projects\nthe one I care about most is this one: a parser")
        );
    }

    #[test]
    fn test_display_field() {
        assert_eq!(display_field("name"), "Name");
        assert_eq!(display_field("contact_info"), "Contact info");
    }
}
