use crate::application::ApplicationStatus;
use crate::bot::MessageBus;
use crate::config::BotConfig;
use crate::events::ApplybotEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sender half of the notifier queue, held by the workflow coordinator
pub type NotificationSender = mpsc::UnboundedSender<ApplybotEvent>;

/// Sends chat notifications for application events: a summary to the admin
/// chat on submission and the outcome to the applicant on decision.
///
/// Events arrive on a dedicated queue rather than the shared event bus, so a
/// burst of unrelated bus traffic never drops a notification.
pub struct Notifier {
    bus: Arc<dyn MessageBus>,
    receiver: mpsc::UnboundedReceiver<ApplybotEvent>,
    admin_chat_id: Option<i64>,
    approved_chat_link: Option<String>,
}

impl Notifier {
    pub fn new(bus: Arc<dyn MessageBus>, config: &BotConfig) -> (Self, NotificationSender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let notifier = Self {
            bus,
            receiver,
            admin_chat_id: config.admin_chat_id,
            approved_chat_link: config
                .approved_chat_link
                .clone()
                .filter(|link| !link.trim().is_empty()),
        };
        (notifier, sender)
    }

    /// Spawn the notification task. Events queued before this call are
    /// delivered too.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Notifier started");

        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event).await;
        }

        debug!("Notifier stopped");
    }

    async fn handle_event(&self, event: ApplybotEvent) {
        match event {
            ApplybotEvent::ApplicationSubmitted {
                application_id,
                summary,
                ..
            } => {
                if let Some(admin_chat_id) = self.admin_chat_id {
                    let text = format!(
                        "New application {}\n\n{}",
                        application_id, summary
                    );
                    self.send(admin_chat_id, &text).await;
                }
            }
            ApplybotEvent::ApplicationDecided {
                chat_id,
                status,
                admin_notes,
                ..
            } => {
                if let Some(text) = self.decision_message(status, admin_notes.as_deref()) {
                    self.send(chat_id, &text).await;
                }
            }
            _ => {}
        }
    }

    fn decision_message(&self, status: ApplicationStatus, notes: Option<&str>) -> Option<String> {
        let mut text = match status {
            ApplicationStatus::Approved => {
                let mut text = String::from("Your application has been approved!");
                if let Some(link) = &self.approved_chat_link {
                    text.push_str(&format!("\nJoin us here: {}", link));
                }
                text
            }
            ApplicationStatus::Rejected => {
                String::from("Unfortunately, your application has not been approved.")
            }
            ApplicationStatus::Pending => return None,
        };

        if let Some(notes) = notes {
            text.push_str(&format!("\n\nNote from the admins: {}", notes));
        }

        Some(text)
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.bus.send_message(chat_id, text).await {
            warn!("Failed to notify chat {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{
        ApplicationContent, DisabledMirror, MemoryApplicationStore, MirrorDispatcher, SpreadsheetMirror,
        SubmitterIdentity, WorkflowCoordinator,
    };
    use crate::bot::MockMessageBus;
    use crate::config::ApplybotConfig;
    use crate::events::EventBus;
    use std::time::{Duration, Instant};

    fn bot_config(admin_chat_id: Option<i64>, link: Option<&str>) -> BotConfig {
        let mut config = ApplybotConfig::default().bot;
        config.admin_chat_id = admin_chat_id;
        config.approved_chat_link = link.map(str::to_string);
        config
    }

    async fn wait_for_sent(bus: &MockMessageBus, count: usize) -> Vec<(i64, String)> {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let sent = bus.sent_messages();
            if sent.len() >= count {
                return sent;
            }
            assert!(Instant::now() < deadline, "expected {} messages", count);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn decided(chat_id: i64, status: ApplicationStatus) -> ApplybotEvent {
        ApplybotEvent::ApplicationDecided {
            application_id: format!("app-{}", chat_id),
            chat_id,
            status,
            admin_notes: None,
        }
    }

    #[tokio::test]
    async fn test_submission_is_announced_to_admin() {
        let bus = Arc::new(MockMessageBus::new());
        let (notifier, notifications) = Notifier::new(bus.clone(), &bot_config(Some(-100), None));
        notifier.start();

        notifications
            .send(ApplybotEvent::ApplicationSubmitted {
                application_id: "app-1".to_string(),
                chat_id: 55,
                summary: "name: Jane".to_string(),
            })
            .unwrap();

        let sent = wait_for_sent(&bus, 1).await;
        assert_eq!(sent[0].0, -100);
        assert!(sent[0].1.contains("app-1"));
        assert!(sent[0].1.contains("name: Jane"));
    }

    #[tokio::test]
    async fn test_approval_includes_invite_link() {
        let bus = Arc::new(MockMessageBus::new());
        let (notifier, notifications) =
            Notifier::new(bus.clone(), &bot_config(None, Some("https://t.me/+invite")));
        notifier.start();

        notifications
            .send(ApplybotEvent::ApplicationDecided {
                application_id: "app-1".to_string(),
                chat_id: 55,
                status: ApplicationStatus::Approved,
                admin_notes: Some("Welcome".to_string()),
            })
            .unwrap();

        let sent = wait_for_sent(&bus, 1).await;
        assert_eq!(sent[0].0, 55);
        assert!(sent[0].1.contains("approved"));
        assert!(sent[0].1.contains("https://t.me/+invite"));
        assert!(sent[0].1.contains("Welcome"));
    }

    #[tokio::test]
    async fn test_send_failure_does_not_stop_notifier() {
        let bus = Arc::new(MockMessageBus::new());
        let (notifier, notifications) = Notifier::new(bus.clone(), &bot_config(None, None));
        let task = notifier.start();

        bus.fail_sends(true);
        notifications
            .send(decided(1, ApplicationStatus::Rejected))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        bus.fail_sends(false);
        notifications
            .send(decided(2, ApplicationStatus::Rejected))
            .unwrap();

        let sent = wait_for_sent(&bus, 1).await;
        assert_eq!(sent[0].0, 2);
        assert!(sent[0].1.contains("not been approved"));
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn test_slow_sends_do_not_lose_decisions_during_message_burst() {
        let bus = Arc::new(MockMessageBus::new());
        bus.set_send_delay(Duration::from_millis(100));

        let event_bus = Arc::new(EventBus::new(4));
        let mirror: Arc<dyn SpreadsheetMirror> = Arc::new(DisabledMirror);
        let dispatcher = Arc::new(MirrorDispatcher::start(mirror, Arc::clone(&event_bus), 8));
        let (notifier, notifications) = Notifier::new(bus.clone(), &bot_config(Some(-100), None));
        let coordinator = WorkflowCoordinator::new(
            &ApplybotConfig::default().application,
            Arc::new(MemoryApplicationStore::new()),
            dispatcher,
            Arc::clone(&event_bus),
        )
        .with_notifications(notifications);
        notifier.start();

        let mut content = ApplicationContent::new();
        content.insert("name".to_string(), "Sam".to_string());
        content.insert("contact".to_string(), "@sam".to_string());
        content.insert("about".to_string(), "Hello".to_string());
        let submitter = SubmitterIdentity {
            user_id: 5,
            chat_id: 55,
            username: None,
            first_name: Some("Sam".to_string()),
            last_name: None,
        };

        let id = coordinator.submit(content, submitter).await.unwrap();
        coordinator.decide(&id, "approved", None).await.unwrap();

        // Overflow the shared bus while the admin announcement is in flight
        for update_id in 0..20 {
            let _ = event_bus.publish(ApplybotEvent::MessageReceived {
                chat_id: 99,
                update_id,
                timestamp: std::time::SystemTime::now(),
            });
        }

        let sent = wait_for_sent(&bus, 2).await;
        assert_eq!(sent[0].0, -100);
        assert_eq!(sent[1].0, 55);
        assert!(sent[1].1.contains("approved"));
    }
}
