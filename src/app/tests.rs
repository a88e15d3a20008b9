use super::*;
use crate::application::{ApplicationStatus, SubmitterIdentity};
use crate::bot::MockMessageBus;
use crate::config::{ApplybotConfig, StoreBackend};
use crate::error::{ApplybotError, ConnectionError};
use crate::health::HealthState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const ADMIN_CHAT: i64 = -1000;

fn create_test_config() -> ApplybotConfig {
    let mut config = ApplybotConfig::default();
    config.bot.token = "123:test".to_string();
    config.bot.admin_chat_id = Some(ADMIN_CHAT);
    config.bot.approved_chat_link = Some("https://t.me/+members".to_string());
    config.bot.poll_timeout_seconds = 1;
    config.reconnect.base_delay_ms = 1;
    config.reconnect.max_delay_ms = 4;
    config.store.backend = StoreBackend::Memory;
    config.system.shutdown_timeout_seconds = 2;
    config
}

async fn create_orchestrator(bus: Arc<MockMessageBus>) -> ApplybotOrchestrator {
    let mut orchestrator = ApplybotOrchestrator::with_bus(create_test_config(), bus)
        .await
        .unwrap();
    orchestrator.set_admin_enabled(false);
    orchestrator
}

fn applicant() -> SubmitterIdentity {
    SubmitterIdentity {
        user_id: 77,
        chat_id: 770,
        username: Some("applicant".to_string()),
        first_name: Some("Alex".to_string()),
        last_name: None,
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let orchestrator = create_orchestrator(Arc::new(MockMessageBus::new())).await;
    assert!(orchestrator.get_all_component_states().is_empty());
}

#[tokio::test]
async fn test_component_state_management() {
    let mut orchestrator = create_orchestrator(Arc::new(MockMessageBus::new())).await;
    orchestrator.initialize().unwrap();

    let states = orchestrator.get_all_component_states();
    assert_eq!(states.len(), 3);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
    assert_eq!(orchestrator.get_component_state("admin"), None);

    orchestrator.set_component_state("supervisor", ComponentState::Running);
    assert_eq!(
        orchestrator.get_component_state("supervisor"),
        Some(ComponentState::Running)
    );
}

#[tokio::test]
async fn test_submission_and_decision_flow() {
    let bus = Arc::new(MockMessageBus::new());
    let mut orchestrator = create_orchestrator(bus.clone()).await;
    orchestrator.initialize().unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        orchestrator.get_component_state("supervisor"),
        Some(ComponentState::Running)
    );
    assert_eq!(orchestrator.health_reporter().report().status, HealthState::Ok);

    bus.push_text_message(applicant(), "/start");
    bus.push_text_message(
        applicant(),
        "Name: Alex Example\nContact: @applicant\nAbout: Met the team at a meetup",
    );

    let coordinator = orchestrator.coordinator();
    // Template reply, confirmation reply, admin announcement
    wait_for(|| bus.sent_messages().len() >= 3).await;

    let applications = coordinator.list().await.unwrap();
    assert_eq!(applications.len(), 1);
    let application = &applications[0];
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.submitter.chat_id, 770);

    let sent = bus.sent_messages();
    assert!(sent
        .iter()
        .any(|(chat, text)| *chat == 770 && text.contains("Name: ...")));
    assert!(sent
        .iter()
        .any(|(chat, text)| *chat == 770 && text.contains(&application.id)));
    assert!(sent
        .iter()
        .any(|(chat, text)| *chat == ADMIN_CHAT && text.contains("Alex Example")));

    coordinator
        .decide(&application.id, "approved", None)
        .await
        .unwrap();
    wait_for(|| {
        bus.sent_messages()
            .iter()
            .any(|(chat, text)| *chat == 770 && text.contains("https://t.me/+members"))
    })
    .await;

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert_eq!(
        orchestrator.get_component_state("supervisor"),
        Some(ComponentState::Stopped)
    );
    assert_eq!(
        orchestrator.get_component_state("mirror"),
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_incomplete_submission_lists_missing_fields() {
    let bus = Arc::new(MockMessageBus::new());
    let mut orchestrator = create_orchestrator(bus.clone()).await;
    orchestrator.initialize().unwrap();
    orchestrator.start().await.unwrap();

    bus.push_text_message(applicant(), "Name: Alex");
    wait_for(|| !bus.sent_messages().is_empty()).await;

    let (chat, text) = &bus.sent_messages()[0];
    assert_eq!(*chat, 770);
    assert!(text.contains("missing: Contact, About"));
    assert!(orchestrator.coordinator().list().await.unwrap().is_empty());

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_credential_fails_start() {
    let bus = Arc::new(MockMessageBus::new());
    bus.push_connect_error(ConnectionError::InvalidCredential {
        details: "Unauthorized".to_string(),
    });
    let mut orchestrator = create_orchestrator(bus).await;
    orchestrator.initialize().unwrap();

    let result = orchestrator.start().await;
    assert!(matches!(result, Err(ApplybotError::Connection(_))));
    assert_eq!(
        orchestrator.get_component_state("supervisor"),
        Some(ComponentState::Failed)
    );
}

#[tokio::test]
async fn test_run_exits_on_user_request() {
    let bus = Arc::new(MockMessageBus::new());
    let mut orchestrator = create_orchestrator(bus).await;
    orchestrator.initialize().unwrap();
    orchestrator.start().await.unwrap();

    assert!(orchestrator.request_shutdown(ShutdownReason::UserRequest));
    assert!(!orchestrator.request_shutdown(ShutdownReason::UserRequest));

    let exit_code = timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_fatal_connection_error_ends_run() {
    let bus = Arc::new(MockMessageBus::new());
    let mut orchestrator = create_orchestrator(bus.clone()).await;
    orchestrator.initialize().unwrap();
    orchestrator.start().await.unwrap();

    bus.push_poll_error(ConnectionError::InvalidCredential {
        details: "token revoked".to_string(),
    });

    let exit_code = timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 1);
}

#[cfg(feature = "admin_panel")]
#[tokio::test]
async fn test_start_fails_when_admin_port_is_taken() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut config = create_test_config();
    config.admin.ip = "127.0.0.1".to_string();
    config.admin.port = port;

    let bus = Arc::new(MockMessageBus::new());
    let mut orchestrator = ApplybotOrchestrator::with_bus(config, bus).await.unwrap();
    orchestrator.initialize().unwrap();

    let result = orchestrator.start().await;
    assert!(matches!(result, Err(ApplybotError::Component { .. })));
    assert_eq!(
        orchestrator.get_component_state("admin"),
        Some(ComponentState::Failed)
    );

    orchestrator.shutdown().await.unwrap();
}

#[cfg(feature = "admin_panel")]
#[tokio::test]
async fn test_admin_server_serves_after_start() {
    let mut config = create_test_config();
    config.admin.ip = "127.0.0.1".to_string();
    config.admin.port = {
        let free = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        free.local_addr().unwrap().port()
    };
    let address = format!("127.0.0.1:{}", config.admin.port);

    let bus = Arc::new(MockMessageBus::new());
    let mut orchestrator = ApplybotOrchestrator::with_bus(config, bus).await.unwrap();
    orchestrator.initialize().unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        orchestrator.get_component_state("admin"),
        Some(ComponentState::Running)
    );
    assert!(tokio::net::TcpStream::connect(&address).await.is_ok());

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert_eq!(
        orchestrator.get_component_state("admin"),
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_decision_reaches_applicant_despite_event_bus_overflow() {
    let bus = Arc::new(MockMessageBus::new());
    bus.set_send_delay(Duration::from_millis(50));

    let mut config = create_test_config();
    config.system.event_bus_capacity = 4;
    let mut orchestrator = ApplybotOrchestrator::with_bus(config, bus.clone())
        .await
        .unwrap();
    orchestrator.set_admin_enabled(false);
    orchestrator.initialize().unwrap();
    orchestrator.start().await.unwrap();

    let coordinator = orchestrator.coordinator();
    let mut content = crate::application::ApplicationContent::new();
    content.insert("name".to_string(), "Alex".to_string());
    content.insert("contact".to_string(), "@alex".to_string());
    content.insert("about".to_string(), "Hello".to_string());
    let id = coordinator.submit(content, applicant()).await.unwrap();
    coordinator.decide(&id, "rejected", None).await.unwrap();

    for _ in 0..10 {
        bus.push_text_message(applicant(), "/help");
    }

    wait_for(|| {
        bus.sent_messages()
            .iter()
            .any(|(chat, text)| *chat == 770 && text.contains("not been approved"))
    })
    .await;

    orchestrator.shutdown().await.unwrap();
}
