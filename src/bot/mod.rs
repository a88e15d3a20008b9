mod intake;
mod mock;
mod snapshot;
mod supervisor;
mod telegram;
mod transport;
mod types;

pub use intake::{parse_application_form, IntakeHandler};
pub use mock::MockMessageBus;
pub use snapshot::{ConnectionHealthSnapshot, ConnectionState};
pub use supervisor::ConnectionSupervisor;
pub use telegram::TelegramBotApi;
pub use transport::{MessageBus, MessageHandler};
pub use types::{BotIdentity, InboundMessage, Update};
