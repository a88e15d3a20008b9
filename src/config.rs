use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApplybotConfig {
    pub bot: BotConfig,
    pub reconnect: ReconnectConfig,
    pub health: HealthConfig,
    pub application: ApplicationConfig,
    pub store: StoreConfig,
    pub mirror: MirrorConfig,
    pub admin: AdminConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BotConfig {
    /// Telegram bot token
    #[serde(default)]
    pub token: String,

    /// Bot API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Long-poll timeout passed to getUpdates, in seconds
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,

    /// Timeout for non-polling Bot API requests, in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Chat that receives new-application notifications
    pub admin_chat_id: Option<i64>,

    /// Invite link sent to approved applicants
    pub approved_chat_link: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for the reconnect delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthConfig {
    /// Inactivity after which a disconnected bot is reported as a warning
    #[serde(default = "default_stale_after_seconds")]
    pub stale_after_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApplicationConfig {
    /// Content fields a submission must carry
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,

    /// Allow overwriting the status of an already decided application
    #[serde(default = "default_allow_redecide")]
    pub allow_redecide: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Storage backend
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// JSON file used by the file backend
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MirrorConfig {
    /// Mirror status changes to the spreadsheet webhook
    #[serde(default = "default_mirror_enabled")]
    pub enabled: bool,

    /// Spreadsheet webhook URL
    pub endpoint: Option<String>,

    /// Request timeout for mirror writes, in seconds
    #[serde(default = "default_mirror_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Pending mirror jobs before new ones are dropped
    #[serde(default = "default_mirror_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdminConfig {
    /// IP address to bind to
    #[serde(default = "default_admin_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Per-component stop timeout, in seconds
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

impl BotConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl ApplybotConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("applybot.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("bot.token", "")?
            .set_default("bot.api_base_url", default_api_base_url())?
            .set_default("bot.poll_timeout_seconds", default_poll_timeout_seconds() as i64)?
            .set_default(
                "bot.request_timeout_seconds",
                default_request_timeout_seconds() as i64,
            )?
            .set_default("reconnect.base_delay_ms", default_base_delay_ms() as i64)?
            .set_default("reconnect.max_delay_ms", default_max_delay_ms() as i64)?
            .set_default(
                "health.stale_after_seconds",
                default_stale_after_seconds() as i64,
            )?
            .set_default("application.required_fields", default_required_fields())?
            .set_default("application.allow_redecide", default_allow_redecide())?
            .set_default("store.backend", "file")?
            .set_default("store.path", default_store_path())?
            .set_default("mirror.enabled", default_mirror_enabled())?
            .set_default(
                "mirror.timeout_seconds",
                default_mirror_timeout_seconds() as i64,
            )?
            .set_default(
                "mirror.queue_capacity",
                default_mirror_queue_capacity() as i64,
            )?
            .set_default("admin.ip", default_admin_ip())?
            .set_default("admin.port", default_admin_port())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.shutdown_timeout_seconds",
                default_shutdown_timeout_seconds() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. APPLYBOT_BOT__TOKEN
            .add_source(
                Environment::with_prefix("APPLYBOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            // Deployment variables of the hosted bot take precedence
            .set_override_option("bot.token", env_var("TELEGRAM_BOT_TOKEN"))?
            .set_override_option("bot.admin_chat_id", env_var("ADMIN_TELEGRAM_ID"))?
            .set_override_option("bot.approved_chat_link", env_var("APPROVED_CHAT_LINK"))?
            .set_override_option("admin.port", env_var("PORT"))?
            .set_override_option("store.path", env_var("DATABASE_PATH"))?
            .build()?;

        let config: ApplybotConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config.redacted());

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.token.trim().is_empty() {
            return Err(ConfigError::Message(
                "Bot token is not set (bot.token or TELEGRAM_BOT_TOKEN)".to_string(),
            ));
        }

        if self.bot.poll_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Bot poll_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Message(
                "Reconnect base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ConfigError::Message(
                "Reconnect max_delay_ms must not be less than base_delay_ms".to_string(),
            ));
        }

        if self.application.required_fields.is_empty() {
            return Err(ConfigError::Message(
                "At least one required application field must be configured".to_string(),
            ));
        }

        if self.mirror.enabled && self.mirror.endpoint.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Message(
                "Mirror is enabled but mirror.endpoint is not set".to_string(),
            ));
        }

        if self.mirror.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Mirror queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Optional settings that are unset, with what the bot loses without them
    pub fn missing_optional_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bot.admin_chat_id.is_none() {
            missing.push("ADMIN_TELEGRAM_ID (bot.admin_chat_id) is not set, new applications will not be announced");
        }
        if self
            .bot
            .approved_chat_link
            .as_deref()
            .map_or(true, |link| link.trim().is_empty())
        {
            missing.push("APPROVED_CHAT_LINK (bot.approved_chat_link) is not set, approval messages will not include an invite");
        }
        missing
    }

    /// Copy of the configuration safe to log
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.bot.token.is_empty() {
            copy.bot.token = "***".to_string();
        }
        copy
    }
}

impl Default for ApplybotConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                token: String::new(),
                api_base_url: default_api_base_url(),
                poll_timeout_seconds: default_poll_timeout_seconds(),
                request_timeout_seconds: default_request_timeout_seconds(),
                admin_chat_id: None,
                approved_chat_link: None,
            },
            reconnect: ReconnectConfig {
                base_delay_ms: default_base_delay_ms(),
                max_delay_ms: default_max_delay_ms(),
            },
            health: HealthConfig {
                stale_after_seconds: default_stale_after_seconds(),
            },
            application: ApplicationConfig {
                required_fields: default_required_fields(),
                allow_redecide: default_allow_redecide(),
            },
            store: StoreConfig {
                backend: default_store_backend(),
                path: default_store_path(),
            },
            mirror: MirrorConfig {
                enabled: default_mirror_enabled(),
                endpoint: None,
                timeout_seconds: default_mirror_timeout_seconds(),
                queue_capacity: default_mirror_queue_capacity(),
            },
            admin: AdminConfig {
                ip: default_admin_ip(),
                port: default_admin_port(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
            },
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

// Default value functions
fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_poll_timeout_seconds() -> u64 {
    30
}
fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_stale_after_seconds() -> u64 {
    600
}

fn default_required_fields() -> Vec<String> {
    vec!["name".to_string(), "contact".to_string(), "about".to_string()]
}
fn default_allow_redecide() -> bool {
    false
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::File
}
fn default_store_path() -> String {
    "./applications.json".to_string()
}

fn default_mirror_enabled() -> bool {
    false
}
fn default_mirror_timeout_seconds() -> u64 {
    10
}
fn default_mirror_queue_capacity() -> usize {
    256
}

fn default_admin_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_admin_port() -> u16 {
    3000
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_shutdown_timeout_seconds() -> u64 {
    10
}
