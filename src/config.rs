//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Options controlling message caching and auto-deletion.
#[derive(Debug, Clone)]
pub struct DeleterOptions {
    /// Minimum gap between the last queued message and a new one that
    /// forces the queue to be flushed first.
    pub message_delay: Duration,
    /// Queue length above which the queue is flushed before the next append.
    pub max_queue_length: usize,
    /// Start the auto-deleter when the deleter is constructed.
    pub perform_auto_deletion: bool,
    /// Base interval between auto-deleter runs (scaled by the multiplier).
    pub collection_interval: Duration,
}

impl Default for DeleterOptions {
    fn default() -> Self {
        Self {
            message_delay: Duration::from_secs(180),
            max_queue_length: 15,
            perform_auto_deletion: true,
            collection_interval: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// Order in which a session pops its queued inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOrder {
    /// Oldest input first.
    #[default]
    Fifo,
    /// Most recent input first.
    Lifo,
}

/// Dialog engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub queue_order: QueueOrder,
    /// Transitions allowed on one input before it is dropped.
    pub max_steps_per_input: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_order: QueueOrder::default(),
            max_steps_per_input: 64,
        }
    }
}

/// Bot configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// The bot's own chat id, stamped on outgoing messages.
    pub bot_id: String,
    /// Directory holding `users.json` and `globals.json`.
    pub data_dir: PathBuf,
    /// User ids allowed to talk to the bot. `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Queue handled command messages for deletion.
    pub delete_commands: bool,
    /// Evict sessions idle for longer than this. `None` keeps them forever.
    pub session_idle_timeout: Option<Duration>,
    pub engine: EngineConfig,
    pub deleter: DeleterOptions,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_id: "panel-bot@c.us".to_string(),
            data_dir: PathBuf::from("./data"),
            allowed_users: vec!["*".to_string()],
            delete_commands: false,
            session_idle_timeout: None,
            engine: EngineConfig::default(),
            deleter: DeleterOptions::default(),
        }
    }
}

impl BotConfig {
    /// Build config from `PANEL_BOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bot_id = std::env::var("PANEL_BOT_ID").unwrap_or(defaults.bot_id);

        let data_dir = std::env::var("PANEL_BOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let allowed_users = parse_list(
            &std::env::var("PANEL_BOT_ALLOWED_USERS").unwrap_or_else(|_| "*".to_string()),
        );

        let delete_commands = env_parse("PANEL_BOT_DELETE_COMMANDS")?.unwrap_or(false);

        let session_idle_timeout =
            env_parse::<u64>("PANEL_BOT_SESSION_IDLE_SECS")?.map(Duration::from_secs);

        let deleter = DeleterOptions {
            message_delay: env_parse::<u64>("PANEL_BOT_MESSAGE_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.deleter.message_delay),
            max_queue_length: env_parse("PANEL_BOT_MAX_QUEUE_LENGTH")?
                .unwrap_or(defaults.deleter.max_queue_length),
            perform_auto_deletion: env_parse("PANEL_BOT_AUTO_DELETE")?
                .unwrap_or(defaults.deleter.perform_auto_deletion),
            collection_interval: env_parse::<u64>("PANEL_BOT_COLLECTION_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.deleter.collection_interval),
        };

        if deleter.collection_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PANEL_BOT_COLLECTION_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            bot_id,
            data_dir,
            allowed_users,
            delete_commands,
            session_idle_timeout,
            engine: EngineConfig::default(),
            deleter,
        })
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn globals_path(&self) -> PathBuf {
        self.data_dir.join("globals.json")
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Read and parse an optional environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
