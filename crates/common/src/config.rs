use crate::Audience;

/// Where price series and quotes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Binance,
    Paper,
}

/// Which trade store backs the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Json,
}

/// Process configuration loaded from environment variables at startup.
/// Malformed values cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Market data
    pub data_source: DataSource,
    pub paper_feed_path: String,

    // Trade store
    pub store_kind: StoreKind,
    pub database_url: String,
    pub trade_store_path: String,

    // Telegram (optional: events are only logged without a token)
    pub telegram_token: Option<String>,
    pub notify_user_ids: Vec<i64>,
    pub notify_group_ids: Vec<i64>,

    // Signal / supervisor parameters file
    pub signal_config_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let data_source = match optional_env("DATA_SOURCE")
            .unwrap_or_else(|| "binance".to_string())
            .to_lowercase()
            .as_str()
        {
            "binance" => DataSource::Binance,
            "paper" => DataSource::Paper,
            other => panic!("ERROR: DATA_SOURCE must be 'binance' or 'paper', got: '{other}'"),
        };

        let store_kind = match optional_env("TRADE_STORE")
            .unwrap_or_else(|| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => StoreKind::Sqlite,
            "json" => StoreKind::Json,
            other => panic!("ERROR: TRADE_STORE must be 'sqlite' or 'json', got: '{other}'"),
        };

        Config {
            data_source,
            paper_feed_path: optional_env("PAPER_FEED_PATH")
                .unwrap_or_else(|| "config/paper_feed.json".to_string()),
            store_kind,
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://trades.db?mode=rwc".to_string()),
            trade_store_path: optional_env("TRADE_STORE_PATH")
                .unwrap_or_else(|| "active_trades.json".to_string()),
            telegram_token: optional_env("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty()),
            notify_user_ids: id_list("NOTIFY_USER_IDS"),
            notify_group_ids: id_list("NOTIFY_GROUP_IDS"),
            signal_config_path: optional_env("SIGNAL_CONFIG_PATH")
                .unwrap_or_else(|| "config/signals.toml".to_string()),
        }
    }

    /// Every configured recipient, users first.
    pub fn audiences(&self) -> Vec<Audience> {
        self.notify_user_ids
            .iter()
            .map(|&id| Audience::User(id))
            .chain(self.notify_group_ids.iter().map(|&id| Audience::Group(id)))
            .collect()
    }
}

fn id_list(key: &str) -> Vec<i64> {
    optional_env(key)
        .map(|raw| parse_id_list(key, &raw))
        .unwrap_or_default()
}

fn parse_id_list(key: &str, raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .unwrap_or_else(|_| panic!("{key} contains non-numeric ID: '{s}'"))
        })
        .collect()
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
