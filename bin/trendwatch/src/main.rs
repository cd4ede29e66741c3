use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    Config, CurrentPriceProvider, DataSource, NotificationSink, PriceSeriesProvider, StoreKind,
};
use engine::{BinanceFeed, Collaborators, LogSink, Supervisor, SupervisorConfig, TradeStore};
use paper::PaperFeed;
use store::{JsonFileTradeStore, SqliteTradeStore};
use strategy::SignalFileConfig;
use telegram_notify::TelegramSink;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let signals = SignalFileConfig::load(&cfg.signal_config_path);
    info!(
        data_source = ?cfg.data_source,
        store = ?cfg.store_kind,
        symbols = signals.scan.symbols.len(),
        "Trendwatch starting"
    );

    // ── Market data ───────────────────────────────────────────────────────────
    let (series, prices): (Arc<dyn PriceSeriesProvider>, Arc<dyn CurrentPriceProvider>) =
        match cfg.data_source {
            DataSource::Binance => {
                let timeout = Duration::from_secs(signals.fetch.timeout_secs);
                let feed = Arc::new(
                    BinanceFeed::new(timeout)
                        .unwrap_or_else(|e| panic!("Failed to build Binance client: {e}")),
                );
                (feed.clone() as Arc<dyn PriceSeriesProvider>, feed as Arc<dyn CurrentPriceProvider>)
            }
            DataSource::Paper => {
                let feed = Arc::new(
                    PaperFeed::from_file(&cfg.paper_feed_path)
                        .await
                        .unwrap_or_else(|e| {
                            panic!("Failed to load paper feed '{}': {e}", cfg.paper_feed_path)
                        }),
                );
                (feed.clone() as Arc<dyn PriceSeriesProvider>, feed as Arc<dyn CurrentPriceProvider>)
            }
        };

    // ── Trade store ───────────────────────────────────────────────────────────
    let trade_store: Arc<dyn TradeStore> = match cfg.store_kind {
        StoreKind::Sqlite => Arc::new(
            SqliteTradeStore::connect(&cfg.database_url)
                .await
                .unwrap_or_else(|e| panic!("Failed to open trade database: {e}")),
        ),
        StoreKind::Json => Arc::new(JsonFileTradeStore::new(&cfg.trade_store_path)),
    };

    // ── Notifications ─────────────────────────────────────────────────────────
    let audiences = cfg.audiences();
    let sink: Arc<dyn NotificationSink> = match &cfg.telegram_token {
        Some(token) => Arc::new(TelegramSink::new(token.clone())),
        None => {
            info!("TELEGRAM_TOKEN not set, events are only logged");
            Arc::new(LogSink)
        }
    };
    if audiences.is_empty() {
        warn!("No NOTIFY_USER_IDS or NOTIFY_GROUP_IDS configured, nobody will be notified");
    }

    // ── Supervisor ────────────────────────────────────────────────────────────
    let sup_cfg = SupervisorConfig {
        audiences,
        ..SupervisorConfig::from_file(&signals)
    };
    let (mut supervisor, handle) = Supervisor::new(
        sup_cfg,
        Collaborators {
            series,
            prices,
            sink,
            store: trade_store,
        },
    );
    let restored = supervisor
        .restore()
        .await
        .unwrap_or_else(|e| panic!("Failed to restore trades, refusing to start: {e}"));
    info!(restored, "Trade collection loaded");

    let task = tokio::spawn(supervisor.run());
    info!("Supervisor running. Waiting for shutdown signal.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received, finishing current tick");
    handle.shutdown().await;
    if let Err(e) = task.await {
        error!(error = %e, "Supervisor task ended abnormally");
    }

    let stats = handle.statistics().await;
    info!(
        total = stats.total_trades,
        active = stats.active_trades,
        win_rate = stats.win_rate,
        total_pips = stats.total_pips,
        "Trendwatch stopped"
    );
}
