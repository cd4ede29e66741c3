use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use common::{
    Audience, CurrentPriceProvider, Error, NotificationSink, PriceSeriesProvider, Result,
    Timeframe, TradeEvent,
};
use levels::LevelCalculator;
use strategy::{ConsensusEngine, SignalFileConfig, TimeframeAnalyzer};

use crate::notify::dispatch;
use crate::scanner::{Candidate, SignalScanner};
use crate::{RetryPolicy, TradeLifecycle, TradeStatistics, TradeStore};

/// Runtime parameters of the supervisor loop.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub tick_interval: Duration,
    pub auto_discovery: bool,
    /// Trades that may be created per UTC calendar day.
    pub max_daily_trades: usize,
    pub min_confidence: f64,
    pub trailing_stop: bool,
    pub max_concurrent_fetches: usize,
    /// Symbols scanned for new trades.
    pub candidates: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub fetch_policy: RetryPolicy,
    pub persist_policy: RetryPolicy,
    pub audiences: Vec<Audience>,
    pub analyzer: TimeframeAnalyzer,
    pub consensus: ConsensusEngine,
    pub levels: LevelCalculator,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_file(&SignalFileConfig::default())
    }
}

impl SupervisorConfig {
    pub fn from_file(file: &SignalFileConfig) -> Self {
        let fetch_policy = RetryPolicy {
            max_attempts: file.fetch.max_attempts,
            timeout: Duration::from_secs(file.fetch.timeout_secs),
            initial_backoff: Duration::from_millis(file.fetch.backoff_ms),
            max_backoff: Duration::from_millis(file.fetch.max_backoff_ms),
        };
        Self {
            tick_interval: Duration::from_secs(file.supervisor.tick_interval_secs.max(1)),
            auto_discovery: file.supervisor.auto_discovery,
            max_daily_trades: file.supervisor.max_daily_trades,
            min_confidence: file.supervisor.min_confidence,
            trailing_stop: file.supervisor.trailing_stop,
            max_concurrent_fetches: file.supervisor.max_concurrent_fetches.max(1),
            candidates: file.scan.symbols.clone(),
            timeframes: file.scan.timeframes.clone(),
            persist_policy: fetch_policy.clone(),
            fetch_policy,
            audiences: Vec::new(),
            analyzer: file.consensus.analyzer(),
            consensus: file.consensus.engine(),
            levels: LevelCalculator::default(),
        }
    }
}

/// External collaborators the supervisor talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub series: Arc<dyn PriceSeriesProvider>,
    pub prices: Arc<dyn CurrentPriceProvider>,
    pub sink: Arc<dyn NotificationSink>,
    pub store: Arc<dyn TradeStore>,
}

/// Summary of one supervisor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Open trades evaluated against a fresh price.
    pub monitored: usize,
    /// Open trades left untouched because their price could not be fetched.
    pub skipped: usize,
    pub events: usize,
    pub scanned: usize,
    pub opened: usize,
    pub cap_reached: bool,
    /// Changes are still waiting to be written to the store.
    pub unsaved: bool,
}

#[derive(Debug)]
pub enum SupervisorCommand {
    EnableDiscovery,
    DisableDiscovery,
    CloseTrade {
        trade_id: String,
        reply: oneshot::Sender<Result<TradeLifecycle>>,
    },
    Tick {
        reply: oneshot::Sender<TickReport>,
    },
    Shutdown,
}

/// Cloneable handle for talking to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    command_tx: mpsc::Sender<SupervisorCommand>,
    trades: Arc<RwLock<Vec<TradeLifecycle>>>,
    discovery: Arc<AtomicBool>,
}

impl SupervisorHandle {
    pub async fn send(&self, cmd: SupervisorCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn enable_discovery(&self) {
        self.send(SupervisorCommand::EnableDiscovery).await;
    }

    pub async fn disable_discovery(&self) {
        self.send(SupervisorCommand::DisableDiscovery).await;
    }

    pub fn discovery_enabled(&self) -> bool {
        self.discovery.load(Ordering::SeqCst)
    }

    pub async fn close_trade(&self, trade_id: impl Into<String>) -> Result<TradeLifecycle> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorCommand::CloseTrade {
            trade_id: trade_id.into(),
            reply,
        })
        .await;
        rx.await.map_err(|_| stopped())?
    }

    /// Run a tick now instead of waiting for the interval.
    pub async fn tick(&self) -> Result<TickReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SupervisorCommand::Tick { reply }).await;
        rx.await.map_err(|_| stopped())
    }

    /// Ask the loop to stop after the current tick.
    pub async fn shutdown(&self) {
        self.send(SupervisorCommand::Shutdown).await;
    }

    /// Snapshot of every trade as of the last committed change.
    pub async fn trades(&self) -> Vec<TradeLifecycle> {
        self.trades.read().await.clone()
    }

    pub async fn open_trades(&self) -> Vec<TradeLifecycle> {
        self.trades
            .read()
            .await
            .iter()
            .filter(|t| t.is_open())
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> TradeStatistics {
        TradeStatistics::from_trades(&self.trades.read().await)
    }
}

fn stopped() -> Error {
    Error::Other("supervisor is not running".into())
}

/// Single owner of the trade collection.
///
/// Every tick monitors open trades, then (when discovery is on) scans the
/// candidates for new ones, and persists the collection if anything changed.
/// Provider calls run concurrently; all mutation happens here, one trade at
/// a time.
pub struct Supervisor {
    config: SupervisorConfig,
    collab: Collaborators,
    scanner: Arc<SignalScanner>,
    trades: Vec<TradeLifecycle>,
    snapshot: Arc<RwLock<Vec<TradeLifecycle>>>,
    discovery: Arc<AtomicBool>,
    /// Collection differs from what the store last accepted.
    dirty: bool,
    /// Cleared while the stored collection could not be read back, so a
    /// save never replaces trades that were never loaded.
    writable: bool,
    command_rx: mpsc::Receiver<SupervisorCommand>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, collab: Collaborators) -> (Self, SupervisorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let snapshot = Arc::new(RwLock::new(Vec::new()));
        let discovery = Arc::new(AtomicBool::new(config.auto_discovery));

        let scanner = Arc::new(SignalScanner::new(
            collab.series.clone(),
            collab.prices.clone(),
            config.analyzer.clone(),
            config.consensus.clone(),
            config.levels.clone(),
            config.timeframes.clone(),
            config.min_confidence,
            config.fetch_policy.clone(),
        ));

        let handle = SupervisorHandle {
            command_tx,
            trades: snapshot.clone(),
            discovery: discovery.clone(),
        };

        let supervisor = Supervisor {
            config,
            collab,
            scanner,
            trades: Vec::new(),
            snapshot,
            discovery,
            dirty: false,
            writable: true,
            command_rx,
        };

        (supervisor, handle)
    }

    /// Load previously persisted trades. Call once before `run`.
    ///
    /// On failure nothing is persisted until a later `restore` succeeds.
    pub async fn restore(&mut self) -> Result<usize> {
        self.writable = false;
        self.trades = self.collab.store.load_all().await?;
        self.writable = true;
        let open = self.trades.iter().filter(|t| t.is_open()).count();
        info!(total = self.trades.len(), open, "Trades restored");
        self.publish_snapshot().await;
        Ok(self.trades.len())
    }

    pub fn trades(&self) -> &[TradeLifecycle] {
        &self.trades
    }

    /// Drive the loop until a shutdown command arrives or every handle is
    /// dropped. Shutdown is only observed between ticks. Call from
    /// `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            interval = ?self.config.tick_interval,
            candidates = self.config.candidates.len(),
            discovery = self.discovery.load(Ordering::SeqCst),
            "Supervisor started"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    debug!(?report, "Tick complete");
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(SupervisorCommand::Shutdown) => {
                        info!("Supervisor shutting down");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        warn!("Supervisor command channel closed, shutting down");
                        break;
                    }
                },
            }
        }

        if self.dirty && !self.persist().await {
            error!("Exiting with unsaved trade changes");
        }
    }

    /// One monitoring and discovery pass.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        self.monitor(&mut report).await;
        if self.discovery.load(Ordering::SeqCst) {
            self.discover(&mut report).await;
        }
        if self.dirty {
            self.commit().await;
        }

        report.unsaved = self.dirty;
        report
    }

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::EnableDiscovery => {
                self.discovery.store(true, Ordering::SeqCst);
                info!("Auto-discovery enabled");
            }
            SupervisorCommand::DisableDiscovery => {
                self.discovery.store(false, Ordering::SeqCst);
                info!("Auto-discovery disabled");
            }
            SupervisorCommand::CloseTrade { trade_id, reply } => {
                let result = self.close_trade(&trade_id).await;
                let _ = reply.send(result);
            }
            SupervisorCommand::Tick { reply } => {
                let report = self.tick().await;
                let _ = reply.send(report);
            }
            // Handled by the run loop.
            SupervisorCommand::Shutdown => {}
        }
    }

    /// Close a trade at the current price on operator request.
    pub async fn close_trade(&mut self, trade_id: &str) -> Result<TradeLifecycle> {
        let idx = self
            .trades
            .iter()
            .position(|t| t.id == trade_id)
            .ok_or_else(|| Error::TradeNotFound(trade_id.to_string()))?;
        if !self.trades[idx].is_open() {
            return Err(Error::TradeClosed(trade_id.to_string()));
        }

        let symbol = self.trades[idx].symbol.clone();
        let prices = &self.collab.prices;
        let price = self
            .config
            .fetch_policy
            .run("latest price", || prices.latest(&symbol))
            .await?;

        let event = self.trades[idx].close_manually(price, Utc::now())?;
        self.dirty = true;
        self.emit(&event);
        self.commit().await;
        Ok(self.trades[idx].clone())
    }

    async fn monitor(&mut self, report: &mut TickReport) {
        let open: Vec<(usize, String)> = self
            .trades
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_open())
            .map(|(i, t)| (i, t.symbol.clone()))
            .collect();
        if open.is_empty() {
            return;
        }

        let prices = self.collab.prices.clone();
        let policy = self.config.fetch_policy.clone();
        let mut quotes: Vec<(usize, Result<f64>)> = stream::iter(open)
            .map(move |(idx, symbol)| {
                let prices = prices.clone();
                let policy = policy.clone();
                async move {
                    let quote = policy.run("latest price", || prices.latest(&symbol)).await;
                    (idx, quote)
                }
            })
            .buffer_unordered(self.config.max_concurrent_fetches)
            .collect()
            .await;
        quotes.sort_by_key(|(idx, _)| *idx);

        for (idx, quote) in quotes {
            let trade = &mut self.trades[idx];
            let price = match quote {
                Ok(price) => price,
                Err(e) => {
                    warn!(
                        trade_id = %trade.id,
                        symbol = %trade.symbol,
                        error = %e,
                        "Price unavailable, trade left unchanged this tick"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            report.monitored += 1;
            let transition = trade.on_price(price, self.config.trailing_stop, Utc::now());
            if transition.is_noop() {
                continue;
            }
            self.dirty = true;
            report.events += transition.events.len();
            for event in &transition.events {
                self.emit(event);
            }
        }
    }

    async fn discover(&mut self, report: &mut TickReport) {
        let today = Utc::now().date_naive();
        let mut created_today = self.created_on(today);
        if created_today >= self.config.max_daily_trades {
            info!(
                created_today,
                cap = self.config.max_daily_trades,
                "Daily trade cap reached, discovery skipped"
            );
            report.cap_reached = true;
            return;
        }

        let busy: HashSet<&str> = self
            .trades
            .iter()
            .filter(|t| t.is_open())
            .map(|t| t.symbol.as_str())
            .collect();
        let symbols: Vec<String> = self
            .config
            .candidates
            .iter()
            .filter(|s| !busy.contains(s.as_str()))
            .cloned()
            .collect();
        if symbols.is_empty() {
            return;
        }

        let scanner = self.scanner.clone();
        let mut results: Vec<(usize, String, Result<Option<Candidate>>)> =
            stream::iter(symbols.into_iter().enumerate())
                .map(move |(order, symbol)| {
                    let scanner = scanner.clone();
                    async move {
                        let result = scanner.scan(&symbol).await;
                        (order, symbol, result)
                    }
                })
                .buffer_unordered(self.config.max_concurrent_fetches)
                .collect()
                .await;
        results.sort_by_key(|(order, _, _)| *order);

        for (_, symbol, result) in results {
            report.scanned += 1;
            let candidate = match result {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Scan failed");
                    continue;
                }
            };

            if created_today >= self.config.max_daily_trades {
                info!(symbol = %symbol, "Daily trade cap reached, signal dropped");
                report.cap_reached = true;
                break;
            }
            if self.has_open_trade(&symbol) {
                continue;
            }

            let now = Utc::now();
            let mut trade = TradeLifecycle::open(
                &symbol,
                candidate.plan.clone(),
                candidate.consensus.confidence,
                now,
            );
            while self.trades.iter().any(|t| t.id == trade.id) {
                trade.id = TradeLifecycle::new_id(&symbol, now);
            }
            info!(
                trade_id = %trade.id,
                symbol = %symbol,
                direction = %trade.direction,
                confidence = trade.confidence,
                entry = trade.plan.entry_zone_1,
                stop = trade.stop_loss,
                "Trade opened"
            );
            let event = TradeEvent::SignalGenerated {
                trade_id: trade.id.clone(),
                symbol: symbol.clone(),
                consensus: candidate.consensus,
                plan: candidate.plan,
            };
            self.trades.push(trade);
            self.dirty = true;
            created_today += 1;
            report.opened += 1;
            report.events += 1;
            self.emit(&event);
        }
    }

    fn created_on(&self, day: NaiveDate) -> usize {
        self.trades
            .iter()
            .filter(|t| t.created_at.date_naive() == day)
            .count()
    }

    fn has_open_trade(&self, symbol: &str) -> bool {
        self.trades.iter().any(|t| t.is_open() && t.symbol == symbol)
    }

    fn emit(&self, event: &TradeEvent) {
        debug!(trade_id = event.trade_id(), event = ?event, "Publishing event");
        dispatch(&self.collab.sink, &self.config.audiences, event);
    }

    /// Publish the snapshot and try to persist. A failed save leaves the
    /// collection dirty for the next tick.
    async fn commit(&mut self) {
        self.publish_snapshot().await;
        self.persist().await;
    }

    async fn publish_snapshot(&self) {
        *self.snapshot.write().await = self.trades.clone();
    }

    async fn persist(&mut self) -> bool {
        if !self.writable {
            warn!(
                trades = self.trades.len(),
                "Stored trades were never restored, refusing to overwrite them"
            );
            return false;
        }
        let store = &self.collab.store;
        let trades = &self.trades;
        let saved = self
            .config
            .persist_policy
            .run("save trades", || store.save_all(trades))
            .await;

        match saved {
            Ok(()) => {
                self.dirty = false;
                debug!(trades = self.trades.len(), "Trades persisted");
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    trades = self.trades.len(),
                    "Failed to persist trades, will retry next tick"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::{CloseReason, Direction, PricePlan, TargetLevel, TradeStatus};
    use paper::{synthetic_candles, PaperFeed, RecordingSink};

    use crate::MemoryTradeStore;

    struct Harness {
        feed: Arc<PaperFeed>,
        sink: Arc<RecordingSink>,
        store: Arc<MemoryTradeStore>,
    }

    impl Harness {
        fn new(store: MemoryTradeStore) -> Self {
            Self {
                feed: Arc::new(PaperFeed::new()),
                sink: Arc::new(RecordingSink::new()),
                store: Arc::new(store),
            }
        }

        fn supervisor(&self, config: SupervisorConfig) -> (Supervisor, SupervisorHandle) {
            Supervisor::new(
                config,
                Collaborators {
                    series: self.feed.clone(),
                    prices: self.feed.clone(),
                    sink: self.sink.clone(),
                    store: self.store.clone(),
                },
            )
        }
    }

    fn config(candidates: &[&str]) -> SupervisorConfig {
        let mut config = SupervisorConfig {
            tick_interval: Duration::from_secs(3600),
            auto_discovery: true,
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
            timeframes: vec![Timeframe::M15, Timeframe::M30],
            fetch_policy: RetryPolicy::once(Duration::from_secs(1)),
            persist_policy: RetryPolicy::once(Duration::from_secs(1)),
            audiences: vec![Audience::User(7)],
            ..SupervisorConfig::default()
        };
        // Strength tops out at 50, so the stock threshold never votes.
        config.consensus.vote_threshold = 40;
        config
    }

    /// 41 closes drifting up with pullbacks: price above both averages,
    /// RSI around 54, so strength 50 and trend up.
    fn choppy_uptrend() -> Vec<f64> {
        let steps = [1.0, 1.0, -1.5];
        let mut closes = vec![100.0];
        for i in 0..40 {
            closes.push(closes[i] + steps[i % 3]);
        }
        closes
    }

    async fn seed_uptrend(feed: &PaperFeed, symbol: &str) {
        let closes = choppy_uptrend();
        for tf in [Timeframe::M15, Timeframe::M30] {
            feed.set_series(symbol, tf, synthetic_candles(&closes, tf, Utc::now()))
                .await;
        }
        feed.set_price(symbol, 107.5).await;
    }

    fn buy_trade(symbol: &str) -> TradeLifecycle {
        let plan =
            PricePlan::new(Direction::Buy, 101.0, [100.0, 95.0], 90.0, [110.0, 120.0, 130.0], 1.0);
        TradeLifecycle::open(symbol, plan, 90.0, Utc::now())
    }

    #[tokio::test]
    async fn discovery_opens_trade_and_notifies() {
        let h = Harness::new(MemoryTradeStore::new());
        seed_uptrend(&h.feed, "XAUUSD").await;
        let (mut sup, handle) = h.supervisor(config(&["XAUUSD"]));

        let report = sup.tick().await;
        assert_eq!(report.opened, 1);
        assert!(!report.unsaved);

        let trades = handle.trades().await;
        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.status, TradeStatus::Pending);
        assert_eq!(trade.direction, Direction::Buy);
        assert_eq!(trade.confidence, 95.0);
        // Gold: 20 pips of 0.1 at strength 50.
        assert!((trade.plan.entry_zone_1 - 106.9).abs() < 1e-9);
        assert!((trade.stop_loss - 103.5).abs() < 1e-9);

        assert_eq!(h.store.stored().await, trades);
        let published = h.sink.wait_for(1).await;
        assert!(matches!(
            &published[0],
            (Audience::User(7), TradeEvent::SignalGenerated { symbol, .. }) if symbol == "XAUUSD"
        ));
    }

    #[tokio::test]
    async fn one_open_trade_per_symbol() {
        let h = Harness::new(MemoryTradeStore::new());
        seed_uptrend(&h.feed, "XAUUSD").await;
        let (mut sup, _handle) = h.supervisor(config(&["XAUUSD"]));

        assert_eq!(sup.tick().await.opened, 1);
        let second = sup.tick().await;
        assert_eq!(second.opened, 0);
        assert_eq!(second.monitored, 1);
        assert_eq!(sup.trades().len(), 1);
        assert_eq!(sup.trades()[0].status, TradeStatus::Active);
    }

    #[tokio::test]
    async fn daily_cap_counts_trades_created_today() {
        let mut closed_today = buy_trade("EURUSD");
        closed_today.close_manually(100.0, Utc::now()).unwrap();
        let mut yesterday = buy_trade("GBPUSD");
        yesterday.created_at = Utc::now() - ChronoDuration::days(1);
        yesterday.close_manually(100.0, Utc::now()).unwrap();

        let h = Harness::new(MemoryTradeStore::with_trades(vec![closed_today, yesterday]));
        for symbol in ["XAUUSD", "XAGUSD", "^GSPC"] {
            seed_uptrend(&h.feed, symbol).await;
        }
        let mut cfg = config(&["XAUUSD", "XAGUSD", "^GSPC"]);
        cfg.max_daily_trades = 2;
        let (mut sup, _handle) = h.supervisor(cfg);
        sup.restore().await.unwrap();

        let report = sup.tick().await;
        assert_eq!(report.opened, 1);
        assert!(report.cap_reached);
        let opened: Vec<_> = sup.trades().iter().filter(|t| t.is_open()).collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].symbol, "XAUUSD");

        let report = sup.tick().await;
        assert_eq!(report.opened, 0);
        assert!(report.cap_reached);
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn monitoring_applies_targets_and_trailing() {
        let trade = buy_trade("EURUSD");
        let id = trade.id.clone();
        let h = Harness::new(MemoryTradeStore::with_trades(vec![trade]));
        h.feed.set_price("EURUSD", 121.0).await;
        let mut cfg = config(&[]);
        cfg.auto_discovery = false;
        let (mut sup, handle) = h.supervisor(cfg);
        sup.restore().await.unwrap();

        let report = sup.tick().await;
        assert_eq!(report.monitored, 1);
        assert_eq!(report.events, 2);

        let stored = h.store.stored().await;
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].status, TradeStatus::Active);
        assert_eq!(stored[0].stop_loss, 105.0);
        assert!(stored[0].triggered.contains(&TargetLevel::T2));
        assert_eq!(handle.trades().await, stored);

        let published = h.sink.wait_for(2).await;
        assert!(published
            .iter()
            .all(|(_, e)| matches!(e, TradeEvent::TargetHit { .. })));

        // Quiet tick: nothing written.
        h.feed.set_price("EURUSD", 112.0).await;
        let saves = h.store.save_count();
        let report = sup.tick().await;
        assert_eq!(report.events, 0);
        assert_eq!(h.store.save_count(), saves);
    }

    #[tokio::test]
    async fn failed_price_fetch_skips_only_that_trade() {
        let h = Harness::new(MemoryTradeStore::with_trades(vec![
            buy_trade("EURUSD"),
            buy_trade("GBPUSD"),
        ]));
        h.feed.set_price("EURUSD", 85.0).await;
        h.feed.set_price("GBPUSD", 101.0).await;
        h.feed.fail_symbol("GBPUSD").await;
        let mut cfg = config(&[]);
        cfg.auto_discovery = false;
        let (mut sup, _handle) = h.supervisor(cfg);
        sup.restore().await.unwrap();

        let report = sup.tick().await;
        assert_eq!(report.monitored, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(sup.trades()[0].close_reason, Some(CloseReason::StopLoss));
        assert_eq!(sup.trades()[1].status, TradeStatus::Pending);
    }

    #[tokio::test]
    async fn failed_save_is_retried_next_tick() {
        let h = Harness::new(MemoryTradeStore::with_trades(vec![buy_trade("EURUSD")]));
        h.feed.set_price("EURUSD", 111.0).await;
        let mut cfg = config(&[]);
        cfg.auto_discovery = false;
        let (mut sup, _handle) = h.supervisor(cfg);
        sup.restore().await.unwrap();

        h.store.fail_next_saves(1);
        let report = sup.tick().await;
        assert!(report.unsaved);
        assert!(h.store.stored().await[0].triggered.is_empty());

        // Same price, no new transition, but the pending change is written.
        let report = sup.tick().await;
        assert!(!report.unsaved);
        assert_eq!(h.store.stored().await, sup.trades().to_vec());
        assert_eq!(h.store.stored().await[0].stop_loss, 100.0);
    }

    #[tokio::test]
    async fn stop_out_and_reopen_in_one_tick_get_distinct_ids() {
        let h = Harness::new(MemoryTradeStore::new());
        seed_uptrend(&h.feed, "XAUUSD").await;
        let (mut sup, handle) = h.supervisor(config(&["XAUUSD"]));

        assert_eq!(sup.tick().await.opened, 1);
        let first = sup.trades()[0].id.clone();

        h.feed.set_price("XAUUSD", 50.0).await;
        let report = sup.tick().await;
        assert_eq!(report.opened, 1);
        assert!(!report.unsaved);

        let trades = sup.trades().to_vec();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, first);
        assert_eq!(trades[0].close_reason, Some(CloseReason::StopLoss));
        assert_eq!(trades[1].status, TradeStatus::Pending);
        assert_ne!(trades[0].id, trades[1].id);

        let second = trades[1].id.clone();
        let task = tokio::spawn(sup.run());
        let closed = handle.close_trade(&second).await.unwrap();
        assert_eq!(closed.id, second);
        assert_eq!(closed.close_reason, Some(CloseReason::Manual));
        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_restore_never_overwrites_store() {
        let existing = buy_trade("EURUSD");
        let h = Harness::new(MemoryTradeStore::with_trades(vec![existing.clone()]));
        seed_uptrend(&h.feed, "XAUUSD").await;
        h.feed.set_price("EURUSD", 101.0).await;
        let (mut sup, _handle) = h.supervisor(config(&["XAUUSD"]));

        h.store.fail_next_loads(1);
        assert!(sup.restore().await.is_err());
        let report = sup.tick().await;
        assert_eq!(report.opened, 1);
        assert!(report.unsaved);
        assert_eq!(h.store.save_count(), 0);
        assert_eq!(h.store.stored().await, vec![existing]);

        assert_eq!(sup.restore().await.unwrap(), 1);
        let report = sup.tick().await;
        assert!(!report.unsaved);
        assert_eq!(h.store.stored().await, sup.trades().to_vec());
        assert_eq!(sup.trades().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_unsaved_changes() {
        let h = Harness::new(MemoryTradeStore::with_trades(vec![buy_trade("EURUSD")]));
        h.feed.set_price("EURUSD", 111.0).await;
        let mut cfg = config(&[]);
        cfg.auto_discovery = false;
        let (mut sup, handle) = h.supervisor(cfg);
        sup.restore().await.unwrap();
        let task = tokio::spawn(sup.run());

        // Target 1 is taken by whichever tick runs first.
        handle.tick().await.unwrap();
        assert_eq!(h.store.stored().await[0].stop_loss, 100.0);

        h.feed.set_price("EURUSD", 121.0).await;
        h.store.fail_next_saves(1);
        let report = handle.tick().await.unwrap();
        assert!(report.unsaved);
        assert_eq!(h.store.stored().await[0].stop_loss, 100.0);

        handle.shutdown().await;
        task.await.unwrap();
        let stored = h.store.stored().await;
        assert_eq!(stored[0].stop_loss, 105.0);
        assert!(stored[0].triggered.contains(&TargetLevel::T2));
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_ticks() {
        let h = Harness::new(MemoryTradeStore::new());
        h.sink.set_failing(true);
        seed_uptrend(&h.feed, "XAUUSD").await;
        let (mut sup, _handle) = h.supervisor(config(&["XAUUSD"]));

        let report = tokio::time::timeout(Duration::from_secs(5), sup.tick())
            .await
            .unwrap();
        assert_eq!(report.opened, 1);
        assert_eq!(report.events, 1);
        assert!(!report.unsaved);
        assert_eq!(h.store.stored().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn handle_drives_running_supervisor() {
        let trade = buy_trade("EURUSD");
        let id = trade.id.clone();
        let h = Harness::new(MemoryTradeStore::with_trades(vec![trade]));
        h.feed.set_price("EURUSD", 104.0).await;
        let mut cfg = config(&[]);
        cfg.auto_discovery = false;
        let (mut sup, handle) = h.supervisor(cfg);
        sup.restore().await.unwrap();
        let task = tokio::spawn(sup.run());

        assert!(!handle.discovery_enabled());
        handle.enable_discovery().await;
        let report = handle.tick().await.unwrap();
        assert_eq!(report.scanned, 0);
        assert!(handle.discovery_enabled());

        let closed = handle.close_trade(&id).await.unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::Manual));
        assert_eq!(closed.pips_result(), Some(4.0));
        assert!(matches!(
            handle.close_trade(&id).await,
            Err(Error::TradeClosed(_))
        ));
        assert!(matches!(
            handle.close_trade("nope").await,
            Err(Error::TradeNotFound(_))
        ));
        assert_eq!(handle.statistics().await.closed_trades, 1);

        handle.shutdown().await;
        task.await.unwrap();
        assert_eq!(h.store.stored().await[0].status, TradeStatus::Closed);
        assert!(handle.tick().await.is_err());
    }
}
