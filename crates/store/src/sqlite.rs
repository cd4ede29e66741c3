use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use common::{CloseReason, Direction, Error, PricePlan, Result, TargetLevel, TradeStatus};
use engine::{TradeLifecycle, TradeStore};

/// Trades in a SQLite table (see `migrations/`).
pub struct SqliteTradeStore {
    db: SqlitePool,
}

impl SqliteTradeStore {
    /// Open the database and apply pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        // One connection: SQLite has a single writer and `sqlite::memory:`
        // gives every connection its own database.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations")
            .run(&db)
            .await
            .map_err(|e| Error::Persistence(format!("migration failed: {e}")))?;
        info!(database_url, "Trade database ready");
        Ok(Self { db })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn save_all(&self, trades: &[TradeLifecycle]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM trades").execute(&mut *tx).await?;

        for trade in trades {
            let plan = &trade.plan;
            sqlx::query(
                r#"
                INSERT INTO trades (
                    id, symbol, direction, status, close_reason, confidence,
                    reference_price, entry_zone_1, entry_zone_2, initial_stop,
                    target_1, target_2, target_3, pip_size, stop_loss, triggered,
                    close_price, pips_result, created_at, activated_at, closed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                        ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                "#,
            )
            .bind(&trade.id)
            .bind(&trade.symbol)
            .bind(trade.direction)
            .bind(trade.status)
            .bind(trade.close_reason)
            .bind(trade.confidence)
            .bind(plan.reference_price)
            .bind(plan.entry_zone_1)
            .bind(plan.entry_zone_2)
            .bind(plan.stop_loss)
            .bind(plan.targets[0])
            .bind(plan.targets[1])
            .bind(plan.targets[2])
            .bind(plan.pip_size)
            .bind(trade.stop_loss)
            .bind(encode_triggered(trade))
            .bind(trade.close_price)
            .bind(trade.pips_result())
            .bind(trade.created_at.to_rfc3339())
            .bind(trade.activated_at.map(|t| t.to_rfc3339()))
            .bind(trade.closed_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(trades = trades.len(), "Trades saved to SQLite");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TradeLifecycle>> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY created_at, id")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

fn encode_triggered(trade: &TradeLifecycle) -> String {
    trade
        .triggered
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_row(row: &SqliteRow) -> Result<TradeLifecycle> {
    let direction: Direction = row.try_get("direction")?;
    let plan = PricePlan::new(
        direction,
        row.try_get("reference_price")?,
        [row.try_get("entry_zone_1")?, row.try_get("entry_zone_2")?],
        row.try_get("initial_stop")?,
        [
            row.try_get("target_1")?,
            row.try_get("target_2")?,
            row.try_get("target_3")?,
        ],
        row.try_get("pip_size")?,
    );

    let triggered: String = row.try_get("triggered")?;
    let triggered: BTreeSet<TargetLevel> = triggered
        .split(',')
        .filter(|s| !s.is_empty())
        .map(TargetLevel::from_str)
        .collect::<Result<_>>()?;

    Ok(TradeLifecycle {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        direction,
        plan,
        stop_loss: row.try_get("stop_loss")?,
        triggered,
        status: row.try_get::<TradeStatus, _>("status")?,
        close_reason: row.try_get::<Option<CloseReason>, _>("close_reason")?,
        close_price: row.try_get("close_price")?,
        confidence: row.try_get("confidence")?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
        activated_at: parse_optional_time(row.try_get("activated_at")?)?,
        closed_at: parse_optional_time(row.try_get("closed_at")?)?,
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Persistence(format!("bad timestamp '{raw}': {e}")))
}

fn parse_optional_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_store() -> SqliteTradeStore {
        SqliteTradeStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sell_trade() -> TradeLifecycle {
        let plan = PricePlan::new(
            Direction::Sell,
            151.25,
            [151.325, 151.45],
            151.75,
            [150.95, 150.7, 150.325],
            0.01,
        );
        TradeLifecycle::open("USDJPY", plan, 90.0, Utc::now())
    }

    #[tokio::test]
    async fn empty_database_loads_nothing() {
        let store = memory_store().await;
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn round_trips_progressed_trades() {
        let store = memory_store().await;
        let now = Utc::now();

        let mut active = sell_trade();
        active.on_price(150.9, true, now);
        assert_eq!(active.triggered.len(), 1);

        let mut closed = sell_trade();
        closed.id = "USDJPY_closed".into();
        closed.created_at = now - Duration::hours(3);
        closed.close_manually(151.0, now).unwrap();

        store.save_all(&[active.clone(), closed.clone()]).await.unwrap();
        let loaded = store.load_all().await.unwrap();

        assert_eq!(loaded.len(), 2);
        // Ordered by creation time.
        assert_eq!(loaded[0].id, "USDJPY_closed");
        assert_eq!(loaded[0].close_reason, Some(CloseReason::Manual));
        assert_eq!(loaded[0].pips_result(), closed.pips_result());
        assert_eq!(loaded[1].stop_loss, active.stop_loss);
        assert_eq!(loaded[1].triggered, active.triggered);
        assert_eq!(loaded[1].plan, active.plan);
        assert_eq!(loaded[1].status, TradeStatus::Active);
    }

    #[tokio::test]
    async fn reopened_symbol_in_same_instant_saves() {
        let store = memory_store().await;
        let now = Utc::now();
        let plan = sell_trade().plan;

        let mut stopped = TradeLifecycle::open("USDJPY", plan.clone(), 90.0, now);
        stopped.on_price(151.8, true, now);
        assert!(!stopped.is_open());
        let reopened = TradeLifecycle::open("USDJPY", plan, 90.0, now);
        assert_ne!(stopped.id, reopened.id);

        store.save_all(&[stopped.clone(), reopened.clone()]).await.unwrap();
        let ids: Vec<String> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&stopped.id));
        assert!(ids.contains(&reopened.id));
    }

    #[tokio::test]
    async fn save_replaces_previous_collection() {
        let store = memory_store().await;
        let first = sell_trade();
        store.save_all(&[first]).await.unwrap();

        let mut second = sell_trade();
        second.id = "USDJPY_2".into();
        store.save_all(&[second]).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "USDJPY_2");
    }
}
