// STORE: SQLite-backed tick store
// Append-only time-series of (symbol, price, timestamp) plus the archived
// top-gainer snapshots written once per ranking cycle.

use crate::types::{RankedSymbol, Tick};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct TickStore {
    db: Arc<Mutex<Connection>>,
}

impl TickStore {
    /// Create or open the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        info!(db_path = %path.display(), "STORE: database opened");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS ticks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                price REAL NOT NULL,
                ts_ms INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ticks_ts ON ticks(ts_ms)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ticks_symbol_ts ON ticks(symbol, ts_ms)",
            [],
        )?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS gainer_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                start_price REAL NOT NULL,
                end_price REAL NOT NULL,
                percent_change REAL NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }

    /// Append one tick. Cheap, never updates existing rows.
    pub async fn insert(&self, tick: &Tick) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO ticks (symbol, price, ts_ms) VALUES (?, ?, ?)",
            params![tick.symbol, tick.price, tick.timestamp.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Ticks with timestamp in `[from, to]`, optionally restricted to one
    /// symbol. Ordered by timestamp; ties broken by arrival order.
    pub async fn query(
        &self,
        symbol: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Tick>> {
        let db = self.db.lock().await;
        let from_ms = from.timestamp_millis();
        let to_ms = to.timestamp_millis();

        let mut out = Vec::new();
        let mut push_row = |symbol: String, price: f64, ts_ms: i64| {
            if let Some(timestamp) = DateTime::<Utc>::from_timestamp_millis(ts_ms) {
                out.push(Tick {
                    symbol,
                    price,
                    timestamp,
                });
            }
        };

        match symbol {
            Some(sym) => {
                let mut stmt = db.prepare(
                    "SELECT symbol, price, ts_ms FROM ticks
                     WHERE symbol = ? AND ts_ms >= ? AND ts_ms <= ?
                     ORDER BY ts_ms, id",
                )?;
                let rows = stmt.query_map(params![sym, from_ms, to_ms], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, row.get::<_, i64>(2)?))
                })?;
                for row in rows {
                    let (symbol, price, ts_ms) = row?;
                    push_row(symbol, price, ts_ms);
                }
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT symbol, price, ts_ms FROM ticks
                     WHERE ts_ms >= ? AND ts_ms <= ?
                     ORDER BY ts_ms, id",
                )?;
                let rows = stmt.query_map(params![from_ms, to_ms], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, row.get::<_, i64>(2)?))
                })?;
                for row in rows {
                    let (symbol, price, ts_ms) = row?;
                    push_row(symbol, price, ts_ms);
                }
            }
        }
        Ok(out)
    }

    /// Delete ticks strictly older than `cutoff`. Returns the deleted count.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let db = self.db.lock().await;
        let deleted = db.execute(
            "DELETE FROM ticks WHERE ts_ms < ?",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    pub async fn tick_count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let count: u64 = db.query_row("SELECT COUNT(*) FROM ticks", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Archive one ranking cycle's snapshot with its `recorded_at` stamp.
    pub async fn record_gainers(
        &self,
        gainers: &[RankedSymbol],
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let recorded_ms = recorded_at.timestamp_millis();
        for g in gainers {
            db.execute(
                "INSERT INTO gainer_history (symbol, start_price, end_price, percent_change, recorded_at_ms)
                 VALUES (?, ?, ?, ?, ?)",
                params![g.symbol, g.start_price, g.end_price, g.percent_change, recorded_ms],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tick(symbol: &str, price: f64, at: DateTime<Utc>) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn query_orders_by_timestamp_then_arrival() {
        let store = TickStore::open_in_memory().unwrap();
        let base = Utc::now();

        // Same timestamp for the last two inserts; arrival order must hold.
        store.insert(&tick("BTCUSDT", 100.0, base)).await.unwrap();
        store
            .insert(&tick("BTCUSDT", 101.0, base + Duration::seconds(1)))
            .await
            .unwrap();
        store
            .insert(&tick("BTCUSDT", 102.0, base + Duration::seconds(1)))
            .await
            .unwrap();

        let ticks = store
            .query(Some("BTCUSDT"), base - Duration::seconds(1), base + Duration::seconds(2))
            .await
            .unwrap();
        let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![100.0, 101.0, 102.0]);
    }

    #[tokio::test]
    async fn query_filters_by_symbol_and_window() {
        let store = TickStore::open_in_memory().unwrap();
        let base = Utc::now();

        store.insert(&tick("BTCUSDT", 1.0, base)).await.unwrap();
        store.insert(&tick("ETHUSDT", 2.0, base)).await.unwrap();
        store
            .insert(&tick("BTCUSDT", 3.0, base + Duration::minutes(30)))
            .await
            .unwrap();

        let ticks = store
            .query(Some("BTCUSDT"), base, base + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].price, 1.0);

        let all = store
            .query(None, base, base + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn purge_removes_only_strictly_older_ticks() {
        let store = TickStore::open_in_memory().unwrap();
        let cutoff = Utc::now();

        store
            .insert(&tick("BTCUSDT", 1.0, cutoff - Duration::hours(4)))
            .await
            .unwrap();
        store
            .insert(&tick("BTCUSDT", 2.0, cutoff - Duration::milliseconds(1)))
            .await
            .unwrap();
        store.insert(&tick("BTCUSDT", 3.0, cutoff)).await.unwrap();
        store
            .insert(&tick("BTCUSDT", 4.0, cutoff + Duration::hours(1)))
            .await
            .unwrap();

        let deleted = store.purge_older_than(cutoff).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.tick_count().await.unwrap(), 2);
    }
}
