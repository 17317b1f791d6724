// RANKER: top-gainer computation over the tick store
// Percentage change uses the first/last tick by timestamp in the window,
// never min/max.

use crate::error::RankError;
use crate::store::TickStore;
use crate::types::{RankedSymbol, Tick};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Compute the top `top_n` symbols by percentage price change over the last
/// `window_minutes`. Symbols with zero in-window ticks are silently excluded;
/// an entirely empty window yields `RankError::InsufficientData`.
pub async fn rank(
    store: &TickStore,
    window_minutes: i64,
    top_n: usize,
) -> Result<Vec<RankedSymbol>, RankError> {
    let end_time = Utc::now();
    let start_time = end_time - Duration::minutes(window_minutes);

    let ticks = store.query(None, start_time, end_time).await?;
    if ticks.is_empty() {
        return Err(RankError::InsufficientData);
    }

    // BTreeMap keeps symbol order deterministic for the tie-break.
    let mut per_symbol: BTreeMap<String, (Tick, Tick)> = BTreeMap::new();
    for tick in ticks {
        let entry = per_symbol
            .entry(tick.symbol.clone())
            .or_insert_with(|| (tick.clone(), tick.clone()));
        entry.1 = tick;
    }

    let mut ranked: Vec<RankedSymbol> = per_symbol
        .into_iter()
        .filter_map(|(symbol, (first, last))| {
            if first.price == 0.0 {
                return None;
            }
            let percent_change = (last.price - first.price) / first.price * 100.0;
            Some(RankedSymbol {
                symbol,
                start_price: first.price,
                end_price: last.price,
                start_time: first.timestamp,
                end_time: last.timestamp,
                percent_change,
            })
        })
        .collect();

    // Descending by percent change; the sort is stable, so equal changes keep
    // the ascending symbol order from the BTreeMap.
    ranked.sort_by(|a, b| {
        b.percent_change
            .partial_cmp(&a.percent_change)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_n);

    debug!(count = ranked.len(), window_minutes, "RANKER: ranking complete");
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    async fn seed(store: &TickStore, symbol: &str, prices: &[f64], start: DateTime<Utc>) {
        for (i, price) in prices.iter().enumerate() {
            store
                .insert(&crate::types::Tick {
                    symbol: symbol.to_string(),
                    price: *price,
                    timestamp: start + Duration::seconds(i as i64 * 10),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn top_gainer_wins_regardless_of_tick_count() {
        let store = TickStore::open_in_memory().unwrap();
        let start = Utc::now() - Duration::minutes(10);

        // X: 20 ticks rising 2%, Y: 5 ticks falling 1%.
        let x: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * (2.0 / 19.0)).collect();
        let y: Vec<f64> = (0..5).map(|i| 50.0 - i as f64 * (0.5 / 4.0)).collect();
        seed(&store, "XUSDT", &x, start).await;
        seed(&store, "YUSDT", &y, start).await;

        let ranked = rank(&store, 15, 1).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "XUSDT");
        assert!((ranked[0].percent_change - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn uses_first_and_last_by_timestamp_not_min_max() {
        let store = TickStore::open_in_memory().unwrap();
        let start = Utc::now() - Duration::minutes(5);

        // Min is 90 and max is 150, but the change is first->last: 100 -> 110.
        seed(&store, "ZUSDT", &[100.0, 150.0, 90.0, 110.0], start).await;

        let ranked = rank(&store, 15, 10).await.unwrap();
        assert_eq!(ranked[0].start_price, 100.0);
        assert_eq!(ranked[0].end_price, 110.0);
        assert!((ranked[0].percent_change - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_window_is_insufficient_data() {
        let store = TickStore::open_in_memory().unwrap();
        let err = rank(&store, 15, 10).await.unwrap_err();
        assert!(matches!(err, RankError::InsufficientData));
    }

    #[tokio::test]
    async fn out_of_window_symbols_are_silently_excluded() {
        let store = TickStore::open_in_memory().unwrap();
        let stale = Utc::now() - Duration::hours(2);
        let fresh = Utc::now() - Duration::minutes(5);

        seed(&store, "OLDUSDT", &[10.0, 20.0], stale).await;
        seed(&store, "NEWUSDT", &[10.0, 11.0], fresh).await;

        let ranked = rank(&store, 15, 10).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "NEWUSDT");
    }

    #[tokio::test]
    async fn equal_changes_tie_break_by_symbol_ascending() {
        let store = TickStore::open_in_memory().unwrap();
        let start = Utc::now() - Duration::minutes(5);

        seed(&store, "BUSDT", &[10.0, 11.0], start).await;
        seed(&store, "AUSDT", &[20.0, 22.0], start).await;

        let ranked = rank(&store, 15, 10).await.unwrap();
        assert_eq!(ranked[0].symbol, "AUSDT");
        assert_eq!(ranked[1].symbol, "BUSDT");
    }

    #[tokio::test]
    async fn truncates_to_top_n() {
        let store = TickStore::open_in_memory().unwrap();
        let start = Utc::now() - Duration::minutes(5);

        seed(&store, "AUSDT", &[10.0, 13.0], start).await;
        seed(&store, "BUSDT", &[10.0, 12.0], start).await;
        seed(&store, "CUSDT", &[10.0, 11.0], start).await;

        let ranked = rank(&store, 15, 2).await.unwrap();
        let symbols: Vec<&str> = ranked.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AUSDT", "BUSDT"]);
    }
}
