// MARKET: REST collaborator for candles, order books and the symbol universe

use crate::types::{Candle, OrderBook};
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const HTTP_TIMEOUT_SECS: u64 = 10;

pub struct MarketClient {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

fn ts_ms_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn parse_levels(raw: Vec<Vec<String>>) -> Vec<(f64, f64)> {
    raw.into_iter()
        .filter_map(|level| {
            let price = level.first()?.parse::<f64>().ok()?;
            let qty = level.get(1)?.parse::<f64>().ok()?;
            Some((price, qty))
        })
        .collect()
}

impl MarketClient {
    pub fn new(rest_base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let base_url = Url::parse(rest_base)?;
        Ok(Self { http, base_url })
    }

    /// Historical candles, oldest first.
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let mut url = self.base_url.join("/api/v3/klines")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("interval", interval)
            .append_pair("limit", &limit.to_string());

        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("Klines error: {}", res.text().await?);
        }

        let raw: Vec<serde_json::Value> = res.json().await?;
        let candles = raw
            .into_iter()
            .filter_map(|arr| {
                let arr = arr.as_array()?;
                if arr.len() < 7 {
                    return None;
                }
                Some(Candle {
                    open_time: ts_ms_to_utc(arr[0].as_i64()?),
                    close_time: ts_ms_to_utc(arr[6].as_i64()?),
                    open: arr[1].as_str()?.parse().ok()?,
                    high: arr[2].as_str()?.parse().ok()?,
                    low: arr[3].as_str()?.parse().ok()?,
                    close: arr[4].as_str()?.parse().ok()?,
                    volume: arr[5].as_str()?.parse().ok()?,
                })
            })
            .collect();

        Ok(candles)
    }

    pub async fn fetch_order_book(&self, symbol: &str, limit: u32) -> Result<OrderBook> {
        let mut url = self.base_url.join("/api/v3/depth")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("limit", &limit.to_string());

        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("Depth error: {}", res.text().await?);
        }

        let depth: DepthResponse = res.json().await?;
        Ok(OrderBook {
            bids: parse_levels(depth.bids),
            asks: parse_levels(depth.asks),
        })
    }

    /// All symbols currently trading against USDT; the initial subscription
    /// universe before the first ranking lands.
    pub async fn fetch_usdt_symbols(&self) -> Result<Vec<String>> {
        let url = self.base_url.join("/api/v3/exchangeInfo")?;
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("ExchangeInfo error: {}", res.text().await?);
        }

        let info: ExchangeInfoResponse = res.json().await?;
        let symbols: Vec<String> = info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING" && s.quote_asset == "USDT")
            .map(|s| s.symbol)
            .collect();

        info!(count = symbols.len(), "MARKET: discovered USDT symbols");
        Ok(symbols)
    }
}
