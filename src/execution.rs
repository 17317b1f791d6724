// EXECUTION: futures order placement collaborator
// Signed REST calls against the futures API. Called once per ranked symbol per
// cycle; every failure is surfaced per symbol and never aborts the scan.

use crate::decision::Decision;
use crate::types::Side;
use anyhow::{anyhow, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub struct FuturesExecutor {
    http: Client,
    base_url: Url,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    usd_per_order: f64,
    leverage: u32,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub symbol: String,
    pub order_id: u64,
    pub side: Side,
    pub quantity: f64,
}

#[derive(Debug, Clone)]
pub struct ClosedPosition {
    pub symbol: String,
    pub position_amt: f64,
    pub entry_price: f64,
    pub closing_price: f64,
    pub pnl_fraction: f64,
}

#[derive(Debug, Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct PositionRisk {
    symbol: String,
    #[serde(rename = "positionAmt")]
    position_amt: String,
    #[serde(rename = "entryPrice")]
    entry_price: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "unRealizedProfit")]
    unrealized_profit: String,
}

#[derive(Debug, Deserialize)]
struct FuturesExchangeInfo {
    symbols: Vec<FuturesSymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct FuturesSymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
struct SymbolFilter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(rename = "stepSize")]
    step_size: Option<String>,
}

/// Truncate a value down to a multiple of the exchange step.
pub fn quantize_decimal(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).floor() * step
}

/// Unrealized PnL as a fraction of position notional.
pub fn pnl_fraction(unrealized_profit: f64, position_amt: f64, mark_price: f64) -> f64 {
    let notional = (position_amt * mark_price).abs();
    if notional > 0.0 {
        unrealized_profit / notional
    } else {
        0.0
    }
}

impl FuturesExecutor {
    pub fn new(
        futures_base: &str,
        api_key: String,
        api_secret: String,
        recv_window_ms: u64,
        usd_per_order: f64,
        leverage: u32,
    ) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let base_url = Url::parse(futures_base)?;
        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
            recv_window_ms,
            usd_per_order,
            leverage,
        })
    }

    fn sign_params(&self, mut params: Vec<(String, String)>) -> Result<String> {
        let timestamp = Utc::now().timestamp_millis();
        params.push(("timestamp".into(), timestamp.to_string()));
        if self.recv_window_ms > 0 {
            params.push(("recvWindow".into(), self.recv_window_ms.to_string()));
        }
        let query = serde_urlencoded::to_string(&params)?;
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|err| anyhow!("failed to init signer: {err}"))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{query}&signature={signature}"))
    }

    async fn signed_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<T> {
        let query = self.sign_params(params)?;
        let url = format!("{}{}?{}", self.base_url.as_str().trim_end_matches('/'), path, query);
        let res = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        if !res.status().is_success() {
            anyhow::bail!("{path} error: {}", res.text().await?);
        }
        Ok(res.json().await?)
    }

    async fn signed_post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<T> {
        let query = self.sign_params(params)?;
        let url = format!("{}{}?{}", self.base_url.as_str().trim_end_matches('/'), path, query);
        let res = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        if !res.status().is_success() {
            anyhow::bail!("{path} error: {}", res.text().await?);
        }
        Ok(res.json().await?)
    }

    async fn fetch_step_size(&self, symbol: &str) -> Result<Option<Decimal>> {
        let url = self.base_url.join("/fapi/v1/exchangeInfo")?;
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("ExchangeInfo error: {}", res.text().await?);
        }
        let info: FuturesExchangeInfo = res.json().await?;
        let step = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .and_then(|s| {
                s.filters
                    .into_iter()
                    .find(|f| f.filter_type == "LOT_SIZE")
                    .and_then(|f| f.step_size)
            })
            .and_then(|step| Decimal::from_str(&step).ok());
        Ok(step)
    }

    async fn fetch_mark_price(&self, symbol: &str) -> Result<f64> {
        let mut url = self.base_url.join("/fapi/v1/ticker/price")?;
        url.query_pairs_mut().append_pair("symbol", symbol);
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("Ticker error: {}", res.text().await?);
        }
        let ticker: PriceTicker = res.json().await?;
        Ok(ticker.price.parse::<f64>()?)
    }

    async fn positions(&self) -> Result<Vec<PositionRisk>> {
        self.signed_get("/fapi/v2/positionRisk", Vec::new()).await
    }

    async fn has_open_position(&self, symbol: &str) -> Result<bool> {
        let positions = self.positions().await?;
        Ok(positions.iter().any(|p| {
            p.symbol == symbol && p.position_amt.parse::<f64>().unwrap_or(0.0) != 0.0
        }))
    }

    /// Attempt to set leverage; failure never blocks the order (the exchange
    /// keeps whatever was configured before).
    async fn set_leverage(&self, symbol: &str) {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("leverage".to_string(), self.leverage.to_string()),
        ];
        if let Err(err) = self
            .signed_post::<serde_json::Value>("/fapi/v1/leverage", params)
            .await
        {
            warn!(symbol, error = %err, "EXECUTION: leverage not set, proceeding anyway");
        }
    }

    /// Place a market order for the decision, sized to the configured USD
    /// amount. Returns `Ok(None)` when the decision is not actionable or a
    /// position for the symbol is already open.
    pub async fn execute(&self, decision: &Decision) -> Result<Option<OrderResult>> {
        let Some(side) = decision.agreed_side() else {
            return Ok(None);
        };
        let symbol = &decision.symbol;

        if self.has_open_position(symbol).await? {
            info!(symbol, "EXECUTION: existing open position, skipping new order");
            return Ok(None);
        }

        self.set_leverage(symbol).await;

        let price = self.fetch_mark_price(symbol).await?;
        if price <= 0.0 {
            anyhow::bail!("invalid market price for {symbol}");
        }
        let raw_qty = Decimal::from_f64(self.usd_per_order / price)
            .ok_or_else(|| anyhow!("quantity out of range for {symbol}"))?;
        let quantity = match self.fetch_step_size(symbol).await? {
            Some(step) => quantize_decimal(raw_qty, step),
            None => raw_qty.round_dp(6),
        };
        if quantity <= Decimal::ZERO {
            anyhow::bail!("order size below step for {symbol}");
        }

        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side.as_str().to_string()),
            ("type".to_string(), "MARKET".to_string()),
            ("quantity".to_string(), quantity.to_string()),
        ];
        let response: OrderResponse = self.signed_post("/fapi/v1/order", params).await?;
        info!(
            symbol,
            order_id = response.order_id,
            side = side.as_str(),
            quantity = %quantity,
            "EXECUTION: market order placed"
        );
        Ok(Some(OrderResult {
            symbol: symbol.clone(),
            order_id: response.order_id,
            side,
            quantity: quantity.to_f64().unwrap_or(0.0),
        }))
    }

    /// Close every open position whose PnL fraction breaches either threshold.
    pub async fn close_positions_on_profit_loss(
        &self,
        profit_threshold: f64,
        loss_threshold: f64,
    ) -> Result<Vec<ClosedPosition>> {
        let mut closed = Vec::new();
        for position in self.positions().await? {
            let amt = position.position_amt.parse::<f64>().unwrap_or(0.0);
            if amt == 0.0 {
                continue;
            }
            let mark = position.mark_price.parse::<f64>().unwrap_or(0.0);
            let unrealized = position.unrealized_profit.parse::<f64>().unwrap_or(0.0);
            let fraction = pnl_fraction(unrealized, amt, mark);
            if fraction < profit_threshold && fraction > loss_threshold {
                continue;
            }

            let side = if amt > 0.0 { Side::Sell } else { Side::Buy };
            let params = vec![
                ("symbol".to_string(), position.symbol.clone()),
                ("side".to_string(), side.as_str().to_string()),
                ("type".to_string(), "MARKET".to_string()),
                ("quantity".to_string(), format!("{}", amt.abs())),
            ];
            match self
                .signed_post::<OrderResponse>("/fapi/v1/order", params)
                .await
            {
                Ok(response) => {
                    info!(
                        symbol = %position.symbol,
                        order_id = response.order_id,
                        pnl_fraction = fraction,
                        "EXECUTION: position closed on threshold"
                    );
                    closed.push(ClosedPosition {
                        symbol: position.symbol,
                        position_amt: amt,
                        entry_price: position.entry_price.parse::<f64>().unwrap_or(0.0),
                        closing_price: mark,
                        pnl_fraction: fraction,
                    });
                }
                Err(err) => {
                    warn!(symbol = %position.symbol, error = %err, "EXECUTION: close order failed");
                }
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantize_truncates_to_step() {
        let qty = dec!(76.4964620386307103672152152);
        assert_eq!(quantize_decimal(qty, dec!(0.001)), dec!(76.496));
        assert_eq!(quantize_decimal(dec!(0.2593620616), dec!(0.1)), dec!(0.2));
        assert_eq!(quantize_decimal(dec!(5), Decimal::ZERO), dec!(5));
    }

    #[test]
    fn pnl_fraction_uses_mark_notional() {
        // Long 2 units at mark 100, +6 unrealized -> 3%.
        assert!((pnl_fraction(6.0, 2.0, 100.0) - 0.03).abs() < 1e-12);
        // Short positions have negative amounts; the notional is absolute.
        assert!((pnl_fraction(-10.0, -2.0, 100.0) + 0.05).abs() < 1e-12);
        assert_eq!(pnl_fraction(5.0, 0.0, 100.0), 0.0);
    }
}
