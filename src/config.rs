// Configuration structures and loading logic

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ScanCfg {
    /// Ranking lookback window in minutes.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Seconds between scan cycles.
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,
    /// Warm-up delay before the first scan, so the store holds some ticks.
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            top_n: default_top_n(),
            interval_secs: default_scan_interval_secs(),
            warmup_secs: default_warmup_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PurgeCfg {
    #[serde(default = "default_purge_interval_secs")]
    pub interval_secs: u64,
    /// Ticks older than this are deleted by the purge.
    #[serde(default = "default_purge_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for PurgeCfg {
    fn default() -> Self {
        Self {
            interval_secs: default_purge_interval_secs(),
            max_age_secs: default_purge_max_age_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvidenceCfg {
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,
    /// Minimum history; symbols with fewer candles degrade to neutral.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
    /// Bounded fan-out across ranked symbols, respects REST rate limits.
    #[serde(default = "default_evidence_concurrency")]
    pub concurrency: usize,
}

impl Default for EvidenceCfg {
    fn default() -> Self {
        Self {
            candle_interval: default_candle_interval(),
            candle_limit: default_candle_limit(),
            min_candles: default_min_candles(),
            concurrency: default_evidence_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionCfg {
    /// How long the controller waits for a cancelled session to terminate.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BinanceCfg {
    #[serde(default = "default_rest_base")]
    pub rest_base: String,
    #[serde(default = "default_ws_base")]
    pub ws_base: String,
    #[serde(default = "default_futures_base")]
    pub futures_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

impl Default for BinanceCfg {
    fn default() -> Self {
        Self {
            rest_base: default_rest_base(),
            ws_base: default_ws_base(),
            futures_base: default_futures_base(),
            api_key: None,
            secret_key: None,
            recv_window_ms: default_recv_window_ms(),
        }
    }
}

impl BinanceCfg {
    /// Config file first, environment second.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("BINANCE_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    pub fn resolved_secret_key(&self) -> Option<String> {
        self.secret_key
            .clone()
            .or_else(|| std::env::var("BINANCE_API_SECRET").ok())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionCfg {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_usd_per_order")]
    pub usd_per_order: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Close positions whose PnL fraction reaches this gain...
    #[serde(default = "default_profit_threshold")]
    pub profit_threshold: f64,
    /// ...or falls to this loss.
    #[serde(default = "default_loss_threshold")]
    pub loss_threshold: f64,
}

impl Default for ExecutionCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            usd_per_order: default_usd_per_order(),
            leverage: default_leverage(),
            profit_threshold: default_profit_threshold(),
            loss_threshold: default_loss_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramCfg {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppCfg {
    #[serde(default)]
    pub scan: ScanCfg,
    #[serde(default)]
    pub purge: PurgeCfg,
    #[serde(default)]
    pub evidence: EvidenceCfg,
    #[serde(default)]
    pub session: SessionCfg,
    #[serde(default)]
    pub binance: BinanceCfg,
    #[serde(default)]
    pub execution: ExecutionCfg,
    #[serde(default)]
    pub telegram: Option<TelegramCfg>,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            scan: ScanCfg::default(),
            purge: PurgeCfg::default(),
            evidence: EvidenceCfg::default(),
            session: SessionCfg::default(),
            binance: BinanceCfg::default(),
            execution: ExecutionCfg::default(),
            telegram: None,
            db_path: default_db_path(),
        }
    }
}

fn default_window_minutes() -> i64 {
    15
}
fn default_top_n() -> usize {
    10
}
fn default_scan_interval_secs() -> u64 {
    240
}
fn default_warmup_secs() -> u64 {
    120
}
fn default_purge_interval_secs() -> u64 {
    6 * 60 * 60
}
fn default_purge_max_age_secs() -> u64 {
    3 * 60 * 60
}
fn default_candle_interval() -> String {
    "15m".to_string()
}
fn default_candle_limit() -> u32 {
    1000
}
fn default_min_candles() -> usize {
    50
}
fn default_evidence_concurrency() -> usize {
    4
}
fn default_stop_timeout_secs() -> u64 {
    10
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_rest_base() -> String {
    "https://api.binance.com".to_string()
}
fn default_ws_base() -> String {
    "wss://stream.binance.com:9443".to_string()
}
fn default_futures_base() -> String {
    "https://fapi.binance.com".to_string()
}
fn default_recv_window_ms() -> u64 {
    5000
}
fn default_usd_per_order() -> f64 {
    5.0
}
fn default_leverage() -> u32 {
    2
}
fn default_profit_threshold() -> f64 {
    0.03
}
fn default_loss_threshold() -> f64 {
    -0.05
}
fn default_db_path() -> String {
    "./gainer_bot.db".to_string()
}

/// Load configuration from `--config <path>` or `./config.yaml`. A missing
/// file yields the defaults.
pub fn load_config() -> Result<AppCfg> {
    let args: Vec<String> = std::env::args().collect();
    let path = args
        .windows(2)
        .find_map(|w| {
            if w[0] == "--config" {
                Some(w[1].clone())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "./config.yaml".to_string());

    let cfg: AppCfg = match std::fs::read_to_string(&path) {
        Ok(content) => serde_yaml::from_str(&content)?,
        Err(_) => AppCfg::default(),
    };

    validate_config(&cfg)?;
    Ok(cfg)
}

fn validate_config(cfg: &AppCfg) -> Result<()> {
    if cfg.scan.window_minutes <= 0 {
        return Err(anyhow!("scan.window_minutes must be positive"));
    }
    if cfg.scan.top_n == 0 {
        return Err(anyhow!("scan.top_n must be positive"));
    }
    if cfg.evidence.concurrency == 0 {
        return Err(anyhow!("evidence.concurrency must be positive"));
    }
    if cfg.execution.profit_threshold <= 0.0 {
        return Err(anyhow!("execution.profit_threshold must be positive"));
    }
    if cfg.execution.loss_threshold >= 0.0 {
        return Err(anyhow!("execution.loss_threshold must be negative"));
    }
    if cfg.execution.enabled && cfg.execution.usd_per_order <= 0.0 {
        return Err(anyhow!("execution.usd_per_order must be positive"));
    }
    Ok(())
}
