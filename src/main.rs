use anyhow::{anyhow, Result};
use gainer_bot::config::{self, AppCfg};
use gainer_bot::evidence::EvidenceCollector;
use gainer_bot::execution::FuturesExecutor;
use gainer_bot::feed::{BinanceTickerFeed, TickerFeed};
use gainer_bot::market::MarketClient;
use gainer_bot::notify::{NoopNotifier, Notifier, TelegramNotifier};
use gainer_bot::scanner::Scanner;
use gainer_bot::store::TickStore;
use gainer_bot::subscription::SubscriptionController;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load_config()?;
    info!(
        window_minutes = cfg.scan.window_minutes,
        top_n = cfg.scan.top_n,
        scan_interval_secs = cfg.scan.interval_secs,
        "MAIN: starting gainer bot"
    );

    let store = Arc::new(TickStore::open(Path::new(&cfg.db_path))?);
    let market = Arc::new(MarketClient::new(&cfg.binance.rest_base)?);
    let feed: Arc<dyn TickerFeed> = Arc::new(BinanceTickerFeed::new(cfg.binance.ws_base.clone()));

    let mut controller = SubscriptionController::new(
        feed,
        store.clone(),
        Duration::from_secs(cfg.session.stop_timeout_secs),
        Duration::from_secs(cfg.session.reconnect_delay_secs),
    );

    // Stream the whole USDT universe until the first ranking narrows it down.
    match market.fetch_usdt_symbols().await {
        Ok(universe) => controller.retarget(universe).await,
        Err(err) => {
            warn!(error = %err, "MAIN: universe discovery failed, waiting for first ranking")
        }
    }

    let collector = EvidenceCollector::new(market.clone(), cfg.evidence.clone());
    let notifier: Arc<dyn Notifier> = match &cfg.telegram {
        Some(tg) => Arc::new(TelegramNotifier::new(
            tg.bot_token.clone(),
            tg.chat_id.clone(),
        )?),
        None => Arc::new(NoopNotifier),
    };
    let executor = build_executor(&cfg)?;

    let scanner = Scanner::new(store, controller, collector, notifier, executor, cfg);
    tokio::select! {
        result = scanner.run() => match result {
            Ok(()) => {}
            Err(err) => return Err(err),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("MAIN: shutdown signal received");
        }
    }
    Ok(())
}

fn build_executor(cfg: &AppCfg) -> Result<Option<Arc<FuturesExecutor>>> {
    if !cfg.execution.enabled {
        return Ok(None);
    }
    let api_key = cfg
        .binance
        .resolved_api_key()
        .ok_or_else(|| anyhow!("execution enabled but no API key configured"))?;
    let api_secret = cfg
        .binance
        .resolved_secret_key()
        .ok_or_else(|| anyhow!("execution enabled but no API secret configured"))?;
    Ok(Some(Arc::new(FuturesExecutor::new(
        &cfg.binance.futures_base,
        api_key,
        api_secret,
        cfg.binance.recv_window_ms,
        cfg.execution.usd_per_order,
        cfg.execution.leverage,
    )?)))
}
