// SCANNER: the periodic scan cycle
// Rank the tick store, re-target the subscription, collect evidence, decide,
// notify and execute. Nothing in here may terminate the process; every
// collaborator failure is logged per unit of work and the loop continues.

use crate::config::AppCfg;
use crate::decision::{decide, Decision};
use crate::error::RankError;
use crate::evidence::EvidenceCollector;
use crate::execution::FuturesExecutor;
use crate::notify::Notifier;
use crate::ranker;
use crate::store::TickStore;
use crate::subscription::SubscriptionController;
use crate::types::RankedSymbol;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

pub struct Scanner {
    store: Arc<TickStore>,
    controller: SubscriptionController,
    collector: EvidenceCollector,
    notifier: Arc<dyn Notifier>,
    executor: Option<Arc<FuturesExecutor>>,
    cfg: AppCfg,
}

impl Scanner {
    pub fn new(
        store: Arc<TickStore>,
        controller: SubscriptionController,
        collector: EvidenceCollector,
        notifier: Arc<dyn Notifier>,
        executor: Option<Arc<FuturesExecutor>>,
        cfg: AppCfg,
    ) -> Self {
        Self {
            store,
            controller,
            collector,
            notifier,
            executor,
            cfg,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!(
            warmup_secs = self.cfg.scan.warmup_secs,
            "SCANNER: warming up before first scan"
        );
        sleep(Duration::from_secs(self.cfg.scan.warmup_secs)).await;

        let scan_interval = Duration::from_secs(self.cfg.scan.interval_secs);
        let purge_interval = Duration::from_secs(self.cfg.purge.interval_secs);
        let mut last_purge = Instant::now();

        loop {
            // Purge runs inside the scan loop so only this task ever deletes.
            if last_purge.elapsed() >= purge_interval {
                let cutoff =
                    Utc::now() - chrono::Duration::seconds(self.cfg.purge.max_age_secs as i64);
                match self.store.purge_older_than(cutoff).await {
                    Ok(deleted) => info!(deleted, "SCANNER: purged old ticks"),
                    Err(err) => warn!(error = %err, "SCANNER: purge failed"),
                }
                last_purge = Instant::now();
            }

            self.run_cycle().await;
            sleep(scan_interval).await;
        }
    }

    async fn run_cycle(&mut self) {
        let ranked = match ranker::rank(
            &self.store,
            self.cfg.scan.window_minutes,
            self.cfg.scan.top_n,
        )
        .await
        {
            Ok(ranked) => ranked,
            Err(RankError::InsufficientData) => {
                info!("SCANNER: no ticks in window, no re-target this cycle");
                return;
            }
            Err(err) => {
                warn!(error = %err, "SCANNER: ranking failed");
                return;
            }
        };

        info!(count = ranked.len(), "SCANNER: ranking cycle complete");
        if let Err(err) = self.store.record_gainers(&ranked, Utc::now()).await {
            warn!(error = %err, "SCANNER: gainer snapshot archive failed");
        }

        // Evidence collection must not start before the old session has fully
        // terminated; retarget blocks until then.
        let symbols: Vec<String> = ranked.iter().map(|r| r.symbol.clone()).collect();
        self.controller.retarget(symbols).await;

        let evidences = self.collector.collect_batch(&ranked).await;

        let mut lines = Vec::with_capacity(ranked.len());
        for r in &ranked {
            let Some(evidence) = evidences.iter().find(|e| e.symbol == r.symbol) else {
                continue;
            };
            let decision = decide(evidence);
            lines.push(format_decision(r, &decision));

            if let Some(executor) = &self.executor {
                match executor.execute(&decision).await {
                    Ok(Some(order)) => info!(
                        symbol = %order.symbol,
                        order_id = order.order_id,
                        "SCANNER: order placed for decision"
                    ),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(symbol = %decision.symbol, error = %err, "SCANNER: execution failed")
                    }
                }
            }
        }

        if let Some(executor) = &self.executor {
            match executor
                .close_positions_on_profit_loss(
                    self.cfg.execution.profit_threshold,
                    self.cfg.execution.loss_threshold,
                )
                .await
            {
                Ok(closed) if !closed.is_empty() => {
                    info!(count = closed.len(), "SCANNER: positions closed on threshold")
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "SCANNER: close-position check failed"),
            }
        }

        let summary = format!(
            "Top gainers scan ({} symbols)\n{}",
            lines.len(),
            lines.join("\n")
        );
        if let Err(err) = self.notifier.send(&summary).await {
            warn!(error = %err, "SCANNER: notifier failed");
        }
    }

    pub async fn shutdown(&mut self) {
        self.controller.shutdown().await;
    }
}

fn format_decision(ranked: &RankedSymbol, decision: &Decision) -> String {
    let action = match decision.agreed_side() {
        Some(side) => side.as_str(),
        None => "no action",
    };
    format!(
        "{} {:+.2}% -> {} ({})",
        ranked.symbol, ranked.percent_change, decision.label, action
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Evidence;

    #[test]
    fn summary_line_shows_label_and_action() {
        let ranked = RankedSymbol {
            symbol: "BTCUSDT".to_string(),
            start_price: 100.0,
            end_price: 102.0,
            start_time: Utc::now(),
            end_time: Utc::now(),
            percent_change: 2.0,
        };
        let decision = decide(&Evidence::neutral("BTCUSDT".to_string()));
        let line = format_decision(&ranked, &decision);
        assert_eq!(line, "BTCUSDT +2.00% -> Neutral/Hold (no action)");
    }
}
