//! Two-speed control loop (C10): a slow catalog refresh and a fast price-poll-and-trade tick.
//!
//! Grounded on `scanner/runner.py::main` — the slow/fast interval split, the parallel price fetch
//! across both venues, in-place injection of fresh prices onto the cached `MatchedPair` list, and
//! sleeping `max(0, poll_interval - cycle_elapsed)` so a slow cycle never compounds drift.

use crate::config::Config;
use crate::executor::TradeExecutor;
use crate::finder;
use crate::market::{ExecutionStatus, MatchedPair};
use crate::matcher;
use crate::persistence::Store;
use crate::schedule::CachedScheduleValidator;
use crate::venues::VenueClient;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{info, warn};

pub struct Runner {
    cfg: Config,
    venue_a: Arc<dyn VenueClient>,
    venue_b: Arc<dyn VenueClient>,
    executor: Arc<dyn TradeExecutor>,
    store: Store,
    schedule: Option<Arc<CachedScheduleValidator>>,
    matched_pairs: Vec<MatchedPair>,
    last_refresh: Option<Instant>,
    /// Set only after a failed catalog refresh, to `now + catalog_retry_delay`. Lets the next
    /// attempt retry quickly instead of waiting out the full `market_refresh_interval`.
    next_refresh_override: Option<Instant>,
}

impl Runner {
    pub fn new(
        cfg: Config,
        venue_a: Arc<dyn VenueClient>,
        venue_b: Arc<dyn VenueClient>,
        executor: Arc<dyn TradeExecutor>,
        store: Store,
        schedule: Option<Arc<CachedScheduleValidator>>,
    ) -> Self {
        Self {
            cfg,
            venue_a,
            venue_b,
            executor,
            store,
            schedule,
            matched_pairs: Vec::new(),
            last_refresh: None,
            next_refresh_override: None,
        }
    }

    fn needs_refresh(&self) -> bool {
        if let Some(t) = self.next_refresh_override {
            return Instant::now() >= t;
        }
        match self.last_refresh {
            None => true,
            Some(t) => t.elapsed() >= self.cfg.market_refresh_interval,
        }
    }

    /// Rebuilds `matched_pairs` from a fresh catalog pull on both venues. Runs every
    /// `market_refresh_interval`; a failed pull on either venue is logged and the existing pairs
    /// are kept for another cycle rather than crashing the loop.
    async fn refresh_catalog(&mut self) {
        info!("MARKET REFRESH: pulling catalogs from both venues");
        let a_markets = self.venue_a.list_markets(self.cfg.scan_window_hours).await;
        let b_markets = self.venue_b.list_markets(self.cfg.scan_window_hours).await;

        match (a_markets, b_markets) {
            (Ok(a), Ok(b)) => {
                let (pairs, stats) = matcher::find_matches(&a, &b, &self.cfg);
                info!(
                    venue_a_markets = stats.venue_a_markets,
                    venue_b_markets = stats.venue_b_markets,
                    matched = stats.matched,
                    rejected_no_bucket = stats.rejected_no_bucket,
                    rejected_resolution_gap = stats.rejected_resolution_gap,
                    "MARKET REFRESH complete"
                );
                self.matched_pairs = pairs;
                self.last_refresh = Some(Instant::now());
                self.next_refresh_override = None;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "catalog refresh failed, keeping previous matched pairs, retrying in {:?}", self.cfg.catalog_retry_delay);
                self.next_refresh_override = Some(Instant::now() + self.cfg.catalog_retry_delay);
            }
        }
    }

    /// Re-fetches live prices for every market currently in `matched_pairs` and writes them back
    /// in place, fetching both venues concurrently the way `_fetch_all_prices` does.
    async fn update_pair_prices(&mut self) {
        let a_ids: Vec<String> = self.matched_pairs.iter().map(|p| p.venue_a.platform_id.clone()).collect();
        let b_ids: Vec<String> = self.matched_pairs.iter().map(|p| p.venue_b.platform_id.clone()).collect();

        let (a_prices, b_prices) = tokio::join!(
            self.venue_a.fetch_live_prices(&a_ids),
            self.venue_b.fetch_live_prices(&b_ids),
        );

        for pair in &mut self.matched_pairs {
            if let Some(live) = a_prices.get(&pair.venue_a.platform_id) {
                pair.venue_a.apply_live_prices(live.clone());
            }
            if let Some(live) = b_prices.get(&pair.venue_b.platform_id) {
                pair.venue_b.apply_live_prices(live.clone());
            }
        }
    }

    /// Runs one fast-poll tick: refresh prices, evaluate every pair, log each one, execute and
    /// persist the ones that clear the threshold. Returns the cycle's wall-clock duration so the
    /// caller can compute how long to sleep before the next tick.
    async fn run_cycle(&mut self) {
        let start = Instant::now();
        self.executor.advance_cycle();
        self.update_pair_prices().await;

        for pair in self.matched_pairs.clone() {
            finder::log_pair_prices(&pair, &self.cfg);
        }

        let opportunities =
            finder::find_opportunities(&self.matched_pairs, &self.cfg, self.schedule.as_deref()).await;

        for opp in &opportunities {
            info!(target: "opportunities", "{}", finder::format_opportunity_log(opp));
            let opportunity_id = self.store.log_opportunity(opp).ok();

            let result = self.executor.execute(opp).await;
            if result.status != ExecutionStatus::Skipped {
                if let Some(id) = opportunity_id {
                    let _ = self.store.mark_opportunity_executed(id);
                }
                let _ = self.store.log_trade(opp, &result);
            }
        }

        info!(
            target: "opportunities",
            pairs_scanned = self.matched_pairs.len(),
            opportunities_found = opportunities.len(),
            cycle_ms = start.elapsed().as_millis() as u64,
            "SCAN CYCLE complete"
        );
    }

    /// Runs forever: a slow refresh whenever due, a fast poll every tick, sleeping the remainder of
    /// `price_poll_interval` after accounting for the cycle's own work.
    pub async fn run_forever(mut self) -> ! {
        loop {
            if self.needs_refresh() {
                self.refresh_catalog().await;
            }

            let start = Instant::now();
            self.run_cycle().await;
            let elapsed = start.elapsed();

            let sleep_for = self.cfg.price_poll_interval.saturating_sub(elapsed);
            sleep(sleep_for).await;
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
