//! Live two-leg arbitrage executor (C7).
//!
//! Grounded on `scanner/arb_executor.py` in full: `ArbExecutor.execute`'s leg-by-leg state
//! machine, `_unwind_kalshi`'s bounded-retry unwind, and `_set_cooldown`'s per-pair cycle map. Per
//! design note 9, the cooldown map and per-market unit tally are owned by this struct instead of
//! living as module-level globals, and the "409 means conflict" check from the source is replaced
//! by matching on the typed `VenueError::Conflict` variant (Open Question (b)).

use crate::config::Config;
use crate::error::VenueError;
use crate::market::{BalanceSnapshot, ExecutionResult, ExecutionStatus, Opportunity};
use crate::sizing;
use crate::venues::OrderClient;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

type PairKey = (String, String);

/// Runner-facing abstraction: both the live `ArbExecutor` and the `PaperExecutor` implement this,
/// so `Runner` drives either mode through the same loop (selected at startup by the `--paper`
/// flag, per design note 9's trait-based executor factory).
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(&self, opp: &Opportunity) -> ExecutionResult;

    /// Advances the monotonic cooldown-cycle counter. No-op for executors that don't track
    /// per-pair cooldowns (paper mode).
    fn advance_cycle(&self) {}
}

pub struct ArbExecutor {
    venue_a: Arc<dyn OrderClient>,
    venue_b: Arc<dyn OrderClient>,
    cfg: Config,
    cooldown_until: Mutex<HashMap<PairKey, u64>>,
    units_committed: Mutex<HashMap<PairKey, u64>>,
    cycle: AtomicU64,
}

impl ArbExecutor {
    pub fn new(venue_a: Arc<dyn OrderClient>, venue_b: Arc<dyn OrderClient>, cfg: Config) -> Self {
        Self {
            venue_a,
            venue_b,
            cfg,
            cooldown_until: Mutex::new(HashMap::new()),
            units_committed: Mutex::new(HashMap::new()),
            cycle: AtomicU64::new(0),
        }
    }

    fn set_cooldown(&self, key: &PairKey, cycles: u64) {
        let cycle = self.cycle.load(Ordering::SeqCst);
        self.cooldown_until.lock().insert(key.clone(), cycle + cycles);
    }

    fn in_cooldown(&self, key: &PairKey) -> bool {
        let cycle = self.cycle.load(Ordering::SeqCst);
        self.cooldown_until.lock().get(key).is_some_and(|&until| cycle < until)
    }

    async fn execute_inner(&self, opp: &Opportunity) -> ExecutionResult {
        let key = opp.pair_key();

        if self.in_cooldown(&key) {
            return ExecutionResult::skipped("cooldown_active");
        }

        let committed = *self.units_committed.lock().get(&key).unwrap_or(&0);
        if committed >= self.cfg.per_market_unit_cap {
            self.set_cooldown(&key, self.cfg.cooldown_base_cycles);
            return ExecutionResult::skipped("market_cap_reached");
        }

        let sizing = sizing::calculate_units(opp, &self.cfg, committed);
        if sizing.units == 0 {
            return ExecutionResult::skipped("sizing_too_small");
        }

        // Venue-B is the hedge leg; if it can't carry at least a minimum-sized order there's no
        // point opening the Venue-A leg at all (grounded on `arb_executor.py`'s `poly_bal` guard).
        let venue_b_balance_raw = match self.venue_b.get_balance().await {
            Ok(bal) => bal,
            Err(e) => {
                warn!(pair = ?key, error = %e, "venue-b balance check failed");
                return ExecutionResult::skipped("b_balance_check_failed");
            }
        };
        if venue_b_balance_raw < self.cfg.venue_b_min_leg_usd {
            warn!(pair = ?key, balance = venue_b_balance_raw, "venue-b balance below minimum order size");
            return ExecutionResult::skipped("b_insufficient_balance");
        }

        let venue_a_balance_before = self.venue_a.get_balance().await.ok();
        let venue_b_balance_before = Some(venue_b_balance_raw);

        // --- Leg A ---
        let a_order_id = match self
            .venue_a
            .place_order(
                &opp.pair.venue_a.platform_id,
                opp.venue_a_side,
                sizing.units,
                opp.venue_a_cost_cents,
            )
            .await
        {
            Ok(id) => id,
            Err(VenueError::Conflict(msg)) => {
                warn!(pair = ?key, %msg, "venue-a leg conflict");
                self.set_cooldown(&key, 6 * self.cfg.cooldown_base_cycles);
                return ExecutionResult::skipped("a_conflict");
            }
            Err(e) => {
                warn!(pair = ?key, error = %e, "venue-a leg failed");
                self.set_cooldown(&key, self.cfg.cooldown_base_cycles);
                return ExecutionResult::error("a_leg_failed");
            }
        };

        sleep(self.cfg.fill_settle_delay).await;
        let a_filled = self.venue_a.get_actual_fill(&a_order_id, sizing.units).await;

        if a_filled > 0 && a_filled < sizing.units {
            if let Err(e) = self.venue_a.cancel_order(&a_order_id).await {
                warn!(pair = ?key, order_id = %a_order_id, error = %e, "failed to cancel resting venue-a remainder after partial fill");
            }
        }

        if a_filled == 0 {
            self.set_cooldown(&key, self.cfg.cooldown_no_fill_cycles.max(self.cfg.cooldown_base_cycles));
            return ExecutionResult {
                venue_a_order_id: Some(a_order_id),
                ..ExecutionResult::skipped("a_no_fill")
            };
        }

        // --- Leg B, sized to what A actually filled ---
        let b_order_id = match self
            .venue_b
            .place_order(
                opp.pair.venue_b.token_id(opp.venue_b_side).unwrap_or(&opp.pair.venue_b.platform_id),
                opp.venue_b_side,
                a_filled,
                sizing.effective_venue_b_cents,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(pair = ?key, error = %e, "venue-b leg failed outright, unwinding venue-a fill");
                let recovered = self.unwind_venue_a(&opp.pair.venue_a.platform_id, opp.venue_a_side, a_filled).await;
                self.set_cooldown(&key, 2 * self.cfg.cooldown_base_cycles);
                return ExecutionResult {
                    status: ExecutionStatus::Unwound,
                    reason: Some("b_zero_fill"),
                    units: a_filled,
                    venue_a_order_id: Some(a_order_id),
                    venue_b_order_id: None,
                    venue_a_cost_usd: a_filled as f64 * opp.venue_a_cost_cents / 100.0,
                    venue_b_cost_usd: 0.0,
                    total_cost_usd: a_filled as f64 * opp.venue_a_cost_cents / 100.0,
                    guaranteed_profit_usd: 0.0,
                    unwind_recovered_usd: recovered,
                    venue_a_balance: BalanceSnapshot { before: venue_a_balance_before, after: None },
                    venue_b_balance: BalanceSnapshot { before: venue_b_balance_before, after: None },
                };
            }
        };

        sleep(self.cfg.fill_settle_delay).await;
        let b_filled = self.venue_b.get_actual_fill(&b_order_id, a_filled).await;

        *self.units_committed.lock().entry(key.clone()).or_insert(0) += a_filled.min(b_filled);

        let venue_a_balance_after = self.venue_a.get_balance().await.ok();
        let venue_b_balance_after = self.venue_b.get_balance().await.ok();
        self.warn_on_balance_drift("venue-a", venue_a_balance_before, venue_a_balance_after, a_filled as f64 * opp.venue_a_cost_cents / 100.0);
        self.warn_on_balance_drift("venue-b", venue_b_balance_before, venue_b_balance_after, b_filled as f64 * sizing.effective_venue_b_cents / 100.0);

        let venue_a_cost_usd = a_filled as f64 * opp.venue_a_cost_cents / 100.0;
        let venue_b_cost_usd = b_filled as f64 * sizing.effective_venue_b_cents / 100.0;
        let total_cost_usd = venue_a_cost_usd + venue_b_cost_usd;
        let guaranteed_units = a_filled.min(b_filled);
        // Recompute against the effective Venue-B price, not the opportunity's original quote —
        // a ladder walk can leave a smaller realized spread than what was first detected.
        let effective_spread_cents = 100.0 - opp.venue_a_cost_cents - sizing.effective_venue_b_cents;
        let fee_usd = guaranteed_units as f64 * self.cfg.venue_a_taker_fee_rate;
        let guaranteed_profit_usd = guaranteed_units as f64 * effective_spread_cents / 100.0 - fee_usd;

        let balances = (
            BalanceSnapshot { before: venue_a_balance_before, after: venue_a_balance_after },
            BalanceSnapshot { before: venue_b_balance_before, after: venue_b_balance_after },
        );

        if b_filled < a_filled {
            // Open Question (c): the A-side surplus above B's fill is left unhedged intentionally,
            // matching the source's own unresolved behavior. No automated unwind for this case.
            warn!(
                pair = ?key,
                a_filled, b_filled,
                "venue-b partial fill leaves unhedged venue-a surplus"
            );
            return ExecutionResult {
                status: ExecutionStatus::PartialStuck,
                reason: Some("b_partial_fill"),
                units: guaranteed_units,
                venue_a_order_id: Some(a_order_id),
                venue_b_order_id: Some(b_order_id),
                venue_a_cost_usd,
                venue_b_cost_usd,
                total_cost_usd,
                guaranteed_profit_usd,
                unwind_recovered_usd: 0.0,
                venue_a_balance: balances.0,
                venue_b_balance: balances.1,
            };
        }

        info!(
            pair = ?key,
            units = guaranteed_units,
            profit_usd = guaranteed_profit_usd,
            "trade filled"
        );

        ExecutionResult {
            status: ExecutionStatus::Filled,
            reason: None,
            units: guaranteed_units,
            venue_a_order_id: Some(a_order_id),
            venue_b_order_id: Some(b_order_id),
            venue_a_cost_usd,
            venue_b_cost_usd,
            total_cost_usd,
            guaranteed_profit_usd,
            unwind_recovered_usd: 0.0,
            venue_a_balance: balances.0,
            venue_b_balance: balances.1,
        }
    }

    /// Attempts to flatten a stranded Venue-A fill by selling the opposite side back, up to
    /// `unwind_max_attempts` times with a fixed delay between tries. Returns the estimated dollars
    /// recovered (0.0 if every attempt failed, in which case the position stays open and is logged
    /// for manual intervention).
    async fn unwind_venue_a(&self, platform_id: &str, filled_side: crate::market::Side, units: u64) -> f64 {
        for attempt in 1..=self.cfg.unwind_max_attempts {
            let bid = self.venue_a.get_market_bid(platform_id, filled_side).await;
            let sell_price = bid.unwrap_or(1.0).floor().max(1.0);
            match self
                .venue_a
                .place_order(platform_id, filled_side.opposite(), units, sell_price)
                .await
            {
                Ok(_) => {
                    info!(platform_id, attempt, sell_price, "unwound stranded venue-a fill");
                    return units as f64 * sell_price / 100.0;
                }
                Err(e) => {
                    warn!(platform_id, attempt, error = %e, "unwind attempt failed");
                    if attempt < self.cfg.unwind_max_attempts {
                        sleep(self.cfg.unwind_retry_delay).await;
                    }
                }
            }
        }
        warn!(platform_id, units, "unwind exhausted all attempts, position remains open");
        0.0
    }

    fn warn_on_balance_drift(&self, venue: &str, before: Option<f64>, after: Option<f64>, expected_cost: f64) {
        if let (Some(b), Some(a)) = (before, after) {
            let actual_delta = (b - a).abs();
            let drift = (actual_delta - expected_cost).abs();
            if drift > self.cfg.balance_reconciliation_tolerance_usd {
                warn!(venue, expected_cost, actual_delta, drift, "balance reconciliation mismatch");
            }
        }
    }
}

#[async_trait]
impl TradeExecutor for ArbExecutor {
    async fn execute(&self, opp: &Opportunity) -> ExecutionResult {
        self.execute_inner(opp).await
    }

    fn advance_cycle(&self) {
        self.cycle.fetch_add(1, Ordering::SeqCst);
    }
}
