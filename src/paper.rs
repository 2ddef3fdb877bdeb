//! Paper-trading executor (C8): mirrors `OrderClient`'s contract against a virtual wallet instead
//! of a live venue, so the same `Opportunity` pipeline can run in dry-run mode.
//!
//! Grounded on `scanner/paper_executor.py`'s `_PaperWallet` (starting capital split, synthesized
//! `PAPER-` order ids, best/worst trade tracking, `report()`).

use crate::config::Config;
use crate::error::VenueError;
use crate::executor::TradeExecutor;
use crate::market::{ExecutionResult, ExecutionStatus, Opportunity};
use crate::sizing;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

struct PaperWallet {
    venue_a_cash: f64,
    venue_b_cash: f64,
}

#[derive(Debug, Clone)]
pub struct PaperTradeRecord {
    pub pair_key: (String, String),
    pub units: u64,
    pub invested_usd: f64,
    pub gross_profit_usd: f64,
    pub fee_usd: f64,
    pub profit_usd: f64,
}

pub struct PaperExecutor {
    cfg: Config,
    wallet: Mutex<PaperWallet>,
    order_seq: AtomicU64,
    trades: Mutex<Vec<PaperTradeRecord>>,
}

impl PaperExecutor {
    pub fn new(cfg: Config) -> Self {
        let capital = cfg.paper_capital_usd;
        let ratio = cfg.paper_venue_a_ratio;
        let wallet = PaperWallet {
            venue_a_cash: capital * ratio,
            venue_b_cash: capital * (1.0 - ratio),
        };
        Self {
            cfg,
            wallet: Mutex::new(wallet),
            order_seq: AtomicU64::new(0),
            trades: Mutex::new(Vec::new()),
        }
    }

    fn next_order_id(&self) -> String {
        let n = self.order_seq.fetch_add(1, Ordering::SeqCst);
        format!("PAPER-{:08}", n)
    }

    /// Same leg-by-leg shape as `ArbExecutor::execute`, but against the wallet balances instead of
    /// live venues: both legs always "fill" at the quoted price since there is no real book to
    /// reject the order, matching the source's simplifying assumption for paper mode.
    pub fn fill(&self, opp: &Opportunity) -> ExecutionResult {
        let sizing = sizing::calculate_units(opp, &self.cfg, 0);
        if sizing.units == 0 {
            return ExecutionResult::skipped("sizing_too_small");
        }

        let venue_a_cost = sizing.units as f64 * opp.venue_a_cost_cents / 100.0;
        let venue_b_cost = sizing.units as f64 * sizing.effective_venue_b_cents / 100.0;

        let mut wallet = self.wallet.lock();
        if wallet.venue_a_cash < venue_a_cost || wallet.venue_b_cash < venue_b_cost {
            return ExecutionResult::skipped("insufficient_paper_capital");
        }
        let venue_a_before = wallet.venue_a_cash;
        let venue_b_before = wallet.venue_b_cash;
        wallet.venue_a_cash -= venue_a_cost;
        wallet.venue_b_cash -= venue_b_cost;
        let venue_a_after = wallet.venue_a_cash;
        let venue_b_after = wallet.venue_b_cash;
        drop(wallet);

        // Recompute against the effective Venue-B price, not the opportunity's original quote —
        // mirrors the live executor's reconciliation so paper and live profit accounting agree.
        let effective_spread_cents = 100.0 - opp.venue_a_cost_cents - sizing.effective_venue_b_cents;
        let gross_profit = sizing.units as f64 * effective_spread_cents / 100.0;
        // Paper mode charges the same Venue-A taker fee a live fill would, so the two modes'
        // profit accounting agree (Open Question: live previously left this fee undeducted too;
        // both paths now deduct it).
        let fee = sizing.units as f64 * self.cfg.venue_a_taker_fee_rate;
        let profit = gross_profit - fee;
        self.trades.lock().push(PaperTradeRecord {
            pair_key: opp.pair_key(),
            units: sizing.units,
            invested_usd: venue_a_cost + venue_b_cost,
            gross_profit_usd: gross_profit,
            fee_usd: fee,
            profit_usd: profit,
        });

        let a_order_id = self.next_order_id();
        let b_order_id = self.next_order_id();
        info!(
            pair = ?opp.pair_key(),
            units = sizing.units,
            profit_usd = profit,
            a_order_id,
            b_order_id,
            "paper trade filled"
        );

        ExecutionResult {
            status: ExecutionStatus::Filled,
            reason: None,
            units: sizing.units,
            venue_a_order_id: Some(a_order_id),
            venue_b_order_id: Some(b_order_id),
            venue_a_cost_usd: venue_a_cost,
            venue_b_cost_usd: venue_b_cost,
            total_cost_usd: venue_a_cost + venue_b_cost,
            guaranteed_profit_usd: profit,
            unwind_recovered_usd: 0.0,
            venue_a_balance: crate::market::BalanceSnapshot { before: Some(venue_a_before), after: Some(venue_a_after) },
            venue_b_balance: crate::market::BalanceSnapshot { before: Some(venue_b_before), after: Some(venue_b_after) },
        }
    }

    pub async fn get_balance_venue_a(&self) -> Result<f64, VenueError> {
        Ok(self.wallet.lock().venue_a_cash)
    }

    pub async fn get_balance_venue_b(&self) -> Result<f64, VenueError> {
        Ok(self.wallet.lock().venue_b_cash)
    }

    /// End-of-run summary: total trades, gross/fee/net profit breakdown, how much of the starting
    /// capital got deployed, realized ROI on deployed capital, and the best/worst single trade.
    pub fn report(&self) -> PaperReport {
        let trades = self.trades.lock();
        let total_invested: f64 = trades.iter().map(|t| t.invested_usd).sum();
        let total_gross_profit: f64 = trades.iter().map(|t| t.gross_profit_usd).sum();
        let total_fees: f64 = trades.iter().map(|t| t.fee_usd).sum();
        let total_profit: f64 = trades.iter().map(|t| t.profit_usd).sum();
        let best = trades.iter().cloned().max_by(|a, b| a.profit_usd.partial_cmp(&b.profit_usd).unwrap());
        let worst = trades.iter().cloned().min_by(|a, b| a.profit_usd.partial_cmp(&b.profit_usd).unwrap());
        let wallet = self.wallet.lock();
        let deployed_pct = if self.cfg.paper_capital_usd > 0.0 {
            total_invested / self.cfg.paper_capital_usd * 100.0
        } else {
            0.0
        };
        let roi_pct = if total_invested > 0.0 { total_profit / total_invested * 100.0 } else { 0.0 };
        PaperReport {
            total_trades: trades.len(),
            total_invested_usd: total_invested,
            total_gross_profit_usd: total_gross_profit,
            total_fees_usd: total_fees,
            total_profit_usd: total_profit,
            average_profit_usd: if trades.is_empty() { 0.0 } else { total_profit / trades.len() as f64 },
            deployed_pct,
            roi_pct,
            best_trade: best,
            worst_trade: worst,
            ending_venue_a_cash: wallet.venue_a_cash,
            ending_venue_b_cash: wallet.venue_b_cash,
        }
    }
}

#[async_trait]
impl TradeExecutor for PaperExecutor {
    async fn execute(&self, opp: &Opportunity) -> ExecutionResult {
        self.fill(opp)
    }
}

#[derive(Debug, Clone)]
pub struct PaperReport {
    pub total_trades: usize,
    pub total_invested_usd: f64,
    pub total_gross_profit_usd: f64,
    pub total_fees_usd: f64,
    pub total_profit_usd: f64,
    pub average_profit_usd: f64,
    /// Percentage of `paper_capital_usd` actually committed across all trades this session.
    pub deployed_pct: f64,
    /// `total_profit_usd` as a percentage of `total_invested_usd`.
    pub roi_pct: f64,
    pub best_trade: Option<PaperTradeRecord>,
    pub worst_trade: Option<PaperTradeRecord>,
    pub ending_venue_a_cash: f64,
    pub ending_venue_b_cash: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{
        Classification, CryptoFields, Direction, Market, MatchedPair, Platform, Side, Tier,
    };
    use chrono::{Duration as ChronoDuration, Utc};

    fn market(platform: Platform) -> Market {
        Market {
            platform,
            platform_id: "m".into(),
            platform_url: String::new(),
            raw_question: String::new(),
            classification: Classification::Crypto(CryptoFields {
                asset: "BTC".into(),
                direction: Direction::Above,
                threshold: 100_000.0,
            }),
            resolution_dt: Utc::now() + ChronoDuration::hours(24),
            yes_ask_cents: Some(40.0),
            no_ask_cents: Some(40.0),
            yes_bid_cents: None,
            no_bid_cents: None,
            yes_ask_depth: Some(1000.0),
            no_ask_depth: Some(1000.0),
            yes_ask_levels: Vec::new(),
            no_ask_levels: Vec::new(),
            yes_token_id: None,
            no_token_id: None,
        }
    }

    fn opp() -> Opportunity {
        Opportunity {
            pair: MatchedPair { venue_a: market(Platform::VenueA), venue_b: market(Platform::VenueB) },
            venue_a_side: Side::Yes,
            venue_b_side: Side::No,
            venue_a_cost_cents: 40.0,
            venue_b_cost_cents: 40.0,
            combined_cost_cents: 80.0,
            spread_cents: 20.0,
            tier: Tier::High,
            hours_to_close: 24.0,
            detected_at: Utc::now(),
            venue_a_depth: Some(1000.0),
            venue_b_depth: Some(1000.0),
            venue_b_ask_levels: Vec::new(),
        }
    }

    #[test]
    fn executes_and_deducts_both_wallets() {
        let paper = PaperExecutor::new(Config::default());
        let result = paper.fill(&opp());
        assert_eq!(result.status, ExecutionStatus::Filled);
        assert!(result.venue_a_order_id.unwrap().starts_with("PAPER-"));

        let report = paper.report();
        assert_eq!(report.total_trades, 1);
        assert!(report.total_profit_usd > 0.0);
    }

    #[test]
    fn deducts_venue_a_taker_fee_from_reported_profit() {
        let paper = PaperExecutor::new(Config::default());
        paper.fill(&opp());
        let report = paper.report();
        assert!(report.total_fees_usd > 0.0);
        assert_eq!(report.total_profit_usd, report.total_gross_profit_usd - report.total_fees_usd);
        assert!(report.total_profit_usd < report.total_gross_profit_usd);
        assert!(report.deployed_pct > 0.0);
    }

    #[test]
    fn stops_trading_when_capital_exhausted() {
        let mut cfg = Config::default();
        cfg.paper_capital_usd = 1.0;
        cfg.max_trade_usd = 1000.0;
        let paper = PaperExecutor::new(cfg);
        let result = paper.fill(&opp());
        assert_eq!(result.status, ExecutionStatus::Skipped);
    }
}
