//! Position sizing (C6): how many units of an opportunity to buy.
//!
//! Grounded on the richer `_calc_units` called from `scanner/paper_executor.py` and exercised by
//! `tests/test_arb_executor.py`'s book-walk cases, per the Open Question (a) decision to follow
//! the ladder-aware version rather than the thinner top-of-book-only one. Pure function: no I/O,
//! no mutable state, so it's testable directly against fixed inputs.

use crate::config::Config;
use crate::market::{AskLevel, Opportunity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingResult {
    pub units: u64,
    /// Average Venue-B price actually paid across the walked ladder, in cents. Equal to the
    /// opportunity's quoted `venue_b_cost_cents` when the full size filled at the top-of-book
    /// price; higher when the walk had to cross into deeper, costlier levels.
    pub effective_venue_b_cents: f64,
}

fn zero() -> SizingResult {
    SizingResult { units: 0, effective_venue_b_cents: 0.0 }
}

/// Sizing algorithm:
/// 1. Cap by `max_trade_usd` at the quoted top-of-book combined price.
/// 2. Cap that by Venue-A's quoted depth and by the per-market unit tally already committed this
///    session — this is the `ceiling`: the most units any later step is allowed to ask for.
/// 3. Further cap by Venue-B's top-of-book depth — this is `max_by_depth`, the most units
///    fillable *without* walking the book.
/// 4. If `max_by_depth` already clears Venue-B's minimum-notional unit count, trade
///    `max_by_depth` units at the top-of-book price; no walk needed.
/// 5. Otherwise, the top-of-book alone can't support a minimum-sized order. If Venue-B published
///    an ask ladder and the ceiling and total ladder depth both cover the minimum count, walk the
///    ladder for exactly that many units (never more — the walk exists to clear the minimum, not
///    to maximize size) and use the blended price.
/// 6. Recompute the spread against the blended (or top-of-book) price; if it no longer clears
///    `min_spread_cents`, the edge is gone (or too thin to be worth it): return zero rather than
///    trading into it.
pub fn calculate_units(
    opp: &Opportunity,
    cfg: &Config,
    units_committed_this_market: u64,
) -> SizingResult {
    let a_price = opp.venue_a_cost_cents;
    let b_price = opp.venue_b_cost_cents;
    if a_price <= 0.0 || b_price <= 0.0 {
        return zero();
    }

    let combined_dollars_per_unit = (a_price + b_price) / 100.0;
    if combined_dollars_per_unit <= 0.0 {
        return zero();
    }
    let max_by_usd = (cfg.max_trade_usd / combined_dollars_per_unit).floor() as u64;

    let mut ceiling = max_by_usd;
    if let Some(a_depth) = opp.venue_a_depth {
        ceiling = ceiling.min(a_depth.floor() as u64);
    }
    let remaining_cap = cfg.per_market_unit_cap.saturating_sub(units_committed_this_market);
    ceiling = ceiling.min(remaining_cap);

    let mut max_by_depth = ceiling;
    if let Some(b_depth) = opp.venue_b_depth {
        max_by_depth = max_by_depth.min(b_depth.floor() as u64);
    }

    let min_for_b = (cfg.venue_b_min_leg_usd * 100.0 / b_price).ceil() as u64;
    let min_for_b = min_for_b.max(1);

    let (units, effective_price) = if max_by_depth >= min_for_b && max_by_depth >= 1 {
        (max_by_depth, b_price)
    } else if opp.venue_b_ask_levels.is_empty() || min_for_b > ceiling {
        return zero();
    } else {
        let ladder_depth: f64 = opp.venue_b_ask_levels.iter().map(|l| l.size_units).sum();
        if (ladder_depth.floor() as u64) < min_for_b {
            return zero();
        }
        (min_for_b, walk_ladder(&opp.venue_b_ask_levels, min_for_b as f64))
    };

    if 100.0 - a_price - effective_price < cfg.min_spread_cents {
        return zero();
    }

    SizingResult { units, effective_venue_b_cents: effective_price }
}

/// Size-weighted average price to fill `size` units by consuming ascending-price ladder rungs in
/// order. If the ladder doesn't have enough depth, the remainder is priced at the last rung (the
/// worst available price) rather than treated as free or infinite.
fn walk_ladder(levels: &[AskLevel], size: f64) -> f64 {
    let mut remaining = size;
    let mut cost = 0.0;
    let mut last_price = levels.last().map(|l| l.price_cents).unwrap_or(100.0);

    for level in levels {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(level.size_units);
        cost += take * level.price_cents;
        remaining -= take;
        last_price = level.price_cents;
    }
    if remaining > 0.0 {
        cost += remaining * last_price;
    }
    cost / size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Classification, CryptoFields, Direction, Market, MatchedPair, Platform, Side, Tier};
    use chrono::{Duration as ChronoDuration, Utc};

    fn base_market(platform: Platform) -> Market {
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

    fn base_opp() -> Opportunity {
        Opportunity {
            pair: MatchedPair {
                venue_a: base_market(Platform::VenueA),
                venue_b: base_market(Platform::VenueB),
            },
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
    fn caps_by_budget() {
        let cfg = Config::default();
        let opp = base_opp();
        let result = calculate_units(&opp, &cfg, 0);
        let expected = (cfg.max_trade_usd / 0.80).floor() as u64;
        assert_eq!(result.units, expected);
    }

    #[test]
    fn caps_by_depth() {
        let cfg = Config::default();
        let mut opp = base_opp();
        opp.venue_a_depth = Some(10.0);
        let result = calculate_units(&opp, &cfg, 0);
        assert_eq!(result.units, 10);
    }

    #[test]
    fn respects_per_market_unit_cap() {
        let cfg = Config::default();
        let opp = base_opp();
        let result = calculate_units(&opp, &cfg, cfg.per_market_unit_cap - 3);
        assert_eq!(result.units, 3);
    }

    #[test]
    fn ladder_walk_raises_effective_price_for_deep_fills() {
        let levels = vec![
            AskLevel { price_cents: 40.0, size_units: 5.0 },
            AskLevel { price_cents: 45.0, size_units: 20.0 },
        ];
        let avg = walk_ladder(&levels, 10.0);
        assert!(avg > 40.0 && avg < 45.0);
    }

    #[test]
    fn walks_ladder_when_top_of_book_below_minimum() {
        // Top-of-book only has 2 units, below the $1 minimum at 40c (ceil(100/40) = 3), so the
        // walk pulls one more unit from the next (costlier) rung to reach exactly 3.
        let cfg = Config::default();
        let mut opp = base_opp();
        opp.venue_a_cost_cents = 49.0;
        opp.venue_a_depth = Some(1000.0);
        opp.venue_b_depth = Some(2.0);
        opp.venue_b_ask_levels = vec![
            AskLevel { price_cents: 40.0, size_units: 2.0 },
            AskLevel { price_cents: 60.0, size_units: 1000.0 },
        ];
        let result = calculate_units(&opp, &cfg, 0);
        assert_eq!(result.units, 3);
        assert!(result.effective_venue_b_cents > 40.0);
    }

    #[test]
    fn rejects_positive_spread_below_minimum() {
        // Combined cost is 99.5c, a 0.5c spread — positive, but under the default 0.8c floor.
        let cfg = Config::default();
        let mut opp = base_opp();
        opp.venue_a_cost_cents = 60.0;
        opp.venue_b_cost_cents = 39.5;
        let result = calculate_units(&opp, &cfg, 0);
        assert_eq!(result.units, 0);
    }

    #[test]
    fn walk_rejected_when_blend_erases_edge() {
        let cfg = Config::default();
        let mut opp = base_opp();
        opp.venue_a_cost_cents = 72.0;
        opp.venue_b_cost_cents = 24.0;
        opp.venue_a_depth = Some(300.0);
        opp.venue_b_depth = Some(1.0);
        opp.venue_b_ask_levels = vec![
            AskLevel { price_cents: 24.0, size_units: 1.0 },
            AskLevel { price_cents: 70.0, size_units: 100.0 },
        ];
        let result = calculate_units(&opp, &cfg, 0);
        assert_eq!(result.units, 0);
    }
}
