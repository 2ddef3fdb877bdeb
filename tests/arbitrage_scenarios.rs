//! End-to-end scenarios against the public pipeline: matcher -> finder -> sizing -> executor.
//!
//! Each test below is one of the worked examples used to validate the sizing and executor
//! behavior during development (happy fill, zero-fill unwind, conflict cooldown, and the two
//! book-walk sizing cases).

use async_trait::async_trait;
use dualmkt_arb::config::Config;
use dualmkt_arb::error::VenueError;
use dualmkt_arb::executor::{ArbExecutor, TradeExecutor};
use dualmkt_arb::market::{
    AskLevel, Classification, CryptoFields, Direction, ExecutionStatus, LivePrice, Market,
    MatchedPair, Opportunity, Platform, Side, Tier,
};
use dualmkt_arb::sizing;
use dualmkt_arb::venues::{OrderClient, OrderState, OrderStatus, VenueClient};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn market(platform: Platform, yes_ask: f64, no_ask: f64, depth: f64) -> Market {
    Market {
        platform,
        platform_id: format!("{:?}-mkt", platform),
        platform_url: String::new(),
        raw_question: String::new(),
        classification: Classification::Crypto(CryptoFields {
            asset: "BTC".into(),
            direction: Direction::Above,
            threshold: 100_000.0,
        }),
        resolution_dt: Utc::now() + ChronoDuration::hours(24),
        yes_ask_cents: Some(yes_ask),
        no_ask_cents: Some(no_ask),
        yes_bid_cents: Some(yes_ask - 2.0),
        no_bid_cents: Some(no_ask - 2.0),
        yes_ask_depth: Some(depth),
        no_ask_depth: Some(depth),
        yes_ask_levels: Vec::new(),
        no_ask_levels: Vec::new(),
        yes_token_id: Some("tok-yes".into()),
        no_token_id: Some("tok-no".into()),
    }
}

fn opportunity(a: Market, b: Market, a_side: Side, b_side: Side) -> Opportunity {
    let a_cost = a.ask_cents(a_side).unwrap();
    let b_cost = b.ask_cents(b_side).unwrap();
    Opportunity {
        venue_a_cost_cents: a_cost,
        venue_b_cost_cents: b_cost,
        combined_cost_cents: a_cost + b_cost,
        spread_cents: 100.0 - a_cost - b_cost,
        tier: Tier::UltraHigh,
        hours_to_close: 24.0,
        detected_at: Utc::now(),
        venue_a_depth: a.ask_depth(a_side),
        venue_b_depth: b.ask_depth(b_side),
        venue_b_ask_levels: b.ask_levels(b_side).to_vec(),
        pair: MatchedPair { venue_a: a, venue_b: b },
        venue_a_side: a_side,
        venue_b_side: b_side,
    }
}

struct MockVenue {
    balance: f64,
    place_result: Result<(), VenueError>,
    fill_units: u64,
    bid_cents: f64,
    calls: AtomicU64,
}

impl MockVenue {
    fn ok(balance: f64, fill_units: u64) -> Self {
        Self { balance, place_result: Ok(()), fill_units, bid_cents: 48.0, calls: AtomicU64::new(0) }
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn list_markets(&self, _scan_window_hours: f64) -> Result<Vec<Market>, VenueError> {
        Ok(Vec::new())
    }
    async fn fetch_live_prices(&self, _ids: &[String]) -> HashMap<String, LivePrice> {
        HashMap::new()
    }
}

#[async_trait]
impl OrderClient for MockVenue {
    async fn get_balance(&self) -> Result<f64, VenueError> {
        Ok(self.balance)
    }

    async fn place_order(&self, _id: &str, _side: Side, _count: u64, _price_cents: f64) -> Result<String, VenueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.place_result {
            Ok(()) => Ok("order-1".to_string()),
            Err(VenueError::Conflict(m)) => Err(VenueError::Conflict(m.clone())),
            Err(_) => Err(VenueError::Request("mock rejection".into())),
        }
    }

    async fn get_order(&self, _order_id: &str) -> Result<OrderStatus, VenueError> {
        Ok(OrderStatus { state: OrderState::Filled, filled_units: Some(self.fill_units) })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), VenueError> {
        Ok(())
    }

    async fn get_actual_fill(&self, _order_id: &str, estimated_size: u64) -> u64 {
        self.fill_units.min(estimated_size)
    }

    async fn get_market_bid(&self, _platform_id: &str, _side: Side) -> Option<f64> {
        Some(self.bid_cents)
    }
}

/// Scenario 1 ("Happy Strategy-A fill"): both legs fill in full, result is `Filled` with a
/// positive guaranteed profit and both order ids recorded.
#[tokio::test]
async fn happy_path_fills_both_legs() {
    let a = market(Platform::VenueA, 51.0, 48.0, 200.0);
    let b = market(Platform::VenueB, 44.0, 40.0, 200.0);
    let opp = opportunity(a, b, Side::Yes, Side::No);
    assert!(opp.spread_cents >= Config::default().min_spread_cents);

    let mut cfg = Config::default();
    cfg.max_trade_usd = 5.0;

    let venue_a = Arc::new(MockVenue::ok(1000.0, 5));
    let venue_b = Arc::new(MockVenue::ok(1000.0, 5));
    let exec = ArbExecutor::new(venue_a, venue_b, cfg);

    let result = exec.execute(&opp).await;
    assert_eq!(result.status, ExecutionStatus::Filled);
    assert_eq!(result.units, 5);
    assert!(result.guaranteed_profit_usd > 0.0);
    assert!(result.venue_a_order_id.is_some());
    assert!(result.venue_b_order_id.is_some());
}

/// Scenario 2: Venue-B returns an order id but fills zero units, so the executor unwinds the
/// Venue-A leg and reports `Unwound` with the stranded units and a long cooldown.
#[tokio::test]
async fn venue_b_zero_fill_unwinds_venue_a() {
    let a = market(Platform::VenueA, 51.0, 48.0, 200.0);
    let b = market(Platform::VenueB, 44.0, 40.0, 200.0);
    let opp = opportunity(a, b, Side::Yes, Side::No);

    let mut cfg = Config::default();
    cfg.max_trade_usd = 5.0;

    let venue_a = Arc::new(MockVenue::ok(1000.0, 5));
    let mut venue_b_mock = MockVenue::ok(1000.0, 0);
    venue_b_mock.place_result = Err(VenueError::Request("size_matched=0".into()));
    let venue_b = Arc::new(venue_b_mock);

    let exec = ArbExecutor::new(venue_a, venue_b, cfg);
    let result = exec.execute(&opp).await;

    assert_eq!(result.status, ExecutionStatus::Unwound);
    assert_eq!(result.reason, Some("b_zero_fill"));
    assert_eq!(result.units, 5);
    assert!(result.venue_b_order_id.is_none());

    // Cooldown should now be long enough that an immediate retry is skipped.
    let retry = exec.execute(&opp).await;
    assert_eq!(retry.reason, Some("cooldown_active"));
}

/// Scenario 4: a Venue-A conflict rejects the leg outright before any Venue-B order is placed,
/// and sets a 6x-base cooldown.
#[tokio::test]
async fn venue_a_conflict_skips_without_touching_venue_b() {
    let a = market(Platform::VenueA, 51.0, 48.0, 200.0);
    let b = market(Platform::VenueB, 44.0, 40.0, 200.0);
    let opp = opportunity(a, b, Side::Yes, Side::No);

    let mut venue_a_mock = MockVenue::ok(1000.0, 0);
    venue_a_mock.place_result = Err(VenueError::Conflict("order book moved".into()));
    let venue_a = Arc::new(venue_a_mock);
    let venue_b = Arc::new(MockVenue::ok(1000.0, 5));

    let exec = ArbExecutor::new(venue_a, venue_b.clone(), Config::default());
    let result = exec.execute(&opp).await;

    assert_eq!(result.status, ExecutionStatus::Skipped);
    assert_eq!(result.reason, Some("a_conflict"));
    assert_eq!(venue_b.calls.load(Ordering::SeqCst), 0);
}

/// Scenario 5: book-walk sizing across two ladder rungs still clears the spread threshold, so
/// the full unit count is kept at the blended price.
#[test]
fn sizing_book_walk_keeps_full_size_when_still_profitable() {
    let mut cfg = Config::default();
    cfg.max_trade_usd = 50.0;
    cfg.venue_a_taker_fee_rate = 0.0;
    cfg.venue_b_min_leg_usd = 1.0;

    let a = market(Platform::VenueA, 72.0, 72.0, 1000.0);
    let mut b = market(Platform::VenueB, 18.0, 18.0, 5.0);
    b.yes_ask_levels = vec![
        AskLevel { price_cents: 18.0, size_units: 5.0 },
        AskLevel { price_cents: 20.0, size_units: 10.0 },
    ];
    let opp = opportunity(a, b, Side::Yes, Side::Yes);

    let result = sizing::calculate_units(&opp, &cfg, 0);
    assert_eq!(result.units, 6);
    assert!((result.effective_venue_b_cents - 18.333).abs() < 0.01);
}

/// Scenario 6: the same shape, but the next ladder rung is far enough above top-of-book that
/// walking it erases the edge entirely, so sizing shrinks to zero rather than trading at a loss.
#[test]
fn sizing_book_walk_collapses_to_zero_when_edge_erased() {
    let mut cfg = Config::default();
    cfg.max_trade_usd = 50.0;
    cfg.venue_a_taker_fee_rate = 0.0;
    cfg.venue_b_min_leg_usd = 1.0;

    let a = market(Platform::VenueA, 72.0, 72.0, 1000.0);
    let mut b = market(Platform::VenueB, 24.0, 24.0, 1.0);
    b.yes_ask_levels = vec![
        AskLevel { price_cents: 24.0, size_units: 1.0 },
        AskLevel { price_cents: 70.0, size_units: 100.0 },
    ];
    let opp = opportunity(a, b, Side::Yes, Side::Yes);

    let result = sizing::calculate_units(&opp, &cfg, 0);
    assert_eq!(result.units, 0);
}
