//! Venue-neutral entities: `Market`, `MatchedPair`, `Opportunity`, `ExecutionResult`.
//!
//! Grounded on `scanner/models.py`'s dataclasses, rewritten per design note 9: optional price
//! fields stay as `Option`, but every identifier that was a loosely-typed string in the source
//! (platform name, side, tier) becomes a closed enum here so mismatches are caught at compile
//! time rather than via a runtime string comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the two exchanges being arbitraged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    VenueA,
    VenueB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCategory {
    Crypto,
    Sports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SportSubtype {
    Series,
    Map,
}

/// The side of a binary market: the "yes" or "no" outcome token/contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

/// One (price, total size) rung of an ask ladder, sorted ascending by price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AskLevel {
    pub price_cents: f64,
    pub size_units: f64,
}

/// Crypto-only classification fields. `None` on a sports market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoFields {
    pub asset: String,
    pub direction: Direction,
    pub threshold: f64,
}

/// Sports-only classification fields. `None` on a crypto market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportsFields {
    pub sport: String,
    pub team: String,
    pub opponent: String,
    pub sport_subtype: SportSubtype,
    pub event_id: String,
    pub map_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Classification {
    Crypto(CryptoFields),
    Sports(SportsFields),
}

impl Classification {
    pub fn category(&self) -> MarketCategory {
        match self {
            Classification::Crypto(_) => MarketCategory::Crypto,
            Classification::Sports(_) => MarketCategory::Sports,
        }
    }
}

/// Venue-neutral representation of one binary outcome market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub platform: Platform,
    /// Unique within the venue. For Venue-B sports markets this is a synthetic id:
    /// `{event_id}_{normalized_team}`.
    pub platform_id: String,
    pub platform_url: String,
    pub raw_question: String,
    pub classification: Classification,
    pub resolution_dt: DateTime<Utc>,

    pub yes_ask_cents: Option<f64>,
    pub no_ask_cents: Option<f64>,
    pub yes_bid_cents: Option<f64>,
    pub no_bid_cents: Option<f64>,

    pub yes_ask_depth: Option<f64>,
    pub no_ask_depth: Option<f64>,

    /// Full ask ladder, Venue-B only. Empty on Venue-A markets.
    pub yes_ask_levels: Vec<AskLevel>,
    pub no_ask_levels: Vec<AskLevel>,

    /// Venue-B token refs. `None` on Venue-A markets.
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
}

impl Market {
    pub fn category(&self) -> MarketCategory {
        self.classification.category()
    }

    pub fn ask_cents(&self, side: Side) -> Option<f64> {
        match side {
            Side::Yes => self.yes_ask_cents,
            Side::No => self.no_ask_cents,
        }
    }

    pub fn bid_cents(&self, side: Side) -> Option<f64> {
        match side {
            Side::Yes => self.yes_bid_cents,
            Side::No => self.no_bid_cents,
        }
    }

    pub fn ask_depth(&self, side: Side) -> Option<f64> {
        match side {
            Side::Yes => self.yes_ask_depth,
            Side::No => self.no_ask_depth,
        }
    }

    pub fn ask_levels(&self, side: Side) -> &[AskLevel] {
        match side {
            Side::Yes => &self.yes_ask_levels,
            Side::No => &self.no_ask_levels,
        }
    }

    pub fn token_id(&self, side: Side) -> Option<&str> {
        match side {
            Side::Yes => self.yes_token_id.as_deref(),
            Side::No => self.no_token_id.as_deref(),
        }
    }

    /// In-place replacement of the live price/depth/ladder fields, used every fast tick. Identity
    /// and classification fields are untouched.
    pub fn apply_live_prices(&mut self, live: LivePrice) {
        self.yes_ask_cents = live.yes_ask_cents;
        self.no_ask_cents = live.no_ask_cents;
        self.yes_bid_cents = live.yes_bid_cents;
        self.no_bid_cents = live.no_bid_cents;
        self.yes_ask_depth = live.yes_ask_depth;
        self.no_ask_depth = live.no_ask_depth;
        if let Some(levels) = live.yes_ask_levels {
            self.yes_ask_levels = levels;
        }
        if let Some(levels) = live.no_ask_levels {
            self.no_ask_levels = levels;
        }
    }
}

/// Result of a `FetchLivePrices` call for one market. A `None` field means the venue adapter could
/// not obtain that value this cycle — it never aborts the whole fetch.
#[derive(Debug, Clone, Default)]
pub struct LivePrice {
    pub yes_ask_cents: Option<f64>,
    pub no_ask_cents: Option<f64>,
    pub yes_bid_cents: Option<f64>,
    pub no_bid_cents: Option<f64>,
    pub yes_ask_depth: Option<f64>,
    pub no_ask_depth: Option<f64>,
    pub yes_ask_levels: Option<Vec<AskLevel>>,
    pub no_ask_levels: Option<Vec<AskLevel>>,
}

/// Two `Market`s, one per venue, found equivalent by the matcher.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub venue_a: Market,
    pub venue_b: Market,
}

impl MatchedPair {
    pub fn earlier_resolution(&self) -> DateTime<Utc> {
        self.venue_a.resolution_dt.min(self.venue_b.resolution_dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Low,
    Mid,
    High,
    UltraHigh,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Low => "Low",
            Tier::Mid => "Mid",
            Tier::High => "High",
            Tier::UltraHigh => "UltraHigh",
        }
    }
}

/// A priced trading decision snapshot: a fully evaluated strategy against one `MatchedPair`.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub pair: MatchedPair,
    pub venue_a_side: Side,
    pub venue_b_side: Side,
    pub venue_a_cost_cents: f64,
    pub venue_b_cost_cents: f64,
    pub combined_cost_cents: f64,
    pub spread_cents: f64,
    pub tier: Tier,
    pub hours_to_close: f64,
    pub detected_at: DateTime<Utc>,
    pub venue_a_depth: Option<f64>,
    pub venue_b_depth: Option<f64>,
    pub venue_b_ask_levels: Vec<AskLevel>,
}

impl Opportunity {
    /// `(a_id, b_id)` — the cooldown/unit-tally key, and the natural persistence key.
    pub fn pair_key(&self) -> (String, String) {
        (
            self.pair.venue_a.platform_id.clone(),
            self.pair.venue_b.platform_id.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Filled,
    Skipped,
    Unwound,
    PartialStuck,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Filled => "filled",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Unwound => "unwound",
            ExecutionStatus::PartialStuck => "partial_stuck",
            ExecutionStatus::Error => "error",
        }
    }
}

/// Pre- and post-trade balance snapshot on one venue, used for reconciliation warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceSnapshot {
    pub before: Option<f64>,
    pub after: Option<f64>,
}

/// The outcome of one `execute(opportunity)` call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub reason: Option<&'static str>,
    pub units: u64,
    pub venue_a_order_id: Option<String>,
    pub venue_b_order_id: Option<String>,
    pub venue_a_cost_usd: f64,
    pub venue_b_cost_usd: f64,
    pub total_cost_usd: f64,
    pub guaranteed_profit_usd: f64,
    pub unwind_recovered_usd: f64,
    pub venue_a_balance: BalanceSnapshot,
    pub venue_b_balance: BalanceSnapshot,
}

impl ExecutionResult {
    pub fn skipped(reason: &'static str) -> Self {
        Self {
            status: ExecutionStatus::Skipped,
            reason: Some(reason),
            units: 0,
            venue_a_order_id: None,
            venue_b_order_id: None,
            venue_a_cost_usd: 0.0,
            venue_b_cost_usd: 0.0,
            total_cost_usd: 0.0,
            guaranteed_profit_usd: 0.0,
            unwind_recovered_usd: 0.0,
            venue_a_balance: BalanceSnapshot::default(),
            venue_b_balance: BalanceSnapshot::default(),
        }
    }

    pub fn error(reason: &'static str) -> Self {
        Self {
            status: ExecutionStatus::Error,
            ..Self::skipped(reason)
        }
    }
}
