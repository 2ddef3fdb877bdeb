//! Environment-driven configuration. Defaults mirror `scanner/config.py` and the worked scenarios
//! in the spec's testable-properties section.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// One `(name, lo, hi)` profit tier. `hi` is exclusive, except the last configured tier, whose
/// upper bound is treated as open (+infinity) by `Config::classify_tier`.
#[derive(Debug, Clone, Copy)]
pub struct TierBound {
    pub name: crate::market::Tier,
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone)]
pub struct Config {
    // --- timing ---
    pub market_refresh_interval: Duration,
    pub price_poll_interval: Duration,
    pub scan_window_hours: f64,
    pub resolution_time_tolerance_hours: f64,
    pub schedule_lookahead_hours: f64,
    pub catalog_retry_delay: Duration,

    // --- matching ---
    pub crypto_matching_enabled: bool,

    // --- opportunity finder ---
    pub min_spread_cents: f64,
    pub min_price_cents: f64,
    pub profit_tiers: Vec<TierBound>,
    pub skip_unverified_matches: bool,

    // --- sizing / executor ---
    pub max_trade_usd: f64,
    pub venue_b_min_leg_usd: f64,
    pub per_market_unit_cap: u64,
    pub cooldown_base_cycles: u64,
    pub cooldown_no_fill_cycles: u64,
    pub venue_a_taker_fee_rate: f64,
    pub unwind_retry_delay: Duration,
    pub unwind_max_attempts: u32,
    pub fill_settle_delay: Duration,
    pub balance_reconciliation_tolerance_usd: f64,

    // --- paper mode ---
    pub paper_capital_usd: f64,
    pub paper_venue_a_ratio: f64,

    // --- http / concurrency ---
    pub http_timeout: Duration,
    pub schedule_oracle_timeout: Duration,
    pub fetch_worker_pool: usize,
    pub venue_b_rate_limit_window: Duration,
    pub venue_b_clob_rate_limit_per_window: u32,
    pub venue_b_gamma_rate_limit_per_window: u32,

    // --- credentials ---
    pub venue_a_api_key: Option<String>,
    pub venue_a_api_secret: Option<String>,
    pub venue_b_private_key: Option<String>,
    pub venue_b_api_key: Option<String>,
    pub venue_b_api_secret: Option<String>,
    pub venue_b_api_passphrase: Option<String>,
    pub venue_b_funder: Option<String>,
    pub schedule_oracle_api_key: Option<String>,

    // --- persistence ---
    pub live_db_path: String,
    pub paper_db_path: String,
}

impl Default for Config {
    fn default() -> Self {
        use crate::market::Tier::*;
        Self {
            market_refresh_interval: Duration::from_secs(env_or("MARKET_REFRESH_SECONDS", 7200)),
            price_poll_interval: Duration::from_secs(env_or("PRICE_POLL_SECONDS", 2)),
            scan_window_hours: env_or("SCAN_WINDOW_HOURS", 72.0),
            resolution_time_tolerance_hours: env_or("RESOLUTION_TIME_TOLERANCE_HOURS", 1.0),
            schedule_lookahead_hours: env_or("SCHEDULE_LOOKAHEAD_HOURS", 72.0),
            catalog_retry_delay: Duration::from_secs(30),

            crypto_matching_enabled: env_or("CRYPTO_MATCHING_ENABLED", false),

            min_spread_cents: env_or("MIN_SPREAD_CENTS", 0.8),
            min_price_cents: env_or("MIN_PRICE_CENTS", 1.0),
            profit_tiers: vec![
                TierBound { name: Low, lo: 0.8, hi: 1.5 },
                TierBound { name: Mid, lo: 1.5, hi: 2.5 },
                TierBound { name: High, lo: 2.5, hi: 5.5 },
                TierBound { name: UltraHigh, lo: 5.5, hi: f64::INFINITY },
            ],
            skip_unverified_matches: env_or("SKIP_UNVERIFIED_MATCHES", true),

            max_trade_usd: env_or("EXEC_MAX_TRADE_USD", 50.0),
            venue_b_min_leg_usd: env_or("EXEC_VENUE_B_MIN_ORDER_USD", 1.0),
            per_market_unit_cap: env_or("EXEC_PER_MARKET_UNIT_CAP", 2000),
            cooldown_base_cycles: env_or("EXEC_COOLDOWN_CYCLES", 5),
            cooldown_no_fill_cycles: env_or("EXEC_COOLDOWN_NO_FILL_CYCLES", 10),
            venue_a_taker_fee_rate: env_or("VENUE_A_TAKER_FEE_RATE", 0.0175),
            unwind_retry_delay: Duration::from_millis(
                (env_or::<f64>("EXEC_UNWIND_DELAY_SECONDS", 3.0) * 1000.0) as u64,
            ),
            unwind_max_attempts: env_or("EXEC_UNWIND_MAX_ATTEMPTS", 3),
            fill_settle_delay: Duration::from_millis(500),
            balance_reconciliation_tolerance_usd: 0.50,

            paper_capital_usd: env_or("PAPER_CAPITAL_USD", 20_000.0),
            paper_venue_a_ratio: env_or("PAPER_VENUE_A_RATIO", 0.5),

            http_timeout: Duration::from_secs_f64(env_or("HTTP_TIMEOUT", 15.0)),
            schedule_oracle_timeout: Duration::from_secs(12),
            fetch_worker_pool: env_or("FETCH_WORKERS", 20),
            venue_b_rate_limit_window: Duration::from_secs(10),
            venue_b_clob_rate_limit_per_window: env_or("VENUE_B_CLOB_RATE_LIMIT", 500),
            venue_b_gamma_rate_limit_per_window: env_or("VENUE_B_GAMMA_RATE_LIMIT", 75),

            venue_a_api_key: env_opt("VENUE_A_API_KEY"),
            venue_a_api_secret: env_opt("VENUE_A_API_SECRET"),
            venue_b_private_key: env_opt("VENUE_B_PRIVATE_KEY"),
            venue_b_api_key: env_opt("VENUE_B_API_KEY"),
            venue_b_api_secret: env_opt("VENUE_B_API_SECRET"),
            venue_b_api_passphrase: env_opt("VENUE_B_API_PASSPHRASE"),
            venue_b_funder: env_opt("VENUE_B_FUNDER"),
            schedule_oracle_api_key: env_opt("SCHEDULE_ORACLE_API_KEY"),

            live_db_path: std::env::var("LIVE_DB_PATH").unwrap_or_else(|_| "arb_live.db".into()),
            paper_db_path: std::env::var("PAPER_DB_PATH")
                .unwrap_or_else(|_| "arb_paper.db".into()),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::default()
    }

    /// First configured tier whose `[lo, hi)` contains `spread`. The last tier's upper bound is
    /// always treated as open, matching the Python source's `math.inf` top tier.
    pub fn classify_tier(&self, spread_cents: f64) -> Option<crate::market::Tier> {
        let n = self.profit_tiers.len();
        for (i, t) in self.profit_tiers.iter().enumerate() {
            let hi_open = i == n - 1;
            if spread_cents >= t.lo && (hi_open || spread_cents < t.hi) {
                return Some(t.name);
            }
        }
        None
    }

    pub fn venue_a_credentials(&self) -> Option<(&str, &str)> {
        match (&self.venue_a_api_key, &self.venue_a_api_secret) {
            (Some(k), Some(s)) => Some((k, s)),
            _ => None,
        }
    }

    pub fn venue_b_credentials(&self) -> Option<&str> {
        self.venue_b_private_key.as_deref()
    }
}
