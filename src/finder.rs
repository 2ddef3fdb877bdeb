//! Opportunity finder (C5): evaluates each matched pair under both strategies, classifies a
//! profit tier, and sorts the result for the executor to walk in priority order.
//!
//! Grounded on `scanner/opportunity_finder.py` (`_evaluate_strategy`, `_classify_tier`,
//! `log_pair_prices`, `format_opportunity_log`).

use crate::config::Config;
use crate::market::{Classification, MatchedPair, Opportunity, Side, Tier};
use crate::schedule::{CachedScheduleValidator, ScheduleVerdict};
use chrono::Utc;
use tracing::{info, warn};

/// Evaluates one `MatchedPair` under both (A=yes/B=no) and (A=no/B=yes) strategies and returns
/// whichever clears `min_spread_cents`, preferring the larger spread when both do.
///
/// For sports pairs, checks the pairing against `schedule` first: `NotFound` drops the pair
/// (unless `skip_unverified_matches` is turned off), `Unknown` lets it through since an oracle
/// outage shouldn't block an otherwise-valid trade, and crypto pairs skip the check entirely.
pub async fn evaluate_pair(
    pair: &MatchedPair,
    cfg: &Config,
    schedule: Option<&CachedScheduleValidator>,
) -> Option<Opportunity> {
    if let Classification::Sports(fields) = &pair.venue_a.classification {
        if let Some(validator) = schedule {
            let verdict = validator.verdict(&fields.sport, &fields.team, &fields.opponent).await;
            match verdict {
                ScheduleVerdict::NotFound if cfg.skip_unverified_matches => {
                    warn!(
                        sport = %fields.sport,
                        team = %fields.team,
                        opponent = %fields.opponent,
                        "schedule oracle could not find this pairing, dropping"
                    );
                    return None;
                }
                ScheduleVerdict::NotFound => {
                    warn!(
                        sport = %fields.sport,
                        team = %fields.team,
                        opponent = %fields.opponent,
                        "schedule oracle could not find this pairing, allowing anyway (SKIP_UNVERIFIED_MATCHES=false)"
                    );
                }
                ScheduleVerdict::Verified | ScheduleVerdict::Unknown => {}
            }
        }
    }

    let candidates = [
        evaluate_strategy(pair, Side::Yes, Side::No, cfg),
        evaluate_strategy(pair, Side::No, Side::Yes, cfg),
    ];

    candidates
        .into_iter()
        .flatten()
        .max_by(|a, b| a.spread_cents.partial_cmp(&b.spread_cents).unwrap())
}

fn evaluate_strategy(
    pair: &MatchedPair,
    venue_a_side: Side,
    venue_b_side: Side,
    cfg: &Config,
) -> Option<Opportunity> {
    let a_ask = pair.venue_a.ask_cents(venue_a_side)?;
    let b_ask = pair.venue_b.ask_cents(venue_b_side)?;

    if a_ask < cfg.min_price_cents || b_ask < cfg.min_price_cents {
        return None;
    }

    let combined = a_ask + b_ask;
    let spread = 100.0 - combined;
    if spread < cfg.min_spread_cents {
        return None;
    }

    let tier = cfg.classify_tier(spread)?;
    let hours_to_close =
        ((pair.earlier_resolution() - Utc::now()).num_minutes() as f64 / 60.0).max(0.0);

    Some(Opportunity {
        pair: pair.clone(),
        venue_a_side,
        venue_b_side,
        venue_a_cost_cents: a_ask,
        venue_b_cost_cents: b_ask,
        combined_cost_cents: combined,
        spread_cents: spread,
        tier,
        hours_to_close,
        detected_at: Utc::now(),
        venue_a_depth: pair.venue_a.ask_depth(venue_a_side),
        venue_b_depth: pair.venue_b.ask_depth(venue_b_side),
        venue_b_ask_levels: pair.venue_b.ask_levels(venue_b_side).to_vec(),
    })
}

/// Scans every matched pair and returns opportunities sorted by descending spread, so the executor
/// attempts the most profitable trades first each cycle.
pub async fn find_opportunities(
    pairs: &[MatchedPair],
    cfg: &Config,
    schedule: Option<&CachedScheduleValidator>,
) -> Vec<Opportunity> {
    let mut found = Vec::with_capacity(pairs.len());
    for pair in pairs {
        if let Some(opp) = evaluate_pair(pair, cfg, schedule).await {
            found.push(opp);
        }
    }
    found.sort_by(|a, b| b.spread_cents.partial_cmp(&a.spread_cents).unwrap());
    found
}

/// Logs the current quote for one pair every fast-poll cycle, whether or not it clears the
/// threshold, mirroring `log_pair_prices` in the source (used by the operator to eyeball spread
/// compression over time, not just the moments it crosses the line).
pub fn log_pair_prices(pair: &MatchedPair, cfg: &Config) {
    let yes_combo = pair.venue_a.ask_cents(Side::Yes).zip(pair.venue_b.ask_cents(Side::No));
    let no_combo = pair.venue_a.ask_cents(Side::No).zip(pair.venue_b.ask_cents(Side::Yes));

    for (a_side, combo) in [("yes/no", yes_combo), ("no/yes", no_combo)] {
        if let Some((a, b)) = combo {
            let spread = 100.0 - (a + b);
            info!(
                target: "opportunities",
                pair = %format!("{}<->{}", pair.venue_a.platform_id, pair.venue_b.platform_id),
                strategy = a_side,
                combined = combo_str(a + b),
                spread = combo_str(spread),
                tier = ?cfg.classify_tier(spread),
                "PAIR PRICES"
            );
        }
    }
}

fn combo_str(v: f64) -> String {
    format!("{:.2}", v)
}

pub fn format_opportunity_log(opp: &Opportunity) -> String {
    format!(
        "ARB OPPORTUNITY: {} ({:?}) x {} ({:?}) | combined={:.2}c spread={:.2}c tier={} closes_in={:.1}h",
        opp.pair.venue_a.platform_id,
        opp.venue_a_side,
        opp.pair.venue_b.platform_id,
        opp.venue_b_side,
        opp.combined_cost_cents,
        opp.spread_cents,
        opp.tier.as_str(),
        opp.hours_to_close,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Classification, CryptoFields, Direction, Market, Platform};
    use chrono::Duration as ChronoDuration;

    fn market(platform: Platform, yes_ask: f64, no_ask: f64) -> Market {
        Market {
            platform,
            platform_id: format!("{:?}", platform),
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
            yes_bid_cents: None,
            no_bid_cents: None,
            yes_ask_depth: Some(500.0),
            no_ask_depth: Some(500.0),
            yes_ask_levels: Vec::new(),
            no_ask_levels: Vec::new(),
            yes_token_id: None,
            no_token_id: None,
        }
    }

    #[tokio::test]
    async fn finds_opportunity_above_min_spread() {
        let cfg = Config::default();
        let pair = MatchedPair {
            venue_a: market(Platform::VenueA, 40.0, 58.0),
            venue_b: market(Platform::VenueB, 40.0, 58.0),
        };
        let opp = evaluate_pair(&pair, &cfg, None).await.expect("should find an opportunity");
        assert!(opp.spread_cents >= cfg.min_spread_cents);
    }

    #[tokio::test]
    async fn rejects_spread_below_threshold() {
        let cfg = Config::default();
        let pair = MatchedPair {
            venue_a: market(Platform::VenueA, 50.0, 50.0),
            venue_b: market(Platform::VenueB, 50.0, 50.0),
        };
        assert!(evaluate_pair(&pair, &cfg, None).await.is_none());
    }

    #[tokio::test]
    async fn clamps_hours_to_close_instead_of_dropping_past_due_pairs() {
        let cfg = Config::default();
        let mut pair = MatchedPair {
            venue_a: market(Platform::VenueA, 40.0, 58.0),
            venue_b: market(Platform::VenueB, 40.0, 58.0),
        };
        pair.venue_a.resolution_dt = Utc::now() - ChronoDuration::hours(1);
        pair.venue_b.resolution_dt = Utc::now() - ChronoDuration::hours(1);
        let opp = evaluate_pair(&pair, &cfg, None).await.expect("should still surface the opportunity");
        assert_eq!(opp.hours_to_close, 0.0);
    }

    #[tokio::test]
    async fn picks_better_of_two_strategies() {
        let cfg = Config::default();
        // yes/no: 10 + 40 = 50c combined -> 50c spread (best)
        // no/yes: 90 + 55 = 145c combined -> negative spread (rejected)
        let a = market(Platform::VenueA, 10.0, 90.0);
        let b = market(Platform::VenueB, 55.0, 40.0);
        let pair = MatchedPair { venue_a: a, venue_b: b };
        let opp = evaluate_pair(&pair, &cfg, None).await.expect("should find opportunity");
        assert_eq!(opp.venue_a_side, Side::Yes);
    }

    fn sports_market(platform: Platform, yes_ask: f64, no_ask: f64, sport: &str, team: &str, opponent: &str) -> Market {
        let mut m = market(platform, yes_ask, no_ask);
        m.classification = Classification::Sports(crate::market::SportsFields {
            sport: sport.to_string(),
            team: team.to_string(),
            opponent: opponent.to_string(),
            sport_subtype: crate::market::SportSubtype::Series,
            event_id: "evt".to_string(),
            map_number: None,
        });
        m
    }

    struct RejectingOracle;

    #[async_trait::async_trait]
    impl crate::schedule::ScheduleOracle for RejectingOracle {
        async fn scheduled_teams(&self, _sport: &str) -> anyhow::Result<Vec<String>> {
            Ok(vec!["some other team".to_string()])
        }
    }

    struct AcceptingOracle;

    #[async_trait::async_trait]
    impl crate::schedule::ScheduleOracle for AcceptingOracle {
        async fn scheduled_teams(&self, _sport: &str) -> anyhow::Result<Vec<String>> {
            Ok(vec!["t1".to_string(), "geng".to_string()])
        }
    }

    #[tokio::test]
    async fn drops_sports_pair_when_schedule_oracle_reports_not_found() {
        let cfg = Config::default();
        let pair = MatchedPair {
            venue_a: sports_market(Platform::VenueA, 40.0, 58.0, "lol", "t1", "geng"),
            venue_b: sports_market(Platform::VenueB, 40.0, 58.0, "lol", "t1", "geng"),
        };
        let validator = CachedScheduleValidator::new(Box::new(RejectingOracle));
        assert!(evaluate_pair(&pair, &cfg, Some(&validator)).await.is_none());
    }

    #[tokio::test]
    async fn keeps_sports_pair_when_schedule_oracle_verifies() {
        let cfg = Config::default();
        let pair = MatchedPair {
            venue_a: sports_market(Platform::VenueA, 40.0, 58.0, "lol", "t1", "geng"),
            venue_b: sports_market(Platform::VenueB, 40.0, 58.0, "lol", "t1", "geng"),
        };
        let validator = CachedScheduleValidator::new(Box::new(AcceptingOracle));
        assert!(evaluate_pair(&pair, &cfg, Some(&validator)).await.is_some());
    }
}
