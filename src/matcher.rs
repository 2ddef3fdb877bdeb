//! Bucket-indexed cross-venue market matcher (C3).
//!
//! Grounded on `scanner/market_matcher.py`: bucket Venue-B markets by an equality key so each
//! Venue-A market only compares against plausible candidates, not the whole catalog. First
//! candidate that passes the full predicate wins; every rejection is tallied for the cycle-end
//! summary log rather than raised as an error.

use crate::config::Config;
use crate::market::{Classification, Market, MatchedPair};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct MatchStats {
    pub venue_a_markets: usize,
    pub venue_b_markets: usize,
    pub matched: usize,
    pub rejected_resolution_gap: usize,
    pub rejected_no_bucket: usize,
}

fn bucket_key(m: &Market) -> Option<String> {
    match &m.classification {
        Classification::Crypto(f) => Some(format!(
            "crypto:{}:{:?}:{}",
            f.asset, f.direction, f.threshold as i64
        )),
        Classification::Sports(f) => Some(format!(
            "sports:{}:{}:{:?}",
            f.sport,
            normalize_team(&f.team),
            f.sport_subtype
        )),
    }
}

fn normalize_team(team: &str) -> String {
    team.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Strict equality predicate beyond the bucket key: classification must match exactly (same
/// asset/direction/threshold, or same sport/team/subtype/map and, when both sides name one, the
/// same opponent), and resolution times must agree within `resolution_time_tolerance_hours`.
/// `event_id` is deliberately not compared — it's assigned independently by each venue from its
/// own ticker/slug and never lines up across venues.
fn is_strict_match(a: &Market, b: &Market, cfg: &Config) -> bool {
    let classification_match = match (&a.classification, &b.classification) {
        (Classification::Crypto(ca), Classification::Crypto(cb)) => {
            ca.asset == cb.asset
                && ca.direction == cb.direction
                && (ca.threshold - cb.threshold).abs() < f64::EPSILON
        }
        (Classification::Sports(sa), Classification::Sports(sb)) => {
            let opponent_match = match (sa.opponent.is_empty(), sb.opponent.is_empty()) {
                (false, false) => normalize_team(&sa.opponent) == normalize_team(&sb.opponent),
                _ => true,
            };
            sa.sport == sb.sport
                && normalize_team(&sa.team) == normalize_team(&sb.team)
                && sa.sport_subtype == sb.sport_subtype
                && sa.map_number == sb.map_number
                && opponent_match
        }
        _ => false,
    };
    if !classification_match {
        return false;
    }

    let gap = (a.resolution_dt - b.resolution_dt).num_minutes().abs() as f64 / 60.0;
    gap <= cfg.resolution_time_tolerance_hours
}

/// Finds matching pairs between a Venue-A catalog and a Venue-B catalog. Crypto markets are
/// skipped entirely unless `cfg.crypto_matching_enabled`, since direction/threshold parsing from
/// free-text titles is unreliable without it (design note in `scanner/config.py`).
pub fn find_matches(
    venue_a_markets: &[Market],
    venue_b_markets: &[Market],
    cfg: &Config,
) -> (Vec<MatchedPair>, MatchStats) {
    let mut stats = MatchStats {
        venue_a_markets: venue_a_markets.len(),
        venue_b_markets: venue_b_markets.len(),
        ..Default::default()
    };

    let mut buckets: HashMap<String, Vec<&Market>> = HashMap::new();
    for m in venue_b_markets {
        if matches!(m.classification, Classification::Crypto(_)) && !cfg.crypto_matching_enabled {
            continue;
        }
        if let Some(key) = bucket_key(m) {
            buckets.entry(key).or_default().push(m);
        }
    }

    let mut used_b: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut pairs = Vec::new();

    for a in venue_a_markets {
        if matches!(a.classification, Classification::Crypto(_)) && !cfg.crypto_matching_enabled {
            continue;
        }
        let Some(key) = bucket_key(a) else {
            stats.rejected_no_bucket += 1;
            continue;
        };
        let Some(candidates) = buckets.get(&key) else {
            stats.rejected_no_bucket += 1;
            continue;
        };

        let found = candidates
            .iter()
            .find(|b| !used_b.contains(&b.platform_id) && is_strict_match(a, b, cfg));

        match found {
            Some(b) => {
                used_b.insert(b.platform_id.clone());
                pairs.push(MatchedPair {
                    venue_a: a.clone(),
                    venue_b: (*b).clone(),
                });
                stats.matched += 1;
            }
            None => {
                stats.rejected_resolution_gap += 1;
                debug!(
                    ticker = %a.platform_id,
                    "no venue-b candidate within resolution tolerance for bucket {}", key
                );
            }
        }
    }

    (pairs, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Direction, Platform};
    use chrono::{Duration as ChronoDuration, Utc};

    fn crypto_market(platform: Platform, ticker: &str, hours_offset: i64) -> Market {
        Market {
            platform,
            platform_id: ticker.to_string(),
            platform_url: String::new(),
            raw_question: String::new(),
            classification: crate::market::Classification::Crypto(crate::market::CryptoFields {
                asset: "BTC".to_string(),
                direction: Direction::Above,
                threshold: 100_000.0,
            }),
            resolution_dt: Utc::now() + ChronoDuration::hours(hours_offset),
            yes_ask_cents: None,
            no_ask_cents: None,
            yes_bid_cents: None,
            no_bid_cents: None,
            yes_ask_depth: None,
            no_ask_depth: None,
            yes_ask_levels: Vec::new(),
            no_ask_levels: Vec::new(),
            yes_token_id: None,
            no_token_id: None,
        }
    }

    #[test]
    fn matches_within_tolerance_and_rejects_outside() {
        let mut cfg = Config::default();
        cfg.crypto_matching_enabled = true;
        cfg.resolution_time_tolerance_hours = 1.0;

        let a = crypto_market(Platform::VenueA, "BTC-100K", 24);
        let b_close = crypto_market(Platform::VenueB, "btc-100k-cond", 24);
        let b_far = crypto_market(Platform::VenueB, "btc-100k-cond-2", 30);

        let (pairs, stats) = find_matches(&[a.clone()], &[b_far], &cfg);
        assert_eq!(pairs.len(), 0);
        assert_eq!(stats.rejected_resolution_gap, 1);

        let (pairs, stats) = find_matches(&[a], &[b_close], &cfg);
        assert_eq!(pairs.len(), 1);
        assert_eq!(stats.matched, 1);
    }

    fn sports_market(
        platform: Platform,
        ticker: &str,
        event_id: &str,
        team: &str,
        opponent: &str,
    ) -> Market {
        Market {
            platform,
            platform_id: ticker.to_string(),
            platform_url: String::new(),
            raw_question: String::new(),
            classification: crate::market::Classification::Sports(crate::market::SportsFields {
                sport: "nba".to_string(),
                team: team.to_string(),
                opponent: opponent.to_string(),
                sport_subtype: crate::market::SportSubtype::Series,
                event_id: event_id.to_string(),
                map_number: None,
            }),
            resolution_dt: Utc::now() + ChronoDuration::hours(24),
            yes_ask_cents: None,
            no_ask_cents: None,
            yes_bid_cents: None,
            no_bid_cents: None,
            yes_ask_depth: None,
            no_ask_depth: None,
            yes_ask_levels: Vec::new(),
            no_ask_levels: Vec::new(),
            yes_token_id: None,
            no_token_id: None,
        }
    }

    #[test]
    fn sports_matches_despite_venue_specific_event_ids() {
        // Each venue assigns its own event_id from its own ticker/slug — the bucket key and
        // strict match must not depend on it lining up across venues.
        let cfg = Config::default();
        let a = sports_market(Platform::VenueA, "NBA-LAL-BOS", "venue-a-evt-1", "Lakers", "Celtics");
        let b = sports_market(Platform::VenueB, "lal-bos-cond", "venue-b-evt-9", "Lakers", "Celtics");
        let (pairs, stats) = find_matches(&[a], &[b], &cfg);
        assert_eq!(pairs.len(), 1);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn sports_rejects_mismatched_opponent() {
        let cfg = Config::default();
        let a = sports_market(Platform::VenueA, "NBA-LAL-BOS", "evt-1", "Lakers", "Celtics");
        let b = sports_market(Platform::VenueB, "lal-nyk-cond", "evt-2", "Lakers", "Knicks");
        let (pairs, _) = find_matches(&[a], &[b], &cfg);
        assert_eq!(pairs.len(), 0);
    }

    #[test]
    fn crypto_disabled_by_default_yields_no_matches() {
        let cfg = Config::default();
        assert!(!cfg.crypto_matching_enabled);
        let a = crypto_market(Platform::VenueA, "BTC-100K", 24);
        let b = crypto_market(Platform::VenueB, "btc-100k-cond", 24);
        let (pairs, _) = find_matches(&[a], &[b], &cfg);
        assert_eq!(pairs.len(), 0);
    }
}
