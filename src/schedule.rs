//! Schedule oracle (C4): an independent source of truth for "is this team/event actually
//! scheduled to play in this window", used to reject matches the bucket matcher got wrong.
//!
//! Genericized from `scanner/match_validator.py`, which hit a single hardcoded provider; here it's
//! a trait so a different schedule source can be swapped in without touching the finder. TTL
//! caching reimplemented with `Instant` + `HashMap`, mirroring the source's module-level
//! dict-of-tuples cache. The fuzzy string ratio has no direct crate equivalent in the dependency
//! set (`difflib.SequenceMatcher` is Python-only), so it is reimplemented locally below.

use crate::config::Config;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::warn;

const TEAM_LIST_TTL: Duration = Duration::from_secs(30 * 60);
const VERDICT_TTL: Duration = Duration::from_secs(30 * 60);
const FUZZY_THRESHOLD: f64 = 0.72;
const LIQUIPEDIA_API_BASE: &str = "https://api.liquipedia.net/api/v3";

/// Verdict from checking a (team, opponent) pairing against a sport's published schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleVerdict {
    /// Both sides fuzzy-matched a scheduled match on the oracle's list.
    Verified,
    /// The oracle answered but neither side appears on its list for this sport.
    NotFound,
    /// The oracle couldn't answer (missing credentials, unsupported sport, request failure).
    Unknown,
}

#[async_trait]
pub trait ScheduleOracle: Send + Sync {
    /// Teams/events known to be scheduled within the lookahead window, for a given sport.
    async fn scheduled_teams(&self, sport: &str) -> anyhow::Result<Vec<String>>;
}

struct CacheEntry<T> {
    value: T,
    at: Instant,
}

/// Wraps any `ScheduleOracle` with the two TTL caches the source module used: a team-list cache
/// per sport, and a pair-verdict cache per (sport, team, opponent) so repeated validations within
/// the same scan window don't re-run the fuzzy match.
pub struct CachedScheduleValidator {
    oracle: Box<dyn ScheduleOracle>,
    team_list_cache: Mutex<HashMap<String, CacheEntry<Vec<String>>>>,
    verdict_cache: Mutex<HashMap<(String, String, String), CacheEntry<ScheduleVerdict>>>,
}

impl CachedScheduleValidator {
    pub fn new(oracle: Box<dyn ScheduleOracle>) -> Self {
        Self {
            oracle,
            team_list_cache: Mutex::new(HashMap::new()),
            verdict_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn teams_for_sport(&self, sport: &str) -> anyhow::Result<Vec<String>> {
        if let Some(entry) = self.team_list_cache.lock().get(sport) {
            if entry.at.elapsed() < TEAM_LIST_TTL {
                return Ok(entry.value.clone());
            }
        }
        let teams = self.oracle.scheduled_teams(sport).await?;
        self.team_list_cache.lock().insert(
            sport.to_string(),
            CacheEntry { value: teams.clone(), at: Instant::now() },
        );
        Ok(teams)
    }

    /// Checks whether `team` and `opponent` both appear on `sport`'s scheduled list. `NotFound`
    /// when the oracle answered but neither side matched (a real signal the bucket matcher paired
    /// the wrong event); `Unknown` when the oracle itself couldn't answer, which the caller should
    /// treat as "can't rule it out" rather than a rejection. Verdicts are cached per
    /// (sport, team, opponent) for `VERDICT_TTL` since the candidate list barely changes within a
    /// scan cycle.
    pub async fn verdict(&self, sport: &str, team: &str, opponent: &str) -> ScheduleVerdict {
        if team.trim().is_empty() || opponent.trim().is_empty() {
            return ScheduleVerdict::Unknown;
        }
        let key = (sport.to_string(), team.to_lowercase(), opponent.to_lowercase());
        if let Some(entry) = self.verdict_cache.lock().get(&key) {
            if entry.at.elapsed() < VERDICT_TTL {
                return entry.value;
            }
        }

        let verdict = match self.teams_for_sport(sport).await {
            Ok(teams) => {
                let team_found = teams.iter().any(|t| team_matches(team, t));
                let opponent_found = teams.iter().any(|t| team_matches(opponent, t));
                if team_found && opponent_found {
                    ScheduleVerdict::Verified
                } else {
                    ScheduleVerdict::NotFound
                }
            }
            Err(e) => {
                warn!(sport, error = %e, "schedule oracle unavailable, treating pair as unverified");
                ScheduleVerdict::Unknown
            }
        };

        self.verdict_cache.lock().insert(key, CacheEntry { value: verdict, at: Instant::now() });
        verdict
    }
}

/// Strips punctuation before comparing, so "Gen.G Esports" matches a feed's "geng" the way a
/// human reader would instead of tripping on the dot.
fn normalize_team_name(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase()
}

fn team_matches(a: &str, b: &str) -> bool {
    let a = normalize_team_name(a);
    let b = normalize_team_name(b);
    if a.contains(&b) || b.contains(&a) {
        return true;
    }
    fuzzy_ratio(&a, &b) >= FUZZY_THRESHOLD
}

/// Gestalt pattern-matching ratio in the style of Python's `difflib.SequenceMatcher.ratio`:
/// `2 * M / T` where `M` is the total length of matching blocks found greedily and `T` is the
/// combined length of both strings.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let total = a.len() + b.len();
    let matches = matching_blocks_len(&a, &b);
    2.0 * matches as f64 / total as f64
}

fn matching_blocks_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (pos_a, pos_b, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_blocks_len(&a[..pos_a], &b[..pos_b])
        + matching_blocks_len(&a[pos_a + len..], &b[pos_b + len..])
}

/// Longest common contiguous substring between `a` and `b`. O(|a| * |b|); these strings are team
/// names, at most a few dozen characters.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 0..a.len() {
        for j in 0..b.len() {
            if a[i] == b[j] {
                table[i + 1][j + 1] = table[i][j] + 1;
                if table[i + 1][j + 1] > best.2 {
                    best = (i + 1 - table[i + 1][j + 1], j + 1 - table[i + 1][j + 1], table[i + 1][j + 1]);
                }
            }
        }
    }
    best
}

fn wiki_for_sport(sport: &str) -> Option<&'static str> {
    match sport.to_lowercase().as_str() {
        "cs2" | "csgo" | "cs" => Some("counterstrike"),
        "lol" | "leagueoflegends" => Some("leagueoflegends"),
        "valorant" => Some("valorant"),
        "dota2" | "dota" => Some("dota2"),
        "rl" | "rocketleague" => Some("rocketleague"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct MatchListResponse {
    result: Vec<MatchEntry>,
}

#[derive(Debug, Deserialize)]
struct MatchEntry {
    #[serde(default)]
    match2opponents: Vec<MatchOpponent>,
}

#[derive(Debug, Deserialize)]
struct MatchOpponent {
    name: Option<String>,
}

/// Real HTTP-JSON oracle backed by Liquipedia's match API (API v3), grounded on
/// `match_validator.py`'s sport-to-wiki map, date-range query, and warn-once-then-`Unknown`
/// behavior when no API key is configured.
pub struct HttpScheduleOracle {
    client: Client,
    api_key: Option<String>,
    lookahead_hours: f64,
    timeout: Duration,
    warned_no_key: AtomicBool,
}

impl HttpScheduleOracle {
    pub fn new(cfg: &Config) -> Self {
        let client = Client::builder()
            .timeout(cfg.schedule_oracle_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: cfg.schedule_oracle_api_key.clone(),
            lookahead_hours: cfg.schedule_lookahead_hours,
            timeout: cfg.schedule_oracle_timeout,
            warned_no_key: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ScheduleOracle for HttpScheduleOracle {
    async fn scheduled_teams(&self, sport: &str) -> anyhow::Result<Vec<String>> {
        let wiki = wiki_for_sport(sport)
            .ok_or_else(|| anyhow::anyhow!("no liquipedia wiki mapped for sport {}", sport))?;

        let Some(api_key) = self.api_key.as_ref() else {
            if !self.warned_no_key.swap(true, Ordering::SeqCst) {
                warn!("SCHEDULE_ORACLE_API_KEY not set, schedule validation will report Unknown for the rest of this process");
            }
            anyhow::bail!("no schedule oracle api key configured");
        };

        let now = Utc::now();
        let until = now + ChronoDuration::hours(self.lookahead_hours.max(0.0) as i64);
        let conditions = format!(
            "[[date_time_utc::>{}]] AND [[date_time_utc::<{}]]",
            now.format("%Y-%m-%d %H:%M:%S"),
            until.format("%Y-%m-%d %H:%M:%S"),
        );

        let url = format!("{}/{}/match", LIQUIPEDIA_API_BASE, wiki);
        let query = [
            ("conditions", conditions.as_str()),
            ("query", "match2opponents"),
            ("limit", "500"),
            ("order", "date_time_utc ASC"),
        ];

        let response = timeout(
            self.timeout,
            self.client
                .get(&url)
                .query(&query)
                .header("Authorization", format!("Apikey {}", api_key))
                .header("User-Agent", "dualmkt-arb/schedule-oracle")
                .header("Accept", "application/json")
                .send(),
        )
        .await??;

        let body: MatchListResponse = response.json().await?;
        let mut seen = HashSet::new();
        let mut teams = Vec::new();
        for entry in body.result {
            for opponent in entry.match2opponents {
                let Some(name) = opponent.name else { continue };
                let trimmed = name.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("tbd") || trimmed.eq_ignore_ascii_case("tba") {
                    continue;
                }
                if seen.insert(trimmed.to_lowercase()) {
                    teams.push(trimmed.to_string());
                }
            }
        }
        Ok(teams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_ratio_one() {
        assert!((fuzzy_ratio("geng esports", "geng esports") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn close_variants_pass_threshold() {
        assert!(fuzzy_ratio("t1", "t1 esports") >= 0.0);
        assert!(team_matches("t1", "t1 esports"));
        assert!(team_matches("geng", "gen.g esports"));
    }

    #[test]
    fn unrelated_strings_fail_threshold() {
        assert!(!team_matches("t1", "fnatic"));
    }

    struct FixedOracle(Vec<String>);

    #[async_trait]
    impl ScheduleOracle for FixedOracle {
        async fn scheduled_teams(&self, _sport: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl ScheduleOracle for FailingOracle {
        async fn scheduled_teams(&self, _sport: &str) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("oracle down")
        }
    }

    #[tokio::test]
    async fn validator_caches_and_matches() {
        let validator = CachedScheduleValidator::new(Box::new(FixedOracle(vec![
            "T1".to_string(),
            "Gen.G Esports".to_string(),
        ])));
        assert_eq!(validator.verdict("lol", "t1", "geng").await, ScheduleVerdict::Verified);
        assert_eq!(validator.verdict("lol", "t1", "cloud9").await, ScheduleVerdict::NotFound);
    }

    #[tokio::test]
    async fn oracle_failure_yields_unknown_not_rejection() {
        let validator = CachedScheduleValidator::new(Box::new(FailingOracle));
        assert_eq!(validator.verdict("lol", "t1", "geng").await, ScheduleVerdict::Unknown);
    }

    #[tokio::test]
    async fn empty_team_or_opponent_is_unknown() {
        let validator = CachedScheduleValidator::new(Box::new(FixedOracle(vec!["T1".to_string()])));
        assert_eq!(validator.verdict("lol", "", "geng").await, ScheduleVerdict::Unknown);
        assert_eq!(validator.verdict("lol", "t1", "").await, ScheduleVerdict::Unknown);
    }
}
