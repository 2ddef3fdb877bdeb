//! Venue-B client: CLOB-style order-book venue with L2 HMAC request authentication.
//!
//! Rate limiting and typed CLOB/catalog structs grounded on `scrapers/polymarket_api.rs`
//! (`RateLimiter`, `CLOBMarket`, `OrderBook`, `GammaMarket`). Trading surface grounded on
//! `scanner/poly_trader.py` (`place_order` building a FOK `OrderArgs`, `get_order`,
//! `get_actual_fill` falling back to the estimate). The source signs orders with an EOA/proxy
//! ECDSA wallet key via `py_clob_client`; this adapter instead authenticates with the CLOB's L2
//! HMAC key/secret/passphrase headers (the crate's stack carries `hmac`/`sha2`, not an EVM signing
//! library), so `maker`/`funder` addresses are carried as opaque identifiers rather than derived
//! from a signer.

use crate::config::Config;
use crate::error::VenueError;
use crate::market::{
    AskLevel, Classification, CryptoFields, Direction, LivePrice, Market, Platform, Side,
    SportSubtype, SportsFields,
};
use crate::venues::{OrderClient, OrderState, OrderStatus, VenueClient};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use tokio::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

const CLOB_API_BASE: &str = "https://clob.venue-b.example";
const GAMMA_API_BASE: &str = "https://gamma.venue-b.example";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

type HmacSha256 = Hmac<Sha256>;

/// Sliding-window rate limiter, one per API surface (CLOB trading vs. Gamma catalog). The window
/// length and per-surface request cap both come from `Config` rather than being fixed, since the
/// two surfaces (`clob_limiter`, `gamma_limiter`) are configured with different caps at
/// construction time and operators may need to retune either without a rebuild.
struct RateLimiter {
    requests_per_window: u32,
    window: Duration,
    current_requests: u32,
    window_start: std::time::Instant,
    surface: &'static str,
}

impl RateLimiter {
    fn new(surface: &'static str, requests_per_window: u32, window: Duration) -> Self {
        Self {
            requests_per_window,
            window,
            current_requests: 0,
            window_start: std::time::Instant::now(),
            surface,
        }
    }

    async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            self.current_requests = 0;
            self.window_start = std::time::Instant::now();
        }
        if self.current_requests >= self.requests_per_window {
            let wait = self.window.saturating_sub(elapsed);
            if wait > Duration::ZERO {
                debug!("venue-b {} rate limit: waiting {}ms", self.surface, wait.as_millis());
                sleep(wait).await;
                self.current_requests = 0;
                self.window_start = std::time::Instant::now();
            }
        }
        self.current_requests += 1;
    }
}

pub struct VenueBClient {
    client: Client,
    api_key: Option<String>,
    api_secret: Option<String>,
    api_passphrase: Option<String>,
    funder: Option<String>,
    clob_limiter: Mutex<RateLimiter>,
    gamma_limiter: Mutex<RateLimiter>,
}

impl VenueBClient {
    pub fn new(cfg: &Config) -> Self {
        let client = Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: cfg.venue_b_api_key.clone(),
            api_secret: cfg.venue_b_api_secret.clone(),
            api_passphrase: cfg.venue_b_api_passphrase.clone(),
            funder: cfg.venue_b_funder.clone(),
            clob_limiter: Mutex::new(RateLimiter::new(
                "clob",
                cfg.venue_b_clob_rate_limit_per_window,
                cfg.venue_b_rate_limit_window,
            )),
            gamma_limiter: Mutex::new(RateLimiter::new(
                "gamma",
                cfg.venue_b_gamma_rate_limit_per_window,
                cfg.venue_b_rate_limit_window,
            )),
        }
    }

    pub fn has_trading_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some() && self.api_passphrase.is_some()
    }

    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Vec<(&'static str, String)> {
        let (Some(key), Some(secret), Some(pass)) =
            (&self.api_key, &self.api_secret, &self.api_passphrase)
        else {
            return Vec::new();
        };
        let ts = Utc::now().timestamp().to_string();
        let message = format!("{}{}{}{}", ts, method, path, body);
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(message.as_bytes());
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        vec![
            ("POLY-API-KEY", key.clone()),
            ("POLY-SIGNATURE", sig),
            ("POLY-TIMESTAMP", ts),
            ("POLY-PASSPHRASE", pass.clone()),
        ]
    }

    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, VenueError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut last_err = VenueError::Request("exhausted retries".into());

        for attempt in 0..MAX_RETRIES {
            match timeout(Duration::from_secs(10), request_fn()).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    } else if status == StatusCode::CONFLICT {
                        let text = response.text().await.unwrap_or_default();
                        return Err(VenueError::Conflict(text));
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!("venue-b rate limited on attempt {}", attempt + 1);
                        sleep(Duration::from_millis(backoff * 10)).await;
                        last_err = VenueError::Request("rate limited".into());
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        return Err(VenueError::Request(format!("{}: {}", status, text)));
                    }
                }
                Ok(Err(e)) => {
                    warn!("venue-b request failed (attempt {}): {}", attempt + 1, e);
                    last_err = VenueError::Request(e.to_string());
                }
                Err(_) => {
                    warn!("venue-b request timed out (attempt {})", attempt + 1);
                    last_err = VenueError::Timeout(Duration::from_secs(10));
                }
            }
            if attempt < MAX_RETRIES - 1 {
                sleep(Duration::from_millis(backoff)).await;
                backoff = (backoff * 2).min(30_000);
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl VenueClient for VenueBClient {
    async fn list_markets(&self, scan_window_hours: f64) -> Result<Vec<Market>, VenueError> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        let limit = 200usize;
        let cutoff = Utc::now() + chrono::Duration::seconds((scan_window_hours * 3600.0) as i64);

        loop {
            self.gamma_limiter.lock().await.acquire().await;
            let url = format!("{}/markets", GAMMA_API_BASE);
            let client = self.client.clone();
            let params = [("limit", limit.to_string()), ("offset", offset.to_string())];
            let response = self
                .execute_with_retry(|| client.get(&url).query(&params).send())
                .await?;

            let page: Vec<GammaMarket> = response
                .json()
                .await
                .map_err(|e| VenueError::Request(e.to_string()))?;
            let fetched = page.len();

            for m in page {
                if m.closed || !m.active {
                    continue;
                }
                let Some(end) = m.end_date_iso.as_deref().and_then(parse_iso) else {
                    continue;
                };
                if end > cutoff {
                    continue;
                }
                if let Some(classification) = classify_question(&m.slug, &m.question) {
                    let tokens = m.clob_token_ids.unwrap_or_default();
                    out.push(Market {
                        platform: Platform::VenueB,
                        platform_id: m.condition_id.clone(),
                        platform_url: format!("https://venue-b.example/event/{}", m.slug),
                        raw_question: m.question,
                        classification,
                        resolution_dt: end,
                        yes_ask_cents: None,
                        no_ask_cents: None,
                        yes_bid_cents: None,
                        no_bid_cents: None,
                        yes_ask_depth: None,
                        no_ask_depth: None,
                        yes_ask_levels: Vec::new(),
                        no_ask_levels: Vec::new(),
                        yes_token_id: tokens.first().cloned(),
                        no_token_id: tokens.get(1).cloned(),
                    });
                }
            }

            if fetched < limit {
                break;
            }
            offset += limit;
        }

        debug!("venue-b: {} markets within scan window", out.len());
        Ok(out)
    }

    async fn fetch_live_prices(&self, platform_ids: &[String]) -> HashMap<String, LivePrice> {
        let mut out = HashMap::new();
        for condition_id in platform_ids {
            self.clob_limiter.lock().await.acquire().await;
            let url = format!("{}/book", CLOB_API_BASE);
            let client = self.client.clone();
            let params = [("token_id", condition_id.clone())];
            let result = self
                .execute_with_retry(|| client.get(&url).query(&params).send())
                .await;

            let live = match result {
                Ok(resp) => match resp.json::<OrderBook>().await {
                    Ok(book) => {
                        let mut asks = book.asks;
                        asks.sort_by(|a, b| {
                            a.price
                                .parse::<f64>()
                                .unwrap_or(f64::MAX)
                                .partial_cmp(&b.price.parse::<f64>().unwrap_or(f64::MAX))
                                .unwrap()
                        });
                        let levels: Vec<AskLevel> = asks
                            .iter()
                            .filter_map(|o| {
                                let price = o.price.parse::<f64>().ok()? * 100.0;
                                let size = o.size.parse::<f64>().ok()?;
                                Some(AskLevel {
                                    price_cents: price,
                                    size_units: size,
                                })
                            })
                            .collect();
                        let best = levels.first().copied();
                        let depth: f64 = levels.iter().map(|l| l.size_units).sum();
                        let best_bid = book
                            .bids
                            .iter()
                            .filter_map(|o| o.price.parse::<f64>().ok())
                            .fold(0.0_f64, f64::max)
                            * 100.0;
                        LivePrice {
                            yes_ask_cents: best.map(|l| l.price_cents),
                            no_ask_cents: None,
                            yes_bid_cents: Some(best_bid),
                            no_bid_cents: None,
                            yes_ask_depth: Some(depth),
                            no_ask_depth: None,
                            yes_ask_levels: Some(levels),
                            no_ask_levels: None,
                        }
                    }
                    Err(_) => LivePrice::default(),
                },
                Err(e) => {
                    debug!("venue-b price fetch failed for {}: {}", condition_id, e);
                    LivePrice::default()
                }
            };
            out.insert(condition_id.clone(), live);
        }
        out
    }
}

#[async_trait]
impl OrderClient for VenueBClient {
    async fn get_balance(&self) -> Result<f64, VenueError> {
        let Some(funder) = &self.funder else {
            return Err(VenueError::Request("no funder address configured".into()));
        };
        let path = "/balance";
        let url = format!("{}{}", CLOB_API_BASE, path);
        let headers = self.auth_headers("GET", path, "");
        let client = self.client.clone();
        let params = [("address", funder.clone())];
        let response = self
            .execute_with_retry(|| {
                let mut req = client.get(&url).query(&params);
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req.send()
            })
            .await?;
        let balance: BalanceResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Request(e.to_string()))?;
        Ok(balance.balance.parse::<f64>().unwrap_or(0.0) / 1_000_000.0)
    }

    async fn place_order(
        &self,
        token_id: &str,
        side: Side,
        count: u64,
        price_cents: f64,
    ) -> Result<String, VenueError> {
        if !self.has_trading_credentials() {
            return Err(VenueError::Request("missing venue-b trading credentials".into()));
        }
        let price = price_cents / 100.0;
        let body = OrderArgs {
            token_id: token_id.to_string(),
            price,
            size: count as f64,
            side: side.as_str().to_uppercase(),
            order_type: "FOK".to_string(),
            client_order_id: Uuid::new_v4().to_string(),
        };
        let body_json =
            serde_json::to_string(&body).map_err(|e| VenueError::Request(e.to_string()))?;
        let path = "/order";
        let url = format!("{}{}", CLOB_API_BASE, path);
        let headers = self.auth_headers("POST", path, &body_json);
        let client = self.client.clone();
        let body_for_send = body_json.clone();
        let response = self
            .execute_with_retry(|| {
                let mut req = client.post(&url);
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req.header("Content-Type", "application/json")
                    .body(body_for_send.clone())
                    .send()
            })
            .await?;
        let placed: OrderResult = response
            .json()
            .await
            .map_err(|e| VenueError::Request(e.to_string()))?;
        placed.order_id.ok_or(VenueError::MissingOrderId)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderStatus, VenueError> {
        let path = format!("/data/order/{}", order_id);
        let url = format!("{}{}", CLOB_API_BASE, path);
        let headers = self.auth_headers("GET", &path, "");
        let client = self.client.clone();
        let response = self
            .execute_with_retry(|| {
                let mut req = client.get(&url);
                for (k, v) in &headers {
                    req = req.header(*k, v);
                }
                req.send()
            })
            .await?;
        let fetched: OrderResult = response
            .json()
            .await
            .map_err(|e| VenueError::Request(e.to_string()))?;
        let size_matched: Option<f64> = fetched.size_matched.and_then(|s| s.parse().ok());
        let state = match fetched.status.as_deref() {
            Some("matched") => OrderState::Filled,
            Some("live") => OrderState::Open,
            Some("cancelled") => OrderState::Cancelled,
            Some("partial") => OrderState::PartiallyFilled,
            _ => OrderState::Rejected,
        };
        Ok(OrderStatus {
            state,
            filled_units: size_matched.map(|s| s as u64),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let path = format!("/order/{}", order_id);
        let url = format!("{}{}", CLOB_API_BASE, path);
        let headers = self.auth_headers("DELETE", &path, "");
        let client = self.client.clone();
        self.execute_with_retry(|| {
            let mut req = client.delete(&url);
            for (k, v) in &headers {
                req = req.header(*k, v);
            }
            req.send()
        })
        .await?;
        Ok(())
    }

    /// Mirrors `poly_trader.py::get_actual_fill`: any lookup error falls back to the estimate
    /// rather than propagating, since the caller already committed to the estimated size.
    async fn get_actual_fill(&self, order_id: &str, estimated_size: u64) -> u64 {
        match self.get_order(order_id).await {
            Ok(status) => status.filled_units.unwrap_or(estimated_size),
            Err(_) => estimated_size,
        }
    }

    async fn get_market_bid(&self, platform_id: &str, side: Side) -> Option<f64> {
        let quotes = self.fetch_live_prices(&[platform_id.to_string()]).await;
        let live = quotes.get(platform_id)?;
        match side {
            Side::Yes => live.yes_bid_cents,
            Side::No => live.no_bid_cents,
        }
    }
}

fn classify_question(slug: &str, question: &str) -> Option<Classification> {
    let lower = question.to_lowercase();
    if let Some(asset) = ["bitcoin", "btc", "ethereum", "eth", "solana", "sol"]
        .iter()
        .find(|a| lower.contains(**a))
    {
        let direction = if lower.contains("above") || lower.contains("reach") {
            Direction::Above
        } else {
            Direction::Below
        };
        let threshold = lower
            .split_whitespace()
            .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse().ok())
            .unwrap_or(0.0);
        let asset = match *asset {
            "bitcoin" => "BTC",
            "ethereum" => "ETH",
            "solana" => "SOL",
            other => other,
        };
        return Some(Classification::Crypto(CryptoFields {
            asset: asset.to_uppercase(),
            direction,
            threshold,
        }));
    }

    let parts: Vec<&str> = slug.split('-').collect();
    if parts.len() >= 2 {
        return Some(Classification::Sports(SportsFields {
            sport: "esports".to_string(),
            team: parts.last().unwrap_or(&"").to_string(),
            opponent: String::new(),
            sport_subtype: SportSubtype::Series,
            event_id: parts[0].to_string(),
            map_number: None,
        }));
    }
    None
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    condition_id: String,
    slug: String,
    question: String,
    end_date_iso: Option<String>,
    closed: bool,
    active: bool,
    clob_token_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OrderBookEntry {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct OrderBook {
    bids: Vec<OrderBookEntry>,
    asks: Vec<OrderBookEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Debug, Serialize)]
struct OrderArgs {
    token_id: String,
    price: f64,
    size: f64,
    side: String,
    order_type: String,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderResult {
    #[serde(rename = "orderID")]
    order_id: Option<String>,
    status: Option<String>,
    size_matched: Option<String>,
}
