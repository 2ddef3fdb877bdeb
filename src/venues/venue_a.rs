//! Venue-A client: order-book/quote venue with HMAC-signed request authentication.
//!
//! Retry/backoff shape grounded on `scrapers/dome.rs`'s `execute_with_retry`. Signing and trading
//! surface grounded on `scanner/kalshi_trader.py` (`_sign`, `_auth_headers`, `place_order`,
//! `get_order`, `cancel_order`, `get_market_price`, `get_balance`). The source signs with
//! RSA-PS256; this adapter signs with HMAC-SHA256 over the same `timestamp + method + path + body`
//! message, since the crate's dependency stack carries `hmac`/`sha2` (already used for CLOB
//! signing) and not an RSA implementation.

use crate::config::Config;
use crate::error::VenueError;
use crate::market::{
    AskLevel, Classification, CryptoFields, Direction, Market, MarketCategory, Platform, Side,
    SportSubtype, SportsFields,
};
use crate::market::LivePrice;
use crate::venues::{OrderClient, OrderState, OrderStatus, VenueClient};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

const API_BASE: &str = "https://venue-a.example/trade-api/v2";
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;

type HmacSha256 = Hmac<Sha256>;

pub struct VenueAClient {
    client: Client,
    api_key: String,
    api_secret: String,
}

impl VenueAClient {
    pub fn new(cfg: &Config) -> Option<Self> {
        let (key, secret) = cfg.venue_a_credentials()?;
        let client = Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Some(Self {
            client,
            api_key: key.to_string(),
            api_secret: secret.to_string(),
        })
    }

    fn sign(&self, method: &str, path: &str, body: &str) -> (String, String) {
        let ts = Utc::now().timestamp_millis().to_string();
        let message = format!("{}{}{}{}", ts, method, path, body);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(message.as_bytes());
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        (ts, sig)
    }

    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Vec<(&'static str, String)> {
        let (ts, sig) = self.sign(method, path, body);
        vec![
            ("VENUE-A-ACCESS-KEY", self.api_key.clone()),
            ("VENUE-A-ACCESS-SIGNATURE", sig),
            ("VENUE-A-ACCESS-TIMESTAMP", ts),
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
                        warn!("venue-a rate limited, backing off {}ms", backoff * 10);
                        sleep(Duration::from_millis(backoff * 10)).await;
                        last_err = VenueError::Request(format!("rate limited: {}", status));
                    } else {
                        let text = response.text().await.unwrap_or_default();
                        return Err(VenueError::Request(format!("{}: {}", status, text)));
                    }
                }
                Ok(Err(e)) => {
                    warn!("venue-a request failed (attempt {}): {}", attempt + 1, e);
                    last_err = VenueError::Request(e.to_string());
                }
                Err(_) => {
                    warn!("venue-a request timed out (attempt {})", attempt + 1);
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

    fn to_cents(raw: i64) -> Result<f64, VenueError> {
        if !(0..=100).contains(&raw) {
            return Err(VenueError::Request(format!("price out of range: {}", raw)));
        }
        Ok(raw as f64)
    }

    fn classify(ticker: &str, title: &str) -> Option<Classification> {
        classify_title(ticker, title)
    }
}

#[async_trait]
impl VenueClient for VenueAClient {
    async fn list_markets(&self, scan_window_hours: f64) -> Result<Vec<Market>, VenueError> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        let cutoff = Utc::now() + chrono::Duration::seconds((scan_window_hours * 3600.0) as i64);

        loop {
            let path = "/markets";
            let url = format!("{}{}", API_BASE, path);
            let client = self.client.clone();
            let mut query = vec![("status", "open".to_string()), ("limit", "200".to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let query2 = query.clone();
            let response = self
                .execute_with_retry(|| {
                    client
                        .get(&url)
                        .query(&query2)
                        .send()
                })
                .await?;

            let page: VenueAMarketsPage = response
                .json()
                .await
                .map_err(|e| VenueError::Request(e.to_string()))?;

            for m in page.markets {
                if m.close_time > cutoff {
                    continue;
                }
                if let Some(classification) = Self::classify(&m.ticker, &m.title) {
                    out.push(Market {
                        platform: Platform::VenueA,
                        platform_id: m.ticker,
                        platform_url: format!("https://venue-a.example/markets/{}", m.event_ticker),
                        raw_question: m.title,
                        classification,
                        resolution_dt: m.close_time,
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
                    });
                }
            }

            cursor = page.cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        debug!("venue-a: {} markets within scan window", out.len());
        Ok(out)
    }

    async fn fetch_live_prices(&self, platform_ids: &[String]) -> HashMap<String, LivePrice> {
        let mut out = HashMap::new();
        for ticker in platform_ids {
            let path = format!("/markets/{}", ticker);
            let url = format!("{}{}", API_BASE, path);
            let client = self.client.clone();
            let result = self
                .execute_with_retry(|| client.get(&url).send())
                .await
                .and_then(|r| {
                    Ok(r)
                });

            let live = match result {
                Ok(resp) => match resp.json::<VenueAMarketQuote>().await {
                    Ok(q) => {
                        let yes_ask = Self::to_cents(q.yes_ask).ok();
                        let no_ask = Self::to_cents(q.no_ask).ok();
                        let yes_bid = Self::to_cents(q.yes_bid).ok();
                        let no_bid = Self::to_cents(q.no_bid).ok();
                        LivePrice {
                            yes_ask_cents: yes_ask,
                            no_ask_cents: no_ask,
                            yes_bid_cents: yes_bid,
                            no_bid_cents: no_bid,
                            yes_ask_depth: q.yes_ask_size.map(|v| v as f64),
                            no_ask_depth: q.no_ask_size.map(|v| v as f64),
                            yes_ask_levels: yes_ask.map(|p| {
                                vec![AskLevel {
                                    price_cents: p,
                                    size_units: q.yes_ask_size.unwrap_or(0) as f64,
                                }]
                            }),
                            no_ask_levels: no_ask.map(|p| {
                                vec![AskLevel {
                                    price_cents: p,
                                    size_units: q.no_ask_size.unwrap_or(0) as f64,
                                }]
                            }),
                        }
                    }
                    Err(_) => LivePrice::default(),
                },
                Err(e) => {
                    debug!("venue-a price fetch failed for {}: {}", ticker, e);
                    LivePrice::default()
                }
            };
            out.insert(ticker.clone(), live);
        }
        out
    }
}

#[async_trait]
impl OrderClient for VenueAClient {
    async fn get_balance(&self) -> Result<f64, VenueError> {
        let path = "/portfolio/balance";
        let url = format!("{}{}", API_BASE, path);
        let headers = self.auth_headers("GET", &format!("/trade-api/v2{}", path), "");
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
        let balance: BalanceResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Request(e.to_string()))?;
        Ok(balance.balance as f64 / 100.0)
    }

    async fn place_order(
        &self,
        platform_id: &str,
        side: Side,
        count: u64,
        price_cents: f64,
    ) -> Result<String, VenueError> {
        if count < 1 {
            return Err(VenueError::Request("count must be >= 1".into()));
        }
        if !(1.0..=99.0).contains(&price_cents) {
            return Err(VenueError::Request("price must be 1-99 cents".into()));
        }

        let path = "/portfolio/orders";
        let url = format!("{}{}", API_BASE, path);
        let client_order_id = Uuid::new_v4().to_string();
        let mut body = OrderRequest {
            ticker: platform_id.to_string(),
            side: side.as_str().to_string(),
            action: "buy".to_string(),
            count,
            r#type: "limit".to_string(),
            client_order_id,
            yes_price: None,
            no_price: None,
        };
        match side {
            Side::Yes => body.yes_price = Some(price_cents as i64),
            Side::No => body.no_price = Some(price_cents as i64),
        }
        let body_json = serde_json::to_string(&body).map_err(|e| VenueError::Request(e.to_string()))?;
        let headers = self.auth_headers("POST", &format!("/trade-api/v2{}", path), &body_json);

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

        let placed: OrderResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Request(e.to_string()))?;
        placed
            .order
            .map(|o| o.order_id)
            .ok_or(VenueError::MissingOrderId)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderStatus, VenueError> {
        let path = format!("/portfolio/orders/{}", order_id);
        let url = format!("{}{}", API_BASE, path);
        let headers = self.auth_headers("GET", &format!("/trade-api/v2{}", path), "");
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
        let fetched: OrderResponse = response
            .json()
            .await
            .map_err(|e| VenueError::Request(e.to_string()))?;
        let order = fetched.order.ok_or(VenueError::MissingOrderId)?;
        let state = match order.status.as_str() {
            "resting" | "pending" => OrderState::Open,
            "executed" if order.filled_count == Some(order.count) => OrderState::Filled,
            "executed" => OrderState::PartiallyFilled,
            "canceled" => OrderState::Cancelled,
            _ => OrderState::Rejected,
        };
        Ok(OrderStatus {
            state,
            filled_units: order.filled_count,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let path = format!("/portfolio/orders/{}", order_id);
        let url = format!("{}{}", API_BASE, path);
        let headers = self.auth_headers("DELETE", &format!("/trade-api/v2{}", path), "");
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

    async fn get_market_bid(&self, platform_id: &str, side: Side) -> Option<f64> {
        let quotes = self.fetch_live_prices(&[platform_id.to_string()]).await;
        let live = quotes.get(platform_id)?;
        match side {
            Side::Yes => live.yes_bid_cents,
            Side::No => live.no_bid_cents,
        }
    }
}

fn classify_title(ticker: &str, title: &str) -> Option<Classification> {
    let lower = title.to_lowercase();
    if let Some(asset) = ["btc", "eth", "sol"].iter().find(|a| lower.contains(**a)) {
        let direction = if lower.contains("above") || lower.contains("or higher") {
            Direction::Above
        } else {
            Direction::Below
        };
        let threshold = lower
            .split_whitespace()
            .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse().ok())
            .unwrap_or(0.0);
        return Some(Classification::Crypto(CryptoFields {
            asset: asset.to_uppercase(),
            direction,
            threshold,
        }));
    }

    let parts: Vec<&str> = ticker.split('-').collect();
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

#[derive(Debug, Deserialize)]
struct VenueAMarketsPage {
    markets: Vec<VenueAMarket>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VenueAMarket {
    ticker: String,
    event_ticker: String,
    title: String,
    close_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct VenueAMarketQuote {
    yes_ask: i64,
    no_ask: i64,
    yes_bid: i64,
    no_bid: i64,
    yes_ask_size: Option<i64>,
    no_ask_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: i64,
}

#[derive(Debug, Serialize)]
struct OrderRequest {
    ticker: String,
    side: String,
    action: String,
    count: u64,
    r#type: String,
    client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    yes_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_price: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order: Option<OrderPayload>,
}

#[derive(Debug, Deserialize)]
struct OrderPayload {
    order_id: String,
    status: String,
    count: u64,
    filled_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_crypto_above() {
        let c = classify_title("BTC-100K", "Will BTC be above 100000 on Friday?").unwrap();
        assert!(matches!(c, Classification::Crypto(f) if f.direction == Direction::Above));
    }

    #[test]
    fn classifies_sports_ticker() {
        let c = classify_title("LOL-2026-T1", "Will T1 win the series?").unwrap();
        assert!(matches!(c, Classification::Sports(_)));
    }

    #[test]
    fn rejects_out_of_range_cents() {
        assert!(VenueAClient::to_cents(150).is_err());
        assert!(VenueAClient::to_cents(-1).is_err());
        assert!(VenueAClient::to_cents(50).is_ok());
    }
}
