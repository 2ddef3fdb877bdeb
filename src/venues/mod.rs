//! Venue adapters (C2). Each venue implements `VenueClient` for catalog/price discovery and
//! `OrderClient` for the trading surface; the executor and paper executor are generic over both.

pub mod venue_a;
pub mod venue_b;

use crate::error::VenueError;
use crate::market::{LivePrice, Market, Side};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only market discovery and live pricing, common to both venues.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Pull the full catalog of currently tradeable markets within the scan window, paginating as
    /// needed. Classification (crypto/sports parsing) happens here, not in the matcher.
    async fn list_markets(&self, scan_window_hours: f64) -> Result<Vec<Market>, VenueError>;

    /// Fetch live prices for a batch of markets in parallel. A per-market failure yields a
    /// `LivePrice::default()` (all fields `None`) for that id rather than aborting the batch.
    async fn fetch_live_prices(
        &self,
        platform_ids: &[String],
    ) -> HashMap<String, LivePrice>;
}

/// The trading surface: order placement, lifecycle queries, and balance. Grounded on
/// `kalshi_trader.py`/`poly_trader.py`'s public methods.
#[async_trait]
pub trait OrderClient: Send + Sync {
    async fn get_balance(&self) -> Result<f64, VenueError>;

    /// Places a limit order for `count` units of `side` at `price_cents` (1-99). Returns the
    /// venue's order id.
    async fn place_order(
        &self,
        platform_id: &str,
        side: Side,
        count: u64,
        price_cents: f64,
    ) -> Result<String, VenueError>;

    async fn get_order(&self, order_id: &str) -> Result<OrderStatus, VenueError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;

    /// Units actually matched. Falls back to `estimated_size` if the venue's response omits a
    /// fill count (grounded on `poly_trader.py::get_actual_fill`).
    async fn get_actual_fill(&self, order_id: &str, estimated_size: u64) -> u64 {
        match self.get_order(order_id).await {
            Ok(status) => status.filled_units.unwrap_or(estimated_size),
            Err(_) => estimated_size,
        }
    }

    /// Current bid for `side` on `platform_id`, used to price an unwind sell at a real market
    /// price instead of a fixed nominal one (grounded on `kalshi_trader.py::get_market_price`).
    /// Default `None` so test doubles that don't care about unwind pricing don't need to
    /// implement it.
    async fn get_market_bid(&self, _platform_id: &str, _side: Side) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub state: OrderState,
    pub filled_units: Option<u64>,
}
