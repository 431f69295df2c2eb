//! Market data capability consumed by the chain query and the rankers.
//!
//! The gateway is injected as a trait object so the scanning logic can be
//! exercised against a mock; the real implementation lives in
//! `polygon_client`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::MarketError;
use crate::types::OptionType;

#[derive(Debug, Clone, Serialize)]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub prev_close: Option<f64>,
    pub volume: u64,
    pub vwap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// One contract from a chain snapshot.
#[derive(Debug, Clone)]
pub struct ContractSnapshot {
    pub strike: f64,
    pub side: OptionType,
    /// Last traded price; 0.0 when the contract has not traded.
    pub last_price: f64,
    pub volume: u64,
    pub open_interest: u64,
    /// As a fraction (0.42 = 42%).
    pub implied_volatility: Option<f64>,
    pub greeks: Option<Greeks>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

impl ContractSnapshot {
    /// Unsigned delta; 0.0 when Greeks are unavailable. Scanning logic keys
    /// off this accessor and never cares where the delta came from.
    pub fn unsigned_delta(&self) -> f64 {
        self.greeks.map(|g| g.delta.abs()).unwrap_or(0.0)
    }
}

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, MarketError>;

    /// Sorted, deduplicated expiration dates; may be empty.
    async fn list_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, MarketError>;

    /// Chain snapshot for one expiration, optionally one side only.
    async fn chain_snapshot(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        side: Option<OptionType>,
    ) -> Result<Vec<ContractSnapshot>, MarketError>;
}

/// Rough delta approximation from moneyness and time, for chains where the
/// provider returns no Greeks. Clamped to [0.01, 0.99].
pub fn estimate_delta(spot: f64, strike: f64, dte: i64, side: OptionType) -> f64 {
    let moneyness = (spot - strike) / spot;
    // contracts close to expiry carry more extreme deltas
    let time_factor = (dte as f64 / 30.0).clamp(0.1, 1.0);
    let raw = match side {
        OptionType::Call => 0.5 + moneyness * 2.0 / time_factor,
        OptionType::Put => 0.5 - moneyness * 2.0 / time_factor,
    };
    raw.clamp(0.01, 0.99)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_the_money_is_half() {
        assert_eq!(estimate_delta(100.0, 100.0, 30, OptionType::Call), 0.5);
        assert_eq!(estimate_delta(100.0, 100.0, 30, OptionType::Put), 0.5);
    }

    #[test]
    fn call_delta_rises_with_moneyness() {
        let otm = estimate_delta(100.0, 110.0, 30, OptionType::Call);
        let atm = estimate_delta(100.0, 100.0, 30, OptionType::Call);
        let itm = estimate_delta(100.0, 90.0, 30, OptionType::Call);
        assert!(otm < atm && atm < itm);
    }

    #[test]
    fn put_mirrors_call() {
        let put_itm = estimate_delta(100.0, 110.0, 30, OptionType::Put);
        let put_otm = estimate_delta(100.0, 90.0, 30, OptionType::Put);
        assert!(put_itm > 0.5);
        assert!(put_otm < 0.5);
    }

    #[test]
    fn clamped_to_unit_interval() {
        assert_eq!(estimate_delta(100.0, 10.0, 1, OptionType::Call), 0.99);
        assert_eq!(estimate_delta(100.0, 500.0, 1, OptionType::Call), 0.01);
    }

    #[test]
    fn missing_greeks_read_as_zero_delta() {
        let c = ContractSnapshot {
            strike: 100.0,
            side: OptionType::Call,
            last_price: 1.0,
            volume: 0,
            open_interest: 0,
            implied_volatility: None,
            greeks: None,
            bid: None,
            ask: None,
        };
        assert_eq!(c.unsigned_delta(), 0.0);
        let with = ContractSnapshot {
            greeks: Some(Greeks {
                delta: -0.35,
                ..Greeks::default()
            }),
            ..c
        };
        assert_eq!(with.unsigned_delta(), 0.35);
    }
}
