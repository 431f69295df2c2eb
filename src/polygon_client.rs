//! Thin Polygon.io REST client implementing the `MarketData` capability:
//! stock snapshots, option expirations and option-chain snapshots with Greeks.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::config::PolygonCfg;
use crate::errors::MarketError;
use crate::market::{estimate_delta, ContractSnapshot, Greeks, MarketData, StockQuote};
use crate::types::OptionType;
use crate::utils::round_to;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: String,
    estimate_missing_greeks: bool,
}

impl PolygonClient {
    pub fn new(api_key: String, cfg: &PolygonCfg) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            estimate_missing_greeks: cfg.estimate_missing_greeks,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "polygon request");
        let resp = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MarketError::Restricted(
                "request rejected by the Polygon plan tier - an upgraded plan is required \
                 (see polygon.io/pricing)"
                    .to_string(),
            ));
        }
        if !status.is_success() {
            return Err(MarketError::Provider(format!("HTTP {status} for {path}")));
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl MarketData for PolygonClient {
    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, MarketError> {
        let symbol = symbol.to_uppercase();
        let path = format!("/v2/snapshot/locale/us/markets/stocks/tickers/{symbol}");
        let snap: StockSnapshotResponse = match self.get_json(&path, &[]).await {
            Ok(v) => v,
            Err(MarketError::Provider(msg)) if msg.contains("404") => {
                return Err(MarketError::NotFound(symbol))
            }
            Err(e) => return Err(e),
        };
        let ticker = snap
            .ticker
            .ok_or_else(|| MarketError::NotFound(symbol.clone()))?;
        let mut quote = quote_from_snapshot(&symbol, &ticker)
            .ok_or_else(|| MarketError::NotFound(symbol.clone()))?;

        // Ticker details may be gated on some plans; ignore failures.
        let details_path = format!("/v3/reference/tickers/{symbol}");
        if let Ok(details) = self
            .get_json::<TickerDetailsResponse>(&details_path, &[])
            .await
        {
            quote.market_cap = details
                .results
                .and_then(|r| r.market_cap)
                .map(|m| m as u64);
        }
        Ok(quote)
    }

    async fn list_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, MarketError> {
        let symbol = symbol.to_uppercase();
        let resp: ContractsResponse = self
            .get_json(
                "/v3/reference/options/contracts",
                &[
                    ("underlying_ticker", symbol),
                    ("expired", "false".to_string()),
                    ("limit", "1000".to_string()),
                ],
            )
            .await?;
        let mut dates = BTreeSet::new();
        for contract in resp.results.unwrap_or_default() {
            if let Some(raw) = contract.expiration_date {
                if let Ok(d) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                    dates.insert(d);
                }
            }
        }
        Ok(dates.into_iter().collect())
    }

    async fn chain_snapshot(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        side: Option<OptionType>,
    ) -> Result<Vec<ContractSnapshot>, MarketError> {
        let symbol = symbol.to_uppercase();
        let mut query = vec![
            ("expiration_date", expiration.format("%Y-%m-%d").to_string()),
            ("limit", "250".to_string()),
        ];
        if let Some(side) = side {
            let kind = match side {
                OptionType::Call => "call",
                OptionType::Put => "put",
            };
            query.push(("contract_type", kind.to_string()));
        }
        let resp: ChainResponse = self
            .get_json(&format!("/v3/snapshot/options/{symbol}"), &query)
            .await?;

        let dte = (expiration - Local::now().date_naive()).num_days();
        let contracts = resp
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| contract_from_item(item, self.estimate_missing_greeks, dte))
            .collect();
        Ok(contracts)
    }
}

/// Resolve a usable price out of the stock snapshot: today's close, the
/// latest minute bar, then the last trade.
fn quote_from_snapshot(symbol: &str, t: &TickerSnapshot) -> Option<StockQuote> {
    let day = t.day.as_ref();
    let price = [
        day.and_then(|d| d.c),
        t.minute.as_ref().and_then(|m| m.c),
        t.last_trade.as_ref().and_then(|lt| lt.p),
    ]
    .into_iter()
    .flatten()
    .find(|p| *p > 0.0)?;

    let prev_close = t.prev_day.as_ref().and_then(|d| d.c).filter(|c| *c > 0.0);
    let change = prev_close.map(|pc| price - pc).unwrap_or(0.0);
    let change_pct = prev_close
        .map(|pc| (price - pc) / pc * 100.0)
        .unwrap_or(0.0);

    Some(StockQuote {
        symbol: symbol.to_string(),
        price: round_to(price, 2),
        change: round_to(change, 2),
        change_pct: round_to(change_pct, 2),
        prev_close,
        volume: day.and_then(|d| d.v).unwrap_or(0.0) as u64,
        vwap: day.and_then(|d| d.vw),
        market_cap: None,
    })
}

fn contract_from_item(item: ChainItem, estimate: bool, dte: i64) -> Option<ContractSnapshot> {
    let details = item.details?;
    let strike = details.strike_price?;
    let side = match details.contract_type.as_deref() {
        Some("call") => OptionType::Call,
        Some("put") => OptionType::Put,
        _ => return None,
    };
    let last_price = item
        .last_trade
        .as_ref()
        .and_then(|t| t.price)
        .filter(|p| *p > 0.0)
        .or_else(|| item.day.as_ref().and_then(|d| d.close))
        .unwrap_or(0.0);

    let mut greeks = item.greeks.map(|g| Greeks {
        delta: g.delta.unwrap_or(0.0),
        gamma: g.gamma.unwrap_or(0.0),
        theta: g.theta.unwrap_or(0.0),
        vega: g.vega.unwrap_or(0.0),
    });
    if greeks.is_none() && estimate {
        let spot = item
            .underlying_asset
            .as_ref()
            .and_then(|u| u.price)
            .filter(|p| *p > 0.0);
        if let Some(spot) = spot {
            greeks = Some(Greeks {
                delta: estimate_delta(spot, strike, dte, side),
                ..Greeks::default()
            });
        }
    }

    Some(ContractSnapshot {
        strike,
        side,
        last_price,
        volume: item.day.as_ref().and_then(|d| d.volume).unwrap_or(0.0) as u64,
        open_interest: item.open_interest.unwrap_or(0.0) as u64,
        implied_volatility: item.implied_volatility,
        greeks,
        bid: item.last_quote.as_ref().and_then(|q| q.bid),
        ask: item.last_quote.as_ref().and_then(|q| q.ask),
    })
}

// ---------- Wire formats ----------

#[derive(Debug, Default, Deserialize)]
struct StockSnapshotResponse {
    #[serde(default)]
    ticker: Option<TickerSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
struct TickerSnapshot {
    #[serde(default)]
    day: Option<Agg>,
    #[serde(default, rename = "prevDay")]
    prev_day: Option<Agg>,
    #[serde(default, rename = "lastTrade")]
    last_trade: Option<TradeStamp>,
    #[serde(default, rename = "min")]
    minute: Option<Agg>,
}

#[derive(Debug, Default, Deserialize)]
struct Agg {
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    v: Option<f64>,
    #[serde(default)]
    vw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TradeStamp {
    #[serde(default)]
    p: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TickerDetailsResponse {
    #[serde(default)]
    results: Option<TickerDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct TickerDetails {
    #[serde(default)]
    market_cap: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContractsResponse {
    #[serde(default)]
    results: Option<Vec<ContractRef>>,
}

#[derive(Debug, Default, Deserialize)]
struct ContractRef {
    #[serde(default)]
    expiration_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChainResponse {
    #[serde(default)]
    results: Option<Vec<ChainItem>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChainItem {
    #[serde(default)]
    details: Option<ContractDetails>,
    #[serde(default)]
    greeks: Option<RawGreeks>,
    #[serde(default)]
    day: Option<OptionDay>,
    #[serde(default)]
    last_trade: Option<OptionTrade>,
    #[serde(default)]
    last_quote: Option<OptionQuoteStamp>,
    #[serde(default)]
    implied_volatility: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
    #[serde(default)]
    underlying_asset: Option<UnderlyingAsset>,
}

#[derive(Debug, Default, Deserialize)]
struct ContractDetails {
    #[serde(default)]
    strike_price: Option<f64>,
    #[serde(default)]
    contract_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGreeks {
    #[serde(default)]
    delta: Option<f64>,
    #[serde(default)]
    gamma: Option<f64>,
    #[serde(default)]
    theta: Option<f64>,
    #[serde(default)]
    vega: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OptionDay {
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OptionTrade {
    #[serde(default)]
    price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OptionQuoteStamp {
    #[serde(default)]
    bid: Option<f64>,
    #[serde(default)]
    ask: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct UnderlyingAsset {
    #[serde(default)]
    price: Option<f64>,
}
