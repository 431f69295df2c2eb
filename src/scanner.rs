//! Option candidate scanning: chain queries plus covered-call and
//! cash-secured-put rankers.
//!
//! Both rankers share one shape: quote -> expirations in the DTE window ->
//! per-expiration chain fetch -> suitability filters -> rank by closeness to
//! the target delta, ties broken by annualized return. A failed expiration
//! fetch only drops that expiration's contribution.

use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::warn;

use crate::config::ScanCfg;
use crate::errors::MarketError;
use crate::market::{ContractSnapshot, MarketData};
use crate::types::OptionType;
use crate::utils::round_to;

// ---------- Chain query ----------

#[derive(Debug, Clone, Default)]
pub struct ChainFilter {
    pub side: Option<OptionType>,
    pub min_delta: Option<f64>,
    pub max_delta: Option<f64>,
    pub min_volume: Option<u64>,
    /// Keep only strikes within N steps (2.5% of spot each) of the money.
    pub near_the_money: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainContract {
    pub strike: f64,
    #[serde(rename = "type")]
    pub side: OptionType,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: u64,
    pub open_interest: Option<u64>,
    /// IV in percent.
    pub iv: Option<f64>,
    pub itm: bool,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChainReport {
    /// No expiration given: the dates to pick from.
    Expirations {
        symbol: String,
        price: f64,
        expirations: Vec<NaiveDate>,
        message: String,
    },
    Chain {
        symbol: String,
        price: f64,
        expiration: NaiveDate,
        dte: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        calls: Option<Vec<ChainContract>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        puts: Option<Vec<ChainContract>>,
    },
}

const EXPIRATION_LIST_CAP: usize = 20;

pub async fn get_option_chain<M: MarketData + ?Sized>(
    market: &M,
    symbol: &str,
    expiration: Option<NaiveDate>,
    filter: &ChainFilter,
    today: NaiveDate,
) -> Result<ChainReport, MarketError> {
    let quote = market.get_quote(symbol).await?;
    let spot = quote.price;

    let expirations = market.list_expirations(symbol).await?;
    if expirations.is_empty() {
        return Err(MarketError::NoOptions(symbol.to_string()));
    }
    let Some(expiration) = expiration else {
        return Ok(ChainReport::Expirations {
            symbol: symbol.to_string(),
            price: spot,
            expirations: expirations
                .into_iter()
                .take(EXPIRATION_LIST_CAP)
                .collect(),
            message: "specify an expiration date to get the option chain".to_string(),
        });
    };

    let dte = (expiration - today).num_days();
    let snapshots = market
        .chain_snapshot(symbol, expiration, filter.side)
        .await?;

    let mut calls = Vec::new();
    let mut puts = Vec::new();
    for c in snapshots {
        if let Some(side) = filter.side {
            if c.side != side {
                continue;
            }
        }
        if !passes_filter(&c, spot, filter) {
            continue;
        }
        let row = chain_contract(&c, spot);
        match c.side {
            OptionType::Call => calls.push(row),
            OptionType::Put => puts.push(row),
        }
    }
    let by_strike =
        |a: &ChainContract, b: &ChainContract| a.strike.partial_cmp(&b.strike).unwrap_or(Ordering::Equal);
    calls.sort_by(by_strike);
    puts.sort_by(by_strike);

    Ok(ChainReport::Chain {
        symbol: symbol.to_string(),
        price: spot,
        expiration,
        dte,
        calls: match filter.side {
            None | Some(OptionType::Call) => Some(calls),
            _ => None,
        },
        puts: match filter.side {
            None | Some(OptionType::Put) => Some(puts),
            _ => None,
        },
    })
}

fn passes_filter(c: &ContractSnapshot, spot: f64, filter: &ChainFilter) -> bool {
    if let Some(n) = filter.near_the_money {
        if (c.strike - spot).abs() > n as f64 * spot * 0.025 {
            return false;
        }
    }
    // delta filters only apply when a delta is known
    let delta = c.unsigned_delta();
    if let Some(min) = filter.min_delta {
        if delta > 0.0 && delta < min {
            return false;
        }
    }
    if let Some(max) = filter.max_delta {
        if delta > 0.0 && delta > max {
            return false;
        }
    }
    if let Some(min_volume) = filter.min_volume {
        if c.volume < min_volume {
            return false;
        }
    }
    true
}

fn chain_contract(c: &ContractSnapshot, spot: f64) -> ChainContract {
    let itm = match c.side {
        OptionType::Call => spot > c.strike,
        OptionType::Put => spot < c.strike,
    };
    let delta = c.unsigned_delta();
    let nonzero = |v: f64| (v != 0.0).then_some(v);
    ChainContract {
        strike: c.strike,
        side: c.side,
        last: (c.last_price > 0.0).then(|| round_to(c.last_price, 2)),
        bid: c.bid.filter(|b| *b > 0.0).map(|b| round_to(b, 2)),
        ask: c.ask.filter(|a| *a > 0.0).map(|a| round_to(a, 2)),
        volume: c.volume,
        open_interest: (c.open_interest > 0).then_some(c.open_interest),
        iv: c
            .implied_volatility
            .filter(|v| *v > 0.0)
            .map(|v| round_to(v * 100.0, 1)),
        itm,
        delta: (delta > 0.0).then(|| round_to(delta, 3)),
        gamma: c.greeks.and_then(|g| nonzero(round_to(g.gamma, 4))),
        theta: c.greeks.and_then(|g| nonzero(round_to(g.theta, 4))),
        vega: c.greeks.and_then(|g| nonzero(round_to(g.vega, 4))),
    }
}

// ---------- Covered call ----------

#[derive(Debug, Clone)]
pub struct CoveredCallParams {
    pub symbol: String,
    pub shares: u32,
    pub target_delta: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Minimum premium as % of spot.
    pub min_premium_pct: f64,
    pub limit: usize,
}

impl CoveredCallParams {
    pub fn from_cfg(symbol: String, shares: u32, cfg: &ScanCfg) -> Self {
        Self {
            symbol,
            shares,
            target_delta: cfg.target_delta,
            min_dte: cfg.min_dte,
            max_dte: cfg.max_dte,
            min_premium_pct: cfg.min_premium_pct,
            limit: cfg.max_candidates,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoveredCallCandidate {
    pub expiration: NaiveDate,
    pub dte: i64,
    pub strike: f64,
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
    pub iv: Option<f64>,
    pub delta: f64,
    pub contracts: u32,
    pub premium: f64,
    pub premium_pct: f64,
    pub annualized_return: f64,
    pub upside_to_strike: f64,
    pub max_return_pct: f64,
    pub breakeven: f64,
    pub delta_diff: f64,
}

#[derive(Debug, Serialize)]
pub struct CoveredCallReport {
    pub symbol: String,
    pub price: f64,
    pub shares: u32,
    pub position_value: f64,
    pub target_delta: f64,
    pub candidates: Vec<CoveredCallCandidate>,
}

pub async fn find_covered_call<M: MarketData + ?Sized>(
    market: &M,
    params: &CoveredCallParams,
    today: NaiveDate,
) -> Result<CoveredCallReport, MarketError> {
    let quote = market.get_quote(&params.symbol).await?;
    let spot = quote.price;
    let window =
        expirations_in_window(market, &params.symbol, today, params.min_dte, params.max_dte)
            .await?;

    let contracts = params.shares / 100;
    let mut candidates = Vec::new();
    for (expiration, dte) in window {
        let chain = match market
            .chain_snapshot(&params.symbol, expiration, Some(OptionType::Call))
            .await
        {
            Ok(chain) => chain,
            Err(e) => {
                warn!(symbol = %params.symbol, %expiration, error = %e,
                    "skipping expiration after chain fetch failure");
                continue;
            }
        };
        for c in chain {
            if c.side != OptionType::Call {
                continue;
            }
            // must be OTM to leave upside on the shares
            if c.strike <= spot {
                continue;
            }
            let delta = c.unsigned_delta();
            if delta == 0.0 {
                continue;
            }
            if c.last_price <= 0.0 {
                continue;
            }
            let premium_pct = c.last_price / spot * 100.0;
            if premium_pct < params.min_premium_pct {
                continue;
            }
            let premium = c.last_price * 100.0 * contracts as f64;
            let annualized = if dte > 0 {
                premium_pct / dte as f64 * 365.0
            } else {
                0.0
            };
            let upside = (c.strike - spot) / spot * 100.0;
            candidates.push(CoveredCallCandidate {
                expiration,
                dte,
                strike: c.strike,
                last: round_to(c.last_price, 2),
                volume: c.volume,
                open_interest: c.open_interest,
                iv: c
                    .implied_volatility
                    .filter(|v| *v > 0.0)
                    .map(|v| round_to(v * 100.0, 1)),
                delta: round_to(delta, 3),
                contracts,
                premium: round_to(premium, 2),
                premium_pct: round_to(premium_pct, 2),
                annualized_return: round_to(annualized, 1),
                upside_to_strike: round_to(upside, 1),
                max_return_pct: round_to(premium_pct + upside, 1),
                breakeven: round_to(spot - c.last_price, 2),
                delta_diff: (delta - params.target_delta).abs(),
            });
        }
    }
    rank(&mut candidates, |c| (c.delta_diff, c.annualized_return), params.limit);

    Ok(CoveredCallReport {
        symbol: params.symbol.clone(),
        price: spot,
        shares: params.shares,
        position_value: round_to(spot * params.shares as f64, 2),
        target_delta: params.target_delta,
        candidates,
    })
}

// ---------- Cash-secured put ----------

#[derive(Debug, Clone)]
pub struct CashSecuredPutParams {
    pub symbol: String,
    pub cash_available: f64,
    pub target_delta: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Minimum premium as % of strike.
    pub min_premium_pct: f64,
    pub limit: usize,
}

impl CashSecuredPutParams {
    pub fn from_cfg(symbol: String, cash_available: f64, cfg: &ScanCfg) -> Self {
        Self {
            symbol,
            cash_available,
            target_delta: cfg.target_delta,
            min_dte: cfg.min_dte,
            max_dte: cfg.max_dte,
            min_premium_pct: cfg.min_premium_pct,
            limit: cfg.max_candidates,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CashSecuredPutCandidate {
    pub expiration: NaiveDate,
    pub dte: i64,
    pub strike: f64,
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
    pub iv: Option<f64>,
    pub delta: f64,
    pub contracts: u32,
    /// Total cash reserved across all contracts.
    pub collateral: f64,
    pub premium: f64,
    pub premium_pct: f64,
    pub annualized_return: f64,
    pub discount_to_current: f64,
    pub breakeven: f64,
    pub cost_basis_if_assigned: f64,
    pub delta_diff: f64,
}

#[derive(Debug, Serialize)]
pub struct CashSecuredPutReport {
    pub symbol: String,
    pub price: f64,
    pub cash_available: f64,
    pub target_delta: f64,
    pub candidates: Vec<CashSecuredPutCandidate>,
}

pub async fn find_cash_secured_put<M: MarketData + ?Sized>(
    market: &M,
    params: &CashSecuredPutParams,
    today: NaiveDate,
) -> Result<CashSecuredPutReport, MarketError> {
    let quote = market.get_quote(&params.symbol).await?;
    let spot = quote.price;
    let window =
        expirations_in_window(market, &params.symbol, today, params.min_dte, params.max_dte)
            .await?;

    let mut candidates = Vec::new();
    for (expiration, dte) in window {
        let chain = match market
            .chain_snapshot(&params.symbol, expiration, Some(OptionType::Put))
            .await
        {
            Ok(chain) => chain,
            Err(e) => {
                warn!(symbol = %params.symbol, %expiration, error = %e,
                    "skipping expiration after chain fetch failure");
                continue;
            }
        };
        for c in chain {
            if c.side != OptionType::Put {
                continue;
            }
            // must be OTM, and one contract's collateral has to fit the cash
            if c.strike >= spot {
                continue;
            }
            let collateral = c.strike * 100.0;
            if collateral > params.cash_available {
                continue;
            }
            let delta = c.unsigned_delta();
            if delta == 0.0 {
                continue;
            }
            if c.last_price <= 0.0 {
                continue;
            }
            let contracts = (params.cash_available / collateral).floor() as u32;
            if contracts < 1 {
                continue;
            }
            let premium_pct = c.last_price / c.strike * 100.0;
            if premium_pct < params.min_premium_pct {
                continue;
            }
            let premium = c.last_price * 100.0 * contracts as f64;
            let annualized = if dte > 0 {
                premium_pct / dte as f64 * 365.0
            } else {
                0.0
            };
            let breakeven = c.strike - c.last_price;
            candidates.push(CashSecuredPutCandidate {
                expiration,
                dte,
                strike: c.strike,
                last: round_to(c.last_price, 2),
                volume: c.volume,
                open_interest: c.open_interest,
                iv: c
                    .implied_volatility
                    .filter(|v| *v > 0.0)
                    .map(|v| round_to(v * 100.0, 1)),
                delta: round_to(delta, 3),
                contracts,
                collateral: round_to(collateral * contracts as f64, 2),
                premium: round_to(premium, 2),
                premium_pct: round_to(premium_pct, 2),
                annualized_return: round_to(annualized, 1),
                discount_to_current: round_to((spot - c.strike) / spot * 100.0, 1),
                breakeven: round_to(breakeven, 2),
                cost_basis_if_assigned: round_to(breakeven, 2),
                delta_diff: (delta - params.target_delta).abs(),
            });
        }
    }
    rank(&mut candidates, |c| (c.delta_diff, c.annualized_return), params.limit);

    Ok(CashSecuredPutReport {
        symbol: params.symbol.clone(),
        price: spot,
        cash_available: round_to(params.cash_available, 2),
        target_delta: params.target_delta,
        candidates,
    })
}

// ---------- Shared pieces ----------

/// Expirations whose DTE falls inside [min_dte, max_dte], paired with DTE.
async fn expirations_in_window<M: MarketData + ?Sized>(
    market: &M,
    symbol: &str,
    today: NaiveDate,
    min_dte: i64,
    max_dte: i64,
) -> Result<Vec<(NaiveDate, i64)>, MarketError> {
    let all = market.list_expirations(symbol).await?;
    if all.is_empty() {
        return Err(MarketError::NoOptions(symbol.to_string()));
    }
    Ok(all
        .into_iter()
        .map(|d| (d, (d - today).num_days()))
        .filter(|(_, dte)| (min_dte..=max_dte).contains(dte))
        .collect())
}

/// Ascending |delta - target|, ties broken by descending annualized return.
fn rank<C>(candidates: &mut Vec<C>, key: impl Fn(&C) -> (f64, f64), limit: usize) {
    candidates.sort_by(|a, b| {
        let (diff_a, ret_a) = key(a);
        let (diff_b, ret_b) = key(b);
        diff_a
            .partial_cmp(&diff_b)
            .unwrap_or(Ordering::Equal)
            .then(ret_b.partial_cmp(&ret_a).unwrap_or(Ordering::Equal))
    });
    candidates.truncate(limit);
}
