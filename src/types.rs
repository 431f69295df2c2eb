//! Core domain types for holdings, alerts and research prompts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Single-letter marker as it appears in the export ("C" / "P").
    pub fn letter(self) -> char {
        match self {
            OptionType::Call => 'C',
            OptionType::Put => 'P',
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EquityHolding {
    pub symbol: String,
    pub quantity: i64,
    pub price: f64,
    pub market_value: f64,
    pub gain_pct: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptionHolding {
    /// Raw export symbol, e.g. "NVDA 01/23/2026 200.00 C".
    pub symbol: String,
    pub underlying: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    /// Contracts; negative = short.
    pub quantity: i64,
    pub price: f64,
    pub market_value: f64,
    /// Unsigned delta; `None` when the export had no value.
    pub delta: Option<f64>,
    pub gain_pct: f64,
}

impl OptionHolding {
    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }
}

/// Parsed account export. Built once per analysis call, immutable after.
#[derive(Debug, Clone, Default)]
pub struct PortfolioSnapshot {
    pub equities: Vec<EquityHolding>,
    pub options: Vec<OptionHolding>,
    pub cash: f64,
}

impl PortfolioSnapshot {
    pub fn equity(&self, symbol: &str) -> Option<&EquityHolding> {
        self.equities.iter().find(|e| e.symbol == symbol)
    }

    pub fn equity_value(&self) -> f64 {
        self.equities.iter().map(|e| e.market_value).sum()
    }

    pub fn option_value(&self) -> f64 {
        self.options.iter().map(|o| o.market_value).sum()
    }
}

/// Rule category, in emission (= priority) order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    ItmShort,
    CashShortfall,
    HighDelta,
    Expiration,
    UnrealizedLoss,
    NakedShort,
    AllClear,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Alert {
    pub category: AlertCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PortfolioSummary {
    pub cash: f64,
    pub equity_value: f64,
    pub option_value: f64,
    pub total_value: f64,
}

/// Flattened display row: equities first, then options.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HoldingRow {
    Equity {
        symbol: String,
        qty: i64,
        price: f64,
        value: f64,
        gain_pct: f64,
    },
    Option {
        symbol: String,
        underlying: String,
        strike: f64,
        opt_type: OptionType,
        expiration: NaiveDate,
        qty: i64,
        price: f64,
        value: f64,
        delta: Option<f64>,
        gain_pct: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioAnalysis {
    pub alerts: Vec<Alert>,
    pub summary: PortfolioSummary,
    pub holdings: Vec<HoldingRow>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptCategory {
    AssignmentRisk,
    CashManagement,
    DeltaRisk,
    Expiration,
    LossReview,
    MarketContext,
}

/// Templated follow-up research task derived from an alert.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResearchPrompt {
    /// Lower = more urgent.
    pub priority: u8,
    pub category: PromptCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub prompt: String,
    /// Source alert text.
    pub context: String,
}
