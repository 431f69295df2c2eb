//! Map portfolio alerts to templated research prompts.
//!
//! Each alert category carries a fixed priority and prompt template; the
//! output is sorted ascending by priority (stable, so ties keep alert
//! emission order).

use regex::Regex;

use crate::types::{
    Alert, AlertCategory, HoldingRow, PortfolioAnalysis, PromptCategory, ResearchPrompt,
};

pub fn generate_research_prompts(analysis: &PortfolioAnalysis) -> Vec<ResearchPrompt> {
    // Leading "SYMBOL:" token after any emoji/marker prefix.
    let symbol_re = Regex::new(r"^\W*(\w+):").expect("static regex");

    let mut prompts = Vec::new();
    for alert in &analysis.alerts {
        let symbol = symbol_re
            .captures(&alert.message)
            .map(|c| c[1].to_string());
        if let Some(p) = prompt_for(alert, symbol) {
            prompts.push(p);
        }
    }
    if let Some(context) = market_context_prompt(&analysis.holdings) {
        prompts.push(context);
    }
    prompts.sort_by_key(|p| p.priority);
    prompts
}

fn prompt_for(alert: &Alert, symbol: Option<String>) -> Option<ResearchPrompt> {
    let sym = symbol.as_deref().unwrap_or("the position");
    let (priority, category, prompt) = match alert.category {
        AlertCategory::ItmShort => (
            1,
            PromptCategory::AssignmentRisk,
            format!(
                "Research {sym} assignment risk and near-term outlook:\n\
                 - Current stock price vs option strike\n\
                 - Upcoming earnings, dividends, or catalysts\n\
                 - Technical support/resistance levels\n\
                 - Should I roll, close, or accept assignment?"
            ),
        ),
        AlertCategory::CashShortfall => (
            2,
            PromptCategory::CashManagement,
            "Research short put assignment timing:\n\
             - When do brokers typically exercise ITM puts?\n\
             - Market conditions affecting early assignment\n\
             - Cash management strategies for wheel traders"
                .to_string(),
        ),
        AlertCategory::HighDelta => (
            3,
            PromptCategory::DeltaRisk,
            format!(
                "Research {sym} short-term price action:\n\
                 - Current IV rank and IV percentile\n\
                 - Analyst price targets and recent ratings changes\n\
                 - Technical momentum indicators\n\
                 - Roll candidates: same strike further out, or lower strike?"
            ),
        ),
        AlertCategory::Expiration => (
            4,
            PromptCategory::Expiration,
            format!(
                "Research {sym} for expiration decision:\n\
                 - Current implied volatility vs historical\n\
                 - Any news or events before expiration\n\
                 - Roll vs let expire analysis\n\
                 - If rolling: optimal DTE and strike selection"
            ),
        ),
        AlertCategory::UnrealizedLoss => (
            5,
            PromptCategory::LossReview,
            format!(
                "Research {sym} thesis review:\n\
                 - What caused the decline?\n\
                 - Is the original investment thesis still valid?\n\
                 - Analyst consensus and price targets\n\
                 - Tax-loss harvesting considerations"
            ),
        ),
        // Naked shorts and the all-clear sentinel have no research angle.
        AlertCategory::NakedShort | AlertCategory::AllClear => return None,
    };
    Some(ResearchPrompt {
        priority,
        category,
        symbol,
        prompt,
        context: alert.message.clone(),
    })
}

/// One general market-context prompt covering up to 5 distinct underlyings,
/// in first-seen order.
fn market_context_prompt(holdings: &[HoldingRow]) -> Option<ResearchPrompt> {
    let mut symbols: Vec<&str> = Vec::new();
    for row in holdings {
        let s = match row {
            HoldingRow::Equity { symbol, .. } => symbol.as_str(),
            HoldingRow::Option { underlying, .. } => underlying.as_str(),
        };
        if !s.is_empty() && !symbols.contains(&s) {
            symbols.push(s);
        }
    }
    if symbols.is_empty() {
        return None;
    }
    symbols.truncate(5);
    Some(ResearchPrompt {
        priority: 10,
        category: PromptCategory::MarketContext,
        symbol: None,
        prompt: format!(
            "Research current market environment for my positions ({}):\n\
             - Overall market sentiment (VIX, put/call ratios)\n\
             - Sector rotation trends affecting tech\n\
             - Upcoming macro events (Fed, earnings season)\n\
             - IV environment: elevated or depressed?",
            symbols.join(", ")
        ),
        context: "General market context".to_string(),
    })
}
