//! Entry point. Wires CSV export -> Parser -> Risk -> Prompts, and the
//! Polygon gateway -> chain query / candidate rankers. Every command prints
//! one JSON document to stdout.

mod clock;
mod config;
mod errors;
mod fields;
mod market;
mod parser;
mod polygon_client;
mod prompts;
mod risk;
mod scanner;
mod types;
mod utils;

use anyhow::Context;
use chrono::{Local, NaiveDate, Utc};
use dotenvy::dotenv;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::errors::MarketError;
use crate::market::MarketData;
use crate::polygon_client::PolygonClient;
use crate::scanner::{CashSecuredPutParams, ChainFilter, CoveredCallParams};
use crate::types::OptionType;
use crate::utils::sanitize_symbol;

const USAGE: &str = "\
usage: portfolio-monitor <command> [args]

  analyze <export.csv>                alerts, summary and holdings for an account export
  prompts <export.csv>                research prompts derived from the alerts
  time                                NYC market time and session
  quote <SYMBOL>                      current stock quote
  chain <SYMBOL> [YYYY-MM-DD] [calls|puts]
                                      option chain (or the available expirations)
  covered-call <SYMBOL> <SHARES>      ranked covered-call candidates
  cash-secured-put <SYMBOL> <CASH>    ranked cash-secured-put candidates

POLYGON_API_KEY must be set (environment or .env) for the market data commands.";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::load_or_default("config.yaml")?;
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let today = Local::now().date_naive();

    match command.as_str() {
        "time" => print_json(&clock::market_time(Utc::now()))?,

        "analyze" | "prompts" => {
            let path = args.next().context("missing <export.csv> argument")?;
            let csv_text =
                std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
            let snapshot = parser::parse_portfolio(&csv_text)?;
            info!(
                equities = snapshot.equities.len(),
                options = snapshot.options.len(),
                cash = snapshot.cash,
                "parsed portfolio export"
            );
            let analysis = risk::RiskEngine::new(cfg.alerts.clone()).analyze(&snapshot, today);
            if command == "analyze" {
                print_json(&analysis)?;
            } else {
                print_json(&prompts::generate_research_prompts(&analysis))?;
            }
        }

        "quote" => {
            let symbol = sanitize_symbol(&args.next().context("missing <SYMBOL> argument")?);
            let market = gateway(&cfg)?;
            render(market.get_quote(&symbol).await)?;
        }

        "chain" => {
            let symbol = sanitize_symbol(&args.next().context("missing <SYMBOL> argument")?);
            let mut expiration = None;
            let mut filter = ChainFilter::default();
            for arg in args {
                match arg.as_str() {
                    "calls" => filter.side = Some(OptionType::Call),
                    "puts" => filter.side = Some(OptionType::Put),
                    other => {
                        expiration = Some(
                            NaiveDate::parse_from_str(other, "%Y-%m-%d")
                                .with_context(|| format!("bad expiration date {other:?}"))?,
                        );
                    }
                }
            }
            let market = gateway(&cfg)?;
            render(scanner::get_option_chain(&market, &symbol, expiration, &filter, today).await)?;
        }

        "covered-call" => {
            let symbol = sanitize_symbol(&args.next().context("missing <SYMBOL> argument")?);
            let shares: u32 = args
                .next()
                .context("missing <SHARES> argument")?
                .parse()
                .context("SHARES must be a whole number")?;
            let market = gateway(&cfg)?;
            let params = CoveredCallParams::from_cfg(symbol, shares, &cfg.scan);
            render(scanner::find_covered_call(&market, &params, today).await)?;
        }

        "cash-secured-put" => {
            let symbol = sanitize_symbol(&args.next().context("missing <SYMBOL> argument")?);
            let cash: f64 = args
                .next()
                .context("missing <CASH> argument")?
                .parse()
                .context("CASH must be a number")?;
            let market = gateway(&cfg)?;
            let params = CashSecuredPutParams::from_cfg(symbol, cash, &cfg.scan);
            render(scanner::find_cash_secured_put(&market, &params, today).await)?;
        }

        other => {
            eprintln!("unknown command {other:?}\n\n{USAGE}");
            std::process::exit(2);
        }
    }
    Ok(())
}

fn gateway(cfg: &AppConfig) -> anyhow::Result<PolygonClient> {
    let api_key = std::env::var("POLYGON_API_KEY")
        .context("POLYGON_API_KEY not set (add it to .env or the environment)")?;
    Ok(PolygonClient::new(api_key, &cfg.polygon))
}

/// Market data failures render as an `{"error": ...}` object instead of
/// aborting, so callers always get JSON back.
fn render<T: Serialize>(result: Result<T, MarketError>) -> anyhow::Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => print_json(&serde_json::json!({ "error": e.to_string() })),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
