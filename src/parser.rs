//! Parse the brokerage CSV export into a portfolio snapshot.
//!
//! The export carries a title row, then the real header, then position rows,
//! closed out by "Cash & Cash Investments" and "Account Total" summary rows.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::errors::ParseError;
use crate::fields;
use crate::types::{EquityHolding, OptionHolding, PortfolioSnapshot};

const CASH_SYMBOL: &str = "Cash & Cash Investments";
const TOTAL_SYMBOL: &str = "Account Total";
const EQUITY_TYPES: [&str; 2] = ["Equity", "ETFs & Closed End Funds"];
const OPTION_TYPE: &str = "Option";

struct Columns {
    symbol: usize,
    sec_type: usize,
    qty: usize,
    price: usize,
    mkt_val: usize,
    gain_pct: usize,
    delta: usize,
}

impl Columns {
    fn locate(header: &StringRecord) -> Result<Self, ParseError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ParseError::MissingColumn(name.to_string()))
        };
        Ok(Self {
            symbol: find("Symbol")?,
            sec_type: find("Security Type")?,
            qty: find("Qty (Quantity)")?,
            price: find("Price")?,
            mkt_val: find("Mkt Val (Market Value)")?,
            gain_pct: find("Gain % (Gain/Loss %)")?,
            delta: find("Delta")?,
        })
    }
}

fn cell<'a>(rec: &'a StringRecord, idx: usize) -> &'a str {
    rec.get(idx).unwrap_or("").trim()
}

pub fn parse_portfolio(csv_text: &str) -> Result<PortfolioSnapshot, ParseError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut records: Vec<StringRecord> = Vec::new();
    for rec in rdr.records() {
        records.push(rec?);
    }
    // First record is the export title; the second is the real header.
    if records.len() < 2 {
        return Err(ParseError::MissingHeader);
    }
    let cols = Columns::locate(&records[1])?;
    let rows = &records[2..];

    let cash = rows
        .iter()
        .find(|r| cell(r, cols.symbol) == CASH_SYMBOL)
        .map(|r| fields::parse_currency(cell(r, cols.mkt_val)))
        .unwrap_or(0.0);

    let mut equities = Vec::new();
    let mut options = Vec::new();
    for row in rows {
        let symbol = cell(row, cols.symbol);
        if symbol.is_empty() || symbol == CASH_SYMBOL || symbol == TOTAL_SYMBOL {
            continue;
        }
        let sec_type = cell(row, cols.sec_type);
        if EQUITY_TYPES.contains(&sec_type) {
            equities.push(EquityHolding {
                symbol: symbol.to_string(),
                quantity: fields::parse_currency(cell(row, cols.qty)) as i64,
                price: fields::parse_currency(cell(row, cols.price)),
                market_value: fields::parse_currency(cell(row, cols.mkt_val)),
                gain_pct: fields::parse_percent(cell(row, cols.gain_pct)),
            });
        } else if sec_type == OPTION_TYPE {
            let parsed = fields::parse_option_symbol(symbol)?;
            let expiration = NaiveDate::parse_from_str(&parsed.expiration, "%m/%d/%Y")
                .map_err(|e| ParseError::BadDate(parsed.expiration.clone(), e))?;
            let delta = match cell(row, cols.delta) {
                "" | "N/A" | "--" => None,
                d => Some(fields::parse_delta(d)),
            };
            options.push(OptionHolding {
                symbol: symbol.to_string(),
                underlying: parsed.underlying,
                expiration,
                strike: parsed.strike,
                option_type: parsed.option_type,
                quantity: fields::parse_currency(cell(row, cols.qty)) as i64,
                price: fields::parse_currency(cell(row, cols.price)),
                market_value: fields::parse_currency(cell(row, cols.mkt_val)),
                delta,
                gain_pct: fields::parse_percent(cell(row, cols.gain_pct)),
            });
        } else {
            debug!(symbol, sec_type, "dropping row with unhandled security type");
        }
    }

    Ok(PortfolioSnapshot {
        equities,
        options,
        cash,
    })
}
