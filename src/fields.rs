//! Normalize raw export fields into typed values.
//!
//! Schwab-style exports wrap numerics in Excel escaping (`=""$1,234.56""`)
//! and use `--` / `N/A` placeholders. Parsing is deliberately lenient: any
//! residue that still fails to parse maps to 0.0, so downstream rules always
//! see numbers.

use crate::errors::ParseError;
use crate::types::OptionType;

/// Strip the Excel-escape artifacts the export wraps values in.
fn strip_escaping(raw: &str) -> String {
    raw.replace("=\"\"", "")
        .replace("\"\"", "")
        .replace("=\"", "")
        .replace('"', "")
}

/// Parse a currency field: `=""$1,234.56""` -> 1234.56; `--`/`N/A`/blank -> 0.
pub fn parse_currency(raw: &str) -> f64 {
    let s = strip_escaping(raw)
        .replace('$', "")
        .replace(',', "")
        .replace("--", "0")
        .replace("N/A", "0");
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    s.parse().unwrap_or(0.0)
}

/// Parse a percentage field into a fraction: `"12.5%"` -> 0.125.
pub fn parse_percent(raw: &str) -> f64 {
    let s = strip_escaping(raw)
        .replace('%', "")
        .replace("--", "0")
        .replace("N/A", "0");
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    s.parse::<f64>().map(|v| v / 100.0).unwrap_or(0.0)
}

/// Parse a delta field. Sign carries no risk information, so the absolute
/// value is returned; placeholders map to 0.
pub fn parse_delta(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() || s == "N/A" || s == "--" {
        return 0.0;
    }
    strip_escaping(s).trim().parse::<f64>().map(f64::abs).unwrap_or(0.0)
}

/// Components of an option symbol like "NVDA 01/23/2026 200.00 C".
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOptionSymbol {
    pub underlying: String,
    /// Expiration as it appears in the export (MM/DD/YYYY).
    pub expiration: String,
    pub strike: f64,
    pub option_type: OptionType,
}

/// Split an option symbol into its four components. Trailing tokens are
/// ignored; fewer than four is an error.
pub fn parse_option_symbol(sym: &str) -> Result<ParsedOptionSymbol, ParseError> {
    let bad = || ParseError::BadOptionSymbol(sym.to_string());
    let mut parts = sym.split_whitespace();
    let underlying = parts.next().ok_or_else(bad)?;
    let expiration = parts.next().ok_or_else(bad)?;
    let strike: f64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let option_type = match parts.next().ok_or_else(bad)? {
        "C" | "c" => OptionType::Call,
        "P" | "p" => OptionType::Put,
        _ => return Err(bad()),
    };
    Ok(ParsedOptionSymbol {
        underlying: underlying.to_string(),
        expiration: expiration.to_string(),
        strike,
        option_type,
    })
}
