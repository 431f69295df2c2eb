//! NYC market clock: session and status for a given instant.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Session {
    Weekend,
    Overnight,
    PreMarket,
    Regular,
    AfterHours,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketTime {
    pub timestamp: String,
    pub timestamp_display: String,
    pub date: String,
    pub time: String,
    pub weekday: String,
    pub session: Session,
    pub market_status: &'static str,
    pub timezone: &'static str,
}

/// Classify `now` against regular US equity market hours (Eastern Time):
/// pre-market 4:00, open 9:30, close 16:00, after-hours until 20:00.
pub fn market_time(now_utc: DateTime<Utc>) -> MarketTime {
    let now = now_utc.with_timezone(&New_York);
    let minutes = now.hour() * 60 + now.minute();

    let (session, market_status) = if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        (Session::Weekend, "closed")
    } else if minutes < 4 * 60 {
        (Session::Overnight, "closed")
    } else if minutes < 9 * 60 + 30 {
        (Session::PreMarket, "pre-market trading")
    } else if minutes < 16 * 60 {
        (Session::Regular, "open")
    } else if minutes < 20 * 60 {
        (Session::AfterHours, "after-hours trading")
    } else {
        (Session::Overnight, "closed")
    };

    MarketTime {
        timestamp: now.to_rfc3339(),
        timestamp_display: now.format("%Y-%m-%d %H:%M:%S ET").to_string(),
        date: now.format("%Y-%m-%d").to_string(),
        time: now.format("%H:%M:%S").to_string(),
        weekday: now.format("%A").to_string(),
        session,
        market_status,
        timezone: "America/New_York",
    }
}
