//! Rule-based risk alerts over a parsed portfolio snapshot.
//!
//! Every rule runs on every call; emission order is the fixed category
//! order, not input order. Thresholds come from [`AlertCfg`].

use chrono::NaiveDate;

use crate::config::AlertCfg;
use crate::types::{
    Alert, AlertCategory, HoldingRow, OptionType, PortfolioAnalysis, PortfolioSnapshot,
    PortfolioSummary,
};
use crate::utils::fmt_thousands;

pub struct RiskEngine {
    cfg: AlertCfg,
}

impl RiskEngine {
    pub fn new(cfg: AlertCfg) -> Self {
        Self { cfg }
    }

    /// Evaluate all rules against a snapshot. `today` is the caller's clock;
    /// expiry windows are computed at day granularity against it.
    pub fn analyze(&self, snap: &PortfolioSnapshot, today: NaiveDate) -> PortfolioAnalysis {
        let mut alerts = Vec::new();
        self.itm_shorts(snap, &mut alerts);
        self.put_cash_coverage(snap, &mut alerts);
        self.high_delta_shorts(snap, &mut alerts);
        self.expiring_soon(snap, today, &mut alerts);
        self.equity_losses(snap, &mut alerts);
        self.naked_shorts(snap, &mut alerts);
        if alerts.is_empty() {
            alerts.push(Alert {
                category: AlertCategory::AllClear,
                symbol: None,
                message: "✅ No immediate alerts".to_string(),
            });
        }

        PortfolioAnalysis {
            alerts,
            summary: summarize(snap),
            holdings: flatten(snap),
        }
    }

    /// Short options whose held underlying has moved past the strike.
    fn itm_shorts(&self, snap: &PortfolioSnapshot, alerts: &mut Vec<Alert>) {
        for opt in snap.options.iter().filter(|o| o.is_short()) {
            let Some(equity) = snap.equity(&opt.underlying) else {
                continue; // not held at all -> handled by the naked rule
            };
            let spot = equity.price;
            let itm = match opt.option_type {
                OptionType::Call => spot > opt.strike,
                OptionType::Put => spot < opt.strike,
            };
            if itm {
                alerts.push(Alert {
                    category: AlertCategory::ItmShort,
                    symbol: Some(opt.underlying.clone()),
                    message: format!(
                        "🚨 {}: Short {} ${} is ITM (price=${:.2})",
                        opt.underlying, opt.option_type, opt.strike, spot
                    ),
                });
            }
        }
    }

    /// Aggregate short-put assignment exposure vs. available cash.
    fn put_cash_coverage(&self, snap: &PortfolioSnapshot, alerts: &mut Vec<Alert>) {
        let exposure: f64 = snap
            .options
            .iter()
            .filter(|o| o.is_short() && o.option_type == OptionType::Put)
            .map(|o| o.quantity.unsigned_abs() as f64 * o.strike * 100.0)
            .sum();
        if exposure > snap.cash {
            let gap = exposure - snap.cash;
            alerts.push(Alert {
                category: AlertCategory::CashShortfall,
                symbol: None,
                message: format!(
                    "💰 Short puts require ${} cash but only ${} available (${} short)",
                    fmt_thousands(exposure),
                    fmt_thousands(snap.cash),
                    fmt_thousands(gap)
                ),
            });
        }
    }

    fn high_delta_shorts(&self, snap: &PortfolioSnapshot, alerts: &mut Vec<Alert>) {
        for opt in snap.options.iter().filter(|o| o.is_short()) {
            let delta = opt.delta.unwrap_or(0.0);
            if delta > self.cfg.high_delta_threshold {
                alerts.push(Alert {
                    category: AlertCategory::HighDelta,
                    symbol: Some(opt.underlying.clone()),
                    message: format!(
                        "⚠️ {}: High Δ={:.2} on short {} ${} - assignment risk",
                        opt.underlying, delta, opt.option_type, opt.strike
                    ),
                });
            }
        }
    }

    /// Options (long or short) expiring within the window, expired included.
    fn expiring_soon(&self, snap: &PortfolioSnapshot, today: NaiveDate, alerts: &mut Vec<Alert>) {
        for opt in &snap.options {
            let dte = (opt.expiration - today).num_days();
            if dte > self.cfg.expiry_window_days {
                continue;
            }
            let spot = snap
                .equity(&opt.underlying)
                .map(|e| e.price)
                .filter(|p| *p > 0.0);

            let message = match spot {
                Some(spot) if opt.is_short() => {
                    let deep_otm = match opt.option_type {
                        OptionType::Call => spot < opt.strike * (1.0 - self.cfg.deep_otm_buffer),
                        OptionType::Put => spot > opt.strike * (1.0 + self.cfg.deep_otm_buffer),
                    };
                    if deep_otm {
                        format!(
                            "⏰ {}: {} ${} expires in {}d - deep OTM, let expire (+{:.0}% profit)",
                            opt.underlying,
                            opt.option_type,
                            opt.strike,
                            dte,
                            opt.gain_pct * 100.0
                        )
                    } else {
                        format!(
                            "⏰ {}: {} ${} expires in {}d - consider rolling or closing",
                            opt.underlying, opt.option_type, opt.strike, dte
                        )
                    }
                }
                _ => format!(
                    "⏰ {}: {} ${} expires in {}d",
                    opt.underlying, opt.option_type, opt.strike, dte
                ),
            };
            alerts.push(Alert {
                category: AlertCategory::Expiration,
                symbol: Some(opt.underlying.clone()),
                message,
            });
        }
    }

    fn equity_losses(&self, snap: &PortfolioSnapshot, alerts: &mut Vec<Alert>) {
        for equity in &snap.equities {
            if equity.gain_pct < self.cfg.loss_threshold {
                alerts.push(Alert {
                    category: AlertCategory::UnrealizedLoss,
                    symbol: Some(equity.symbol.clone()),
                    message: format!(
                        "📉 {}: Down {:.1}% - review position",
                        equity.symbol,
                        equity.gain_pct * 100.0
                    ),
                });
            }
        }
    }

    /// Short options with no underlying position at all (distinct from the
    /// ITM rule, which requires the underlying to be held).
    fn naked_shorts(&self, snap: &PortfolioSnapshot, alerts: &mut Vec<Alert>) {
        for opt in snap.options.iter().filter(|o| o.is_short()) {
            if snap.equity(&opt.underlying).is_none() {
                alerts.push(Alert {
                    category: AlertCategory::NakedShort,
                    symbol: Some(opt.underlying.clone()),
                    message: format!(
                        "⚠️ {}: Naked short {} ${} - no underlying held",
                        opt.underlying, opt.option_type, opt.strike
                    ),
                });
            }
        }
    }
}

fn summarize(snap: &PortfolioSnapshot) -> PortfolioSummary {
    let equity_value = snap.equity_value();
    let option_value = snap.option_value();
    PortfolioSummary {
        cash: snap.cash,
        equity_value,
        option_value,
        total_value: snap.cash + equity_value + option_value,
    }
}

fn flatten(snap: &PortfolioSnapshot) -> Vec<HoldingRow> {
    let mut rows: Vec<HoldingRow> = snap
        .equities
        .iter()
        .map(|e| HoldingRow::Equity {
            symbol: e.symbol.clone(),
            qty: e.quantity,
            price: e.price,
            value: e.market_value,
            gain_pct: e.gain_pct,
        })
        .collect();
    rows.extend(snap.options.iter().map(|o| HoldingRow::Option {
        symbol: o.symbol.clone(),
        underlying: o.underlying.clone(),
        strike: o.strike,
        opt_type: o.option_type,
        expiration: o.expiration,
        qty: o.quantity,
        price: o.price,
        value: o.market_value,
        delta: o.delta,
        gain_pct: o.gain_pct,
    }));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EquityHolding, OptionHolding};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(AlertCfg::default())
    }

    fn equity(symbol: &str, qty: i64, price: f64, gain_pct: f64) -> EquityHolding {
        EquityHolding {
            symbol: symbol.to_string(),
            quantity: qty,
            price,
            market_value: price * qty as f64,
            gain_pct,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn option(
        underlying: &str,
        expiration: NaiveDate,
        strike: f64,
        option_type: OptionType,
        qty: i64,
        delta: Option<f64>,
        gain_pct: f64,
    ) -> OptionHolding {
        OptionHolding {
            symbol: format!(
                "{} {} {:.2} {}",
                underlying,
                expiration.format("%m/%d/%Y"),
                strike,
                option_type
            ),
            underlying: underlying.to_string(),
            expiration,
            strike,
            option_type,
            quantity: qty,
            price: 1.0,
            market_value: qty as f64 * 100.0,
            delta,
            gain_pct,
        }
    }

    fn far_exp() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 19).unwrap()
    }

    fn categories(analysis: &PortfolioAnalysis) -> Vec<AlertCategory> {
        analysis.alerts.iter().map(|a| a.category).collect()
    }

    #[test]
    fn short_call_below_spot_is_itm() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 210.50, 0.25)],
            options: vec![option(
                "NVDA",
                far_exp(),
                200.0,
                OptionType::Call,
                -1,
                Some(0.6),
                0.3,
            )],
            cash: 100_000.0,
        };
        let analysis = engine().analyze(&snap, today());
        let itm: Vec<_> = analysis
            .alerts
            .iter()
            .filter(|a| a.category == AlertCategory::ItmShort)
            .collect();
        assert_eq!(itm.len(), 1);
        assert!(itm[0].message.contains("Short C $200 is ITM (price=$210.50)"));
    }

    #[test]
    fn short_call_above_spot_is_not_itm() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 186.0, 0.25)],
            options: vec![option(
                "NVDA",
                far_exp(),
                200.0,
                OptionType::Call,
                -1,
                Some(0.3),
                0.3,
            )],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        assert!(!categories(&analysis).contains(&AlertCategory::ItmShort));
    }

    #[test]
    fn long_options_never_trigger_itm() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 210.0, 0.25)],
            options: vec![option(
                "NVDA",
                far_exp(),
                200.0,
                OptionType::Call,
                2,
                Some(0.8),
                0.3,
            )],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        assert!(!categories(&analysis).contains(&AlertCategory::ItmShort));
    }

    #[test]
    fn put_exposure_over_cash_raises_shortfall() {
        // one short put, strike 90 -> 9,000 exposure vs 5,000 cash
        let snap = PortfolioSnapshot {
            equities: vec![],
            options: vec![option(
                "AMD",
                far_exp(),
                90.0,
                OptionType::Put,
                -1,
                Some(0.2),
                0.1,
            )],
            cash: 5000.0,
        };
        let analysis = engine().analyze(&snap, today());
        let shortfall: Vec<_> = analysis
            .alerts
            .iter()
            .filter(|a| a.category == AlertCategory::CashShortfall)
            .collect();
        assert_eq!(shortfall.len(), 1);
        assert!(shortfall[0]
            .message
            .contains("require $9,000 cash but only $5,000 available ($4,000 short)"));
    }

    #[test]
    fn put_exposure_equal_to_cash_is_covered() {
        let snap = PortfolioSnapshot {
            equities: vec![],
            options: vec![option(
                "AMD",
                far_exp(),
                90.0,
                OptionType::Put,
                -1,
                Some(0.2),
                0.1,
            )],
            cash: 9000.0,
        };
        let analysis = engine().analyze(&snap, today());
        assert!(!categories(&analysis).contains(&AlertCategory::CashShortfall));
    }

    #[test]
    fn high_delta_on_shorts_only() {
        let exp = far_exp();
        let snap = PortfolioSnapshot {
            equities: vec![],
            options: vec![
                option("AMD", exp, 90.0, OptionType::Put, -1, Some(0.62), 0.1),
                option("TSLA", exp, 300.0, OptionType::Call, 1, Some(0.9), 0.1),
                option("MSFT", exp, 400.0, OptionType::Put, -1, Some(0.5), 0.1),
                option("INTC", exp, 30.0, OptionType::Put, -1, None, 0.1),
            ],
            cash: 1_000_000.0,
        };
        let analysis = engine().analyze(&snap, today());
        let high: Vec<_> = analysis
            .alerts
            .iter()
            .filter(|a| a.category == AlertCategory::HighDelta)
            .collect();
        // only the short 0.62; 0.50 is not strictly above, long and missing deltas don't count
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].symbol.as_deref(), Some("AMD"));
        assert!(high[0].message.contains("High Δ=0.62"));
    }

    #[test]
    fn expiry_window_boundary_is_seven_days() {
        let in_window = option(
            "NVDA",
            today() + chrono::Days::new(7),
            200.0,
            OptionType::Call,
            1,
            None,
            0.0,
        );
        let outside = option(
            "AMD",
            today() + chrono::Days::new(8),
            90.0,
            OptionType::Put,
            1,
            None,
            0.0,
        );
        let snap = PortfolioSnapshot {
            equities: vec![],
            options: vec![in_window, outside],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        let expiring: Vec<_> = analysis
            .alerts
            .iter()
            .filter(|a| a.category == AlertCategory::Expiration)
            .collect();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].symbol.as_deref(), Some("NVDA"));
        assert!(expiring[0].message.ends_with("expires in 7d"));
    }

    #[test]
    fn deep_otm_short_near_expiry_recommends_letting_expire() {
        // spot 186, strike 200 call: 186 < 200 * 0.95 -> deep OTM
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 186.0, 0.25)],
            options: vec![option(
                "NVDA",
                today() + chrono::Days::new(3),
                200.0,
                OptionType::Call,
                -1,
                Some(0.1),
                0.82,
            )],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        let msg = &analysis
            .alerts
            .iter()
            .find(|a| a.category == AlertCategory::Expiration)
            .unwrap()
            .message;
        assert!(msg.contains("deep OTM, let expire (+82% profit)"), "{msg}");
    }

    #[test]
    fn near_strike_short_near_expiry_suggests_rolling() {
        // spot 198, strike 200 call: 198 > 190 -> not deep OTM
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 198.0, 0.25)],
            options: vec![option(
                "NVDA",
                today() + chrono::Days::new(3),
                200.0,
                OptionType::Call,
                -1,
                Some(0.45),
                0.2,
            )],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        let msg = &analysis
            .alerts
            .iter()
            .find(|a| a.category == AlertCategory::Expiration)
            .unwrap()
            .message;
        assert!(msg.contains("consider rolling or closing"), "{msg}");
    }

    #[test]
    fn short_without_underlying_gets_bare_expiry_notice() {
        let snap = PortfolioSnapshot {
            equities: vec![],
            options: vec![option(
                "AMD",
                today() + chrono::Days::new(2),
                90.0,
                OptionType::Put,
                -1,
                Some(0.2),
                0.1,
            )],
            cash: 100_000.0,
        };
        let analysis = engine().analyze(&snap, today());
        let msg = &analysis
            .alerts
            .iter()
            .find(|a| a.category == AlertCategory::Expiration)
            .unwrap()
            .message;
        assert!(msg.ends_with("expires in 2d"), "{msg}");
    }

    #[test]
    fn equity_loss_threshold() {
        let snap = PortfolioSnapshot {
            equities: vec![
                equity("NVDA", 100, 180.0, -0.125),
                equity("VOO", 10, 440.0, -0.05),
            ],
            options: vec![],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        let losses: Vec<_> = analysis
            .alerts
            .iter()
            .filter(|a| a.category == AlertCategory::UnrealizedLoss)
            .collect();
        assert_eq!(losses.len(), 1);
        assert!(losses[0].message.contains("Down -12.5% - review position"));
    }

    #[test]
    fn naked_short_requires_no_underlying() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 186.0, 0.1)],
            options: vec![
                option("NVDA", far_exp(), 200.0, OptionType::Call, -1, None, 0.0),
                option("AMD", far_exp(), 90.0, OptionType::Put, -1, None, 0.0),
            ],
            cash: 100_000.0,
        };
        let analysis = engine().analyze(&snap, today());
        let naked: Vec<_> = analysis
            .alerts
            .iter()
            .filter(|a| a.category == AlertCategory::NakedShort)
            .collect();
        assert_eq!(naked.len(), 1);
        assert_eq!(naked[0].symbol.as_deref(), Some("AMD"));
    }

    #[test]
    fn quiet_portfolio_emits_single_sentinel() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 186.0, 0.25)],
            options: vec![],
            cash: 5000.0,
        };
        let analysis = engine().analyze(&snap, today());
        assert_eq!(analysis.alerts.len(), 1);
        assert_eq!(analysis.alerts[0].category, AlertCategory::AllClear);
        assert_eq!(analysis.alerts[0].message, "✅ No immediate alerts");
    }

    #[test]
    fn alerts_come_out_in_category_order() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 210.0, -0.15)],
            options: vec![
                // naked short put, also high delta, also expiring
                option(
                    "AMD",
                    today() + chrono::Days::new(5),
                    90.0,
                    OptionType::Put,
                    -1,
                    Some(0.7),
                    0.1,
                ),
                // ITM short call on held NVDA
                option("NVDA", far_exp(), 200.0, OptionType::Call, -1, Some(0.6), 0.1),
            ],
            cash: 1000.0,
        };
        let analysis = engine().analyze(&snap, today());
        assert_eq!(
            categories(&analysis),
            vec![
                AlertCategory::ItmShort,
                AlertCategory::CashShortfall,
                AlertCategory::HighDelta,
                AlertCategory::HighDelta,
                AlertCategory::Expiration,
                AlertCategory::UnrealizedLoss,
                AlertCategory::NakedShort,
            ]
        );
    }

    #[test]
    fn summary_total_is_sum_of_parts() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 186.23, 0.25)],
            options: vec![option(
                "NVDA",
                far_exp(),
                200.0,
                OptionType::Call,
                -1,
                Some(0.3),
                0.1,
            )],
            cash: 5000.0,
        };
        let analysis = engine().analyze(&snap, today());
        let s = &analysis.summary;
        assert_eq!(s.total_value, s.cash + s.equity_value + s.option_value);
        assert_eq!(s.cash, 5000.0);
    }

    #[test]
    fn short_put_shortfall_from_a_raw_export() {
        let text = r#"Positions for account Individual XXXX-1234
"Symbol","Qty (Quantity)","Price","Mkt Val (Market Value)","Gain % (Gain/Loss %)","Security Type","Delta"
"AMD 06/19/2026 90.00 P","-1","$2.10","-$210.00","5%","Option","0.20"
"Cash & Cash Investments","--","--","$5,000.00","--","Cash and Money Market","--"
"Account Total","--","--","$4,790.00","--","--","--"
"#;
        let snap = crate::parser::parse_portfolio(text).unwrap();
        let analysis = engine().analyze(&snap, today());
        assert!(categories(&analysis).contains(&AlertCategory::CashShortfall));
        // same export with the exposure exactly covered
        let covered = text.replace("$5,000.00", "$9,000.00");
        let snap = crate::parser::parse_portfolio(&covered).unwrap();
        let analysis = engine().analyze(&snap, today());
        assert!(!categories(&analysis).contains(&AlertCategory::CashShortfall));
    }

    #[test]
    fn holdings_are_flattened_equities_first() {
        let snap = PortfolioSnapshot {
            equities: vec![equity("NVDA", 100, 186.0, 0.25)],
            options: vec![option(
                "AMD",
                far_exp(),
                90.0,
                OptionType::Put,
                -2,
                None,
                0.0,
            )],
            cash: 0.0,
        };
        let analysis = engine().analyze(&snap, today());
        assert_eq!(analysis.holdings.len(), 2);
        assert!(matches!(analysis.holdings[0], HoldingRow::Equity { .. }));
        assert!(matches!(
            analysis.holdings[1],
            HoldingRow::Option { qty: -2, .. }
        ));
    }
}
