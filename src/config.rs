//! Load and validate runtime configuration.

use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolygonCfg {
    pub base_url: String,
    /// Fill in an approximate delta when the provider returns no Greeks.
    pub estimate_missing_greeks: bool,
}

impl Default for PolygonCfg {
    fn default() -> Self {
        Self {
            base_url: "https://api.polygon.io".to_string(),
            estimate_missing_greeks: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanCfg {
    pub target_delta: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Minimum premium as % of spot (calls) or strike (puts).
    pub min_premium_pct: f64,
    pub max_candidates: usize,
}

impl Default for ScanCfg {
    fn default() -> Self {
        Self {
            target_delta: 0.20,
            min_dte: 20,
            max_dte: 45,
            min_premium_pct: 0.5,
            max_candidates: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertCfg {
    pub expiry_window_days: i64,
    pub high_delta_threshold: f64,
    /// Fraction; equities below this unrealized gain get flagged.
    pub loss_threshold: f64,
    /// Fraction past the strike that counts as deep OTM.
    pub deep_otm_buffer: f64,
}

impl Default for AlertCfg {
    fn default() -> Self {
        Self {
            expiry_window_days: 7,
            high_delta_threshold: 0.5,
            loss_threshold: -0.10,
            deep_otm_buffer: 0.05,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub polygon: PolygonCfg,
    pub scan: ScanCfg,
    pub alerts: AlertCfg,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&s)?;
        Ok(cfg)
    }

    /// Load `path` if present, otherwise fall back to the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("no {} found, using default config", path.display());
            Ok(Self::default())
        }
    }
}
