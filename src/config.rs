//! Analysis settings, optionally loaded from a TOML file

use crate::optimize::NelderMead;
use anyhow::Context;
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Settings for one CLTV analysis run. Missing keys fall back to defaults;
/// unknown keys are rejected.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CltvConfig {
    /// L2 penalty applied while fitting BG/NBD
    pub bgnbd_penalizer: f64,
    /// L2 penalty applied while fitting Gamma-Gamma
    pub gamma_gamma_penalizer: f64,
    /// Months of future value included in `cltv`
    pub cltv_horizon_months: u32,
    /// Monthly discount rate
    pub discount_rate: f64,
    /// Days between the latest order in the data and the derived analysis date
    pub analysis_date_offset_days: i64,
    pub optimizer: NelderMead,
}

impl Default for CltvConfig {
    fn default() -> Self {
        Self {
            bgnbd_penalizer: 0.001,
            gamma_gamma_penalizer: 0.01,
            cltv_horizon_months: 6,
            discount_rate: 0.01,
            analysis_date_offset_days: 2,
            optimizer: NelderMead::default(),
        }
    }
}

impl CltvConfig {
    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(self.bgnbd_penalizer >= 0.0 && self.gamma_gamma_penalizer >= 0.0) {
            anyhow::bail!("Penalizer coefficients must be non-negative");
        }
        if !(self.discount_rate > -1.0) {
            anyhow::bail!("Discount rate must be greater than -1, got {}", self.discount_rate);
        }
        Ok(())
    }
}
