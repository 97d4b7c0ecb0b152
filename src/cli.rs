//! Command-line interface definitions and argument parsing

use crate::config::CltvConfig;
use crate::data::parse_date;
use chrono::NaiveDate;
use clap::Parser;

/// Customer lifetime value estimation with BG/NBD and Gamma-Gamma models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file (OmniChannel customer export)
    #[arg(short, long, default_value = "flo_data_20k.csv")]
    pub input: String,

    /// Write the scored customers to this CSV file
    #[arg(short, long)]
    pub output: Option<String>,

    /// TOML file with analysis settings
    #[arg(short, long)]
    pub config: Option<String>,

    /// Analysis date (YYYY-MM-DD); defaults to a fixed offset after the latest order
    #[arg(long)]
    pub analysis_date: Option<String>,

    /// L2 penalty for the BG/NBD fit
    #[arg(long)]
    pub bgnbd_penalizer: Option<f64>,

    /// L2 penalty for the Gamma-Gamma fit
    #[arg(long)]
    pub gamma_gamma_penalizer: Option<f64>,

    /// CLTV horizon in months
    #[arg(long)]
    pub horizon_months: Option<u32>,

    /// Monthly discount rate
    #[arg(long)]
    pub discount_rate: Option<f64>,

    /// Number of customers listed in the ranking tables
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Generate this many synthetic customers instead of reading --input
    #[arg(long)]
    pub synthetic: Option<usize>,

    /// Seed for --synthetic
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Prediction mode: provide frequency,recency,tenure,monetary as comma-separated string
    /// Example: --predict "5,30.5,40.0,120.0" (recency and tenure in weeks)
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Customer history supplied for single-customer scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomerInput {
    pub frequency: f64,
    pub recency: f64,
    pub tenure: f64,
    pub monetary: f64,
}

impl Args {
    /// Parse customer values from the predict string
    /// Expected format: "frequency,recency,tenure,monetary"
    pub fn parse_customer_values(&self) -> crate::Result<Option<CustomerInput>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 4 {
            anyhow::bail!("Predict values must be in format 'frequency,recency,tenure,monetary'");
        }

        let parse = |name: &str, raw: &str| -> crate::Result<f64> {
            raw.trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, raw))
        };
        let input = CustomerInput {
            frequency: parse("frequency", parts[0])?,
            recency: parse("recency", parts[1])?,
            tenure: parse("tenure", parts[2])?,
            monetary: parse("monetary", parts[3])?,
        };

        if input.frequency <= 1.0 || input.monetary <= 0.0 {
            anyhow::bail!("Prediction needs a repeat customer (frequency > 1) with positive spend");
        }
        if input.recency < 0.0 || input.tenure < input.recency {
            anyhow::bail!("Recency must be non-negative and not exceed tenure");
        }
        Ok(Some(input))
    }

    /// Parse the explicit analysis date, if any
    pub fn parse_analysis_date(&self) -> crate::Result<Option<NaiveDate>> {
        self.analysis_date
            .as_deref()
            .map(|raw| parse_date(raw).ok_or_else(|| anyhow::anyhow!("Invalid analysis date: {}", raw)))
            .transpose()
    }

    /// Settings from the config file (or defaults) with CLI overrides applied
    pub fn resolve_config(&self) -> crate::Result<CltvConfig> {
        let mut config = match &self.config {
            Some(path) => CltvConfig::load_from_path(path)?,
            None => CltvConfig::default(),
        };

        if let Some(value) = self.bgnbd_penalizer {
            config.bgnbd_penalizer = value;
        }
        if let Some(value) = self.gamma_gamma_penalizer {
            config.gamma_gamma_penalizer = value;
        }
        if let Some(value) = self.horizon_months {
            config.cltv_horizon_months = value;
        }
        if let Some(value) = self.discount_rate {
            config.discount_rate = value;
        }

        config.validate()?;
        Ok(config)
    }
}
