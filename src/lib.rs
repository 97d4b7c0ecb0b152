//! CLTVForge: customer lifetime value estimation for OmniChannel retail data
//!
//! Caps outliers in the raw order aggregates, derives weekly
//! recency/tenure/frequency/monetary features, fits a BG/NBD purchase model and
//! a Gamma-Gamma spend model, and segments customers into value quartiles.

pub mod bgnbd;
pub mod cli;
pub mod cltv;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod gamma_gamma;
pub mod optimize;
pub mod outliers;
pub mod report;
pub mod special;
pub mod synthetic;

// Re-export public items for easier access
pub use bgnbd::{BetaGeoModel, BetaGeoParams};
pub use cli::Args;
pub use cltv::{run_analysis, segment, CltvAnalysis, CltvResult, Segment};
pub use config::CltvConfig;
pub use data::{load_customers, CustomerRecord};
pub use error::CltvError;
pub use features::{derive_features, CltvFeatures};
pub use gamma_gamma::{GammaGammaModel, GammaGammaParams, TimeUnit};
pub use optimize::{NelderMead, Optimizer};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
