//! Gamma-Gamma model of average transaction value
//!
//! Spend per transaction is gamma distributed with shape `p` and a
//! customer-specific rate drawn from `Gamma(q, v)`. The model assumes a
//! customer's spend level is independent of how often they buy; it does not
//! detect or reject data that violates this, it only logs the observed
//! correlation when fitting.

use crate::bgnbd::BetaGeoModel;
use crate::error::CltvError;
use crate::features::CltvFeatures;
use crate::optimize::Optimizer;
use crate::special::ln_gamma;
use ndarray::{Array1, Zip};
use tracing::{info, warn};

const MODEL_NAME: &str = "Gamma-Gamma";

/// Absolute frequency/monetary correlation above which a warning is logged
pub const CORRELATION_WARNING: f64 = 0.3;

/// Time unit the purchase model was fitted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Hour,
}

impl TimeUnit {
    /// Number of model time units in one month
    pub fn periods_per_month(&self) -> f64 {
        match self {
            TimeUnit::Day => 30.0,
            TimeUnit::Week => 4.345,
            TimeUnit::Month => 1.0,
            TimeUnit::Hour => 30.0 * 24.0,
        }
    }
}

/// Fitted Gamma-Gamma parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

impl GammaGammaParams {
    fn validate(&self) -> crate::Result<()> {
        if [self.p, self.q, self.v].iter().all(|x| x.is_finite() && *x > 0.0) {
            Ok(())
        } else {
            Err(CltvError::InvalidParameters {
                model: MODEL_NAME,
                reason: format!("all parameters must be positive and finite, got {self:?}"),
            }
            .into())
        }
    }
}

/// Gamma-Gamma model with immutable fitted parameters
#[derive(Debug, Clone, PartialEq)]
pub struct GammaGammaModel {
    params: GammaGammaParams,
    penalizer: f64,
    neg_log_likelihood: f64,
    iterations: usize,
}

fn log_likelihood(params: &GammaGammaParams, x: f64, m: f64) -> f64 {
    let GammaGammaParams { p, q, v } = *params;
    let px = p * x;
    ln_gamma(px + q) - ln_gamma(px) - ln_gamma(q) + q * v.ln() + (px - 1.0) * m.ln()
        + px * x.ln()
        - (px + q) * (x * m + v).ln()
}

/// Mean negative log-likelihood plus the L2 penalty, over `[ln p, ln q, ln v]`
fn penalized_objective(
    log_params: &[f64],
    frequency: &Array1<f64>,
    monetary_avg: &Array1<f64>,
    penalizer: f64,
) -> f64 {
    let params = GammaGammaParams {
        p: log_params[0].exp(),
        q: log_params[1].exp(),
        v: log_params[2].exp(),
    };
    let total = Zip::from(frequency)
        .and(monetary_avg)
        .fold(0.0, |acc, &x, &m| acc + log_likelihood(&params, x, m));
    let penalty = penalizer * (params.p.powi(2) + params.q.powi(2) + params.v.powi(2));
    -total / frequency.len() as f64 + penalty
}

/// Pearson correlation coefficient; `None` when either side is constant
pub fn pearson_correlation(xs: &Array1<f64>, ys: &Array1<f64>) -> Option<f64> {
    let mean_x = xs.mean()?;
    let mean_y = ys.mean()?;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x * var_y).sqrt())
}

impl GammaGammaModel {
    pub fn from_params(params: GammaGammaParams) -> crate::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            penalizer: 0.0,
            neg_log_likelihood: f64::NAN,
            iterations: 0,
        })
    }

    /// Fit by penalized maximum likelihood on repeat customers.
    ///
    /// Frequencies and average values must be strictly positive.
    pub fn fit(
        frequency: &Array1<f64>,
        monetary_avg: &Array1<f64>,
        penalizer: f64,
        optimizer: &dyn Optimizer,
    ) -> crate::Result<Self> {
        if frequency.is_empty() {
            return Err(CltvError::EmptyInput("Gamma-Gamma fit needs at least one customer".to_string()).into());
        }
        if frequency.len() != monetary_avg.len() {
            anyhow::bail!(
                "frequency and monetary value must have equal lengths ({}, {})",
                frequency.len(),
                monetary_avg.len()
            );
        }
        for (row, (&x, &m)) in frequency.iter().zip(monetary_avg.iter()).enumerate() {
            if !(x > 0.0 && m > 0.0 && m.is_finite()) {
                return Err(CltvError::InvalidValue {
                    column: "frequency/monetary_avg".to_string(),
                    row,
                    reason: format!("expected positive frequency and spend, got ({x}, {m})"),
                }
                .into());
            }
        }

        if let Some(rho) = pearson_correlation(frequency, monetary_avg) {
            if rho.abs() > CORRELATION_WARNING {
                warn!(
                    correlation = rho,
                    "Frequency and monetary value are correlated; Gamma-Gamma estimates may be biased"
                );
            }
        }

        let objective =
            |log_params: &[f64]| -> f64 { penalized_objective(log_params, frequency, monetary_avg, penalizer) };

        let result = optimizer.minimize(&objective, &[0.1; 3]);
        if !result.converged || !result.value.is_finite() {
            return Err(CltvError::NotConverged {
                model: MODEL_NAME,
                iterations: result.iterations,
            }
            .into());
        }

        let params = GammaGammaParams {
            p: result.x[0].exp(),
            q: result.x[1].exp(),
            v: result.x[2].exp(),
        };
        params.validate()?;

        info!(
            p = params.p,
            q = params.q,
            v = params.v,
            neg_log_likelihood = result.value,
            iterations = result.iterations,
            "Gamma-Gamma model fitted"
        );

        Ok(Self {
            params,
            penalizer,
            neg_log_likelihood: result.value,
            iterations: result.iterations,
        })
    }

    pub fn fit_features(features: &CltvFeatures, penalizer: f64, optimizer: &dyn Optimizer) -> crate::Result<Self> {
        Self::fit(&features.frequency, &features.monetary_avg, penalizer, optimizer)
    }

    pub fn params(&self) -> &GammaGammaParams {
        &self.params
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    pub fn neg_log_likelihood(&self) -> f64 {
        self.neg_log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Mean spend per transaction across the population; only finite when
    /// `q > 1`
    pub fn population_mean(&self) -> Option<f64> {
        let GammaGammaParams { p, q, v } = self.params;
        (q > 1.0).then(|| v * p / (q - 1.0))
    }

    /// Expected average transaction value, shrunk toward the population
    /// mean. Customers with fewer transactions are shrunk more.
    ///
    /// Uses `p (v + x m) / (p x + q - 1)`, which equals the weighted mean of
    /// the population and individual averages but stays defined for `q <= 1`.
    pub fn conditional_expected_average_profit(&self, frequency: f64, monetary_avg: f64) -> f64 {
        let GammaGammaParams { p, q, v } = self.params;
        p * (v + frequency * monetary_avg) / (p * frequency + q - 1.0)
    }

    pub fn predict(&self, features: &CltvFeatures) -> Array1<f64> {
        self.predict_values(&features.frequency, &features.monetary_avg)
    }

    pub fn predict_values(&self, frequency: &Array1<f64>, monetary_avg: &Array1<f64>) -> Array1<f64> {
        Zip::from(frequency)
            .and(monetary_avg)
            .map_collect(|&x, &m| self.conditional_expected_average_profit(x, m))
    }

    /// Discounted value of a customer's purchases over `horizon_months`.
    ///
    /// The purchase model is queried at cumulative horizons of `i` months
    /// (converted with [`TimeUnit::periods_per_month`]); each month's
    /// increment is valued at the shrunk average spend and discounted by
    /// `(1 + discount_rate)^i`.
    #[allow(clippy::too_many_arguments)]
    pub fn customer_lifetime_value(
        &self,
        purchases: &BetaGeoModel,
        frequency: f64,
        recency: f64,
        tenure: f64,
        monetary_avg: f64,
        horizon_months: u32,
        time_unit: TimeUnit,
        discount_rate: f64,
    ) -> f64 {
        let spend = self.conditional_expected_average_profit(frequency, monetary_avg);
        let factor = time_unit.periods_per_month();

        let mut previous = 0.0;
        let mut value = 0.0;
        for month in 1..=horizon_months {
            let horizon = month as f64 * factor;
            let cumulative =
                purchases.conditional_expected_number_of_purchases(horizon, frequency, recency, tenure);
            value += spend * (cumulative - previous) / (1.0 + discount_rate).powi(month as i32);
            previous = cumulative;
        }
        value
    }

    /// [`Self::customer_lifetime_value`] for every customer in a feature table
    pub fn predict_lifetime_value(
        &self,
        purchases: &BetaGeoModel,
        features: &CltvFeatures,
        horizon_months: u32,
        time_unit: TimeUnit,
        discount_rate: f64,
    ) -> Array1<f64> {
        Zip::from(&features.frequency)
            .and(&features.recency_weekly)
            .and(&features.tenure_weekly)
            .and(&features.monetary_avg)
            .map_collect(|&x, &t_x, &t, &m| {
                self.customer_lifetime_value(purchases, x, t_x, t, m, horizon_months, time_unit, discount_rate)
            })
    }
}
