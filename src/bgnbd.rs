//! Beta-Geometric / Negative-Binomial purchase frequency model
//!
//! Each customer buys at a Poisson rate drawn from `Gamma(r, alpha)` and may
//! become inactive after any purchase with a probability drawn from
//! `Beta(a, b)`. Fitting maximizes the mean log-likelihood with an L2 penalty
//! on the four parameters.

use crate::error::CltvError;
use crate::features::CltvFeatures;
use crate::optimize::Optimizer;
use crate::special::{ln_gamma, ln_hyp2f1, log_add_exp};
use ndarray::{Array1, Zip};
use tracing::info;

const MODEL_NAME: &str = "BG/NBD";

/// Fitted BG/NBD parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaGeoParams {
    /// Shape of the purchase-rate gamma distribution
    pub r: f64,
    /// Scale of the purchase-rate gamma distribution, in weeks
    pub alpha: f64,
    /// Beta dropout shape
    pub a: f64,
    /// Beta dropout shape
    pub b: f64,
}

impl BetaGeoParams {
    fn validate(&self) -> crate::Result<()> {
        let all = [self.r, self.alpha, self.a, self.b];
        if all.iter().all(|p| p.is_finite() && *p > 0.0) {
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

/// BG/NBD model with immutable fitted parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BetaGeoModel {
    params: BetaGeoParams,
    penalizer: f64,
    /// Penalized mean negative log-likelihood at the optimum
    neg_log_likelihood: f64,
    iterations: usize,
}

/// Per-customer contribution to the BG/NBD log-likelihood
fn log_likelihood(p: &BetaGeoParams, x: f64, t_x: f64, t: f64) -> f64 {
    let a1 = ln_gamma(p.r + x) - ln_gamma(p.r) + p.r * p.alpha.ln();
    let a2 = ln_gamma(p.a + p.b) + ln_gamma(p.b + x) - ln_gamma(p.b) - ln_gamma(p.a + p.b + x);
    let a3 = -(p.r + x) * (p.alpha + t).ln();
    let a4 = if x > 0.0 {
        p.a.ln() - (p.b + x - 1.0).ln() - (p.r + x) * (p.alpha + t_x).ln()
    } else {
        f64::NEG_INFINITY
    };
    a1 + a2 + log_add_exp(a3, a4)
}

/// Factor mapping weeks onto the fitting time axis, where the longest tenure is 10
fn time_scale(tenure: &Array1<f64>) -> f64 {
    let max_tenure = tenure.fold(0.0_f64, |acc, &t| acc.max(t));
    if max_tenure > 0.0 {
        10.0 / max_tenure
    } else {
        1.0
    }
}

/// Mean negative log-likelihood plus the L2 penalty, over log-parameters
/// `[ln r, ln alpha, ln a, ln b]` on the scaled time axis
fn penalized_objective(
    log_params: &[f64],
    frequency: &Array1<f64>,
    recency: &Array1<f64>,
    tenure: &Array1<f64>,
    penalizer: f64,
) -> f64 {
    let p = BetaGeoParams {
        r: log_params[0].exp(),
        alpha: log_params[1].exp(),
        a: log_params[2].exp(),
        b: log_params[3].exp(),
    };
    let total = Zip::from(frequency)
        .and(recency)
        .and(tenure)
        .fold(0.0, |acc, &x, &t_x, &t| acc + log_likelihood(&p, x, t_x, t));
    let penalty = penalizer * (p.r.powi(2) + p.alpha.powi(2) + p.a.powi(2) + p.b.powi(2));
    -total / frequency.len() as f64 + penalty
}

fn validate_inputs(frequency: &Array1<f64>, recency: &Array1<f64>, tenure: &Array1<f64>) -> crate::Result<()> {
    if frequency.is_empty() {
        return Err(CltvError::EmptyInput("BG/NBD fit needs at least one customer".to_string()).into());
    }
    if frequency.len() != recency.len() || frequency.len() != tenure.len() {
        anyhow::bail!(
            "frequency, recency and tenure must have equal lengths ({}, {}, {})",
            frequency.len(),
            recency.len(),
            tenure.len()
        );
    }
    for (row, ((&x, &t_x), &t)) in frequency.iter().zip(recency.iter()).zip(tenure.iter()).enumerate() {
        let reason = if !(x >= 0.0) || x.fract() != 0.0 {
            Some(format!("frequency must be a non-negative integer, got {x}"))
        } else if !(t_x >= 0.0) {
            Some(format!("recency must be non-negative, got {t_x}"))
        } else if !(t >= t_x) {
            Some(format!("tenure {t} is shorter than recency {t_x}"))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(CltvError::InvalidValue {
                column: "frequency/recency/tenure".to_string(),
                row,
                reason,
            }
            .into());
        }
    }
    Ok(())
}

impl BetaGeoModel {
    /// Build a model from known parameters
    pub fn from_params(params: BetaGeoParams) -> crate::Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            penalizer: 0.0,
            neg_log_likelihood: f64::NAN,
            iterations: 0,
        })
    }

    /// Fit by penalized maximum likelihood.
    ///
    /// Times are rescaled so the longest tenure equals 10 during the search,
    /// and `alpha` is mapped back to weeks afterwards. The optimizer works on
    /// log-parameters starting from `0.1` for each.
    pub fn fit(
        frequency: &Array1<f64>,
        recency: &Array1<f64>,
        tenure: &Array1<f64>,
        penalizer: f64,
        optimizer: &dyn Optimizer,
    ) -> crate::Result<Self> {
        validate_inputs(frequency, recency, tenure)?;

        let scale = time_scale(tenure);
        let scaled_recency = recency.mapv(|v| v * scale);
        let scaled_tenure = tenure.mapv(|v| v * scale);

        let objective = |log_params: &[f64]| -> f64 {
            penalized_objective(log_params, frequency, &scaled_recency, &scaled_tenure, penalizer)
        };

        let result = optimizer.minimize(&objective, &[0.1; 4]);
        if !result.converged || !result.value.is_finite() {
            return Err(CltvError::NotConverged {
                model: MODEL_NAME,
                iterations: result.iterations,
            }
            .into());
        }

        let params = BetaGeoParams {
            r: result.x[0].exp(),
            alpha: result.x[1].exp() / scale,
            a: result.x[2].exp(),
            b: result.x[3].exp(),
        };
        params.validate()?;

        info!(
            r = params.r,
            alpha = params.alpha,
            a = params.a,
            b = params.b,
            neg_log_likelihood = result.value,
            iterations = result.iterations,
            "BG/NBD model fitted"
        );

        Ok(Self {
            params,
            penalizer,
            neg_log_likelihood: result.value,
            iterations: result.iterations,
        })
    }

    /// Fit on derived customer features
    pub fn fit_features(features: &CltvFeatures, penalizer: f64, optimizer: &dyn Optimizer) -> crate::Result<Self> {
        Self::fit(
            &features.frequency,
            &features.recency_weekly,
            &features.tenure_weekly,
            penalizer,
            optimizer,
        )
    }

    pub fn params(&self) -> &BetaGeoParams {
        &self.params
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    /// Penalized mean negative log-likelihood reached by the fit (`NaN` when
    /// the model was built from fixed parameters)
    pub fn neg_log_likelihood(&self) -> f64 {
        self.neg_log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Expected number of purchases in the next `t` weeks for a customer with
    /// the given history.
    ///
    /// Defined for zero recency and zero tenure; `t = 0` yields 0.
    pub fn conditional_expected_number_of_purchases(
        &self,
        t: f64,
        frequency: f64,
        recency: f64,
        tenure: f64,
    ) -> f64 {
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let x = frequency;

        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + tenure + t);
        let ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z);

        let first_term = (a + b + x - 1.0) / (a - 1.0);
        let second_term =
            1.0 - (ln_hyp + (r + x) * ((alpha + tenure) / (alpha + t + tenure)).ln()).exp();
        let numerator = first_term * second_term;

        let denominator = if x > 0.0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + tenure) / (alpha + recency)).powf(r + x)
        } else {
            1.0
        };

        numerator / denominator
    }

    /// Vectorized [`Self::conditional_expected_number_of_purchases`] over a feature table
    pub fn predict(&self, t: f64, features: &CltvFeatures) -> Array1<f64> {
        Zip::from(&features.frequency)
            .and(&features.recency_weekly)
            .and(&features.tenure_weekly)
            .map_collect(|&x, &t_x, &tenure| {
                self.conditional_expected_number_of_purchases(t, x, t_x, tenure)
            })
    }

    /// Expected purchases in `t` weeks for a randomly chosen new customer
    pub fn expected_number_of_purchases_up_to_time(&self, t: f64) -> f64 {
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let ln_hyp = ln_hyp2f1(r, b, a + b - 1.0, t / (alpha + t));
        let first_term = (a + b - 1.0) / (a - 1.0);
        first_term * (1.0 - (r * (alpha / (alpha + t)).ln() + ln_hyp).exp())
    }

    /// Probability that a customer with the given history is still active
    pub fn probability_alive(&self, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if frequency == 0.0 {
            return 1.0;
        }
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let log_div = (r + frequency) * ((alpha + tenure) / (alpha + recency)).ln()
            + (a / (b + frequency.max(1.0) - 1.0)).ln();
        1.0 / (1.0 + log_div.exp())
    }
}
