//! Lifetime value composition and quartile segmentation

use crate::bgnbd::BetaGeoModel;
use crate::config::CltvConfig;
use crate::data::CustomerRecord;
use crate::error::CltvError;
use crate::features::{derive_features, CltvFeatures};
use crate::gamma_gamma::{GammaGammaModel, TimeUnit};
use crate::optimize::Optimizer;
use crate::outliers::{cap_customer_columns, quantile_sorted, CappedColumn, Thresholds};
use chrono::NaiveDate;
use std::fmt;
use tracing::info;

/// Weeks counted per month when converting purchase horizons
pub const WEEKS_PER_MONTH: f64 = 4.0;
pub const THREE_MONTHS_WEEKS: f64 = WEEKS_PER_MONTH * 3.0;
pub const SIX_MONTHS_WEEKS: f64 = WEEKS_PER_MONTH * 6.0;

/// Recency and tenure are derived in weeks, so the purchase model is fitted in weeks
pub const FEATURE_TIME_UNIT: TimeUnit = TimeUnit::Week;

/// Value tier, ordered from lowest (`D`) to highest (`A`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    D,
    C,
    B,
    A,
}

impl Segment {
    /// Ascending order, one per quartile
    pub const ALL: [Segment; 4] = [Segment::D, Segment::C, Segment::B, Segment::A];
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Segment::D => "D",
            Segment::C => "C",
            Segment::B => "B",
            Segment::A => "A",
        };
        f.write_str(label)
    }
}

/// Quartile cut points of a CLTV population
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEdges {
    edges: [f64; 5],
}

impl SegmentEdges {
    /// Empirical quartiles (linear interpolation) of `values`.
    ///
    /// Fails when two edges coincide, which happens when ties span a
    /// quartile boundary.
    pub fn from_values(values: &[f64]) -> crate::Result<Self> {
        if values.is_empty() {
            return Err(CltvError::EmptyInput("cannot segment an empty population".to_string()).into());
        }
        if let Some(row) = values.iter().position(|v| !v.is_finite()) {
            return Err(CltvError::InvalidValue {
                column: "cltv".to_string(),
                row,
                reason: format!("non-finite value {}", values[row]),
            }
            .into());
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let edges = [0.0, 0.25, 0.5, 0.75, 1.0].map(|q| quantile_sorted(&sorted, q));
        if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CltvError::NonUniqueBinEdges { edges: edges.to_vec() }.into());
        }
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64; 5] {
        &self.edges
    }

    /// Bin a value. Bins are right-closed, the lowest bin also holds the
    /// minimum; values outside the fitted range clamp to `D` or `A`.
    pub fn assign(&self, value: f64) -> Segment {
        let index = self.edges[1..4].iter().take_while(|&&edge| value > edge).count();
        Segment::ALL[index]
    }
}

/// Label every value with its quartile tier
pub fn segment(cltv: &[f64]) -> crate::Result<Vec<Segment>> {
    let edges = SegmentEdges::from_values(cltv)?;
    Ok(cltv.iter().map(|&value| edges.assign(value)).collect())
}

/// Prediction row for one repeat customer
#[derive(Debug, Clone, PartialEq)]
pub struct CltvResult {
    pub customer_id: String,
    pub recency_weekly: f64,
    pub tenure_weekly: f64,
    pub frequency: f64,
    pub monetary_avg: f64,
    pub exp_sales_3_month: f64,
    pub exp_sales_6_month: f64,
    pub exp_average_value: f64,
    pub cltv: f64,
    pub segment: Segment,
}

/// Mean behaviour of the customers in one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentProfile {
    pub segment: Segment,
    pub customers: usize,
    pub mean_recency_weekly: f64,
    pub mean_frequency: f64,
    pub mean_monetary_avg: f64,
    pub mean_cltv: f64,
    pub total_cltv: f64,
}

/// Per-segment averages, in ascending segment order; empty segments are skipped
pub fn segment_profiles(results: &[CltvResult]) -> Vec<SegmentProfile> {
    Segment::ALL
        .iter()
        .filter_map(|&segment| {
            let members: Vec<&CltvResult> = results.iter().filter(|r| r.segment == segment).collect();
            if members.is_empty() {
                return None;
            }
            let n = members.len() as f64;
            let mean = |f: fn(&CltvResult) -> f64| members.iter().map(|r| f(r)).sum::<f64>() / n;
            let total_cltv = members.iter().map(|r| r.cltv).sum::<f64>();
            Some(SegmentProfile {
                segment,
                customers: members.len(),
                mean_recency_weekly: mean(|r| r.recency_weekly),
                mean_frequency: mean(|r| r.frequency),
                mean_monetary_avg: mean(|r| r.monetary_avg),
                mean_cltv: total_cltv / n,
                total_cltv,
            })
        })
        .collect()
}

/// Everything produced by one analysis run
#[derive(Debug, Clone)]
pub struct CltvAnalysis {
    pub analysis_date: NaiveDate,
    pub thresholds: Vec<(CappedColumn, Thresholds)>,
    pub features: CltvFeatures,
    pub purchase_model: BetaGeoModel,
    pub spend_model: GammaGammaModel,
    pub edges: SegmentEdges,
    pub results: Vec<CltvResult>,
}

impl CltvAnalysis {
    /// Score a customer that is not part of the fitted population
    pub fn score(&self, config: &CltvConfig, frequency: f64, recency: f64, tenure: f64, monetary_avg: f64) -> CltvResult {
        let cltv = self.spend_model.customer_lifetime_value(
            &self.purchase_model,
            frequency,
            recency,
            tenure,
            monetary_avg,
            config.cltv_horizon_months,
            FEATURE_TIME_UNIT,
            config.discount_rate,
        );
        CltvResult {
            customer_id: String::new(),
            recency_weekly: recency,
            tenure_weekly: tenure,
            frequency,
            monetary_avg,
            exp_sales_3_month: self.purchase_model.conditional_expected_number_of_purchases(
                THREE_MONTHS_WEEKS,
                frequency,
                recency,
                tenure,
            ),
            exp_sales_6_month: self.purchase_model.conditional_expected_number_of_purchases(
                SIX_MONTHS_WEEKS,
                frequency,
                recency,
                tenure,
            ),
            exp_average_value: self.spend_model.conditional_expected_average_profit(frequency, monetary_avg),
            cltv,
            segment: self.edges.assign(cltv),
        }
    }
}

/// Run the whole pipeline: cap outliers, derive features, fit both models,
/// predict and segment.
///
/// # Arguments
/// * `records` - Customer aggregates; capped in place
/// * `analysis_date` - Reference date for tenure
/// * `config` - Penalizers, CLTV horizon and discount rate
/// * `optimizer` - Minimizer used for both model fits
///
/// # Returns
/// * `CltvAnalysis` holding the thresholds, features, fitted models, segment
///   edges and one `CltvResult` per repeat customer
pub fn run_analysis(
    records: &mut [CustomerRecord],
    analysis_date: NaiveDate,
    config: &CltvConfig,
    optimizer: &dyn Optimizer,
) -> crate::Result<CltvAnalysis> {
    config.validate()?;

    let thresholds = cap_customer_columns(records);
    let features = derive_features(records, analysis_date)?;
    if features.is_empty() {
        return Err(CltvError::EmptyInput("no repeat customers to model".to_string()).into());
    }

    let purchase_model = BetaGeoModel::fit_features(&features, config.bgnbd_penalizer, optimizer)?;
    let spend_model = GammaGammaModel::fit_features(&features, config.gamma_gamma_penalizer, optimizer)?;

    let exp_sales_3_month = purchase_model.predict(THREE_MONTHS_WEEKS, &features);
    let exp_sales_6_month = purchase_model.predict(SIX_MONTHS_WEEKS, &features);
    let exp_average_value = spend_model.predict(&features);
    let cltv = spend_model.predict_lifetime_value(
        &purchase_model,
        &features,
        config.cltv_horizon_months,
        FEATURE_TIME_UNIT,
        config.discount_rate,
    );

    let cltv_values = cltv.to_vec();
    let edges = SegmentEdges::from_values(&cltv_values)?;

    let results: Vec<CltvResult> = (0..features.len())
        .map(|i| CltvResult {
            customer_id: features.customer_ids[i].clone(),
            recency_weekly: features.recency_weekly[i],
            tenure_weekly: features.tenure_weekly[i],
            frequency: features.frequency[i],
            monetary_avg: features.monetary_avg[i],
            exp_sales_3_month: exp_sales_3_month[i],
            exp_sales_6_month: exp_sales_6_month[i],
            exp_average_value: exp_average_value[i],
            cltv: cltv_values[i],
            segment: edges.assign(cltv_values[i]),
        })
        .collect();

    info!(
        customers = results.len(),
        horizon_months = config.cltv_horizon_months,
        discount_rate = config.discount_rate,
        "CLTV computed and segmented"
    );

    Ok(CltvAnalysis {
        analysis_date,
        thresholds,
        features,
        purchase_model,
        spend_model,
        edges,
        results,
    })
}
