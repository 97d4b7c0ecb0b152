//! Recency / tenure / frequency / monetary features in weekly units

use crate::data::CustomerRecord;
use crate::error::CltvError;
use chrono::NaiveDate;
use ndarray::Array1;
use tracing::info;

pub const DAYS_PER_WEEK: f64 = 7.0;

/// Order totals across the online and offline channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmniChannelMetrics {
    pub total_order: f64,
    pub total_price: f64,
}

impl OmniChannelMetrics {
    pub fn from_record(record: &CustomerRecord) -> Self {
        Self {
            total_order: record.order_num_total_online + record.order_num_total_offline,
            total_price: record.value_total_online + record.value_total_offline,
        }
    }

    /// Average spend per order; undefined for customers without orders
    pub fn average_order_value(&self, customer_id: &str) -> crate::Result<f64> {
        if self.total_order <= 0.0 {
            return Err(CltvError::ZeroOrders {
                customer_id: customer_id.to_string(),
            }
            .into());
        }
        Ok(self.total_price / self.total_order)
    }
}

/// Model inputs for repeat customers, one entry per retained customer
#[derive(Debug, Clone, PartialEq)]
pub struct CltvFeatures {
    pub customer_ids: Vec<String>,
    /// Weeks between first and last order
    pub recency_weekly: Array1<f64>,
    /// Weeks between first order and the analysis date
    pub tenure_weekly: Array1<f64>,
    /// Total number of orders across channels
    pub frequency: Array1<f64>,
    /// Average spend per order
    pub monetary_avg: Array1<f64>,
}

impl CltvFeatures {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }
}

/// Whole days between two dates, expressed in weeks
pub fn weeks_between(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64 / DAYS_PER_WEEK
}

/// Build model features for every customer with more than one order.
///
/// # Arguments
/// * `records` - Customer aggregates, usually already capped
/// * `analysis_date` - Date tenure is measured to; must not precede any
///   retained customer's last order
///
/// # Returns
/// * `CltvFeatures` with weekly recency/tenure, total orders and average
///   order value of the repeat customers, in input order
pub fn derive_features(
    records: &[CustomerRecord],
    analysis_date: NaiveDate,
) -> crate::Result<CltvFeatures> {
    let mut customer_ids = Vec::new();
    let mut recency = Vec::new();
    let mut tenure = Vec::new();
    let mut frequency = Vec::new();
    let mut monetary = Vec::new();

    for record in records {
        let metrics = OmniChannelMetrics::from_record(record);
        if metrics.total_order <= 1.0 {
            continue;
        }
        if record.last_order_date > analysis_date {
            return Err(CltvError::AnalysisDateBeforeLastOrder {
                customer_id: record.customer_id.clone(),
                analysis_date,
            }
            .into());
        }

        customer_ids.push(record.customer_id.clone());
        recency.push(weeks_between(record.first_order_date, record.last_order_date));
        tenure.push(weeks_between(record.first_order_date, analysis_date));
        frequency.push(metrics.total_order);
        monetary.push(metrics.average_order_value(&record.customer_id)?);
    }

    info!(
        retained = customer_ids.len(),
        dropped = records.len() - customer_ids.len(),
        %analysis_date,
        "Derived CLTV features for repeat customers"
    );

    Ok(CltvFeatures {
        customer_ids,
        recency_weekly: Array1::from(recency),
        tenure_weekly: Array1::from(tenure),
        frequency: Array1::from(frequency),
        monetary_avg: Array1::from(monetary),
    })
}
