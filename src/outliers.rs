//! Outlier suppression for the raw order-count and spend columns

use crate::data::{
    CustomerRecord, COL_ORDERS_OFFLINE, COL_ORDERS_ONLINE, COL_VALUE_OFFLINE, COL_VALUE_ONLINE,
};
use std::fmt;
use tracing::info;

/// Lower and upper percentile used in place of the classic quartiles
pub const LOWER_QUANTILE: f64 = 0.01;
pub const UPPER_QUANTILE: f64 = 0.99;
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Raw columns that get capped, in the order they are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CappedColumn {
    OrdersOnline,
    OrdersOffline,
    ValueOnline,
    ValueOffline,
}

impl CappedColumn {
    pub const ALL: [CappedColumn; 4] = [
        CappedColumn::OrdersOnline,
        CappedColumn::OrdersOffline,
        CappedColumn::ValueOnline,
        CappedColumn::ValueOffline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CappedColumn::OrdersOnline => COL_ORDERS_ONLINE,
            CappedColumn::OrdersOffline => COL_ORDERS_OFFLINE,
            CappedColumn::ValueOnline => COL_VALUE_ONLINE,
            CappedColumn::ValueOffline => COL_VALUE_OFFLINE,
        }
    }

    pub fn get(&self, record: &CustomerRecord) -> f64 {
        match self {
            CappedColumn::OrdersOnline => record.order_num_total_online,
            CappedColumn::OrdersOffline => record.order_num_total_offline,
            CappedColumn::ValueOnline => record.value_total_online,
            CappedColumn::ValueOffline => record.value_total_offline,
        }
    }

    fn slot<'a>(&self, record: &'a mut CustomerRecord) -> &'a mut f64 {
        match self {
            CappedColumn::OrdersOnline => &mut record.order_num_total_online,
            CappedColumn::OrdersOffline => &mut record.order_num_total_offline,
            CappedColumn::ValueOnline => &mut record.value_total_online,
            CappedColumn::ValueOffline => &mut record.value_total_offline,
        }
    }
}

impl fmt::Display for CappedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounds outside of which a value is treated as an outlier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    /// Replacement written for values below `low`
    pub fn low_cap(&self) -> f64 {
        self.low.round_ties_even()
    }

    /// Replacement written for values above `high`
    pub fn high_cap(&self) -> f64 {
        self.high.round_ties_even()
    }
}

/// Quantile with linear interpolation between closest ranks.
///
/// `values` must be sorted ascending and non-empty.
pub fn quantile_sorted(values: &[f64], q: f64) -> f64 {
    let position = (values.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(values.len() - 1);
    let fraction = position - lower as f64;
    values[lower] + fraction * (values[upper] - values[lower])
}

/// Quantile of an unsorted column; `None` for an empty column
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

/// Widened IQR fence built from the 1st and 99th percentiles
pub fn outlier_thresholds(values: &[f64]) -> Option<Thresholds> {
    let q1 = quantile(values, LOWER_QUANTILE)?;
    let q3 = quantile(values, UPPER_QUANTILE)?;
    let iqr = q3 - q1;
    Some(Thresholds {
        low: q1 - IQR_MULTIPLIER * iqr,
        high: q3 + IQR_MULTIPLIER * iqr,
    })
}

/// Clip a column in place; values past a bound become the rounded bound.
///
/// Rounding applies to every column, monetary ones included, and uses
/// round-half-to-even.
pub fn cap_values(values: &mut [f64]) -> Option<Thresholds> {
    let thresholds = outlier_thresholds(values)?;
    for value in values.iter_mut() {
        if *value < thresholds.low {
            *value = thresholds.low_cap();
        } else if *value > thresholds.high {
            *value = thresholds.high_cap();
        }
    }
    Some(thresholds)
}

/// Cap one customer column using bounds computed from its current values
pub fn cap_column(records: &mut [CustomerRecord], column: CappedColumn) -> Option<Thresholds> {
    let mut values: Vec<f64> = records.iter().map(|r| column.get(r)).collect();
    let thresholds = cap_values(&mut values)?;
    for (record, value) in records.iter_mut().zip(values) {
        *column.slot(record) = value;
    }

    info!(
        column = column.name(),
        low = thresholds.low,
        high = thresholds.high,
        "Outlier thresholds applied"
    );
    Some(thresholds)
}

/// Cap the four raw order/spend columns one after another
pub fn cap_customer_columns(records: &mut [CustomerRecord]) -> Vec<(CappedColumn, Thresholds)> {
    CappedColumn::ALL
        .iter()
        .filter_map(|&column| cap_column(records, column).map(|t| (column, t)))
        .collect()
}
