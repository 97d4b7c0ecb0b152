//! Typed failures raised by the CLTV pipeline

use thiserror::Error;

/// Domain errors. Library functions return `crate::Result`, so these travel
/// inside `anyhow::Error` and can be recovered with `downcast_ref`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CltvError {
    #[error("Required column '{column}' is missing from the input")]
    MissingColumn { column: String },

    #[error("Invalid value in column '{column}' at row {row}: {reason}")]
    InvalidValue {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("No usable rows: {0}")]
    EmptyInput(String),

    #[error("Customer '{customer_id}' has no orders; average order value is undefined")]
    ZeroOrders { customer_id: String },

    #[error("Analysis date {analysis_date} precedes the last order of customer '{customer_id}'")]
    AnalysisDateBeforeLastOrder {
        customer_id: String,
        analysis_date: chrono::NaiveDate,
    },

    #[error("{model} fit did not converge after {iterations} iterations")]
    NotConverged { model: &'static str, iterations: usize },

    #[error("Invalid {model} parameters: {reason}")]
    InvalidParameters { model: &'static str, reason: String },

    #[error("Segment bin edges must be unique, got {edges:?}")]
    NonUniqueBinEdges { edges: Vec<f64> },
}
