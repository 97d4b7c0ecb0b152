//! Loading and exporting the OmniChannel customer table using Polars

use crate::cltv::CltvResult;
use crate::error::CltvError;
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

pub const COL_CUSTOMER_ID: &str = "master_id";
pub const COL_ORDER_CHANNEL: &str = "order_channel";
pub const COL_LAST_ORDER_CHANNEL: &str = "last_order_channel";
pub const COL_FIRST_ORDER_DATE: &str = "first_order_date";
pub const COL_LAST_ORDER_DATE: &str = "last_order_date";
pub const COL_LAST_ORDER_DATE_ONLINE: &str = "last_order_date_online";
pub const COL_LAST_ORDER_DATE_OFFLINE: &str = "last_order_date_offline";
pub const COL_ORDERS_ONLINE: &str = "order_num_total_ever_online";
pub const COL_ORDERS_OFFLINE: &str = "order_num_total_ever_offline";
pub const COL_VALUE_OFFLINE: &str = "customer_value_total_ever_offline";
pub const COL_VALUE_ONLINE: &str = "customer_value_total_ever_online";

/// Columns that must be present before anything is fitted
pub const REQUIRED_COLUMNS: [&str; 7] = [
    COL_CUSTOMER_ID,
    COL_FIRST_ORDER_DATE,
    COL_LAST_ORDER_DATE,
    COL_ORDERS_ONLINE,
    COL_ORDERS_OFFLINE,
    COL_VALUE_OFFLINE,
    COL_VALUE_ONLINE,
];

/// One customer row of the OmniChannel export
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub order_channel: Option<String>,
    pub last_order_channel: Option<String>,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    pub last_order_date_online: Option<NaiveDate>,
    pub last_order_date_offline: Option<NaiveDate>,
    pub order_num_total_online: f64,
    pub order_num_total_offline: f64,
    pub value_total_online: f64,
    pub value_total_offline: f64,
}

/// Shape information about a source column, used for the data overview
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
}

/// Parsed customer table plus metadata about the raw frame
#[derive(Debug, Clone)]
pub struct CustomerData {
    pub records: Vec<CustomerRecord>,
    pub columns: Vec<ColumnSummary>,
}

/// Load a CSV export and convert it into customer records
///
/// # Arguments
/// * `file_path` - Path to the OmniChannel CSV export
///
/// # Returns
/// * `CustomerData` with one record per row and a summary of every column
///
/// Fails with [`CltvError::MissingColumn`] before any parsing when a required
/// column is absent.
pub fn load_customers<P: AsRef<Path>>(file_path: P) -> crate::Result<CustomerData> {
    let path = file_path.as_ref();
    info!(path = %path.display(), "Loading customer data");

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    customers_from_frame(&df)
}

/// Convert an in-memory frame into customer records
pub fn customers_from_frame(df: &DataFrame) -> crate::Result<CustomerData> {
    for column in REQUIRED_COLUMNS {
        if df.column(column).is_err() {
            return Err(CltvError::MissingColumn {
                column: column.to_string(),
            }
            .into());
        }
    }

    if df.height() == 0 {
        return Err(CltvError::EmptyInput("input table has no rows".to_string()).into());
    }

    let columns = df
        .get_columns()
        .iter()
        .map(|series| ColumnSummary {
            name: series.name().to_string(),
            dtype: series.dtype().to_string(),
            null_count: series.null_count(),
        })
        .collect();

    let ids = required_strings(df, COL_CUSTOMER_ID)?;
    let first_dates = required_dates(df, COL_FIRST_ORDER_DATE)?;
    let last_dates = required_dates(df, COL_LAST_ORDER_DATE)?;
    let orders_online = required_amounts(df, COL_ORDERS_ONLINE)?;
    let orders_offline = required_amounts(df, COL_ORDERS_OFFLINE)?;
    let value_offline = required_amounts(df, COL_VALUE_OFFLINE)?;
    let value_online = required_amounts(df, COL_VALUE_ONLINE)?;

    let order_channel = optional_strings(df, COL_ORDER_CHANNEL)?;
    let last_order_channel = optional_strings(df, COL_LAST_ORDER_CHANNEL)?;
    let last_online = optional_dates(df, COL_LAST_ORDER_DATE_ONLINE)?;
    let last_offline = optional_dates(df, COL_LAST_ORDER_DATE_OFFLINE)?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        if first_dates[row] > last_dates[row] {
            return Err(CltvError::InvalidValue {
                column: COL_LAST_ORDER_DATE.to_string(),
                row,
                reason: format!(
                    "last order {} precedes first order {}",
                    last_dates[row], first_dates[row]
                ),
            }
            .into());
        }

        records.push(CustomerRecord {
            customer_id: ids[row].clone(),
            order_channel: order_channel[row].clone(),
            last_order_channel: last_order_channel[row].clone(),
            first_order_date: first_dates[row],
            last_order_date: last_dates[row],
            last_order_date_online: last_online[row],
            last_order_date_offline: last_offline[row],
            order_num_total_online: orders_online[row],
            order_num_total_offline: orders_offline[row],
            value_total_online: value_online[row],
            value_total_offline: value_offline[row],
        });
    }

    debug!(rows = records.len(), "Parsed customer records");
    Ok(CustomerData { records, columns })
}

/// Analysis date anchored `offset_days` after the latest observed last order
pub fn default_analysis_date(
    records: &[CustomerRecord],
    offset_days: i64,
) -> crate::Result<NaiveDate> {
    let latest = records
        .iter()
        .map(|record| record.last_order_date)
        .max()
        .ok_or_else(|| CltvError::EmptyInput("no customers to anchor the analysis date".to_string()))?;
    Ok(latest + Duration::days(offset_days))
}

/// Write the scored customers as CSV
pub fn write_results<P: AsRef<Path>>(file_path: P, results: &[CltvResult]) -> crate::Result<()> {
    let mut df = results_frame(results)?;
    let mut file = File::create(file_path.as_ref())?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    info!(path = %file_path.as_ref().display(), rows = results.len(), "Results written");
    Ok(())
}

/// Tabular form of the scored customers
pub fn results_frame(results: &[CltvResult]) -> crate::Result<DataFrame> {
    let customer_ids: Vec<String> = results.iter().map(|r| r.customer_id.clone()).collect();
    let segments: Vec<String> = results.iter().map(|r| r.segment.to_string()).collect();
    let column = |name: &str, f: fn(&CltvResult) -> f64| -> Series {
        Series::new(name, results.iter().map(f).collect::<Vec<f64>>())
    };

    let df = DataFrame::new(vec![
        Series::new("customer_id", customer_ids),
        column("recency_weekly", |r| r.recency_weekly),
        column("tenure_weekly", |r| r.tenure_weekly),
        column("frequency", |r| r.frequency),
        column("monetary_avg", |r| r.monetary_avg),
        column("exp_sales_3_month", |r| r.exp_sales_3_month),
        column("exp_sales_6_month", |r| r.exp_sales_6_month),
        column("exp_average_value", |r| r.exp_average_value),
        column("cltv", |r| r.cltv),
        Series::new("cltv_segment", segments),
    ])?;
    Ok(df)
}

fn required_strings(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    optional_strings(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or_else(|| missing_value(name, row)))
        .collect()
}

fn optional_strings(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let Ok(series) = df.column(name) else {
        return Ok(vec![None; df.height()]);
    };
    let series = series.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(str::trim).filter(|v| !v.is_empty()).map(String::from))
        .collect();
    Ok(values)
}

fn required_dates(df: &DataFrame, name: &str) -> crate::Result<Vec<NaiveDate>> {
    optional_dates(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or_else(|| missing_value(name, row)))
        .collect()
}

fn optional_dates(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<NaiveDate>>> {
    optional_strings(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| invalid_value(name, row, format!("cannot parse date '{raw}'"))),
            None => Ok(None),
        })
        .collect()
}

fn required_amounts(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    // Unparsable text becomes null in the cast; keep the raw cells to tell
    // it apart from an empty cell.
    let raw = optional_strings(df, name)?;
    let series = df.column(name)?.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .zip(raw)
        .enumerate()
        .map(|(row, (value, raw))| match (value, raw) {
            (Some(v), _) if v.is_finite() && v >= 0.0 => Ok(v),
            (Some(v), _) => Err(invalid_value(name, row, format!("expected a non-negative amount, got {v}"))),
            (None, Some(raw)) => Err(invalid_value(name, row, format!("cannot parse amount '{raw}'"))),
            (None, None) => Err(missing_value(name, row)),
        })
        .collect()
}

/// Parse `YYYY-MM-DD`, ignoring any trailing time component
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split(|c: char| c == ' ' || c == 'T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn missing_value(column: &str, row: usize) -> anyhow::Error {
    invalid_value(column, row, "missing value".to_string())
}

fn invalid_value(column: &str, row: usize, reason: String) -> anyhow::Error {
    CltvError::InvalidValue {
        column: column.to_string(),
        row,
        reason,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "master_id,order_channel,last_order_channel,first_order_date,last_order_date,last_order_date_online,last_order_date_offline,order_num_total_ever_online,order_num_total_ever_offline,customer_value_total_ever_offline,customer_value_total_ever_online,interested_in_categories_12";

    fn create_test_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_customers() {
        let file = create_test_csv(&[
            "cc294636,Android App,Offline,2020-10-30,2021-02-26,2021-02-21,2021-02-26,4.0,1.0,139.99,799.38,[KADIN]",
            "f431bd5a,Android App,Mobile,2017-02-08,2021-02-16,2021-02-16,2020-01-10,19.0,2.0,159.97,1853.58,\"[ERKEK, COCUK]\"",
            "69b69676,Desktop,Desktop,2019-11-27,2020-11-27,2020-11-27,,3.0,0.0,0.0,317.91,[]",
        ]);

        let data = load_customers(file.path()).unwrap();
        assert_eq!(data.records.len(), 3);
        assert_eq!(data.columns.len(), 12);

        let first = &data.records[0];
        assert_eq!(first.customer_id, "cc294636");
        assert_eq!(first.first_order_date, NaiveDate::from_ymd_opt(2020, 10, 30).unwrap());
        assert_eq!(first.order_num_total_online, 4.0);
        assert_eq!(first.value_total_offline, 139.99);
        assert_eq!(first.order_channel.as_deref(), Some("Android App"));

        assert_eq!(data.records[2].last_order_date_offline, None);
        let offline_nulls = data
            .columns
            .iter()
            .find(|c| c.name == COL_LAST_ORDER_DATE_OFFLINE)
            .unwrap()
            .null_count;
        assert_eq!(offline_nulls, 1);
    }

    #[test]
    fn test_missing_required_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "master_id,first_order_date,last_order_date,order_num_total_ever_online").unwrap();
        writeln!(file, "a,2020-01-01,2020-02-01,2").unwrap();

        let err = load_customers(file.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CltvError>(),
            Some(&CltvError::MissingColumn {
                column: COL_ORDERS_OFFLINE.to_string()
            })
        );
    }

    #[test]
    fn test_rejects_last_order_before_first() {
        let file = create_test_csv(&[
            "a,Desktop,Desktop,2021-03-01,2021-01-01,2021-01-01,,2.0,0.0,0.0,100.0,[]",
        ]);
        let err = load_customers(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CltvError>(),
            Some(CltvError::InvalidValue { row: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_negative_amount() {
        let file = create_test_csv(&[
            "a,Desktop,Desktop,2021-01-01,2021-02-01,2021-02-01,,2.0,0.0,0.0,-5.0,[]",
        ]);
        assert!(load_customers(file.path()).is_err());
    }

    #[test]
    fn test_rejects_unparsable_amount() {
        let file = create_test_csv(&[
            "a,Desktop,Desktop,2021-01-01,2021-02-01,2021-02-01,,2.0,0.0,0.0,100.0,[]",
            "b,Desktop,Desktop,2021-01-01,2021-02-01,2021-02-01,,two,0.0,0.0,100.0,[]",
        ]);
        let err = load_customers(file.path()).unwrap_err();
        match err.downcast_ref::<CltvError>() {
            Some(CltvError::InvalidValue { column, row, reason }) => {
                assert_eq!(column, COL_ORDERS_ONLINE);
                assert_eq!(*row, 1);
                assert_eq!(reason, "cannot parse amount 'two'");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reports_empty_amount_as_missing() {
        let file = create_test_csv(&[
            "a,Desktop,Desktop,2021-01-01,2021-02-01,2021-02-01,,2.0,0.0,0.0,,[]",
        ]);
        let err = load_customers(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CltvError>(),
            Some(CltvError::InvalidValue { reason, .. }) if reason == "missing value"
        ));
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2021, 5, 30);
        assert_eq!(parse_date("2021-05-30"), expected);
        assert_eq!(parse_date("2021-05-30 00:00:00"), expected);
        assert_eq!(parse_date("2021-05-30T12:00:00"), expected);
        assert_eq!(parse_date("30/05/2021"), None);
    }

    #[test]
    fn test_default_analysis_date() {
        let file = create_test_csv(&[
            "a,Desktop,Desktop,2020-01-01,2021-05-28,2021-05-28,,2.0,0.0,0.0,100.0,[]",
            "b,Desktop,Desktop,2020-01-01,2021-05-30,2021-05-30,,2.0,0.0,0.0,100.0,[]",
        ]);
        let data = load_customers(file.path()).unwrap();
        let date = default_analysis_date(&data.records, 2).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());

        assert!(default_analysis_date(&[], 2).is_err());
    }
}
