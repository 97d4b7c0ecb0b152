//! Integration tests for CLTVForge

use cltvforge::data::{default_analysis_date, write_results, REQUIRED_COLUMNS};
use cltvforge::synthetic::{generate_customers, SyntheticConfig};
use chrono::{Duration, NaiveDate};
use cltvforge::{load_customers, run_analysis, CltvConfig, CltvError, CustomerRecord, Segment, TimeUnit};
use polars::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn synthetic_records(n_customers: usize) -> Vec<CustomerRecord> {
    generate_customers(&SyntheticConfig {
        n_customers,
        ..SyntheticConfig::default()
    })
}

/// 100 customers whose aggregates follow closed-form rules, so the fitted
/// values below can be reproduced outside this crate
fn reference_population() -> Vec<CustomerRecord> {
    const WEYL: [f64; 6] = [
        0.6180339887498949,
        0.4142135623730951,
        0.7320508075688772,
        0.2360679774997897,
        0.6457513110645907,
        0.1622776601683795,
    ];
    let observation_end = NaiveDate::from_ymd_opt(2021, 5, 30).unwrap();

    (0..100)
        .map(|i| {
            let u: Vec<f64> = WEYL.iter().map(|a| ((i + 1) as f64 * a).fract()).collect();
            let history_days = 30 + (1400.0 * u[0]).floor() as i64;
            let first_order_date = observation_end - Duration::days(history_days);

            let rate = 0.02 + 0.28 * u[1];
            let dropout = 0.02 + 0.28 * u[2];
            let lifetime_weeks = (0.25 + 1.5 * u[3]) / (dropout * rate);
            let active_weeks = (history_days as f64 / 7.0).min(lifetime_weeks);
            let repeats = (rate * active_weeks).floor();
            let last_order_date = first_order_date + Duration::days((repeats / rate * 7.0).floor() as i64);

            let orders = 1.0 + repeats;
            let online = (orders * u[4]).floor();
            let offline = orders - online;
            let basket = 40.0 + (360.0 * u[5]).floor();

            CustomerRecord {
                customer_id: format!("flo-{i:03}"),
                order_channel: None,
                last_order_channel: None,
                first_order_date,
                last_order_date,
                last_order_date_online: None,
                last_order_date_offline: None,
                order_num_total_online: online,
                order_num_total_offline: offline,
                value_total_online: online * basket,
                value_total_offline: offline * (basket + 15.0),
            }
        })
        .collect()
}

fn assert_relative(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance * expected.abs(),
        "{actual} differs from {expected}"
    );
}

fn date_cell(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

/// Write records in the OmniChannel export layout
fn create_test_csv(records: &[CustomerRecord]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "master_id,order_channel,last_order_channel,first_order_date,last_order_date,\
         last_order_date_online,last_order_date_offline,order_num_total_ever_online,\
         order_num_total_ever_offline,customer_value_total_ever_offline,customer_value_total_ever_online"
    )
    .unwrap();

    for r in records {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{},{}",
            r.customer_id,
            r.order_channel.clone().unwrap_or_default(),
            r.last_order_channel.clone().unwrap_or_default(),
            r.first_order_date,
            r.last_order_date,
            date_cell(r.last_order_date_online),
            date_cell(r.last_order_date_offline),
            r.order_num_total_online,
            r.order_num_total_offline,
            r.value_total_offline,
            r.value_total_online
        )
        .unwrap();
    }

    file
}

#[test]
fn test_end_to_end_pipeline() {
    let mut records = synthetic_records(100);
    let config = CltvConfig::default();
    let analysis_date = default_analysis_date(&records, config.analysis_date_offset_days).unwrap();

    let analysis = run_analysis(&mut records, analysis_date, &config, &config.optimizer).unwrap();

    // Single-purchase customers are not modelled
    let repeat = records
        .iter()
        .filter(|r| r.order_num_total_online + r.order_num_total_offline > 1.0)
        .count();
    assert_eq!(analysis.results.len(), repeat);
    assert_eq!(analysis.features.len(), repeat);

    for r in &analysis.results {
        assert!(r.frequency > 1.0);
        assert!(r.recency_weekly >= 0.0 && r.recency_weekly <= r.tenure_weekly);
        assert!(r.monetary_avg > 0.0);
        assert!(r.exp_sales_3_month >= 0.0);
        assert!(r.exp_sales_6_month >= r.exp_sales_3_month);
        assert!(r.exp_average_value > 0.0);
        assert!(r.cltv.is_finite() && r.cltv >= 0.0);
    }

    let params = analysis.purchase_model.params();
    assert!(params.r > 0.0 && params.alpha > 0.0 && params.a > 0.0 && params.b > 0.0);
    let spend = analysis.spend_model.params();
    assert!(spend.p > 0.0 && spend.q > 0.0 && spend.v > 0.0);
}

#[test]
fn test_reference_population_cltv() {
    let mut records = reference_population();
    let config = CltvConfig::default();
    assert_eq!(config.cltv_horizon_months, 6);
    assert_eq!(config.discount_rate, 0.01);
    let analysis_date = default_analysis_date(&records, config.analysis_date_offset_days).unwrap();
    assert_eq!(analysis_date, NaiveDate::from_ymd_opt(2021, 5, 28).unwrap());

    let analysis = run_analysis(&mut records, analysis_date, &config, &config.optimizer).unwrap();
    assert_eq!(analysis.results.len(), 96);

    let bg = analysis.purchase_model.params();
    assert_relative(bg.r, 3.9771784604050313, 1e-5);
    assert_relative(bg.alpha, 22.561691931487694, 1e-5);
    assert_relative(bg.a, 0.9579085334678105, 1e-5);
    assert_relative(bg.b, 6.5764678761197715, 1e-5);

    let gg = analysis.spend_model.params();
    assert_relative(gg.p, 3.956139347782521, 1e-5);
    assert_relative(gg.q, 0.39642829629455906, 1e-5);
    assert_relative(gg.v, 3.908483504432452, 1e-5);

    let total: f64 = analysis.results.iter().map(|r| r.cltv).sum();
    assert_relative(total, 22972.072392772585, 1e-6);

    for (id, cltv) in [
        ("flo-001", 41.63666026114229),
        ("flo-002", 496.2922897063391),
        ("flo-010", 1341.3582285557636),
        ("flo-050", 6.4683120014462805),
    ] {
        let result = analysis.results.iter().find(|r| r.customer_id == id).unwrap();
        assert_relative(result.cltv, cltv, 1e-5);
    }
}

#[test]
fn test_pipeline_is_deterministic() {
    let config = CltvConfig::default();

    let run = || {
        let mut records = synthetic_records(100);
        let analysis_date = default_analysis_date(&records, config.analysis_date_offset_days).unwrap();
        run_analysis(&mut records, analysis_date, &config, &config.optimizer)
            .unwrap()
            .results
    };

    assert_eq!(run(), run());
}

#[test]
fn test_segments_partition_customers() {
    let mut records = synthetic_records(100);
    let config = CltvConfig::default();
    let analysis_date = default_analysis_date(&records, config.analysis_date_offset_days).unwrap();
    let analysis = run_analysis(&mut records, analysis_date, &config, &config.optimizer).unwrap();

    let mut mean_cltv = Vec::new();
    let mut total = 0;
    for segment in Segment::ALL {
        let members: Vec<f64> = analysis
            .results
            .iter()
            .filter(|r| r.segment == segment)
            .map(|r| r.cltv)
            .collect();
        assert!(!members.is_empty(), "segment {} is empty", segment);
        total += members.len();
        mean_cltv.push(members.iter().sum::<f64>() / members.len() as f64);
    }
    assert_eq!(total, analysis.results.len());

    // D, C, B, A in ascending value
    for pair in mean_cltv.windows(2) {
        assert!(pair[0] <= pair[1]);
    }

    // Every A customer is worth at least as much as every D customer
    let max_d = analysis
        .results
        .iter()
        .filter(|r| r.segment == Segment::D)
        .map(|r| r.cltv)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_a = analysis
        .results
        .iter()
        .filter(|r| r.segment == Segment::A)
        .map(|r| r.cltv)
        .fold(f64::INFINITY, f64::min);
    assert!(max_d <= min_a);
}

#[test]
fn test_score_matches_fitted_population() {
    let mut records = synthetic_records(100);
    let config = CltvConfig::default();
    let analysis_date = default_analysis_date(&records, config.analysis_date_offset_days).unwrap();
    let analysis = run_analysis(&mut records, analysis_date, &config, &config.optimizer).unwrap();

    for r in analysis.results.iter().take(10) {
        let scored = analysis.score(&config, r.frequency, r.recency_weekly, r.tenure_weekly, r.monetary_avg);
        assert!((scored.exp_sales_3_month - r.exp_sales_3_month).abs() < 1e-9);
        assert!((scored.exp_sales_6_month - r.exp_sales_6_month).abs() < 1e-9);
        assert!((scored.exp_average_value - r.exp_average_value).abs() < 1e-9);
        assert!((scored.cltv - r.cltv).abs() < 1e-6);
        assert_eq!(scored.segment, r.segment);

        // recency and tenure are weekly, so CLTV is always valued in weeks
        let weekly = analysis.spend_model.customer_lifetime_value(
            &analysis.purchase_model,
            r.frequency,
            r.recency_weekly,
            r.tenure_weekly,
            r.monetary_avg,
            config.cltv_horizon_months,
            TimeUnit::Week,
            config.discount_rate,
        );
        assert_eq!(weekly, r.cltv);
    }
}

#[test]
fn test_csv_round_trip() {
    let source = synthetic_records(150);
    let input = create_test_csv(&source);

    let data = load_customers(input.path()).unwrap();
    assert_eq!(data.records.len(), 150);
    assert_eq!(data.columns.len(), 11);
    assert_eq!(data.records[0].customer_id, source[0].customer_id);
    assert_eq!(data.records[0].first_order_date, source[0].first_order_date);

    let mut records = data.records;
    let config = CltvConfig::default();
    let analysis_date = default_analysis_date(&records, config.analysis_date_offset_days).unwrap();
    let analysis = run_analysis(&mut records, analysis_date, &config, &config.optimizer).unwrap();

    let output = NamedTempFile::new().unwrap();
    write_results(output.path(), &analysis.results).unwrap();

    let written = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(output.path().to_path_buf()))
        .unwrap()
        .finish()
        .unwrap();
    assert_eq!(written.height(), analysis.results.len());
    for column in [
        "customer_id",
        "recency_weekly",
        "tenure_weekly",
        "frequency",
        "monetary_avg",
        "exp_sales_3_month",
        "exp_sales_6_month",
        "exp_average_value",
        "cltv",
        "cltv_segment",
    ] {
        assert!(written.column(column).is_ok(), "missing output column {}", column);
    }

    let segments: Vec<String> = written
        .column("cltv_segment")
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|s| s.unwrap_or_default().to_string())
        .collect();
    for (written_segment, result) in segments.iter().zip(&analysis.results) {
        assert_eq!(written_segment, &result.segment.to_string());
    }
}

#[test]
fn test_missing_column_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "master_id,first_order_date,last_order_date").unwrap();
    writeln!(file, "a,2020-01-01,2021-01-01").unwrap();

    let err = load_customers(file.path()).unwrap_err();
    let err = err.downcast_ref::<CltvError>().unwrap();
    assert!(matches!(err, CltvError::MissingColumn { column } if REQUIRED_COLUMNS.contains(&column.as_str())));
}

#[test]
fn test_analysis_date_before_last_order_is_rejected() {
    let mut records = synthetic_records(50);
    let config = CltvConfig::default();
    let latest = records
        .iter()
        .filter(|r| r.order_num_total_online + r.order_num_total_offline > 1.0)
        .map(|r| r.last_order_date)
        .max()
        .unwrap();
    let too_early = latest - Duration::days(30);

    let err = run_analysis(&mut records, too_early, &config, &config.optimizer).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CltvError>(),
        Some(CltvError::AnalysisDateBeforeLastOrder { .. })
    ));
}
