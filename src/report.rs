//! Console reporting: data overview, outlier bounds, rankings and segment profiles

use crate::cltv::{segment_profiles, CltvAnalysis, CltvResult};
use crate::data::{ColumnSummary, CustomerRecord};
use crate::outliers::{quantile_sorted, CappedColumn};

/// Summary statistics of one numeric column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub p01: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p99: f64,
    pub max: f64,
}

/// Describe a column; `None` when it has no values
pub fn describe(name: &str, values: &[f64]) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    // sample standard deviation
    let std = if count > 1 {
        (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
    } else {
        f64::NAN
    };

    Some(ColumnStats {
        name: name.to_string(),
        count,
        mean,
        std,
        min: sorted[0],
        p01: quantile_sorted(&sorted, 0.01),
        p25: quantile_sorted(&sorted, 0.25),
        p50: quantile_sorted(&sorted, 0.5),
        p75: quantile_sorted(&sorted, 0.75),
        p99: quantile_sorted(&sorted, 0.99),
        max: sorted[count - 1],
    })
}

/// Stats for the four capped order/spend columns
pub fn describe_records(records: &[CustomerRecord]) -> Vec<ColumnStats> {
    CappedColumn::ALL
        .iter()
        .filter_map(|column| {
            let values: Vec<f64> = records.iter().map(|r| column.get(r)).collect();
            describe(column.name(), &values)
        })
        .collect()
}

/// Print the overview of the loaded table
pub fn print_data_overview(columns: &[ColumnSummary], rows: usize) {
    println!("\n=== Data Overview ===");
    println!("Rows: {}", rows);
    println!("Columns: {}", columns.len());
    println!("\n  {:<36} | {:<8} | Nulls", "Column", "Type");
    println!("  {:-<36}-|-{:-<8}-|------", "", "");
    for column in columns {
        println!("  {:<36} | {:<8} | {}", column.name, column.dtype, column.null_count);
    }
}

pub fn print_describe(title: &str, stats: &[ColumnStats]) {
    println!("\n=== {} ===", title);
    println!(
        "  {:<34} | {:>6} | {:>10} | {:>10} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>10} | {:>10}",
        "Column", "count", "mean", "std", "min", "1%", "25%", "50%", "75%", "99%", "max"
    );
    for s in stats {
        println!(
            "  {:<34} | {:>6} | {:>10.4} | {:>10.4} | {:>8.2} | {:>8.2} | {:>8.2} | {:>8.2} | {:>8.2} | {:>10.2} | {:>10.2}",
            s.name, s.count, s.mean, s.std, s.min, s.p01, s.p25, s.p50, s.p75, s.p99, s.max
        );
    }
}

/// Print fitted parameters and the outlier bounds used
pub fn print_model_summary(analysis: &CltvAnalysis) {
    println!("\n=== Outlier Thresholds ===");
    for (column, thresholds) in &analysis.thresholds {
        println!(
            "  {:<36} low={:>12.4} high={:>12.4}",
            column.name(),
            thresholds.low,
            thresholds.high
        );
    }

    let bg = analysis.purchase_model.params();
    let gg = analysis.spend_model.params();
    println!("\n=== Fitted Models ===");
    println!("Analysis date: {}", analysis.analysis_date);
    println!("Repeat customers modelled: {}", analysis.features.len());
    println!(
        "BG/NBD:      r={:.4} alpha={:.4} a={:.4} b={:.4} (penalizer {}, {} iterations)",
        bg.r,
        bg.alpha,
        bg.a,
        bg.b,
        analysis.purchase_model.penalizer(),
        analysis.purchase_model.iterations()
    );
    println!(
        "Gamma-Gamma: p={:.4} q={:.4} v={:.4} (penalizer {}, {} iterations)",
        gg.p,
        gg.q,
        gg.v,
        analysis.spend_model.penalizer(),
        analysis.spend_model.iterations()
    );
}

/// The `n` largest results by `key`, largest first; ties keep input order
pub fn top_by(results: &[CltvResult], key: fn(&CltvResult) -> f64, n: usize) -> Vec<&CltvResult> {
    let mut ranked: Vec<&CltvResult> = results.iter().collect();
    ranked.sort_by(|a, b| key(b).total_cmp(&key(a)));
    ranked.truncate(n);
    ranked
}

pub fn print_top(title: &str, results: &[CltvResult], key: fn(&CltvResult) -> f64, n: usize) {
    println!("\n=== Top {} by {} ===", n, title);
    println!(
        "  {:<24} | {:>9} | {:>9} | {:>9} | {:>10} | {:>8} | {:>8} | {:>10} | {:>10} | Seg",
        "Customer", "Recency", "T", "Freq", "Monetary", "Exp 3M", "Exp 6M", "Exp Value", "CLTV"
    );
    for r in top_by(results, key, n) {
        println!(
            "  {:<24} | {:>9.2} | {:>9.2} | {:>9.0} | {:>10.2} | {:>8.4} | {:>8.4} | {:>10.2} | {:>10.2} | {}",
            r.customer_id,
            r.recency_weekly,
            r.tenure_weekly,
            r.frequency,
            r.monetary_avg,
            r.exp_sales_3_month,
            r.exp_sales_6_month,
            r.exp_average_value,
            r.cltv,
            r.segment
        );
    }
}

/// Print the mean recency, frequency and spend of each segment
pub fn print_segment_statistics(results: &[CltvResult]) {
    println!("\n=== Segment Statistics ===");
    println!("Total customers: {}", results.len());
    println!("  Segment | Customers | Recency (w) | Frequency | Monetary | Mean CLTV | Total CLTV");
    println!("  --------|-----------|-------------|-----------|----------|-----------|-----------");
    for profile in segment_profiles(results) {
        let percentage = profile.customers as f64 / results.len() as f64 * 100.0;
        println!(
            "  {:>7} | {:>5} ({:>4.1}%) | {:>11.2} | {:>9.2} | {:>8.2} | {:>9.2} | {:>10.2}",
            profile.segment.to_string(),
            profile.customers,
            percentage,
            profile.mean_recency_weekly,
            profile.mean_frequency,
            profile.mean_monetary_avg,
            profile.mean_cltv,
            profile.total_cltv
        );
    }
}

/// Print the full report of an analysis run
pub fn print_analysis_report(analysis: &CltvAnalysis, top: usize) {
    print_model_summary(analysis);
    print_top("expected sales (3 months)", &analysis.results, |r| r.exp_sales_3_month, top);
    print_top("expected sales (6 months)", &analysis.results, |r| r.exp_sales_6_month, top);
    print_top("CLTV", &analysis.results, |r| r.cltv, top);
    print_segment_statistics(&analysis.results);
}
