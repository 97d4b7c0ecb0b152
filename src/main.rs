//! CLTVForge: Customer lifetime value CLI using BG/NBD and Gamma-Gamma models
//!
//! This is the main entrypoint that orchestrates data loading, outlier capping,
//! model fitting, segmentation, reporting, and single-customer prediction.

use anyhow::Result;
use clap::Parser;
use cltvforge::cli::CustomerInput;
use cltvforge::data::{default_analysis_date, write_results, ColumnSummary};
use cltvforge::synthetic::{generate_customers, SyntheticConfig};
use cltvforge::{report, run_analysis, Args, CltvConfig, CustomerRecord};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let directive = if args.verbose { "cltvforge=debug" } else { "cltvforge=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let config = args.resolve_config()?;
    info!(?config, "Configuration resolved");

    // Check if in prediction mode
    if let Some(customer) = args.parse_customer_values()? {
        run_prediction_mode(&args, &config, customer)?;
    } else {
        run_full_pipeline(&args, &config)?;
    }

    Ok(())
}

/// Load the customer table from --input or generate one with --synthetic
fn load_records(args: &Args) -> Result<(Vec<CustomerRecord>, Option<Vec<ColumnSummary>>)> {
    match args.synthetic {
        Some(n_customers) => {
            info!(n_customers, seed = args.seed, "Generating synthetic customers");
            let synthetic = SyntheticConfig {
                n_customers,
                seed: args.seed,
                ..SyntheticConfig::default()
            };
            Ok((generate_customers(&synthetic), None))
        }
        None => {
            let data = cltvforge::load_customers(&args.input)?;
            Ok((data.records, Some(data.columns)))
        }
    }
}

/// Fit on the population and score a single customer
fn run_prediction_mode(args: &Args, config: &CltvConfig, customer: CustomerInput) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input: frequency={}, recency={}w, tenure={}w, monetary={}",
        customer.frequency, customer.recency, customer.tenure, customer.monetary
    );

    let start_time = Instant::now();

    let (mut records, _) = load_records(args)?;
    let analysis_date = match args.parse_analysis_date()? {
        Some(date) => date,
        None => default_analysis_date(&records, config.analysis_date_offset_days)?,
    };
    let analysis = run_analysis(&mut records, analysis_date, config, &config.optimizer)?;

    let scored = analysis.score(
        config,
        customer.frequency,
        customer.recency,
        customer.tenure,
        customer.monetary,
    );
    let elapsed = start_time.elapsed();

    println!("\n✓ Predicted segment: {}", scored.segment);
    println!("  Expected purchases (3 months): {:.4}", scored.exp_sales_3_month);
    println!("  Expected purchases (6 months): {:.4}", scored.exp_sales_6_month);
    println!("  Expected average value:        {:.2}", scored.exp_average_value);
    println!(
        "  CLTV ({} months, {} discount): {:.2}",
        config.cltv_horizon_months, config.discount_rate, scored.cltv
    );
    println!(
        "  Probability alive:             {:.4}",
        analysis
            .purchase_model
            .probability_alive(customer.frequency, customer.recency, customer.tenure)
    );
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    let edges = analysis.edges.edges();
    println!(
        "\nSegment edges (CLTV): D ≤ {:.2} < C ≤ {:.2} < B ≤ {:.2} < A",
        edges[1], edges[2], edges[3]
    );

    Ok(())
}

/// Run full CLTV pipeline
fn run_full_pipeline(args: &Args, config: &CltvConfig) -> Result<()> {
    println!("=== CLTV Prediction Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load data
    let (mut records, columns) = load_records(args)?;
    println!("✓ Data loaded: {} customers", records.len());
    if let Some(columns) = &columns {
        report::print_data_overview(columns, records.len());
    }
    report::print_describe("Raw Aggregates", &report::describe_records(&records));

    let analysis_date = match args.parse_analysis_date()? {
        Some(date) => date,
        None => default_analysis_date(&records, config.analysis_date_offset_days)?,
    };
    println!("Analysis date: {}", analysis_date);

    // Step 2: Cap, derive, fit, predict, segment
    let model_start = Instant::now();
    let analysis = run_analysis(&mut records, analysis_date, config, &config.optimizer)?;
    let model_time = model_start.elapsed();

    println!("✓ Models fitted for {} repeat customers", analysis.results.len());
    if args.verbose {
        println!("  Fitting time: {:.2}s", model_time.as_secs_f64());
    }
    report::print_describe("Capped Aggregates", &report::describe_records(&records));

    // Step 3: Report
    report::print_analysis_report(&analysis, args.top);

    // Step 4: Export
    if let Some(output) = &args.output {
        write_results(output, &analysis.results)?;
        println!("\nResults saved to: {}", output);
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}
