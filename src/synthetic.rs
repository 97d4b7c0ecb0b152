//! Seeded synthetic OmniChannel populations for demos and tests

use crate::data::CustomerRecord;
use crate::features::DAYS_PER_WEEK;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shape of a generated population
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub n_customers: usize,
    pub seed: u64,
    /// Last possible order date; the analysis date is usually a few days later
    pub observation_end: NaiveDate,
    /// Earliest first order, in days before `observation_end`
    pub max_history_days: i64,
    /// Range of weekly purchase rates while a customer is active
    pub purchase_rate: (f64, f64),
    /// Range of per-purchase dropout probabilities
    pub dropout: (f64, f64),
    /// Range of average basket values
    pub basket: (f64, f64),
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_customers: 100,
            seed: 42,
            observation_end: NaiveDate::from_ymd_opt(2021, 5, 30).unwrap_or_default(),
            max_history_days: 4 * 365,
            purchase_rate: (0.02, 0.3),
            dropout: (0.02, 0.3),
            basket: (40.0, 400.0),
        }
    }
}

/// Generate customer aggregates by simulating the BG/NBD story: purchases
/// arrive as a Poisson process and the customer may drop out after each one.
pub fn generate_customers(config: &SyntheticConfig) -> Vec<CustomerRecord> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let channels = ["Android App", "Ios App", "Desktop", "Mobile", "Offline"];

    (0..config.n_customers)
        .map(|i| {
            let history_days = rng.gen_range(14..=config.max_history_days.max(14));
            let first_order_date = config.observation_end - Duration::days(history_days);
            let history_weeks = history_days as f64 / DAYS_PER_WEEK;

            let rate = rng.gen_range(config.purchase_rate.0..=config.purchase_rate.1);
            let dropout = rng.gen_range(config.dropout.0..=config.dropout.1);

            let mut orders = 1.0;
            let mut elapsed = 0.0;
            let mut last_purchase = 0.0;
            loop {
                let uniform: f64 = rng.gen();
                elapsed += -(1.0 - uniform).ln() / rate;
                if elapsed > history_weeks {
                    break;
                }
                orders += 1.0;
                last_purchase = elapsed;
                if rng.gen_bool(dropout) {
                    break;
                }
            }

            let last_order_date =
                first_order_date + Duration::days((last_purchase * DAYS_PER_WEEK).floor() as i64);
            let online_share: f64 = rng.gen();
            let orders_online = (orders * online_share).round();
            let orders_offline = orders - orders_online;

            let basket = rng.gen_range(config.basket.0..=config.basket.1);
            let mut spend = |count: f64| {
                let noise: f64 = rng.gen_range(0.8..1.2);
                (count * basket * noise * 100.0).round() / 100.0
            };
            let value_online = spend(orders_online);
            let value_offline = spend(orders_offline);

            let order_channel = channels[rng.gen_range(0..channels.len())];
            CustomerRecord {
                customer_id: format!("cust-{i:05}"),
                order_channel: Some(order_channel.to_string()),
                last_order_channel: Some(order_channel.to_string()),
                first_order_date,
                last_order_date,
                last_order_date_online: (orders_online > 0.0).then_some(last_order_date),
                last_order_date_offline: (orders_offline > 0.0).then_some(last_order_date),
                order_num_total_online: orders_online,
                order_num_total_offline: orders_offline,
                value_total_online: value_online,
                value_total_offline: value_offline,
            }
        })
        .collect()
}
