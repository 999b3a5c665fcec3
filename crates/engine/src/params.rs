//! Parameter construction for the two-phase backtest pipeline
//!
//! Pure transformations: strategy settings in, wire payload and
//! deterministic artifact names out. No side effects.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use crate::types::{ArtifactHandle, ArtifactKind, BacktestMode, DateRange, StrategyConfig};

/// Name prefix of raw swap data artifacts.
pub const RAW_DATA_PREFIX: &str = "swap_results";
/// Name prefix of computed backtest result artifacts.
pub const BT_RESULT_PREFIX: &str = "bt_results";
/// Case label the compute service uses for runs that never rebalance.
pub const NO_REBALANCE_CASE: &str = "Fix_0D";

/// Wire payload submitted to the compute endpoint. Built once per run,
/// immutable thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct JobQuery {
    /// URL of the raw swap data artifact the backtest reads from.
    pub data: String,
    pub cases: CaseMap,
    /// Artifact name the compute service writes results to.
    pub file_name: String,
}

/// Case map with a single entry: `[pool name, <ordered parameter values>]`.
#[derive(Debug, Clone, Serialize)]
pub struct CaseMap {
    pub case0: Vec<Value>,
}

/// Handle for the raw swap data artifact of a pool and date range.
/// Name = prefix + first 5 chars of the lowercased pool address + dates.
pub fn raw_data_handle(pool_address: &str, range: &DateRange) -> ArtifactHandle {
    let prefix: String = pool_address.to_lowercase().chars().take(5).collect();
    ArtifactHandle {
        file_name: format!("{}{}{}{}", RAW_DATA_PREFIX, prefix, range.start, range.end),
        kind: ArtifactKind::RawSwapData,
    }
}

/// Ordered case parameters. Order is part of the wire contract: rebalance
/// case label, price range pair, wait hours, start date, fiat value, gas
/// price — both in the case list and in the result file name.
struct CaseParams {
    rebalance_case: String,
    range_price: (f64, f64),
    hours_rebalance: u8,
    date_a: NaiveDate,
    usd_position: f64,
    gas_price: f64,
}

impl CaseParams {
    fn from_config(config: &StrategyConfig) -> Self {
        match config.mode {
            BacktestMode::Simple => Self {
                rebalance_case: NO_REBALANCE_CASE.to_string(),
                range_price: (
                    config.ticks.lower.unwrap_or_default(),
                    config.ticks.upper.unwrap_or_default(),
                ),
                hours_rebalance: 0,
                date_a: config.range.start,
                usd_position: config.fiat_value,
                gas_price: config.gas_price_gwei,
            },
            BacktestMode::Dynamic => Self {
                rebalance_case: config.rebalance_period.as_case_label().to_string(),
                // Upstream expects the same band value in both slots.
                range_price: (
                    config.rebalance_settings.band_width,
                    config.rebalance_settings.band_width,
                ),
                hours_rebalance: config.rebalance_settings.hours_before_rebalance,
                date_a: config.range.start,
                usd_position: config.fiat_value,
                gas_price: config.gas_price_gwei,
            },
        }
    }

    fn wire_values(&self, pool_name: &str) -> Vec<Value> {
        vec![
            json!(pool_name),
            json!(self.rebalance_case),
            json!([self.range_price.0, self.range_price.1]),
            json!(self.hours_rebalance),
            json!(self.date_a.to_string()),
            json!(self.usd_position),
            json!(self.gas_price),
        ]
    }

    /// Flattened string values for the result file name: the nested price
    /// range pair contributes two entries to the comma list.
    fn file_name_values(&self, pool_name: &str) -> Vec<String> {
        vec![
            pool_name.to_string(),
            self.rebalance_case.clone(),
            fmt_number(self.range_price.0),
            fmt_number(self.range_price.1),
            self.hours_rebalance.to_string(),
            self.date_a.to_string(),
            fmt_number(self.usd_position),
            fmt_number(self.gas_price),
        ]
    }
}

// Matches JavaScript Number rendering for the values seen here: integral
// floats print without a decimal point.
fn fmt_number(value: f64) -> String {
    value.to_string()
}

/// Build the job query and the result artifact handle for a validated
/// config. `data_url` points at the previously produced raw swap artifact.
pub fn build_parameters(config: &StrategyConfig, data_url: &str) -> (JobQuery, ArtifactHandle) {
    let pool_name = config.pool.name();
    let params = CaseParams::from_config(config);

    let file_name = format!(
        "{}{}",
        BT_RESULT_PREFIX,
        params.file_name_values(&pool_name).join(",")
    );

    let query = JobQuery {
        data: data_url.to_string(),
        cases: CaseMap {
            case0: params.wire_values(&pool_name),
        },
        file_name: file_name.clone(),
    };

    let handle = ArtifactHandle {
        file_name,
        kind: ArtifactKind::BacktestResult,
    };

    (query, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BacktestMode, Pool, PriceTicks, RebalancePeriod, RebalanceSettings, StrategyConfig,
    };
    use chrono::NaiveDate;

    fn simple_config() -> StrategyConfig {
        StrategyConfig {
            mode: BacktestMode::Simple,
            pool: Pool::new("0xABCdef0123456789", "ETH", "USDC", 3000),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2021, 6, 10).unwrap(),
            },
            gas_price_gwei: 40.0,
            fiat_value: 5000.0,
            ticks: PriceTicks {
                lower: Some(1000.0),
                upper: Some(2000.0),
            },
            rebalance_period: RebalancePeriod::Volatility1D,
            rebalance_settings: RebalanceSettings::default(),
        }
    }

    fn dynamic_config() -> StrategyConfig {
        StrategyConfig {
            mode: BacktestMode::Dynamic,
            rebalance_period: RebalancePeriod::PercentOfPrice,
            rebalance_settings: RebalanceSettings {
                band_width: 7.5,
                hours_before_rebalance: 4,
            },
            ..simple_config()
        }
    }

    #[test]
    fn test_raw_data_handle_name() {
        let config = simple_config();
        let handle = raw_data_handle(&config.pool.address, &config.range);
        assert_eq!(handle.kind, ArtifactKind::RawSwapData);
        assert_eq!(
            handle.file_name,
            "swap_results0xabc2021-06-012021-06-10"
        );
    }

    #[test]
    fn test_simple_mode_uses_literal_ticks_and_zero_wait() {
        let config = simple_config();
        let (query, handle) = build_parameters(&config, "https://store.test/raw");

        assert_eq!(query.cases.case0[1], "Fix_0D");
        assert_eq!(query.cases.case0[2], serde_json::json!([1000.0, 2000.0]));
        assert_eq!(query.cases.case0[3], 0);
        assert_eq!(
            handle.file_name,
            "bt_resultsWETH-USDC-0.3%,Fix_0D,1000,2000,0,2021-06-01,5000,40"
        );
    }

    #[test]
    fn test_dynamic_mode_price_range_entries_are_equal() {
        // Regression: upstream puts the identical band value in both slots.
        let config = dynamic_config();
        let (query, handle) = build_parameters(&config, "https://store.test/raw");

        let range = query.cases.case0[2].as_array().unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0], range[1]);
        assert_eq!(range[0], serde_json::json!(7.5));
        assert_eq!(
            handle.file_name,
            "bt_resultsWETH-USDC-0.3%,%_of_price,7.5,7.5,4,2021-06-01,5000,40"
        );
    }

    #[test]
    fn test_dynamic_mode_ignores_ticks() {
        let mut config = dynamic_config();
        config.ticks = PriceTicks {
            lower: Some(123.0),
            upper: Some(456.0),
        };
        let (query, _) = build_parameters(&config, "https://store.test/raw");
        assert_eq!(query.cases.case0[2], serde_json::json!([7.5, 7.5]));
    }

    #[test]
    fn test_query_wire_shape() {
        let config = simple_config();
        let (query, _) = build_parameters(&config, "https://store.test/raw-file");
        let wire = serde_json::to_value(&query).unwrap();

        assert_eq!(wire["data"], "https://store.test/raw-file");
        assert_eq!(wire["file_name"], query.file_name);
        let case0 = wire["cases"]["case0"].as_array().unwrap();
        assert_eq!(case0.len(), 7);
        assert_eq!(case0[0], "WETH-USDC-0.3%");
        assert_eq!(case0[4], "2021-06-01");
    }

    #[test]
    fn test_file_name_is_deterministic() {
        let config = simple_config();
        let (_, first) = build_parameters(&config, "https://store.test/raw");
        let (_, second) = build_parameters(&config, "https://store.test/raw");
        assert_eq!(first.file_name, second.file_name);
    }

    #[test]
    fn test_fractional_numbers_keep_decimal_point() {
        let mut config = simple_config();
        config.gas_price_gwei = 40.5;
        let (_, handle) = build_parameters(&config, "https://store.test/raw");
        assert!(handle.file_name.ends_with(",5000,40.5"));
    }
}
