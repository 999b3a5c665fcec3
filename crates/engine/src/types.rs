//! Domain types for the backtest orchestration pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, EngineResult};

/// Pools quote the native token as its wrapped form.
pub fn wrapped_symbol(symbol: &str) -> &str {
    if symbol == "ETH" {
        "WETH"
    } else {
        symbol
    }
}

/// A Uniswap v3 liquidity pool, identified by contract address, token pair,
/// and fee tier (hundredths of a bip: 3000 = 0.3%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub address: String,
    pub token0: String,
    pub token1: String,
    pub fee: u32,
}

impl Pool {
    pub fn new(address: impl Into<String>, token0: &str, token1: &str, fee: u32) -> Self {
        Self {
            address: address.into(),
            token0: wrapped_symbol(token0).to_string(),
            token1: wrapped_symbol(token1).to_string(),
            fee,
        }
    }

    /// Display name keying this pool in shared result artifacts,
    /// e.g. `WETH-USDC-0.3%`.
    pub fn name(&self) -> String {
        format!("{}-{}-{}%", self.token0, self.token1, self.fee as f64 * 0.0001)
    }
}

/// Backtest mode selected by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacktestMode {
    /// Fixed position range, no rebalancing.
    Simple,
    /// Range re-derived from the rebalance trigger; position rebalances.
    Dynamic,
}

/// Trigger condition governing simulated rebalancing in dynamic mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalancePeriod {
    PercentOfPrice,
    Volatility1D,
    Volatility3D,
    Volatility5D,
    Volatility7D,
}

impl RebalancePeriod {
    /// Wire token the compute service expects for this period.
    pub fn as_case_label(&self) -> &'static str {
        match self {
            Self::PercentOfPrice => "%_of_price",
            Self::Volatility1D => "STD_1D",
            Self::Volatility3D => "STD_3D",
            Self::Volatility5D => "STD_5D",
            Self::Volatility7D => "STD_7D",
        }
    }
}

/// Rebalance tuning for dynamic mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RebalanceSettings {
    /// Percent-of-price threshold or band width, depending on the period.
    pub band_width: f64,
    /// Hours to wait before rebalancing, 0-23.
    pub hours_before_rebalance: u8,
}

/// Position price ticks for simple mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceTicks {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Calendar date range of the backtest
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// User-facing strategy settings for one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub mode: BacktestMode,
    pub pool: Pool,
    pub range: DateRange,
    pub gas_price_gwei: f64,
    pub fiat_value: f64,
    /// Used in simple mode; dynamic mode derives its range from the period.
    pub ticks: PriceTicks,
    /// Used in dynamic mode only.
    pub rebalance_period: RebalancePeriod,
    /// Used in dynamic mode only.
    pub rebalance_settings: RebalanceSettings,
}

impl StrategyConfig {
    /// Boundary validation; rejects bad input before any network call.
    pub fn validate(&self) -> EngineResult<()> {
        require_amount("fiat_value", self.fiat_value)?;
        require_amount("gas_price_gwei", self.gas_price_gwei)?;

        if self.range.start > self.range.end {
            return Err(BacktestError::InvalidConfig(format!(
                "date range starts after it ends ({} > {})",
                self.range.start, self.range.end
            )));
        }

        match self.mode {
            BacktestMode::Simple => match (self.ticks.lower, self.ticks.upper) {
                (Some(lower), Some(upper)) => {
                    require_amount("tick_lower", lower)?;
                    require_amount("tick_upper", upper)?;
                }
                _ => {
                    return Err(BacktestError::InvalidConfig(
                        "simple mode requires both price ticks".into(),
                    ));
                }
            },
            BacktestMode::Dynamic => {
                require_amount("band_width", self.rebalance_settings.band_width)?;
                if self.rebalance_settings.hours_before_rebalance > 23 {
                    return Err(BacktestError::InvalidConfig(
                        "hours_before_rebalance must be between 0 and 23".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn require_amount(label: &str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(BacktestError::InvalidConfig(format!(
            "{label} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

/// What a remote artifact contains; its existence signals phase completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    RawSwapData,
    BacktestResult,
}

/// A deterministic reference to a remote artifact. Created at submission
/// time; "exists" once the compute service finishes writing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub file_name: String,
    pub kind: ArtifactKind,
}

/// Decoded backtest time series. Position `i` in every series refers to the
/// same simulated time step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    pub timestamp: Vec<String>,
    pub pnl_usd: Vec<f64>,
    pub apr_pool: Vec<f64>,
    pub fees_earned: Vec<f64>,
    pub fees_earned_token0: Vec<f64>,
    pub fees_earned_token1: Vec<f64>,
    pub impermanent_loss: Vec<f64>,
    pub token0_in: Vec<f64>,
    pub token1_in: Vec<f64>,
    pub price_token0: Vec<f64>,
    pub price_token1: Vec<f64>,
    pub price_tick_lower: Vec<f64>,
    pub price_tick_upper: Vec<f64>,
    /// Absent for runs that never rebalance.
    pub rebalancing: Option<Vec<f64>>,
}

impl BacktestResult {
    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    /// Wire key and length of every numeric series present.
    pub(crate) fn series_lengths(&self) -> Vec<(&'static str, usize)> {
        let mut lengths = vec![
            ("PNL_USD_alt", self.pnl_usd.len()),
            ("APR_pool_alt", self.apr_pool.len()),
            ("fees_earned_ac", self.fees_earned.len()),
            ("fees_earned_t0_ac", self.fees_earned_token0.len()),
            ("fees_earned_t1_ac", self.fees_earned_token1.len()),
            ("IL_USD", self.impermanent_loss.len()),
            ("t0_in", self.token0_in.len()),
            ("t1_in", self.token1_in.len()),
            ("pini_t0", self.price_token0.len()),
            ("pini_t1", self.price_token1.len()),
            ("price_tickLow", self.price_tick_lower.len()),
            ("price_tickUpper", self.price_tick_upper.len()),
        ];
        if let Some(rebalancing) = &self.rebalancing {
            lengths.push(("rebalancing", rebalancing.len()));
        }
        lengths
    }

    pub fn final_pnl_usd(&self) -> Option<f64> {
        self.pnl_usd.last().copied()
    }

    pub fn final_apr(&self) -> Option<f64> {
        self.apr_pool.last().copied()
    }

    pub fn final_fees_token0(&self) -> Option<f64> {
        self.fees_earned_token0.last().copied()
    }

    pub fn final_fees_token1(&self) -> Option<f64> {
        self.fees_earned_token1.last().copied()
    }

    pub fn final_impermanent_loss(&self) -> Option<f64> {
        self.impermanent_loss.last().copied()
    }

    pub fn initial_token0_in(&self) -> Option<f64> {
        self.token0_in.first().copied()
    }

    pub fn initial_token1_in(&self) -> Option<f64> {
        self.token1_in.first().copied()
    }

    /// Total rebalance count over the run.
    pub fn total_rebalances(&self) -> f64 {
        self.rebalancing
            .as_deref()
            .map(|series| series.iter().sum())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> StrategyConfig {
        StrategyConfig {
            mode: BacktestMode::Simple,
            pool: Pool::new("0xABCdef0123", "ETH", "USDC", 3000),
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

    #[test]
    fn test_pool_name_unwraps_native_token() {
        let pool = Pool::new("0xabc", "ETH", "USDC", 3000);
        assert_eq!(pool.name(), "WETH-USDC-0.3%");
    }

    #[test]
    fn test_pool_name_fee_tiers() {
        assert_eq!(Pool::new("0xabc", "WBTC", "WETH", 500).name(), "WBTC-WETH-0.05%");
        assert_eq!(Pool::new("0xabc", "DAI", "USDT", 10000).name(), "DAI-USDT-1%");
    }

    #[test]
    fn test_case_labels() {
        assert_eq!(RebalancePeriod::PercentOfPrice.as_case_label(), "%_of_price");
        assert_eq!(RebalancePeriod::Volatility1D.as_case_label(), "STD_1D");
        assert_eq!(RebalancePeriod::Volatility7D.as_case_label(), "STD_7D");
    }

    #[test]
    fn test_validate_accepts_base_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_finite_money() {
        let mut config = base_config();
        config.gas_price_gwei = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidConfig(_))
        ));

        let mut config = base_config();
        config.fiat_value = -1.0;
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_ticks_in_simple_mode() {
        let mut config = base_config();
        config.ticks.upper = None;
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let mut config = base_config();
        std::mem::swap(&mut config.range.start, &mut config.range.end);
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_hours() {
        let mut config = base_config();
        config.mode = BacktestMode::Dynamic;
        config.rebalance_settings.hours_before_rebalance = 24;
        assert!(matches!(
            config.validate(),
            Err(BacktestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_total_rebalances_sums_series() {
        let result = BacktestResult {
            rebalancing: Some(vec![0.0, 1.0, 0.0, 1.0, 1.0]),
            ..Default::default()
        };
        assert_eq!(result.total_rebalances(), 3.0);
        assert_eq!(BacktestResult::default().total_rebalances(), 0.0);
    }
}
