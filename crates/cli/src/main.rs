//! lp-backtest — CLI driver for the LP backtest orchestration engine
//!
//! Usage:
//!   lp-backtest run --pool-address 0x... --token0 ETH --token1 USDC \
//!       --start 2021-06-01 --end 2021-06-10 --gas-price 40 --fiat-value 5000 \
//!       --tick-lower 1000 --tick-upper 2000
//!   lp-backtest swaps --pool-address 0x... --start 2021-06-01 --end 2021-06-10

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use engine::{
    download_raw_swaps, ArtifactStoreClient, BacktestMode, BacktestOrchestrator, BacktestResult,
    ComputeClient, DateRange, Pool, PriceTicks, RebalancePeriod, RebalanceSettings,
    StrategyConfig,
};
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "lp-backtest")]
#[command(about = "Backtest Uniswap v3 LP strategies against the remote compute service", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RangeArgs {
    /// Backtest start date (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Backtest end date (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,
}

#[derive(Args)]
struct PollArgs {
    /// Seconds between artifact existence probes
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    /// Give up waiting for an artifact after this many seconds
    #[arg(long, default_value_t = 900)]
    poll_deadline_secs: u64,
}

impl PollArgs {
    fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(self.poll_deadline_secs)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full two-phase backtest pipeline
    Run {
        /// Pool contract address
        #[arg(long)]
        pool_address: String,

        /// Token 0 symbol
        #[arg(long)]
        token0: String,

        /// Token 1 symbol
        #[arg(long)]
        token1: String,

        /// Fee tier in hundredths of a bip (3000 = 0.3%)
        #[arg(long, default_value_t = 3000)]
        fee: u32,

        #[command(flatten)]
        range: RangeArgs,

        /// Backtest mode: simple or dynamic
        #[arg(long, default_value = "simple")]
        mode: String,

        /// Gas price in gwei
        #[arg(long)]
        gas_price: f64,

        /// Position value in USD
        #[arg(long)]
        fiat_value: f64,

        /// Lower price tick (simple mode)
        #[arg(long)]
        tick_lower: Option<f64>,

        /// Upper price tick (simple mode)
        #[arg(long)]
        tick_upper: Option<f64>,

        /// Rebalance period: percent, std_1d, std_3d, std_5d, std_7d (dynamic mode)
        #[arg(long, default_value = "std_1d")]
        period: String,

        /// Percent-of-price threshold or band width (dynamic mode)
        #[arg(long, default_value_t = 0.0)]
        band_width: f64,

        /// Hours to wait before rebalancing, 0-23 (dynamic mode)
        #[arg(long, default_value_t = 0)]
        rebalance_hours: u8,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Download raw swap data for a pool and date range
    Swaps {
        /// Pool contract address
        #[arg(long)]
        pool_address: String,

        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        poll: PollArgs,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,lp_backtest=debug")
    } else {
        EnvFilter::new("info,engine=info,lp_backtest=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn parse_mode(s: &str) -> BacktestMode {
    match s.to_lowercase().as_str() {
        "dynamic" => BacktestMode::Dynamic,
        _ => BacktestMode::Simple,
    }
}

fn parse_period(s: &str) -> RebalancePeriod {
    match s.to_lowercase().as_str() {
        "percent" | "%_of_price" | "% of price" => RebalancePeriod::PercentOfPrice,
        "std_3d" => RebalancePeriod::Volatility3D,
        "std_5d" => RebalancePeriod::Volatility5D,
        "std_7d" => RebalancePeriod::Volatility7D,
        _ => RebalancePeriod::Volatility1D,
    }
}

fn compute_client() -> ComputeClient {
    match std::env::var("COMPUTE_BASE_URL") {
        Ok(url) => ComputeClient::with_base_url(&url),
        Err(_) => ComputeClient::new(),
    }
}

fn store_client() -> ArtifactStoreClient {
    match std::env::var("ARTIFACT_STORE_URL") {
        Ok(url) => ArtifactStoreClient::with_base_url(&url),
        Err(_) => ArtifactStoreClient::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Run {
            pool_address,
            token0,
            token1,
            fee,
            range,
            mode,
            gas_price,
            fiat_value,
            tick_lower,
            tick_upper,
            period,
            band_width,
            rebalance_hours,
            poll,
        } => {
            let config = StrategyConfig {
                mode: parse_mode(&mode),
                pool: Pool::new(pool_address, &token0, &token1, fee),
                range: DateRange {
                    start: range.start,
                    end: range.end,
                },
                gas_price_gwei: gas_price,
                fiat_value,
                ticks: PriceTicks {
                    lower: tick_lower,
                    upper: tick_upper,
                },
                rebalance_period: parse_period(&period),
                rebalance_settings: RebalanceSettings {
                    band_width,
                    hours_before_rebalance: rebalance_hours,
                },
            };
            run_backtest(config, &poll).await
        }
        Commands::Swaps {
            pool_address,
            range,
            poll,
        } => download_swaps(&pool_address, &range, &poll).await,
    }
}

async fn run_backtest(config: StrategyConfig, poll: &PollArgs) -> anyhow::Result<()> {
    let orchestrator = BacktestOrchestrator::new(compute_client(), store_client())
        .with_polling(poll.interval(), poll.deadline());

    info!(pool = %config.pool.name(), mode = ?config.mode, "Starting backtest run");
    let result = orchestrator
        .run(&config)
        .await
        .context("backtest run failed")?;

    print_summary(&config, &result);
    Ok(())
}

async fn download_swaps(
    pool_address: &str,
    range: &RangeArgs,
    poll: &PollArgs,
) -> anyhow::Result<()> {
    let compute = compute_client();
    let store = store_client();
    let cancelled = AtomicBool::new(false);
    let range = DateRange {
        start: range.start,
        end: range.end,
    };

    let swaps = download_raw_swaps(
        &compute,
        &store,
        pool_address,
        &range,
        poll.interval(),
        poll.deadline(),
        &cancelled,
    )
    .await
    .context("raw swap download failed")?;

    println!("{}", serde_json::to_string_pretty(&swaps)?);
    Ok(())
}

fn print_summary(config: &StrategyConfig, result: &BacktestResult) {
    let pool = &config.pool;

    println!(
        "Backtest results for {} ({} to {})",
        pool.name(),
        config.range.start,
        config.range.end
    );
    println!();
    println!("Capital deployed:  ${:.0}", config.fiat_value);
    if let Some(amount) = result.initial_token0_in() {
        println!("                   {:.4} {}", amount, pool.token0);
    }
    if let Some(amount) = result.initial_token1_in() {
        println!("                   {:.4} {}", amount, pool.token1);
    }
    println!(
        "Return (USD):      ${:.0}",
        result.final_pnl_usd().unwrap_or(0.0)
    );
    println!(
        "APR accrued:       {:.0}%",
        result.final_apr().unwrap_or(0.0)
    );
    println!(
        "Fees accrued:      {:.4} {} / {:.4} {}",
        result.final_fees_token0().unwrap_or(0.0),
        pool.token0,
        result.final_fees_token1().unwrap_or(0.0),
        pool.token1
    );
    println!(
        "Impermanent loss:  ${:.4}",
        result.final_impermanent_loss().unwrap_or(0.0)
    );
    if config.mode == BacktestMode::Dynamic {
        println!("Rebalances:        {:.0}", result.total_rebalances());
    }
}
