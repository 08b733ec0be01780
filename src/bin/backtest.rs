use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;

use candlebot::backtest::{BacktestRunner, MarketScenario, SyntheticTradeGenerator};
use candlebot::config::Settings;
use candlebot::persistence::{FileStore, MarketDataStore};

/// Replay recorded or synthetic trades through the trading pipeline
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a synthetic scenario instead of recorded trades
    /// (uptrend, downtrend, sideways, volatile, gaps, crash)
    #[arg(short, long)]
    scenario: Option<MarketScenario>,

    /// Number of synthetic trades
    #[arg(long, default_value_t = 20_000)]
    trades: usize,

    /// Seed for synthetic trades
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Average seconds between synthetic trades
    #[arg(long, default_value_t = 10)]
    spacing_secs: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("candlebot=warn,backtest=info")
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    let trades = match args.scenario {
        Some(scenario) => {
            println!("🧪 Synthetic scenario {:?}: {} trades, seed {}", scenario, args.trades, args.seed);
            SyntheticTradeGenerator::new(args.seed).generate(
                scenario,
                args.trades,
                chrono::Duration::seconds(args.spacing_secs.max(1)),
            )
        }
        None => {
            let mut store = FileStore::new(&settings.data_dir, &settings.market()?, settings.interval()?);
            println!("📂 Recorded trades from {}", store.trades_path().display());
            store
                .load_trades_since(DateTime::<Utc>::MIN_UTC)
                .await
                .context("Failed to load recorded trades")?
        }
    };

    if trades.is_empty() {
        anyhow::bail!("No trades to backtest");
    }

    let report = BacktestRunner::new(settings).run(trades).await?;
    report.metrics.print_report();

    println!(
        "Candles: {}  Duplicates: {}  Rejected orders: {}",
        report.stats.candles_closed, report.stats.duplicates, report.stats.rejections
    );
    Ok(())
}
