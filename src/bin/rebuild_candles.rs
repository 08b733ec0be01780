use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;

use candlebot::aggregation::trades_to_candles;
use candlebot::config::{interval_label, Settings};
use candlebot::feed::Deduplicator;
use candlebot::persistence::{FileStore, MarketDataStore};

/// Rebuild the candle file for a market from its recorded trades
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Candle interval to build, overriding the configured one (e.g. 1h)
    #[arg(short, long)]
    interval: Option<String>,

    /// Keep the last candle even though it may still be in progress
    #[arg(long)]
    keep_last: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("candlebot=info").init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(interval) = args.interval {
        settings.candle_interval = interval;
        settings.validate()?;
    }

    let market = settings.market()?;
    let interval = settings.interval()?;
    let mut store = FileStore::new(&settings.data_dir, &market, interval);

    let mut trades = store
        .load_trades_since(DateTime::<Utc>::MIN_UTC)
        .await
        .context("Failed to load recorded trades")?;
    trades.sort_by_key(|t| (t.timestamp, t.id));

    let mut dedup = Deduplicator::new(settings.dedup_capacity);
    trades.retain(|t| dedup.is_novel(t));

    let mut candles = trades_to_candles(&trades, interval)?;
    if !args.keep_last {
        candles.pop();
    }

    store.replace_candles(&candles).await?;

    tracing::info!(
        "✅ Rebuilt {} {} candles for {} from {} trades ({} duplicates) into {}",
        candles.len(),
        interval_label(interval),
        market,
        trades.len(),
        dedup.duplicates(),
        store.candles_path().display()
    );
    Ok(())
}
