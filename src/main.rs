use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::Duration;

use candlebot::backfill::load_seed;
use candlebot::config::{interval_label, Settings};
use candlebot::execution::PaperGateway;
use candlebot::feed::{BitfinexTradeFeed, TradeFeed};
use candlebot::persistence::{run_recorder, FileStore, MarketDataStore, RedisStore};
use candlebot::pipeline::{EventBus, Pipeline};

const FEED_BUFFER: usize = 4096;
const CLOCK_TICK: Duration = Duration::from_secs(1);

/// Live moving average crossover trader for one market (paper execution)
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML settings file; CANDLEBOT__* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Market to trade, e.g. bitfinex_BTC_USD
    #[arg(short, long)]
    market: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(market) = args.market {
        settings.market = market;
        settings.validate()?;
    }

    let market = settings.market()?;
    let interval = settings.interval()?;

    tracing::info!("🚀 candlebot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Market: {}", market);
    tracing::info!("  Interval: {}", interval_label(interval));
    tracing::info!(
        "  Averages: {:?} {}/{} (signal {})",
        settings.ma_type,
        settings.fast_period,
        settings.slow_period,
        settings.signal_period
    );
    tracing::info!("  Stoploss: {}%", settings.stoploss_pct * rust_decimal::Decimal::ONE_HUNDRED);
    tracing::info!("  Risk per trade: {}%", settings.risk_per_trade_pct * rust_decimal::Decimal::ONE_HUNDRED);

    let mut store = open_store(&settings).await?;
    let seed = load_seed(
        store.as_mut(),
        interval,
        settings.warmup_candles().max(settings.history_len),
        Utc::now(),
        settings.record_data,
    )
    .await
    .context("Backfill failed")?;

    let resume_at = seed
        .pending_trades
        .last()
        .map(|t| t.timestamp)
        .or_else(|| seed.candles.last().map(|c| c.close_time));

    let bus = EventBus::new(settings.observer_queue);
    let recorder = settings
        .record_data
        .then(|| tokio::spawn(run_recorder(bus.subscribe(), store, settings.retention())));

    let gateway = PaperGateway::new(
        settings.initial_quote_balance,
        settings.initial_base_balance,
        settings.commission_pct,
    );
    let mut pipeline = Pipeline::from_settings(&settings, gateway, bus)?;
    pipeline.warm_up(seed)?;

    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    let mut feed = BitfinexTradeFeed::new(&market, Duration::from_secs(settings.poll_interval_secs))?;
    if let Some(since) = resume_at {
        feed = feed.resume_from(since);
    }
    let feed_task = tokio::spawn(async move {
        if let Err(e) = feed.run(tx).await {
            tracing::error!("Trade feed stopped: {}", e);
        }
    });

    let outcome = tokio::select! {
        result = pipeline.run(rx, Some(CLOCK_TICK)) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            None
        }
    };

    feed_task.abort();
    let balances = pipeline.gateway().balances();
    tracing::info!(
        position = ?pipeline.position().state,
        base = %balances.base,
        quote = %balances.quote,
        stats = ?pipeline.stats(),
        "👋 Stopping"
    );
    drop(pipeline);

    if let Some(recorder) = recorder {
        // the bus closes once the pipeline is gone
        if let Ok(stats) = recorder.await {
            tracing::info!(?stats, "Recorder flushed");
        }
    }

    match outcome {
        Some(Err(e)) => Err(e).context("Pipeline halted"),
        _ => Ok(()),
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "candlebot=info".into()),
        )
        .init();
}

async fn open_store(settings: &Settings) -> anyhow::Result<Box<dyn MarketDataStore>> {
    let market = settings.market()?;
    let interval = settings.interval()?;

    if let Some(url) = &settings.redis_url {
        match RedisStore::connect(url, &market, interval).await {
            Ok(store) => return Ok(Box::new(store)),
            Err(e) => tracing::warn!("Redis unavailable ({}), falling back to files", e),
        }
    }
    Ok(Box::new(FileStore::new(&settings.data_dir, &market, interval)))
}
