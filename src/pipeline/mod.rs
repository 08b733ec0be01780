// The per-instrument trading pipeline and its observer bus
pub mod bus;
pub mod events;

pub use bus::EventBus;
pub use events::PipelineEvent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, MissedTickBehavior};

use crate::aggregation::{CandleAggregator, CandleHistory};
use crate::backfill::BackfillSeed;
use crate::config::Settings;
use crate::execution::OrderGateway;
use crate::feed::Deduplicator;
use crate::indicators::IndicatorEngine;
use crate::models::{Candle, Market, OrderIntent, OrderOutcome, Position, Trade};
use crate::risk::{RiskDecision, RiskManager};
use crate::strategy::{CrossoverStrategy, Strategy};
use crate::{Error, Result};

/// Counters for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub trades: u64,
    pub duplicates: u64,
    pub candles_closed: u64,
    pub intents: u64,
    pub fills: u64,
    pub rejections: u64,
    pub unconfirmed: u64,
}

/// Tuning that does not change trading decisions
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub dedup_capacity: usize,
    pub history_len: usize,
    pub fill_timeout: Duration,
    /// How long after a boundary a quiet candle is closed by the clock
    pub close_grace: chrono::Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dedup_capacity: 10_000,
            history_len: 500,
            fill_timeout: Duration::from_secs(30),
            close_grace: chrono::Duration::seconds(5),
        }
    }
}

/// Feed -> dedup -> aggregator -> indicators -> strategy -> risk -> gateway
///
/// Strictly sequential. The only shared state is the event bus, which observers
/// read without ever blocking this loop.
pub struct Pipeline<G: OrderGateway> {
    market: Market,
    dedup: Deduplicator,
    aggregator: CandleAggregator,
    engine: IndicatorEngine,
    strategy: Box<dyn Strategy>,
    risk: RiskManager,
    gateway: G,
    bus: EventBus,
    history: CandleHistory,
    options: PipelineOptions,
    stats: PipelineStats,
    halted: bool,
}

impl<G: OrderGateway> Pipeline<G> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: Market,
        interval: chrono::Duration,
        engine: IndicatorEngine,
        strategy: Box<dyn Strategy>,
        risk: RiskManager,
        gateway: G,
        bus: EventBus,
        options: PipelineOptions,
    ) -> Self {
        Self {
            market,
            dedup: Deduplicator::new(options.dedup_capacity),
            aggregator: CandleAggregator::new(interval),
            engine,
            strategy,
            risk,
            gateway,
            bus,
            history: CandleHistory::new(options.history_len),
            options,
            stats: PipelineStats::default(),
            halted: false,
        }
    }

    /// Moving average crossover pipeline as configured
    pub fn from_settings(settings: &Settings, gateway: G, bus: EventBus) -> Result<Self> {
        let market = settings.market()?;
        let interval = settings.interval()?;

        let engine = IndicatorEngine::for_crossover(
            settings.ma_type,
            settings.fast_period,
            settings.slow_period,
            settings.signal_period,
        );
        let strategy = CrossoverStrategy::new(settings.stoploss_pct, settings.warmup_candles());
        let options = PipelineOptions {
            dedup_capacity: settings.dedup_capacity,
            history_len: settings.history_len,
            fill_timeout: Duration::from_secs(settings.fill_timeout_secs),
            close_grace: chrono::Duration::seconds(settings.close_grace_secs.min(86_400) as i64),
        };

        Ok(Self::new(
            market,
            interval,
            engine,
            Box::new(strategy),
            RiskManager::new(settings.risk_config()),
            gateway,
            bus,
            options,
        ))
    }

    /// Replay backfilled history without trading
    ///
    /// Indicators, the strategy's last reading and the aggregator all resume from
    /// the seed's last candle.
    pub fn warm_up(&mut self, seed: BackfillSeed) -> Result<()> {
        for candle in &seed.candles {
            self.observe_candle(candle.clone())?;
        }
        if let Some(last) = seed.candles.last() {
            self.aggregator.resume_after(last.clone())?;
        }

        for trade in &seed.pending_trades {
            if !self.dedup.is_novel(trade) {
                continue;
            }
            for candle in self.aggregator.ingest(trade)? {
                self.observe_candle(candle)?;
            }
        }

        let required = self.strategy.min_candles_required();
        if seed.candles.len() < required {
            tracing::warn!(
                market = %self.market,
                have = seed.candles.len(),
                required,
                "Not enough history to warm up; first signals will be delayed"
            );
        }

        tracing::info!(
            market = %self.market,
            candles = seed.candles.len(),
            pending_trades = seed.pending_trades.len(),
            warm = self.engine.is_warm(),
            "Pipeline warmed up"
        );
        Ok(())
    }

    /// Process one trade from the feed
    pub async fn on_trade(&mut self, trade: Trade) -> Result<()> {
        if !self.dedup.is_novel(&trade) {
            self.stats.duplicates += 1;
            tracing::debug!(trade_id = trade.id, "Duplicate trade");
            return Ok(());
        }
        self.stats.trades += 1;

        let closed = self.aggregator.ingest(&trade)?;
        self.bus.publish(PipelineEvent::Trade(trade));

        for candle in closed {
            self.on_candle_closed(candle).await?;
        }

        if let Some(current) = self.aggregator.current() {
            self.bus.publish(PipelineEvent::CandleUpdated(current.clone()));
        }
        Ok(())
    }

    /// Close candles whose interval ended more than the grace period before `now`
    pub async fn on_clock(&mut self, now: DateTime<Utc>) -> Result<()> {
        let closed = self.aggregator.close_until(now - self.options.close_grace)?;
        for candle in closed {
            self.on_candle_closed(candle).await?;
        }
        Ok(())
    }

    /// Consume trades until the channel closes or data integrity breaks
    ///
    /// With `clock` set, quiet candles are closed on that tick even without
    /// trades. Leave it unset when replaying history.
    pub async fn run(&mut self, mut trades: mpsc::Receiver<Trade>, clock: Option<Duration>) -> Result<PipelineStats> {
        let live = clock.is_some();
        let mut ticker = tokio::time::interval(clock.unwrap_or(Duration::from_secs(3600)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(market = %self.market, live, "🚀 Pipeline running");

        loop {
            let result = tokio::select! {
                maybe = trades.recv() => match maybe {
                    Some(trade) => self.on_trade(trade).await,
                    None => break,
                },
                _ = ticker.tick(), if live => self.on_clock(Utc::now()).await,
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    return Err(self.halt(e));
                }
                tracing::warn!(market = %self.market, "Pipeline step failed: {}", e);
            }
        }

        tracing::info!(market = %self.market, stats = ?self.stats, "Trade stream ended");
        Ok(self.stats.clone())
    }

    pub fn position(&self) -> &Position {
        self.strategy.position()
    }

    pub fn history(&self) -> &CandleHistory {
        &self.history
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Bus for attaching more observers
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Update indicators and the strategy's reading without acting on it
    fn observe_candle(&mut self, candle: Candle) -> Result<()> {
        let snapshot = self.engine.on_candle_close(&candle)?;
        self.strategy.observe(&snapshot);
        self.history.push(candle);
        Ok(())
    }

    async fn on_candle_closed(&mut self, candle: Candle) -> Result<()> {
        self.stats.candles_closed += 1;
        tracing::info!(
            market = %self.market,
            open_time = %candle.open_time,
            open = %candle.open,
            high = %candle.high,
            low = %candle.low,
            close = %candle.close,
            volume = %candle.volume,
            "🕯️ Candle closed"
        );

        let snapshot = self.engine.on_candle_close(&candle)?;
        self.history.push(candle.clone());
        self.bus.publish(PipelineEvent::CandleClosed(candle));
        self.bus.publish(PipelineEvent::Indicators(snapshot.clone()));

        if let Some(intent) = self.strategy.on_snapshot(&snapshot) {
            self.stats.intents += 1;
            self.execute(intent).await;
        }
        Ok(())
    }

    /// Size, submit and confirm an order; only a confirmed fill moves the position
    async fn execute(&mut self, intent: OrderIntent) {
        let equity = match self.gateway.equity(intent.price_hint).await {
            Ok(equity) => equity,
            Err(e) => {
                tracing::error!(kind = %intent.kind, "Could not read account equity: {}", e);
                self.reject(intent, format!("equity unavailable: {}", e));
                return;
            }
        };

        let sized = match self.risk.evaluate(intent, self.strategy.position(), equity) {
            RiskDecision::Approved(sized) => sized,
            RiskDecision::Rejected { intent, reason } => {
                self.reject(intent, reason.to_string());
                return;
            }
        };

        match timeout(self.options.fill_timeout, self.gateway.submit(&sized)).await {
            Ok(Ok(OrderOutcome::Filled(fill))) => {
                self.strategy.apply_fill(&fill);
                self.stats.fills += 1;
                tracing::info!(
                    market = %self.market,
                    kind = %fill.kind,
                    price = %fill.price,
                    size = %fill.size,
                    fee = %fill.fee,
                    reason = %sized.reason,
                    "✅ Order filled"
                );
                self.bus.publish(PipelineEvent::OrderFilled(fill));
            }
            Ok(Ok(OrderOutcome::Rejected { reason })) => {
                tracing::warn!(kind = %sized.kind, %reason, "Gateway rejected order");
                self.reject(sized, reason);
            }
            Ok(Err(e)) => {
                tracing::error!(kind = %sized.kind, "Order submission failed: {}", e);
                self.reject(sized, format!("submission failed: {}", e));
            }
            Err(_) => {
                self.stats.unconfirmed += 1;
                tracing::error!(
                    order_id = %sized.id,
                    kind = %sized.kind,
                    timeout_secs = self.options.fill_timeout.as_secs_f64(),
                    "Order unconfirmed; position left unchanged"
                );
                let reason = format!(
                    "no confirmation within {:?}",
                    self.options.fill_timeout
                );
                self.reject(sized, reason);
            }
        }
    }

    fn reject(&mut self, intent: OrderIntent, reason: String) {
        self.stats.rejections += 1;
        self.bus.publish(PipelineEvent::OrderRejected { intent, reason });
    }

    fn halt(&mut self, error: Error) -> Error {
        self.halted = true;
        tracing::error!(market = %self.market, "🛑 Halting pipeline: {}", error);
        self.bus.publish(PipelineEvent::Halted {
            reason: error.to_string(),
        });
        error
    }
}
