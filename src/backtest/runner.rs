use rust_decimal::Decimal;

use crate::backtest::metrics::{BacktestMetrics, EquityPoint};
use crate::config::Settings;
use crate::execution::PaperGateway;
use crate::models::Trade;
use crate::pipeline::{EventBus, Pipeline, PipelineStats};
use crate::Result;

/// Outcome of one backtest
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub metrics: BacktestMetrics,
    pub stats: PipelineStats,
    pub equity_curve: Vec<EquityPoint>,
}

/// Drives the live pipeline over recorded trades with a paper gateway
///
/// Same dedup, aggregation, indicators, strategy and risk code as live trading.
/// Candles close only on trades; there is no wall clock.
pub struct BacktestRunner {
    settings: Settings,
}

impl BacktestRunner {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run a backtest over trades in feed order
    ///
    /// An integrity violation aborts the run, as it would halt live trading.
    pub async fn run(&self, trades: Vec<Trade>) -> Result<BacktestReport> {
        let gateway = PaperGateway::new(
            self.settings.initial_quote_balance,
            self.settings.initial_base_balance,
            self.settings.commission_pct,
        );
        let bus = EventBus::new(self.settings.observer_queue);
        let mut pipeline = Pipeline::from_settings(&self.settings, gateway, bus)?;

        let first_price = trades.first().map(|t| t.price);
        let last_price = trades.last().map(|t| t.price);
        let initial_equity = pipeline
            .gateway()
            .mark_to_market(first_price.unwrap_or(Decimal::ZERO));

        tracing::info!(
            trades = trades.len(),
            market = %pipeline.market(),
            "Starting backtest"
        );

        let mut equity_curve = Vec::new();
        let mut seen_closes = 0;

        for trade in trades {
            if let Err(e) = pipeline.on_trade(trade).await {
                if e.is_fatal() {
                    tracing::error!("Backtest aborted: {}", e);
                    return Err(e);
                }
                tracing::warn!("Backtest step failed: {}", e);
            }

            let closes = pipeline.stats().candles_closed;
            if closes != seen_closes {
                seen_closes = closes;
                if let Some(candle) = pipeline.history().last() {
                    equity_curve.push(EquityPoint {
                        time: candle.close_time,
                        equity: pipeline.gateway().mark_to_market(candle.close),
                    });
                }
            }
        }

        let final_equity = pipeline
            .gateway()
            .mark_to_market(last_price.unwrap_or(Decimal::ZERO));

        let metrics = BacktestMetrics::from_fills(
            pipeline.gateway().fills(),
            &equity_curve,
            initial_equity,
            final_equity,
            first_price,
            last_price,
        );

        tracing::info!(
            candles = pipeline.stats().candles_closed,
            round_trips = metrics.total_trades,
            return_pct = format!("{:.2}", metrics.total_return_pct),
            "Backtest complete"
        );

        Ok(BacktestReport {
            metrics,
            stats: pipeline.stats().clone(),
            equity_curve,
        })
    }
}
