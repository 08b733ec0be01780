use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Fill, OrderKind};

/// One entry fill matched with the exit fill that closed it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTrip {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub fees: Decimal,
    /// After fees
    pub net_pnl: Decimal,
    pub stoploss: bool,
}

impl RoundTrip {
    fn from_fills(entry: &Fill, exit: &Fill) -> Self {
        let gross = (exit.price - entry.price) * exit.size;
        let fees = entry.fee + exit.fee;
        Self {
            entry_time: entry.timestamp,
            exit_time: exit.timestamp,
            entry_price: entry.price,
            exit_price: exit.price,
            size: exit.size,
            fees,
            net_pnl: gross - fees,
            stoploss: exit.kind == OrderKind::StoplossExit,
        }
    }

    pub fn holding_minutes(&self) -> i64 {
        (self.exit_time - self.entry_time).num_minutes()
    }
}

/// Account value at a candle close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: Decimal,
}

/// Complete backtest performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub initial_equity: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    /// Return of holding the base asset over the same candles
    pub buy_and_hold_pct: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub stoploss_exits: usize,
    pub net_pnl: f64,
    pub total_fees: f64,
    pub max_drawdown_pct: f64,
    pub avg_holding_minutes: f64,
    pub open_position: bool,

    pub trades: Vec<RoundTrip>,
}

impl BacktestMetrics {
    /// Build metrics from the fill log and the per-candle equity curve
    pub fn from_fills(
        fills: &[Fill],
        equity_curve: &[EquityPoint],
        initial_equity: Decimal,
        final_equity: Decimal,
        first_close: Option<Decimal>,
        last_close: Option<Decimal>,
    ) -> Self {
        let trades = Self::pair_fills(fills);
        let open_position = fills.last().is_some_and(|f| f.kind == OrderKind::Enter);

        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.net_pnl > Decimal::ZERO).count();
        let losing_trades = total_trades - winning_trades;
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let net_pnl: Decimal = trades.iter().map(|t| t.net_pnl).sum();
        let total_fees: Decimal = fills.iter().map(|f| f.fee).sum();

        let avg_holding_minutes = if total_trades > 0 {
            trades.iter().map(|t| t.holding_minutes()).sum::<i64>() as f64 / total_trades as f64
        } else {
            0.0
        };

        let buy_and_hold_pct = match (first_close, last_close) {
            (Some(first), Some(last)) => pct_change(first, last),
            _ => 0.0,
        };

        Self {
            initial_equity: as_f64(initial_equity),
            final_equity: as_f64(final_equity),
            total_return_pct: pct_change(initial_equity, final_equity),
            buy_and_hold_pct,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            stoploss_exits: trades.iter().filter(|t| t.stoploss).count(),
            net_pnl: as_f64(net_pnl),
            total_fees: as_f64(total_fees),
            max_drawdown_pct: Self::max_drawdown_pct(equity_curve),
            avg_holding_minutes,
            open_position,
            trades,
        }
    }

    /// Match each entry with the next exit
    fn pair_fills(fills: &[Fill]) -> Vec<RoundTrip> {
        let mut trades = Vec::new();
        let mut entry: Option<&Fill> = None;

        for fill in fills {
            match (fill.kind, entry) {
                (OrderKind::Enter, None) => entry = Some(fill),
                (OrderKind::Exit | OrderKind::StoplossExit, Some(open)) => {
                    trades.push(RoundTrip::from_fills(open, fill));
                    entry = None;
                }
                _ => tracing::warn!(kind = %fill.kind, "Unpaired fill in backtest log"),
            }
        }
        trades
    }

    /// Largest peak-to-trough fall of the equity curve, in percent of the peak
    fn max_drawdown_pct(curve: &[EquityPoint]) -> f64 {
        let mut peak: Option<Decimal> = None;
        let mut max_dd = 0.0;

        for point in curve {
            let high = peak.map_or(point.equity, |p| p.max(point.equity));
            peak = Some(high);

            if high > Decimal::ZERO {
                let dd = as_f64((high - point.equity) / high) * 100.0;
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }
        max_dd
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n═══════════════ BACKTEST REPORT ═══════════════\n");

        println!("📊 RETURNS");
        println!("  Initial Equity:        {:.2}", self.initial_equity);
        println!("  Final Equity:          {:.2}", self.final_equity);
        println!("  Total Return:          {:+.2}%", self.total_return_pct);
        println!("  Buy & Hold:            {:+.2}%", self.buy_and_hold_pct);
        println!("  Max Drawdown:          {:.2}%", self.max_drawdown_pct);

        println!("\n📈 TRADES");
        println!("  Round Trips:           {}", self.total_trades);
        println!(
            "  Winning / Losing:      {} / {} ({:.1}% win rate)",
            self.winning_trades, self.losing_trades, self.win_rate
        );
        println!("  Stoploss Exits:        {}", self.stoploss_exits);
        println!("  Net P&L:               {:+.2}", self.net_pnl);
        println!("  Fees Paid:             {:.2}", self.total_fees);
        println!("  Avg Holding:           {:.0} min", self.avg_holding_minutes);
        if self.open_position {
            println!("  (position still open at end of data)");
        }
        println!();
    }
}

fn as_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn pct_change(from: Decimal, to: Decimal) -> f64 {
    if from.is_zero() {
        return 0.0;
    }
    as_f64((to - from) / from) * 100.0
}
