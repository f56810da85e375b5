use std::collections::HashMap;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::indicators::{Ema, Roc, Sma};
use crate::model::{FillEvent, MarketEvent, SignalDirection, SignalEvent};

/// Read-only view handed to the strategy on every dispatch.
///
/// Carries only information available at the current simulated time: the
/// clock, and the portfolio state as of the fills applied so far. A strategy
/// may additionally keep its own internal state, nothing else.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub now: i64,
    pub cash: Decimal,
    pub equity: Decimal,
    positions: HashMap<String, Decimal>,
}

impl StrategyContext {
    pub fn new(
        now: i64,
        cash: Decimal,
        equity: Decimal,
        positions: HashMap<String, Decimal>,
    ) -> Self {
        StrategyContext {
            now,
            cash,
            equity,
            positions,
        }
    }

    /// Signed position quantity, zero when flat.
    pub fn position(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Polymorphic decision unit.
///
/// Implementations must be side-effect-free with respect to simulated time:
/// decisions may use only the event, the context, and prior internal state.
/// Signals must carry the event's timestamp.
pub trait Strategy: Send {
    fn on_market(&mut self, event: &MarketEvent, ctx: &StrategyContext) -> Vec<SignalEvent>;

    /// Optional feedback for stateful strategies (trailing stops etc.).
    fn on_fill(&mut self, _fill: &FillEvent) {}
}

/// Rule-based variant: moving-average crossover on a single instrument.
///
/// Goes long when the fast average crosses above the slow one, exits on the
/// cross back down.
pub struct MaCrossStrategy {
    symbol: String,
    fast: Sma,
    slow: Sma,
    prev_diff: Option<f64>,
}

impl MaCrossStrategy {
    pub fn new(symbol: impl Into<String>, fast_period: usize, slow_period: usize) -> Self {
        MaCrossStrategy {
            symbol: symbol.into(),
            fast: Sma::new(fast_period),
            slow: Sma::new(slow_period),
            prev_diff: None,
        }
    }
}

impl Strategy for MaCrossStrategy {
    fn on_market(&mut self, event: &MarketEvent, ctx: &StrategyContext) -> Vec<SignalEvent> {
        if event.symbol() != self.symbol {
            return Vec::new();
        }
        let close = event.last_price().to_f64().unwrap_or(0.0);
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);

        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Vec::new();
        };
        let diff = fast - slow;
        let prev = self.prev_diff.replace(diff);

        let mut signals = Vec::new();
        match prev {
            Some(p) if p <= 0.0 && diff > 0.0 => {
                signals.push(SignalEvent::new(
                    &self.symbol,
                    event.timestamp(),
                    SignalDirection::Long,
                    Decimal::ONE,
                ));
            }
            Some(p) if p >= 0.0 && diff < 0.0 && !ctx.position(&self.symbol).is_zero() => {
                signals.push(SignalEvent::new(
                    &self.symbol,
                    event.timestamp(),
                    SignalDirection::Exit,
                    Decimal::ONE,
                ));
            }
            _ => {}
        }
        signals
    }
}

/// Model-based variant: smoothed one-bar momentum mapped to a bounded
/// strength.
///
/// The score is an EMA of single-bar returns; strength is the score scaled
/// by the entry threshold (clamped to [0, 1] at signal construction).
pub struct MomentumModelStrategy {
    symbol: String,
    score: Ema,
    last_close: Option<f64>,
    entry_threshold: f64,
    exit_threshold: f64,
}

impl MomentumModelStrategy {
    pub fn new(
        symbol: impl Into<String>,
        smoothing_period: usize,
        entry_threshold: f64,
        exit_threshold: f64,
    ) -> Self {
        MomentumModelStrategy {
            symbol: symbol.into(),
            score: Ema::new(smoothing_period),
            last_close: None,
            entry_threshold,
            exit_threshold,
        }
    }
}

impl Strategy for MomentumModelStrategy {
    fn on_market(&mut self, event: &MarketEvent, ctx: &StrategyContext) -> Vec<SignalEvent> {
        if event.symbol() != self.symbol {
            return Vec::new();
        }
        let close = event.last_price().to_f64().unwrap_or(0.0);
        let prev_close = self.last_close.replace(close);
        let Some(prev_close) = prev_close else {
            return Vec::new();
        };
        if prev_close == 0.0 {
            return Vec::new();
        }

        let ret = close / prev_close - 1.0;
        let Some(score) = self.score.update(ret) else {
            return Vec::new();
        };

        let holding = !ctx.position(&self.symbol).is_zero();
        let mut signals = Vec::new();
        if score > self.entry_threshold && !holding {
            let strength =
                Decimal::from_f64(score / self.entry_threshold).unwrap_or(Decimal::ONE);
            signals.push(SignalEvent::new(
                &self.symbol,
                event.timestamp(),
                SignalDirection::Long,
                strength,
            ));
        } else if score < self.exit_threshold && holding {
            signals.push(SignalEvent::new(
                &self.symbol,
                event.timestamp(),
                SignalDirection::Exit,
                Decimal::ONE,
            ));
        }
        signals
    }
}

/// Multi-asset variant: cross-sectional momentum rotation.
///
/// Ranks the universe by rate of change every `rebalance_every` cross
/// sections, goes long the top `top_k` and exits everything else held.
pub struct MultiAssetMomentumStrategy {
    momentum: HashMap<String, Roc>,
    universe: Vec<String>,
    top_k: usize,
    rebalance_every: usize,
    current_ts: Option<i64>,
    sections_seen: usize,
}

impl MultiAssetMomentumStrategy {
    pub fn new(universe: Vec<String>, lookback: usize, top_k: usize, rebalance_every: usize) -> Self {
        let momentum = universe
            .iter()
            .map(|s| (s.clone(), Roc::new(lookback)))
            .collect();
        MultiAssetMomentumStrategy {
            momentum,
            universe,
            top_k,
            rebalance_every: rebalance_every.max(1),
            current_ts: None,
            sections_seen: 0,
        }
    }

    fn rebalance(&self, timestamp: i64, ctx: &StrategyContext) -> Vec<SignalEvent> {
        let mut ranked: Vec<(&str, f64)> = self
            .universe
            .iter()
            .filter_map(|s| self.momentum[s].value().map(|m| (s.as_str(), m)))
            .collect();
        if ranked.is_empty() {
            return Vec::new();
        }
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let winners: Vec<&str> = ranked
            .iter()
            .take(self.top_k)
            .filter(|(_, m)| *m > 0.0)
            .map(|(s, _)| *s)
            .collect();

        let mut signals = Vec::new();
        for symbol in &self.universe {
            let held = !ctx.position(symbol).is_zero();
            if winners.contains(&symbol.as_str()) {
                if !held {
                    signals.push(SignalEvent::new(
                        symbol,
                        timestamp,
                        SignalDirection::Long,
                        Decimal::ONE,
                    ));
                }
            } else if held {
                signals.push(SignalEvent::new(
                    symbol,
                    timestamp,
                    SignalDirection::Exit,
                    Decimal::ONE,
                ));
            }
        }
        signals
    }
}

impl Strategy for MultiAssetMomentumStrategy {
    fn on_market(&mut self, event: &MarketEvent, ctx: &StrategyContext) -> Vec<SignalEvent> {
        let mut signals = Vec::new();

        // A new timestamp opens a new cross section; rebalance on the
        // configured cadence using only data from completed sections.
        if self.current_ts != Some(event.timestamp()) {
            if self.current_ts.is_some() {
                self.sections_seen += 1;
                if self.sections_seen % self.rebalance_every == 0 {
                    signals = self.rebalance(event.timestamp(), ctx);
                }
            }
            self.current_ts = Some(event.timestamp());
        }

        if let Some(roc) = self.momentum.get_mut(event.symbol()) {
            roc.update(event.last_price().to_f64().unwrap_or(0.0));
        }
        signals
    }
}
