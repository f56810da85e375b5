use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TradecraftError};
use crate::model::{FillEvent, Instrument, MarketEvent, OrderEvent, SignalDirection, SignalEvent};
use crate::risk::{PortfolioView, RiskDecision, RiskManager};

/// Open position in one instrument, weighted-average-cost accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Signed: positive long, negative short.
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

/// Point-in-time portfolio state. One snapshot is recorded per processed
/// timestamp; the history is append-only and never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: i64,
    pub cash: Decimal,
    pub equity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: BTreeMap<String, Position>,
}

/// Converts signal strength into a signed order quantity.
pub trait PositionSizer: Send {
    /// Signed quantity to order given current equity, the instrument's last
    /// price, and the signed position already held. Zero means no order.
    fn target_quantity(
        &self,
        signal: &SignalEvent,
        equity: Decimal,
        price: Decimal,
        position: Decimal,
    ) -> Decimal;
}

/// Targets `equity × fraction × strength` of notional per instrument.
pub struct FractionOfEquity {
    pub fraction: Decimal,
}

impl PositionSizer for FractionOfEquity {
    fn target_quantity(
        &self,
        signal: &SignalEvent,
        equity: Decimal,
        price: Decimal,
        position: Decimal,
    ) -> Decimal {
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let target = match signal.direction {
            SignalDirection::Long => (equity * self.fraction * signal.strength / price).floor(),
            SignalDirection::Short => -(equity * self.fraction * signal.strength / price).floor(),
            SignalDirection::Exit => Decimal::ZERO,
        };
        target - position
    }
}

/// Always orders the same absolute quantity (exits still flatten).
pub struct FixedQuantity {
    pub quantity: Decimal,
}

impl PositionSizer for FixedQuantity {
    fn target_quantity(
        &self,
        signal: &SignalEvent,
        _equity: Decimal,
        _price: Decimal,
        position: Decimal,
    ) -> Decimal {
        match signal.direction {
            SignalDirection::Long => self.quantity,
            SignalDirection::Short => -self.quantity,
            SignalDirection::Exit => -position,
        }
    }
}

/// Authoritative owner of cash, positions and the equity history.
///
/// Converts signals into risk-checked orders and applies each fill exactly
/// once. Nothing else mutates portfolio state.
pub struct PortfolioManager {
    cash: Decimal,
    initial_cash: Decimal,
    positions: HashMap<String, Position>,
    instruments: HashMap<String, Instrument>,
    last_prices: HashMap<String, Decimal>,
    realized_pnl: Decimal,
    applied_fills: HashSet<Uuid>,
    fills: Vec<FillEvent>,
    snapshots: Vec<PortfolioSnapshot>,
    sizer: Box<dyn PositionSizer>,
    risk: RiskManager,
    peak_equity: Decimal,
    halted: bool,
    rejected_signals: u64,
    duplicate_fills: u64,
}

impl PortfolioManager {
    pub fn new(initial_cash: Decimal, sizer: Box<dyn PositionSizer>, risk: RiskManager) -> Self {
        PortfolioManager {
            cash: initial_cash,
            initial_cash,
            positions: HashMap::new(),
            instruments: HashMap::new(),
            last_prices: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            applied_fills: HashSet::new(),
            fills: Vec::new(),
            snapshots: Vec::new(),
            sizer,
            risk,
            peak_equity: initial_cash,
            halted: false,
            rejected_signals: 0,
            duplicate_fills: 0,
        }
    }

    /// Register contract terms for a symbol. Unregistered symbols are
    /// treated as plain equities: multiplier 1, lot 1.
    pub fn set_instrument(&mut self, instrument: Instrument) {
        self.instruments
            .insert(instrument.symbol.clone(), instrument);
    }

    fn multiplier(&self, symbol: &str) -> Decimal {
        self.instruments
            .get(symbol)
            .map(|i| i.multiplier)
            .unwrap_or(Decimal::ONE)
    }

    /// Mark-to-market against the latest observation.
    pub fn on_market(&mut self, event: &MarketEvent) {
        self.last_prices
            .insert(event.symbol().to_string(), event.last_price());
    }

    /// Size and risk-check a signal. `Ok(None)` means nothing to do (e.g. an
    /// exit with no position); `Err(RiskLimit)` is a reported rejection the
    /// engine absorbs.
    pub fn on_signal(&mut self, signal: &SignalEvent) -> Result<Option<OrderEvent>> {
        if self.halted {
            self.rejected_signals += 1;
            return Err(TradecraftError::RiskLimit(
                "drawdown halt active, no new orders".to_string(),
            ));
        }

        let Some(&price) = self.last_prices.get(&signal.symbol) else {
            // A strategy can fire on an instrument before any data arrived;
            // that signal is rejected, not fatal.
            self.rejected_signals += 1;
            return Err(TradecraftError::RiskLimit(format!(
                "{}: signal before any market data",
                signal.symbol
            )));
        };

        let position = self.position_quantity(&signal.symbol);
        let equity = self.equity();
        let mut requested = self
            .sizer
            .target_quantity(signal, equity, price, position);
        if let Some(instrument) = self.instruments.get(&signal.symbol) {
            requested = instrument.round_lot(requested);
        }
        if requested.is_zero() {
            return Ok(None);
        }

        let view = PortfolioView {
            cash: self.cash,
            equity,
            position,
            gross_exposure: self.gross_exposure(),
        };
        // Risk reasons about notional; hand it the per-unit contract value.
        let unit_value = price * self.multiplier(&signal.symbol);
        match self.risk.evaluate(&signal.symbol, requested, unit_value, &view) {
            RiskDecision::Approve(approved) => {
                let quantity = match self.instruments.get(&signal.symbol) {
                    Some(instrument) => instrument.round_lot(approved),
                    None => approved,
                };
                if quantity.is_zero() {
                    self.rejected_signals += 1;
                    return Err(TradecraftError::RiskLimit(format!(
                        "{}: approved quantity rounds to zero lots",
                        signal.symbol
                    )));
                }
                if quantity != requested {
                    debug!(
                        symbol = %signal.symbol,
                        %requested,
                        approved = %quantity,
                        "order downsized by risk limits"
                    );
                }
                Ok(Some(OrderEvent::market(
                    &signal.symbol,
                    signal.timestamp,
                    quantity,
                )))
            }
            RiskDecision::Reject(reason) => {
                self.rejected_signals += 1;
                Err(TradecraftError::RiskLimit(reason))
            }
        }
    }

    /// Apply a fill exactly once. A repeated id leaves all state untouched
    /// and surfaces as the recoverable [`TradecraftError::DuplicateFill`],
    /// which the engine logs and absorbs.
    pub fn on_fill(&mut self, fill: &FillEvent) -> Result<()> {
        if !self.applied_fills.insert(fill.id) {
            self.duplicate_fills += 1;
            return Err(TradecraftError::DuplicateFill(fill.id));
        }

        let multiplier = self.multiplier(&fill.symbol);
        self.cash -= fill.quantity * fill.price * multiplier;
        self.cash -= fill.commission;

        let entry = self
            .positions
            .entry(fill.symbol.clone())
            .or_default();
        let old_qty = entry.quantity;
        let new_qty = old_qty + fill.quantity;

        if old_qty.is_zero() {
            entry.quantity = new_qty;
            entry.average_cost = fill.price;
        } else if old_qty.signum() == fill.quantity.signum() {
            // Same direction: weighted-average the cost basis.
            entry.average_cost =
                (old_qty * entry.average_cost + fill.quantity * fill.price) / new_qty;
            entry.quantity = new_qty;
        } else if new_qty.is_zero() || new_qty.signum() == old_qty.signum() {
            // Partial or full close: realize P&L on the closed portion,
            // cost basis of the remainder is unchanged.
            let closed = old_qty.signum() * fill.quantity.abs().min(old_qty.abs());
            self.realized_pnl += (fill.price - entry.average_cost) * closed * multiplier;
            entry.quantity = new_qty;
        } else {
            // Sign flip: close through zero, open the remainder fresh.
            self.realized_pnl += (fill.price - entry.average_cost) * old_qty * multiplier;
            entry.quantity = new_qty;
            entry.average_cost = fill.price;
        }

        if entry.quantity.is_zero() {
            self.positions.remove(&fill.symbol);
        }

        self.fills.push(fill.clone());

        if !self.risk.limits.allow_margin && self.cash < Decimal::ZERO {
            // A correct risk gate keeps this unreachable; if it trips the
            // state is corrupt and the run must stop.
            return Err(TradecraftError::Execution(format!(
                "cash went negative ({}) after fill {}",
                self.cash, fill.id
            )));
        }

        self.check_drawdown();
        Ok(())
    }

    /// Record the per-timestamp snapshot. Append-only.
    pub fn record_snapshot(&mut self, timestamp: i64) {
        let equity = self.equity();
        let snapshot = PortfolioSnapshot {
            timestamp,
            cash: self.cash,
            equity,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            positions: self
                .positions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        self.snapshots.push(snapshot);
    }

    /// Resume from a persisted snapshot: cash and positions are restored,
    /// histories start fresh from the checkpoint.
    pub fn restore(&mut self, snapshot: &PortfolioSnapshot) {
        self.cash = snapshot.cash;
        self.realized_pnl = snapshot.realized_pnl;
        self.positions = snapshot
            .positions
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.peak_equity = snapshot.equity.max(self.initial_cash);
    }

    fn check_drawdown(&mut self) {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        if let Some(limit) = self.risk.limits.max_drawdown {
            if self.peak_equity > Decimal::ZERO && !self.halted {
                let drawdown = (self.peak_equity - equity) / self.peak_equity;
                if drawdown > limit {
                    self.halted = true;
                    warn!(%drawdown, %limit, "max drawdown breached, halting new orders");
                }
            }
        }
    }

    // ---- read-only reporting surface (pull-only) ----

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn equity(&self) -> Decimal {
        let mut equity = self.cash;
        for (symbol, pos) in &self.positions {
            let multiplier = self.multiplier(symbol);
            if let Some(price) = self.last_prices.get(symbol) {
                equity += pos.quantity * price * multiplier;
            } else {
                // No mark yet; fall back to cost.
                equity += pos.quantity * pos.average_cost * multiplier;
            }
        }
        equity
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        let mut pnl = Decimal::ZERO;
        for (symbol, pos) in &self.positions {
            if let Some(price) = self.last_prices.get(symbol) {
                pnl += (price - pos.average_cost) * pos.quantity * self.multiplier(symbol);
            }
        }
        pnl
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn position_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn position_quantities(&self) -> HashMap<String, Decimal> {
        self.positions
            .iter()
            .map(|(k, v)| (k.clone(), v.quantity))
            .collect()
    }

    pub fn gross_exposure(&self) -> Decimal {
        let mut gross = Decimal::ZERO;
        for (symbol, pos) in &self.positions {
            if let Some(price) = self.last_prices.get(symbol) {
                gross += (pos.quantity * price * self.multiplier(symbol)).abs();
            }
        }
        gross
    }

    pub fn fills(&self) -> &[FillEvent] {
        &self.fills
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    pub fn equity_curve(&self) -> Vec<(i64, Decimal)> {
        self.snapshots
            .iter()
            .map(|s| (s.timestamp, s.equity))
            .collect()
    }

    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn rejected_signals(&self) -> u64 {
        self.rejected_signals
    }

    pub fn duplicate_fills(&self) -> u64 {
        self.duplicate_fills
    }
}
