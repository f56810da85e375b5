use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, TradecraftError};
use crate::model::{Bar, FillEvent, FillTiming, MarketEvent, OrderEvent, OrderKind};

/// Deterministic price-impact model applied to market-order fills.
pub trait SlippageModel: Send + Sync {
    /// Executed price given the reference price, the signed order quantity
    /// and the bar/tick volume.
    fn execution_price(&self, reference: Decimal, quantity: Decimal, volume: Decimal) -> Decimal;
}

/// No slippage (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroSlippage;

impl SlippageModel for ZeroSlippage {
    fn execution_price(&self, reference: Decimal, _quantity: Decimal, _volume: Decimal) -> Decimal {
        reference
    }
}

/// Fixed basis-point cost against the trade direction.
#[derive(Debug, Clone, Copy)]
pub struct FixedBpsSlippage {
    pub bps: Decimal,
}

impl SlippageModel for FixedBpsSlippage {
    fn execution_price(&self, reference: Decimal, quantity: Decimal, _volume: Decimal) -> Decimal {
        let rate = self.bps / Decimal::from(10_000);
        if quantity > Decimal::ZERO {
            reference * (Decimal::ONE + rate)
        } else {
            reference * (Decimal::ONE - rate)
        }
    }
}

/// Impact proportional to the order's share of the observed volume.
#[derive(Debug, Clone, Copy)]
pub struct VolumeProportionalSlippage {
    /// Fractional price move when the order equals the full bar volume.
    pub impact: Decimal,
}

impl SlippageModel for VolumeProportionalSlippage {
    fn execution_price(&self, reference: Decimal, quantity: Decimal, volume: Decimal) -> Decimal {
        if volume <= Decimal::ZERO {
            return reference;
        }
        let participation = quantity.abs() / volume;
        let move_frac = self.impact * participation;
        if quantity > Decimal::ZERO {
            reference * (Decimal::ONE + move_frac)
        } else {
            reference * (Decimal::ONE - move_frac)
        }
    }
}

/// Commission terms: a rate on notional plus a per-unit charge, with a
/// floor that only applies when a commission is charged at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionSchedule {
    pub rate: Decimal,
    pub per_unit: Decimal,
    pub minimum: Decimal,
}

impl CommissionSchedule {
    pub fn compute(&self, price: Decimal, quantity: Decimal) -> Decimal {
        let qty = quantity.abs();
        let base = price * qty * self.rate + qty * self.per_unit;
        if base.is_zero() {
            Decimal::ZERO
        } else {
            base.max(self.minimum)
        }
    }
}

/// Converts orders into fills.
///
/// A handler must never fill at a price observed before the order's
/// timestamp.
pub trait ExecutionHandler: Send {
    /// Accept an order at simulated time `now`. May fill immediately
    /// (CurrentClose policy) or rest the order.
    fn on_order(&mut self, order: OrderEvent, now: i64) -> Result<Vec<FillEvent>>;

    /// Match resting orders against a new market observation.
    fn on_market(&mut self, event: &MarketEvent) -> Vec<FillEvent>;

    /// Cancel a resting order; true when it was found.
    fn cancel(&mut self, order_id: Uuid) -> bool;

    fn pending_orders(&self) -> &[OrderEvent];
}

/// In-memory matching for backtests.
///
/// Market orders fill per the configured [`FillTiming`]; limit orders rest
/// and are re-evaluated on each later observation until they fill, are
/// cancelled, or expire. Limit fills execute exactly at the limit price and
/// carry no slippage.
pub struct SimulatedExecution {
    timing: FillTiming,
    slippage: Box<dyn SlippageModel>,
    commission: CommissionSchedule,
    pending: Vec<OrderEvent>,
    last_bars: HashMap<String, Bar>,
}

impl SimulatedExecution {
    pub fn new(
        timing: FillTiming,
        slippage: Box<dyn SlippageModel>,
        commission: CommissionSchedule,
    ) -> Self {
        SimulatedExecution {
            timing,
            slippage,
            commission,
            pending: Vec::new(),
            last_bars: HashMap::new(),
        }
    }

    fn make_fill(
        &self,
        order: &OrderEvent,
        timestamp: i64,
        reference: Decimal,
        volume: Decimal,
        with_slippage: bool,
    ) -> FillEvent {
        let price = if with_slippage {
            self.slippage
                .execution_price(reference, order.quantity, volume)
        } else {
            reference
        };
        FillEvent {
            id: Uuid::new_v4(),
            order_id: order.id,
            symbol: order.symbol.clone(),
            timestamp,
            quantity: order.quantity,
            price,
            commission: self.commission.compute(price, order.quantity),
            slippage: price - reference,
        }
    }

    /// Fill decision for one resting order against one observation, or
    /// `None` to keep resting.
    fn try_match(&self, order: &OrderEvent, event: &MarketEvent) -> Option<FillEvent> {
        if order.symbol != event.symbol() {
            return None;
        }
        // Look-ahead guard: only strictly later observations may fill.
        if event.timestamp() <= order.timestamp {
            return None;
        }

        match (order.kind, event) {
            (OrderKind::Market, MarketEvent::Bar(bar)) => {
                let reference = match self.timing {
                    FillTiming::NextOpen => bar.open,
                    // CurrentClose market orders are filled on arrival, not
                    // rested; a resting one only exists before any data,
                    // which the portfolio prevents.
                    FillTiming::CurrentClose => bar.close,
                };
                Some(self.make_fill(order, bar.timestamp, reference, bar.volume, true))
            }
            (OrderKind::Market, MarketEvent::Tick(tick)) => {
                Some(self.make_fill(order, tick.timestamp, tick.price, tick.volume, true))
            }
            (OrderKind::Limit, MarketEvent::Bar(bar)) => {
                let limit = order.limit_price?;
                let crossed = if order.quantity > Decimal::ZERO {
                    bar.low <= limit
                } else {
                    bar.high >= limit
                };
                crossed.then(|| self.make_fill(order, bar.timestamp, limit, bar.volume, false))
            }
            (OrderKind::Limit, MarketEvent::Tick(tick)) => {
                let limit = order.limit_price?;
                let crossed = if order.quantity > Decimal::ZERO {
                    tick.price <= limit
                } else {
                    tick.price >= limit
                };
                crossed.then(|| self.make_fill(order, tick.timestamp, limit, tick.volume, false))
            }
        }
    }
}

impl ExecutionHandler for SimulatedExecution {
    fn on_order(&mut self, order: OrderEvent, now: i64) -> Result<Vec<FillEvent>> {
        if order.kind == OrderKind::Market && self.timing == FillTiming::CurrentClose {
            let bar = self.last_bars.get(&order.symbol).ok_or_else(|| {
                TradecraftError::Execution(format!(
                    "{}: market order with no observed price",
                    order.symbol
                ))
            })?;
            let fill = self.make_fill(&order, now, bar.close, bar.volume, true);
            return Ok(vec![fill]);
        }
        self.pending.push(order);
        Ok(Vec::new())
    }

    fn on_market(&mut self, event: &MarketEvent) -> Vec<FillEvent> {
        let mut fills = Vec::new();
        let mut still_pending = Vec::new();

        for order in std::mem::take(&mut self.pending) {
            if let Some(expiry) = order.expires_at {
                if event.symbol() == order.symbol && event.timestamp() > expiry {
                    debug!(order_id = %order.id, symbol = %order.symbol, "limit order expired");
                    continue;
                }
            }
            match self.try_match(&order, event) {
                Some(fill) => fills.push(fill),
                None => still_pending.push(order),
            }
        }
        self.pending = still_pending;

        if let MarketEvent::Bar(bar) = event {
            self.last_bars.insert(bar.symbol.clone(), bar.clone());
        }
        fills
    }

    fn cancel(&mut self, order_id: Uuid) -> bool {
        let before = self.pending.len();
        self.pending.retain(|o| o.id != order_id);
        before != self.pending.len()
    }

    fn pending_orders(&self) -> &[OrderEvent] {
        &self.pending
    }
}
