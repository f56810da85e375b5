use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{FillEvent, OrderEvent, OrderKind};

/// Asynchronous notice from a broker, consumed by polling.
#[derive(Debug, Clone)]
pub enum BrokerNotice {
    Fill(FillEvent),
    Reject { order_id: Uuid, reason: String },
}

/// Live-mode order routing. Implementations wrap a real brokerage API;
/// the engine only ever talks to this trait.
pub trait BrokerAdapter: Send {
    /// Submit an order; returns the broker-side id (here the order id).
    fn submit(&mut self, order: &OrderEvent) -> Result<Uuid>;

    /// Request cancellation; true when the order was still working.
    fn cancel(&mut self, order_id: Uuid) -> Result<bool>;

    /// Drain notices produced since the last poll.
    fn poll(&mut self) -> Result<Vec<BrokerNotice>>;
}

/// Deterministic in-process broker for live-mode tests and dry runs.
///
/// Market orders fill at the posted quote; limit orders fill at the limit
/// when the quote crosses it, otherwise rest until a later `set_quote`.
/// Orders for symbols with no quote are rejected.
pub struct PaperBroker {
    quotes: HashMap<String, Decimal>,
    working: Vec<OrderEvent>,
    outbox: Vec<BrokerNotice>,
}

impl PaperBroker {
    pub fn new() -> Self {
        PaperBroker {
            quotes: HashMap::new(),
            working: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Post a quote and re-check resting limit orders against it.
    pub fn set_quote(&mut self, symbol: &str, price: Decimal, timestamp: i64) {
        self.quotes.insert(symbol.to_string(), price);

        let mut still_working = Vec::new();
        for order in std::mem::take(&mut self.working) {
            if order.symbol == symbol && limit_crossed(&order, price) {
                self.outbox
                    .push(BrokerNotice::Fill(fill_at(&order, price, timestamp)));
            } else {
                still_working.push(order);
            }
        }
        self.working = still_working;
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerAdapter for PaperBroker {
    fn submit(&mut self, order: &OrderEvent) -> Result<Uuid> {
        let Some(&quote) = self.quotes.get(&order.symbol) else {
            self.outbox.push(BrokerNotice::Reject {
                order_id: order.id,
                reason: format!("{}: no quote", order.symbol),
            });
            return Ok(order.id);
        };

        match order.kind {
            OrderKind::Market => {
                self.outbox
                    .push(BrokerNotice::Fill(fill_at(order, quote, order.timestamp)));
            }
            OrderKind::Limit => {
                if limit_crossed(order, quote) {
                    let price = order.limit_price.unwrap_or(quote);
                    self.outbox
                        .push(BrokerNotice::Fill(fill_at(order, price, order.timestamp)));
                } else {
                    info!(order_id = %order.id, symbol = %order.symbol, "limit order working");
                    self.working.push(order.clone());
                }
            }
        }
        Ok(order.id)
    }

    fn cancel(&mut self, order_id: Uuid) -> Result<bool> {
        let before = self.working.len();
        self.working.retain(|o| o.id != order_id);
        Ok(before != self.working.len())
    }

    fn poll(&mut self) -> Result<Vec<BrokerNotice>> {
        Ok(std::mem::take(&mut self.outbox))
    }
}

fn limit_crossed(order: &OrderEvent, quote: Decimal) -> bool {
    match order.limit_price {
        Some(limit) if order.quantity > Decimal::ZERO => quote <= limit,
        Some(limit) => quote >= limit,
        None => true,
    }
}

fn fill_at(order: &OrderEvent, price: Decimal, timestamp: i64) -> FillEvent {
    FillEvent {
        id: Uuid::new_v4(),
        order_id: order.id,
        symbol: order.symbol.clone(),
        timestamp,
        quantity: order.quantity,
        price,
        commission: Decimal::ZERO,
        slippage: Decimal::ZERO,
    }
}
