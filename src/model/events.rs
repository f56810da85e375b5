use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{OrderKind, SignalDirection};

/// Trading intent emitted by a strategy. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub timestamp: i64,
    pub direction: SignalDirection,
    /// Conviction in [0, 1]; clamped at construction.
    pub strength: Decimal,
}

impl SignalEvent {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: i64,
        direction: SignalDirection,
        strength: Decimal,
    ) -> Self {
        SignalEvent {
            symbol: symbol.into(),
            timestamp,
            direction,
            strength: strength.clamp(Decimal::ZERO, Decimal::ONE),
        }
    }
}

/// Sized order produced by the portfolio manager in response to a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Uuid,
    pub symbol: String,
    pub timestamp: i64,
    /// Signed: positive buys, negative sells.
    pub quantity: Decimal,
    pub kind: OrderKind,
    pub limit_price: Option<Decimal>,
    /// Nanosecond deadline for resting limit orders; `None` is
    /// good-till-cancel.
    pub expires_at: Option<i64>,
}

impl OrderEvent {
    pub fn market(symbol: impl Into<String>, timestamp: i64, quantity: Decimal) -> Self {
        OrderEvent {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            timestamp,
            quantity,
            kind: OrderKind::Market,
            limit_price: None,
            expires_at: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        timestamp: i64,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        OrderEvent {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            timestamp,
            quantity,
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Terminal record of an executed (portion of an) order.
///
/// `id` is the idempotency key: the portfolio applies each fill exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub timestamp: i64,
    /// Signed, same convention as the order.
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    /// Price delta attributable to the slippage model (per unit).
    pub slippage: Decimal,
}
