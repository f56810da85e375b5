use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tradable instrument definition.
///
/// `multiplier` scales quantity into notional (1 for stocks), `lot_size`
/// is the smallest order increment, `tick_size` the smallest price step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub multiplier: Decimal,
    pub lot_size: Decimal,
    pub tick_size: Decimal,
}

impl Instrument {
    /// Plain equity-style instrument: multiplier 1, lot 1.
    pub fn equity(symbol: impl Into<String>) -> Self {
        Instrument {
            symbol: symbol.into(),
            multiplier: Decimal::ONE,
            lot_size: Decimal::ONE,
            tick_size: Decimal::new(1, 2),
        }
    }

    /// Round a raw quantity down to the lot grid.
    pub fn round_lot(&self, quantity: Decimal) -> Decimal {
        if self.lot_size <= Decimal::ZERO {
            return quantity;
        }
        quantity - (quantity % self.lot_size)
    }
}

/// Descriptive metadata for a symbol, as returned by data providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
}
