use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Hard limits the portfolio manager enforces before forwarding an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Per-instrument cap as a fraction of equity (e.g. 0.05 for 5%).
    pub max_position_pct: Option<Decimal>,
    /// Gross exposure cap as a multiple of equity.
    pub max_leverage: Option<Decimal>,
    /// Peak-to-trough drawdown fraction past which no new orders are sized.
    pub max_drawdown: Option<Decimal>,
    /// Absolute per-order quantity cap.
    pub max_order_quantity: Option<Decimal>,
    /// Symbols that must never be traded.
    pub restricted: Vec<String>,
    /// When false, buys must be fully covered by cash.
    pub allow_margin: bool,
    /// Cash buffer fraction held back against commission and slippage.
    pub safety_margin: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            max_position_pct: None,
            max_leverage: None,
            max_drawdown: None,
            max_order_quantity: None,
            restricted: Vec::new(),
            allow_margin: false,
            safety_margin: Decimal::new(1, 4), // 0.0001
        }
    }
}

/// Portfolio figures a pre-trade check needs, valued at current prices.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioView {
    pub cash: Decimal,
    pub equity: Decimal,
    /// Signed quantity already held in the order's instrument.
    pub position: Decimal,
    /// Σ|quantity × price| across all instruments.
    pub gross_exposure: Decimal,
}

/// Outcome of a pre-trade check.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    /// Possibly downsized from the requested quantity; never upsized.
    Approve(Decimal),
    Reject(String),
}

/// Stateless pre-trade gate. Downsizes where a cap allows partial
/// execution, rejects where it does not; a request downsized to zero is a
/// rejection, never a silent no-op fill.
#[derive(Debug, Clone, Default)]
pub struct RiskManager {
    pub limits: RiskLimits,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        RiskManager { limits }
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        requested: Decimal,
        price: Decimal,
        view: &PortfolioView,
    ) -> RiskDecision {
        if requested.is_zero() {
            return RiskDecision::Reject("zero quantity".to_string());
        }
        if price <= Decimal::ZERO {
            return RiskDecision::Reject(format!("{symbol}: no valid market price"));
        }
        if self.limits.restricted.iter().any(|s| s == symbol) {
            return RiskDecision::Reject(format!("{symbol} is restricted"));
        }

        let mut quantity = requested;

        if let Some(max_qty) = self.limits.max_order_quantity {
            if quantity.abs() > max_qty {
                return RiskDecision::Reject(format!(
                    "order quantity {} exceeds limit {}",
                    quantity.abs(),
                    max_qty
                ));
            }
        }

        // Per-instrument cap: shrink toward the allowed resulting position.
        if let Some(max_pct) = self.limits.max_position_pct {
            let cap_value = view.equity * max_pct;
            if cap_value <= Decimal::ZERO {
                return RiskDecision::Reject("equity exhausted".to_string());
            }
            let cap_qty = (cap_value / price).floor();
            let resulting = view.position + quantity;
            if resulting.abs() > cap_qty {
                let allowed = if quantity > Decimal::ZERO {
                    cap_qty - view.position
                } else {
                    -cap_qty - view.position
                };
                // Only shrink in the order's own direction.
                quantity = if quantity > Decimal::ZERO {
                    allowed.max(Decimal::ZERO).min(quantity)
                } else {
                    allowed.min(Decimal::ZERO).max(quantity)
                };
            }
        }

        // Leverage cap on gross exposure. Quantity that offsets the held
        // position reduces exposure and is always allowed; only the portion
        // past flat consumes headroom, so a portfolio at the limit can still
        // deleverage and exit.
        if let Some(max_lev) = self.limits.max_leverage {
            let opposes = !view.position.is_zero()
                && (quantity > Decimal::ZERO) != (view.position > Decimal::ZERO);
            let reducing = if opposes {
                quantity.abs().min(view.position.abs())
            } else {
                Decimal::ZERO
            };
            if quantity.abs() > reducing {
                let headroom =
                    (view.equity * max_lev - view.gross_exposure).max(Decimal::ZERO);
                let cap_qty = (headroom / price).floor() + reducing;
                if cap_qty.is_zero() {
                    return RiskDecision::Reject(
                        "gross exposure at leverage limit".to_string(),
                    );
                }
                if quantity.abs() > cap_qty {
                    quantity = if quantity > Decimal::ZERO {
                        cap_qty
                    } else {
                        -cap_qty
                    };
                }
            }
        }

        // Cash sufficiency for buys when margin is off, with a buffer for
        // commission and slippage.
        if !self.limits.allow_margin && quantity > Decimal::ZERO {
            let safety_factor = Decimal::ONE - self.limits.safety_margin;
            let available = (view.cash * safety_factor).max(Decimal::ZERO);
            let affordable = (available / price).floor();
            if quantity > affordable {
                quantity = affordable;
            }
        }

        if quantity.is_zero() {
            RiskDecision::Reject(format!("{symbol}: request reduced to zero by risk limits"))
        } else {
            RiskDecision::Approve(quantity)
        }
    }
}
