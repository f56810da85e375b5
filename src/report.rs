use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::FillEvent;

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// Summary statistics computed from an equity curve after a run.
///
/// Ratio metrics use f64; they are descriptive, not accounting values.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    pub initial_equity: f64,
    pub final_equity: f64,
    /// Simple return over the whole run.
    pub total_return: f64,
    /// Geometric return scaled to one year of elapsed simulated time.
    pub annualized_return: f64,
    /// Annualized standard deviation of per-period returns.
    pub volatility: f64,
    /// Annualized return over volatility, zero-risk-free-rate convention.
    pub sharpe: f64,
    /// Largest peak-to-trough equity decline, as a fraction of the peak.
    pub max_drawdown: f64,
    pub num_fills: usize,
    /// Fraction of closing fills with positive realized P&L.
    pub win_rate: f64,
}

impl PerformanceMetrics {
    /// Compute from a timestamp-ordered equity curve (Unix nanoseconds).
    /// Fewer than two points yields the zeroed default.
    pub fn from_equity_curve(curve: &[(i64, Decimal)], fills: &[FillEvent]) -> Self {
        if curve.len() < 2 {
            return PerformanceMetrics {
                num_fills: fills.len(),
                ..Default::default()
            };
        }

        let equity: Vec<f64> = curve
            .iter()
            .map(|(_, e)| e.to_f64().unwrap_or(0.0))
            .collect();
        let initial = equity[0];
        let last = equity[equity.len() - 1];
        let total_return = if initial != 0.0 {
            last / initial - 1.0
        } else {
            0.0
        };

        let elapsed_ns = curve[curve.len() - 1].0 - curve[0].0;
        let years = elapsed_ns as f64 / 1e9 / SECONDS_PER_YEAR;
        let annualized_return = if years > 0.0 && initial > 0.0 && last > 0.0 {
            (last / initial).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let returns: Vec<f64> = equity
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        let periods_per_year = if years > 0.0 {
            returns.len() as f64 / years
        } else {
            0.0
        };
        let (mean, std) = mean_std(&returns);
        let volatility = std * periods_per_year.sqrt();
        let sharpe = if std > 0.0 {
            mean / std * periods_per_year.sqrt()
        } else {
            0.0
        };

        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0f64;
        for &e in &equity {
            if e > peak {
                peak = e;
            }
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - e) / peak);
            }
        }

        PerformanceMetrics {
            initial_equity: initial,
            final_equity: last,
            total_return,
            annualized_return,
            volatility,
            sharpe,
            max_drawdown,
            num_fills: fills.len(),
            win_rate: win_rate(fills),
        }
    }
}

fn mean_std(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Pairs fills into round trips per symbol (average-cost basis) and counts
/// the fraction of closing trades that realized a gain.
fn win_rate(fills: &[FillEvent]) -> f64 {
    use std::collections::HashMap;

    struct Book {
        quantity: Decimal,
        average_cost: Decimal,
    }

    let mut books: HashMap<&str, Book> = HashMap::new();
    let mut wins = 0usize;
    let mut closes = 0usize;

    for fill in fills {
        let book = books.entry(fill.symbol.as_str()).or_insert(Book {
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
        });

        let same_side = book.quantity.is_zero()
            || (book.quantity > Decimal::ZERO) == (fill.quantity > Decimal::ZERO);
        if same_side {
            let new_qty = book.quantity + fill.quantity;
            if !new_qty.is_zero() {
                book.average_cost = (book.average_cost * book.quantity
                    + fill.price * fill.quantity)
                    / new_qty;
            }
            book.quantity = new_qty;
        } else {
            let closed = fill.quantity.abs().min(book.quantity.abs());
            let direction = if book.quantity > Decimal::ZERO {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            let pnl = (fill.price - book.average_cost) * closed * direction;
            closes += 1;
            if pnl > Decimal::ZERO {
                wins += 1;
            }
            book.quantity += fill.quantity;
            if book.quantity.is_zero() {
                book.average_cost = Decimal::ZERO;
            } else if (book.quantity > Decimal::ZERO) != (direction > Decimal::ZERO) {
                // Flipped through zero: the residual opens at the fill price.
                book.average_cost = fill.price;
            }
        }
    }

    if closes == 0 {
        0.0
    } else {
        wins as f64 / closes as f64
    }
}
