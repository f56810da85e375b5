//! Incremental indicators used by the built-in strategies.

use std::collections::VecDeque;

/// Simple Moving Average.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    buffer: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Sma {
            period,
            buffer: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        self.sum += value;

        if self.buffer.len() > self.period {
            if let Some(removed) = self.buffer.pop_front() {
                self.sum -= removed;
            }
        }

        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.buffer.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.len() == self.period
    }
}

/// Exponential Moving Average, seeded with the first observation.
#[derive(Debug, Clone)]
pub struct Ema {
    k: f64,
    current: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Ema {
            k: 2.0 / (period as f64 + 1.0),
            current: None,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        let next = match self.current {
            Some(prev) => (value - prev) * self.k + prev,
            None => value,
        };
        self.current = Some(next);
        self.current
    }

    pub fn value(&self) -> Option<f64> {
        self.current
    }
}

/// Rate of change over `period` observations, as a fraction.
#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    buffer: VecDeque<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        Roc {
            period,
            buffer: VecDeque::with_capacity(period + 1),
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        if self.buffer.len() > self.period + 1 {
            self.buffer.pop_front();
        }
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.buffer.len() == self.period + 1 {
            let oldest = *self.buffer.front()?;
            let newest = *self.buffer.back()?;
            if oldest == 0.0 {
                return None;
            }
            Some(newest / oldest - 1.0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warms_up_then_slides() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(1.0), None);
        assert_eq!(sma.update(2.0), None);
        assert_eq!(sma.update(3.0), Some(2.0));
        assert_eq!(sma.update(5.0), Some(10.0 / 3.0));
        assert!(sma.is_ready());
    }

    #[test]
    fn ema_seeds_with_first_value() {
        let mut ema = Ema::new(9);
        assert_eq!(ema.update(10.0), Some(10.0));
        let next = ema.update(20.0).unwrap();
        assert!((next - 12.0).abs() < 1e-9); // k = 0.2
    }

    #[test]
    fn roc_measures_fractional_change() {
        let mut roc = Roc::new(2);
        assert_eq!(roc.update(100.0), None);
        assert_eq!(roc.update(105.0), None);
        let value = roc.update(110.0).unwrap();
        assert!((value - 0.10).abs() < 1e-9);
    }
}
