use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated OHLCV observation for one instrument over a fixed interval.
///
/// Timestamps are Unix nanoseconds. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Single trade/quote observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: i64,
    pub price: Decimal,
    pub volume: Decimal,
}

/// Time-stamped market observation, produced by a [`DataSource`].
///
/// [`DataSource`]: crate::data::DataSource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    Bar(Bar),
    Tick(Tick),
}

impl MarketEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            MarketEvent::Bar(b) => b.timestamp,
            MarketEvent::Tick(t) => t.timestamp,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Bar(b) => &b.symbol,
            MarketEvent::Tick(t) => &t.symbol,
        }
    }

    /// Most recent traded price carried by this observation.
    pub fn last_price(&self) -> Decimal {
        match self {
            MarketEvent::Bar(b) => b.close,
            MarketEvent::Tick(t) => t.price,
        }
    }
}

/// Normalize a timestamp of unknown precision to nanoseconds.
///
/// CSV exports disagree on precision; anything up to year ~5138 is
/// unambiguous by magnitude.
#[inline]
pub fn normalize_timestamp(ts: i64) -> i64 {
    let abs_ts = ts.abs();
    if abs_ts < 100_000_000_000 {
        ts * 1_000_000_000
    } else if abs_ts < 100_000_000_000_000 {
        ts * 1_000_000
    } else if abs_ts < 100_000_000_000_000_000 {
        ts * 1_000
    } else {
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_detects_precision() {
        let secs = 1_700_000_000i64;
        assert_eq!(normalize_timestamp(secs), secs * 1_000_000_000);
        assert_eq!(normalize_timestamp(secs * 1_000), secs * 1_000_000_000);
        assert_eq!(normalize_timestamp(secs * 1_000_000), secs * 1_000_000_000);
        assert_eq!(
            normalize_timestamp(secs * 1_000_000_000),
            secs * 1_000_000_000
        );
    }

    #[test]
    fn market_event_accessors() {
        let bar = Bar {
            symbol: "AAPL".to_string(),
            timestamp: 1_000,
            open: dec!(100),
            high: dec!(105),
            low: dec!(95),
            close: dec!(102),
            volume: dec!(10000),
        };
        let event = MarketEvent::Bar(bar);
        assert_eq!(event.timestamp(), 1_000);
        assert_eq!(event.symbol(), "AAPL");
        assert_eq!(event.last_price(), dec!(102));
    }
}
