use crate::model::{FillEvent, MarketEvent, OrderEvent, SignalEvent};

/// Everything that flows through the engine queue.
///
/// Each variant is created by exactly one component and consumed by one or
/// two; events are retired after dispatch, never re-emitted or mutated.
#[derive(Debug, Clone)]
pub enum Event {
    /// Produced by the data source.
    Market(MarketEvent),
    /// Produced by the strategy.
    Signal(SignalEvent),
    /// Produced by the portfolio manager.
    Order(OrderEvent),
    /// Produced by the execution handler or a broker adapter.
    Fill(FillEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Market,
    Signal,
    Order,
    Fill,
}

impl Event {
    pub fn timestamp(&self) -> i64 {
        match self {
            Event::Market(m) => m.timestamp(),
            Event::Signal(s) => s.timestamp,
            Event::Order(o) => o.timestamp,
            Event::Fill(f) => f.timestamp,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Event::Market(m) => m.symbol(),
            Event::Signal(s) => &s.symbol,
            Event::Order(o) => &o.symbol,
            Event::Fill(f) => &f.symbol,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Market(_) => EventKind::Market,
            Event::Signal(_) => EventKind::Signal,
            Event::Order(_) => EventKind::Order,
            Event::Fill(_) => EventKind::Fill,
        }
    }
}
