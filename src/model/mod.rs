pub mod events;
pub mod instrument;
pub mod market_data;
pub mod types;

pub use events::{FillEvent, OrderEvent, SignalEvent};
pub use instrument::{Instrument, SymbolInfo};
pub use market_data::{normalize_timestamp, Bar, MarketEvent, Tick};
pub use types::{FailurePolicy, FillTiming, OrderKind, RunMode, SignalDirection};
