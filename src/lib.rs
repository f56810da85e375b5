//! Event-driven trading research toolkit.
//!
//! A single simulation loop runs both backtests and paper/live sessions:
//! market data becomes events on a stable time-ordered queue, strategies
//! turn observations into signals, the portfolio manager turns signals into
//! risk-checked orders, and an execution handler (or broker adapter) turns
//! orders into fills. The clock only moves at dispatch, so no component can
//! act on data it has not yet been shown.

pub mod broker;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod event;
pub mod execution;
pub mod indicators;
pub mod model;
pub mod portfolio;
pub mod queue;
pub mod report;
pub mod risk;
pub mod strategy;

pub use broker::{BrokerAdapter, BrokerNotice, PaperBroker};
pub use checkpoint::SnapshotLog;
pub use clock::Clock;
pub use config::{SimulationConfig, SlippageConfig};
pub use data::{CsvDataSource, DataSource, MemoryDataSource};
pub use engine::{Engine, RunSummary};
pub use error::{Result, TradecraftError};
pub use event::{Event, EventKind};
pub use execution::{
    CommissionSchedule, ExecutionHandler, FixedBpsSlippage, SimulatedExecution, SlippageModel,
    VolumeProportionalSlippage, ZeroSlippage,
};
pub use indicators::{Ema, Roc, Sma};
pub use model::{
    Bar, FailurePolicy, FillEvent, FillTiming, Instrument, MarketEvent, OrderEvent, OrderKind,
    RunMode, SignalDirection, SignalEvent, SymbolInfo, Tick,
};
pub use portfolio::{
    FixedQuantity, FractionOfEquity, PortfolioManager, PortfolioSnapshot, Position, PositionSizer,
};
pub use queue::EventQueue;
pub use report::PerformanceMetrics;
pub use risk::{PortfolioView, RiskDecision, RiskLimits, RiskManager};
pub use strategy::{
    MaCrossStrategy, MomentumModelStrategy, MultiAssetMomentumStrategy, Strategy, StrategyContext,
};
