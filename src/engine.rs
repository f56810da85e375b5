use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::broker::{BrokerAdapter, BrokerNotice};
use crate::checkpoint::SnapshotLog;
use crate::clock::Clock;
use crate::config::SimulationConfig;
use crate::data::DataSource;
use crate::error::{Result, TradecraftError};
use crate::event::{Event, EventKind};
use crate::execution::ExecutionHandler;
use crate::model::{FailurePolicy, MarketEvent, RunMode};
use crate::portfolio::{PortfolioManager, PositionSizer};
use crate::queue::EventQueue;
use crate::strategy::{Strategy, StrategyContext};

/// Aggregate counters for a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub events_processed: u64,
    pub fills: usize,
    pub rejected_signals: u64,
    pub duplicate_fills: u64,
    pub isolated_handlers: usize,
}

/// The simulation loop.
///
/// Owns the clock, the event queue, and every component; time advances only
/// when an event is dispatched, so no component ever observes data newer
/// than the event it is handling.
pub struct Engine {
    clock: Clock,
    queue: EventQueue,
    data: Box<dyn DataSource>,
    strategy: Box<dyn Strategy>,
    portfolio: PortfolioManager,
    execution: Box<dyn ExecutionHandler>,
    broker: Option<Box<dyn BrokerAdapter>>,
    mode: RunMode,
    failure_policy: FailurePolicy,
    isolated: HashSet<EventKind>,
    until: Option<i64>,
    snapshot_log: Option<SnapshotLog>,
    last_data_ts: Option<i64>,
    last_processed_ts: Option<i64>,
    last_snapshot_ts: Option<i64>,
    events_processed: u64,
}

impl Engine {
    pub fn new(
        data: Box<dyn DataSource>,
        strategy: Box<dyn Strategy>,
        portfolio: PortfolioManager,
        execution: Box<dyn ExecutionHandler>,
    ) -> Self {
        Engine {
            clock: Clock::new(),
            queue: EventQueue::new(),
            data,
            strategy,
            portfolio,
            execution,
            broker: None,
            mode: RunMode::Backtest,
            failure_policy: FailurePolicy::Halt,
            isolated: HashSet::new(),
            until: None,
            snapshot_log: None,
            last_data_ts: None,
            last_processed_ts: None,
            last_snapshot_ts: None,
            events_processed: 0,
        }
    }

    /// Assemble an engine from a [`SimulationConfig`]: execution terms, risk
    /// limits, failure policy, run horizon, and the snapshot log all come
    /// from the file. Live mode still needs [`with_broker`] afterwards.
    ///
    /// [`with_broker`]: Engine::with_broker
    pub fn from_config(
        config: &SimulationConfig,
        data: Box<dyn DataSource>,
        strategy: Box<dyn Strategy>,
        sizer: Box<dyn PositionSizer>,
    ) -> Result<Self> {
        let portfolio =
            PortfolioManager::new(config.initial_cash, sizer, config.build_risk());
        let mut engine = Engine::new(data, strategy, portfolio, Box::new(config.build_execution()));
        engine.mode = config.mode;
        engine.failure_policy = config.failure_policy();
        engine.until = config.until;
        engine.snapshot_log = match &config.snapshot_log {
            Some(path) => Some(SnapshotLog::open(path)?),
            None => None,
        };
        Ok(engine)
    }

    /// Live mode routes orders through the broker and defaults to isolating
    /// failing handlers instead of halting.
    pub fn with_broker(mut self, broker: Box<dyn BrokerAdapter>) -> Self {
        self.broker = Some(broker);
        self.mode = RunMode::Live;
        self.failure_policy = FailurePolicy::default_for(RunMode::Live);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Run to data exhaustion, or stop before the first event past `until`
    /// (falling back to the configured horizon when the argument is `None`).
    pub fn run(&mut self, until: Option<i64>) -> Result<RunSummary> {
        let until = until.or(self.until);
        loop {
            if self.queue.is_empty() && !self.refill()? {
                break;
            }
            if let (Some(limit), Some(next_ts)) = (until, self.queue.peek_timestamp()) {
                if next_ts > limit {
                    info!(limit, "stopping before horizon");
                    break;
                }
            }
            let Some(event) = self.queue.pop() else { break };
            self.step(event)?;
        }

        // Close out the final timestamp group.
        if let Some(ts) = self.last_processed_ts {
            self.take_snapshot(ts)?;
        }

        let summary = self.summary();
        info!(
            events = summary.events_processed,
            fills = summary.fills,
            rejected = summary.rejected_signals,
            "run complete"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            events_processed: self.events_processed,
            fills: self.portfolio.fills().len(),
            rejected_signals: self.portfolio.rejected_signals(),
            duplicate_fills: self.portfolio.duplicate_fills(),
            isolated_handlers: self.isolated.len(),
        }
    }

    pub fn portfolio(&self) -> &PortfolioManager {
        &self.portfolio
    }

    pub fn portfolio_mut(&mut self) -> &mut PortfolioManager {
        &mut self.portfolio
    }

    pub fn now(&self) -> Option<i64> {
        self.clock.now()
    }

    fn step(&mut self, event: Event) -> Result<()> {
        let ts = event.timestamp();
        let kind = event.kind();

        // A snapshot closes each timestamp group before the clock moves on.
        if let Some(prev) = self.last_processed_ts {
            if ts > prev {
                self.take_snapshot(prev)?;
            }
        }
        self.clock.advance(ts)?;
        self.last_processed_ts = Some(ts);
        self.events_processed += 1;

        if self.isolated.contains(&kind) {
            return Ok(());
        }
        match self.dispatch(event) {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, ?kind, "recoverable dispatch error");
                Ok(())
            }
            Err(e) => match self.failure_policy {
                FailurePolicy::Halt => Err(e),
                FailurePolicy::Isolate => {
                    error!(error = %e, ?kind, "isolating handler after failure");
                    self.isolated.insert(kind);
                    Ok(())
                }
            },
        }
    }

    /// Record the per-timestamp snapshot at most once, even across resumed
    /// `run` calls, and mirror it to the snapshot log when one is attached.
    fn take_snapshot(&mut self, timestamp: i64) -> Result<()> {
        if self.last_snapshot_ts == Some(timestamp) {
            return Ok(());
        }
        self.last_snapshot_ts = Some(timestamp);
        self.portfolio.record_snapshot(timestamp);
        if let Some(log) = &mut self.snapshot_log {
            if let Some(snapshot) = self.portfolio.snapshots().last() {
                log.append(snapshot)?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Market(market) => self.on_market(market),
            Event::Signal(signal) => {
                if let Some(order) = self.portfolio.on_signal(&signal)? {
                    self.queue.push(Event::Order(order));
                }
                Ok(())
            }
            Event::Order(order) => match (&mut self.broker, self.mode) {
                (Some(broker), RunMode::Live) => {
                    broker.submit(&order)?;
                    Ok(())
                }
                _ => {
                    let now = order.timestamp;
                    for fill in self.execution.on_order(order, now)? {
                        self.queue.push(Event::Fill(fill));
                    }
                    Ok(())
                }
            },
            Event::Fill(fill) => {
                self.portfolio.on_fill(&fill)?;
                self.strategy.on_fill(&fill);
                Ok(())
            }
        }
    }

    /// Market events fan out in a fixed order: mark the portfolio, match
    /// resting orders, then let the strategy see the observation. Fills are
    /// enqueued before the strategy's signals, so at equal timestamps they
    /// settle first.
    fn on_market(&mut self, market: MarketEvent) -> Result<()> {
        let now = market.timestamp();
        self.portfolio.on_market(&market);

        for fill in self.execution.on_market(&market) {
            self.queue.push(Event::Fill(fill));
        }

        let ctx = StrategyContext::new(
            now,
            self.portfolio.cash(),
            self.portfolio.equity(),
            self.portfolio.position_quantities(),
        );
        for signal in self.strategy.on_market(&market, &ctx) {
            if signal.timestamp != now {
                return Err(TradecraftError::DataIntegrity(format!(
                    "signal timestamp {} does not match event time {now}",
                    signal.timestamp
                )));
            }
            self.queue.push(Event::Signal(signal));
        }
        Ok(())
    }

    /// Pull the next data batch (and broker notices in live mode) into the
    /// queue. Returns false when no further events can arrive.
    fn refill(&mut self) -> Result<bool> {
        if let Some(broker) = &mut self.broker {
            for notice in broker.poll()? {
                match notice {
                    BrokerNotice::Fill(mut fill) => {
                        // Notices can carry wall-clock times behind the
                        // simulated clock; clamp so ordering holds.
                        if let Some(now) = self.clock.now() {
                            if fill.timestamp < now {
                                fill.timestamp = now;
                            }
                        }
                        self.queue.push(Event::Fill(fill));
                    }
                    BrokerNotice::Reject { order_id, reason } => {
                        warn!(%order_id, %reason, "broker rejected order");
                    }
                }
            }
        }

        let batch = self.data.next_batch(self.last_data_ts)?;
        if batch.is_empty() {
            return Ok(!self.queue.is_empty());
        }

        let mut prev = self.last_data_ts;
        for event in batch {
            let ts = event.timestamp();
            if let Some(p) = prev {
                if ts < p {
                    return Err(TradecraftError::DataIntegrity(format!(
                        "{}: batch timestamp {ts} precedes {p}",
                        event.symbol()
                    )));
                }
            }
            if let Some(now) = self.clock.now() {
                if ts < now {
                    return Err(TradecraftError::DataIntegrity(format!(
                        "{}: data timestamp {ts} behind clock {now}",
                        event.symbol()
                    )));
                }
            }
            prev = Some(ts);
            self.queue.push(Event::Market(event));
        }
        self.last_data_ts = prev;
        Ok(true)
    }
}
