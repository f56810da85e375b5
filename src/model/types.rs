use serde::{Deserialize, Serialize};

/// Trade intent carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Long,
    Short,
    /// Flatten any open position in the instrument.
    Exit,
}

/// Order pricing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
}

/// Which future price a matched order executes at.
///
/// The policy is fixed for a whole run; mixing policies breaks
/// reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTiming {
    /// Fill at the open of the first bar after the order timestamp.
    #[default]
    NextOpen,
    /// Fill at the close of the bar the order was placed on.
    CurrentClose,
}

/// Scheduling profile of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Backtest,
    Live,
}

/// Reaction to a handler error during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and stop the run. Determinism requires stopping
    /// rather than silently skipping; the backtest default.
    Halt,
    /// Disable the failing handler and keep draining events; the live
    /// default.
    Isolate,
}

impl FailurePolicy {
    pub fn default_for(mode: RunMode) -> Self {
        match mode {
            RunMode::Backtest => FailurePolicy::Halt,
            RunMode::Live => FailurePolicy::Isolate,
        }
    }
}
