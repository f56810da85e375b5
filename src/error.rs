use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TradecraftError {
    /// Out-of-order or malformed market data. Fatal: aborts the run.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// A signal or order rejected by a risk limit. Recoverable: absorbed
    /// and reported, never silently executed.
    #[error("risk limit violation: {0}")]
    RiskLimit(String),

    /// Adapter/handler failure to fill or cancel. Fatal in backtests,
    /// isolation-eligible in live mode.
    #[error("execution error: {0}")]
    Execution(String),

    /// A fill identifier seen twice. Must be ignored, never double-applied.
    #[error("duplicate fill: {0}")]
    DuplicateFill(Uuid),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TradecraftError {
    /// Recoverable errors are absorbed at the dispatch site and counted;
    /// everything else halts the run (or isolates the handler in live mode).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TradecraftError::RiskLimit(_) | TradecraftError::DuplicateFill(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TradecraftError>;
