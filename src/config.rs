use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TradecraftError};
use crate::execution::{
    CommissionSchedule, FixedBpsSlippage, SimulatedExecution, SlippageModel,
    VolumeProportionalSlippage, ZeroSlippage,
};
use crate::model::{FailurePolicy, FillTiming, RunMode};
use crate::risk::{RiskLimits, RiskManager};

/// Slippage model selection, deserialized from the `[slippage]` table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SlippageConfig {
    #[default]
    Zero,
    FixedBps {
        bps: Decimal,
    },
    VolumeProportional {
        impact: Decimal,
    },
}

impl SlippageConfig {
    pub fn build(&self) -> Box<dyn SlippageModel> {
        match *self {
            SlippageConfig::Zero => Box::new(ZeroSlippage),
            SlippageConfig::FixedBps { bps } => Box::new(FixedBpsSlippage { bps }),
            SlippageConfig::VolumeProportional { impact } => {
                Box::new(VolumeProportionalSlippage { impact })
            }
        }
    }
}

/// Run parameters, loadable from TOML. Every field has a sensible default
/// so a minimal file (or none at all) still yields a working backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_cash: Decimal,
    pub mode: RunMode,
    pub fill_timing: FillTiming,
    /// Defaults per mode when absent: halt in backtests, isolate live.
    pub failure_policy: Option<FailurePolicy>,
    /// Stop before the first event strictly after this Unix-ns timestamp.
    pub until: Option<i64>,
    /// Path for the append-only snapshot log; disabled when absent.
    pub snapshot_log: Option<PathBuf>,
    pub slippage: SlippageConfig,
    pub commission: CommissionSchedule,
    pub risk: RiskLimits,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_cash: dec!(100000),
            mode: RunMode::Backtest,
            fill_timing: FillTiming::NextOpen,
            failure_policy: None,
            until: None,
            snapshot_log: None,
            slippage: SlippageConfig::Zero,
            commission: CommissionSchedule::default(),
            risk: RiskLimits::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
            .unwrap_or_else(|| FailurePolicy::default_for(self.mode))
    }

    pub fn build_execution(&self) -> SimulatedExecution {
        SimulatedExecution::new(
            self.fill_timing,
            self.slippage.build(),
            self.commission.clone(),
        )
    }

    pub fn build_risk(&self) -> RiskManager {
        RiskManager::new(self.risk.clone())
    }

    fn validate(&self) -> Result<()> {
        if self.initial_cash <= Decimal::ZERO {
            return Err(TradecraftError::Config(
                "initial_cash must be positive".to_string(),
            ));
        }
        if let Some(pct) = self.risk.max_position_pct {
            if pct <= Decimal::ZERO || pct > Decimal::ONE {
                return Err(TradecraftError::Config(
                    "risk.max_position_pct must be in (0, 1]".to_string(),
                ));
            }
        }
        if let Some(dd) = self.risk.max_drawdown {
            if dd <= Decimal::ZERO || dd >= Decimal::ONE {
                return Err(TradecraftError::Config(
                    "risk.max_drawdown must be in (0, 1)".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config.initial_cash, dec!(100000));
        assert_eq!(config.mode, RunMode::Backtest);
        assert_eq!(config.fill_timing, FillTiming::NextOpen);
        assert_eq!(config.failure_policy(), FailurePolicy::Halt);
    }

    #[test]
    fn full_toml_round_trip() {
        let text = r#"
            initial_cash = "50000"
            fill_timing = "current_close"

            [slippage]
            model = "fixed_bps"
            bps = "5"

            [commission]
            rate = "0.001"
            per_unit = "0"
            minimum = "1"

            [risk]
            max_position_pct = "0.05"
            max_leverage = "2"
            allow_margin = true
            restricted = ["PENNY"]
            safety_margin = "0.0001"
        "#;
        let config = SimulationConfig::from_toml_str(text).unwrap();
        assert_eq!(config.initial_cash, dec!(50000));
        assert_eq!(config.fill_timing, FillTiming::CurrentClose);
        assert_eq!(config.risk.max_position_pct, Some(dec!(0.05)));
        assert_eq!(config.risk.restricted, vec!["PENNY".to_string()]);
        assert_eq!(config.commission.minimum, dec!(1));
        assert!(matches!(
            config.slippage,
            SlippageConfig::FixedBps { bps } if bps == dec!(5)
        ));
    }

    #[test]
    fn live_mode_defaults_to_isolate() {
        let config = SimulationConfig::from_toml_str("mode = \"live\"").unwrap();
        assert_eq!(config.failure_policy(), FailurePolicy::Isolate);
    }

    #[test]
    fn partial_risk_table_keeps_defaults_for_the_rest() {
        let text = "[risk]\nmax_position_pct = \"0.05\"";
        let config = SimulationConfig::from_toml_str(text).unwrap();
        assert_eq!(config.risk.max_position_pct, Some(dec!(0.05)));
        assert!(!config.risk.allow_margin);
        assert_eq!(config.risk.safety_margin, dec!(0.0001));
        assert!(config.risk.restricted.is_empty());
    }

    #[test]
    fn partial_commission_table_parses() {
        let text = "[commission]\nrate = \"0.001\"";
        let config = SimulationConfig::from_toml_str(text).unwrap();
        assert_eq!(config.commission.rate, dec!(0.001));
        assert_eq!(config.commission.minimum, dec!(0));
    }

    #[test]
    fn rejects_nonpositive_cash() {
        let err = SimulationConfig::from_toml_str("initial_cash = \"0\"").unwrap_err();
        assert!(matches!(err, TradecraftError::Config(_)));
    }

    #[test]
    fn rejects_out_of_range_drawdown() {
        let text = "[risk]\nmax_drawdown = \"1.5\"";
        let err = SimulationConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, TradecraftError::Config(_)));
    }
}
