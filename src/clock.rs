use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, TradecraftError};

/// The single authority for current simulated time.
///
/// Advances only when the engine dispatches the next event; no component
/// ever observes an event newer than the clock.
#[derive(Debug, Default)]
pub struct Clock {
    now_ns: Option<i64>,
}

impl Clock {
    pub fn new() -> Self {
        Clock { now_ns: None }
    }

    /// Advance to `timestamp` (Unix nanoseconds). Going backwards is a
    /// data-integrity error; equal timestamps are fine.
    pub fn advance(&mut self, timestamp: i64) -> Result<()> {
        if let Some(now) = self.now_ns {
            if timestamp < now {
                return Err(TradecraftError::DataIntegrity(format!(
                    "clock cannot move backwards: {} -> {}",
                    now, timestamp
                )));
            }
        }
        self.now_ns = Some(timestamp);
        Ok(())
    }

    /// Current simulated time in Unix nanoseconds; `None` before the first
    /// event.
    pub fn now(&self) -> Option<i64> {
        self.now_ns
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.now_ns.and_then(|ts| {
            let secs = ts.div_euclid(1_000_000_000);
            let nanos = ts.rem_euclid(1_000_000_000) as u32;
            Utc.timestamp_opt(secs, nanos).single()
        })
    }
}
