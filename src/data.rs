use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Result, TradecraftError};
use crate::model::{normalize_timestamp, Bar, MarketEvent, SymbolInfo};

/// Pull-based market data source.
///
/// `next_batch` must return events in non-decreasing timestamp order, all
/// strictly newer than `since`; the engine treats a violation as a
/// data-integrity error and aborts the run. Pull calls are synchronous and
/// complete before the next dispatch; a source backed by a live feed blocks
/// in `next_batch` until data arrives, since an empty batch ends the run.
pub trait DataSource: Send {
    /// Next ordered chunk of market events after `since` (exclusive).
    fn next_batch(&mut self, since: Option<i64>) -> Result<Vec<MarketEvent>>;

    /// Metadata for the instruments this source serves, when known.
    fn symbols(&self) -> Vec<SymbolInfo> {
        Vec::new()
    }
}

/// In-memory source backed by a pre-sorted event list.
///
/// Each batch is one timestamp group, so simultaneous observations across
/// instruments enter the queue together.
pub struct MemoryDataSource {
    events: VecDeque<MarketEvent>,
}

impl MemoryDataSource {
    pub fn new(mut events: Vec<MarketEvent>) -> Self {
        // Stable sort keeps same-timestamp events in caller order.
        events.sort_by_key(|e| e.timestamp());
        MemoryDataSource {
            events: events.into(),
        }
    }
}

impl DataSource for MemoryDataSource {
    fn next_batch(&mut self, since: Option<i64>) -> Result<Vec<MarketEvent>> {
        while let Some(front) = self.events.front() {
            match since {
                Some(s) if front.timestamp() <= s => {
                    self.events.pop_front();
                }
                _ => break,
            }
        }

        let Some(front_ts) = self.events.front().map(|e| e.timestamp()) else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::new();
        while let Some(event) = self.events.pop_front() {
            if event.timestamp() == front_ts {
                batch.push(event);
            } else {
                self.events.push_front(event);
                break;
            }
        }
        Ok(batch)
    }
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Streaming CSV bar source for a single instrument.
///
/// Expects a header row with `timestamp,open,high,low,close,volume`;
/// timestamps may be seconds, milliseconds, microseconds, or nanoseconds.
pub struct CsvDataSource {
    reader: csv::Reader<File>,
    info: SymbolInfo,
    last_ts: Option<i64>,
    batch_size: usize,
}

impl CsvDataSource {
    pub fn open(path: impl AsRef<Path>, symbol: impl Into<String>) -> Result<Self> {
        Self::open_with_info(
            path,
            SymbolInfo {
                symbol: symbol.into(),
                ..SymbolInfo::default()
            },
        )
    }

    pub fn open_with_info(path: impl AsRef<Path>, info: SymbolInfo) -> Result<Self> {
        let file = File::open(path)?;
        let reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        Ok(CsvDataSource {
            reader,
            info,
            last_ts: None,
            batch_size: 1024,
        })
    }
}

// Free-standing so the record loop can hold the reader borrow.
fn bar_from(info: &SymbolInfo, record: BarRecord) -> Bar {
    Bar {
        symbol: info.symbol.clone(),
        timestamp: normalize_timestamp(record.timestamp),
        open: record.open,
        high: record.high,
        low: record.low,
        close: record.close,
        volume: record.volume,
    }
}

impl DataSource for CsvDataSource {
    fn next_batch(&mut self, since: Option<i64>) -> Result<Vec<MarketEvent>> {
        let mut batch = Vec::new();
        for result in self.reader.deserialize::<BarRecord>() {
            let bar = bar_from(&self.info, result?);

            if let Some(prev) = self.last_ts {
                if bar.timestamp < prev {
                    return Err(TradecraftError::DataIntegrity(format!(
                        "{}: CSV rows out of order at {}",
                        self.info.symbol, bar.timestamp
                    )));
                }
            }
            self.last_ts = Some(bar.timestamp);

            if let Some(s) = since {
                if bar.timestamp <= s {
                    continue;
                }
            }

            batch.push(MarketEvent::Bar(bar));
            if batch.len() >= self.batch_size {
                break;
            }
        }
        Ok(batch)
    }

    fn symbols(&self) -> Vec<SymbolInfo> {
        vec![self.info.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn bar(symbol: &str, ts: i64, close: Decimal) -> MarketEvent {
        MarketEvent::Bar(Bar {
            symbol: symbol.to_string(),
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(100),
        })
    }

    #[test]
    fn memory_source_batches_by_timestamp() {
        let mut src = MemoryDataSource::new(vec![
            bar("B", 20, dec!(2)),
            bar("A", 10, dec!(1)),
            bar("C", 10, dec!(3)),
        ]);

        let first = src.next_batch(None).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|e| e.timestamp() == 10));

        let second = src.next_batch(Some(10)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].timestamp(), 20);

        assert!(src.next_batch(Some(20)).unwrap().is_empty());
    }

    #[test]
    fn memory_source_skips_stale_events() {
        let mut src = MemoryDataSource::new(vec![bar("A", 10, dec!(1)), bar("A", 20, dec!(2))]);
        let batch = src.next_batch(Some(15)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].timestamp(), 20);
    }

    #[test]
    fn csv_source_reads_and_normalizes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "1700000000,100,105,95,102,5000").unwrap();
        writeln!(file, "1700000060,102,106,101,104,6000").unwrap();
        file.flush().unwrap();

        let mut src = CsvDataSource::open(file.path(), "AAPL").unwrap();
        let batch = src.next_batch(None).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].timestamp(), 1_700_000_000 * 1_000_000_000);
        assert_eq!(batch[0].symbol(), "AAPL");
        assert_eq!(batch[1].last_price(), dec!(104));
    }

    #[test]
    fn csv_source_resumes_between_batches() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        for i in 0..3 {
            writeln!(file, "{},100,105,95,102,5000", 1_700_000_000 + i * 60).unwrap();
        }
        file.flush().unwrap();

        let mut src = CsvDataSource::open(file.path(), "AAPL").unwrap();
        let first = src.next_batch(None).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].symbol(), "AAPL");
        // The reader is exhausted; a second pull ends the run cleanly.
        assert!(src.next_batch(first.last().map(|e| e.timestamp())).unwrap().is_empty());
    }

    #[test]
    fn csv_source_carries_symbol_metadata() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "1700000000,100,105,95,102,5000").unwrap();
        file.flush().unwrap();

        let src = CsvDataSource::open_with_info(
            file.path(),
            SymbolInfo {
                symbol: "AAPL".to_string(),
                name: Some("Apple Inc.".to_string()),
                exchange: Some("NASDAQ".to_string()),
                currency: Some("USD".to_string()),
            },
        )
        .unwrap();

        let infos = src.symbols();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].exchange.as_deref(), Some("NASDAQ"));
    }

    #[test]
    fn csv_source_rejects_out_of_order_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "1700000060,100,105,95,102,5000").unwrap();
        writeln!(file, "1700000000,102,106,101,104,6000").unwrap();
        file.flush().unwrap();

        let mut src = CsvDataSource::open(file.path(), "AAPL").unwrap();
        let err = src.next_batch(None).unwrap_err();
        assert!(matches!(err, TradecraftError::DataIntegrity(_)));
    }
}
