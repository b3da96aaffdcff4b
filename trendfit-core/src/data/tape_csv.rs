//! Long-format CSV for minute tapes: one `symbol,timestamp,price` row per sample.
//!
//! Timestamps are wall-clock session times (`YYYY-MM-DD HH:MM[:SS]`). Rows
//! outside 09:30–15:59 are rejected. A blank price, or a minute with no row
//! at all, is a missing sample and becomes a gap on the tape.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use super::provider::DataError;
use super::tape::MinuteTape;
use crate::domain::bar::session_minute;
use crate::domain::{InstrumentId, MinuteBar};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];
const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    symbol: String,
    timestamp: String,
    price: Option<f64>,
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
}

/// Read per-instrument bars from any reader.
pub fn read_bars<R: Read>(reader: R) -> Result<BTreeMap<InstrumentId, Vec<MinuteBar>>, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut bars: BTreeMap<InstrumentId, Vec<MinuteBar>> = BTreeMap::new();

    for (line, result) in rdr.deserialize::<Row>().enumerate() {
        // header is line 1
        let line = line + 2;
        let row = result.map_err(|e| DataError::Csv(format!("line {line}: {e}")))?;
        if row.symbol.is_empty() {
            return Err(DataError::Csv(format!("line {line}: empty symbol")));
        }
        let ts = parse_timestamp(&row.timestamp).ok_or_else(|| {
            DataError::Csv(format!("line {line}: bad timestamp '{}'", row.timestamp))
        })?;
        let minute = session_minute(ts).ok_or_else(|| {
            DataError::ValidationError(format!("line {line}: {ts} is outside the regular session"))
        })?;
        let Some(price) = row.price else {
            continue;
        };
        bars.entry(InstrumentId::new(row.symbol))
            .or_default()
            .push(MinuteBar {
                date: ts.date(),
                minute,
                price,
            });
    }
    Ok(bars)
}

/// Read a minute tape from any reader.
pub fn read_tape<R: Read>(reader: R) -> Result<MinuteTape, DataError> {
    MinuteTape::from_bars(read_bars(reader)?)
}

/// Read a minute tape from a CSV file.
pub fn load_tape(path: &Path) -> Result<MinuteTape, DataError> {
    let file = File::open(path)
        .map_err(|e| DataError::Csv(format!("open {}: {e}", path.display())))?;
    let tape = read_tape(file)?;
    tracing::debug!(
        path = %path.display(),
        instruments = tape.instrument_count(),
        days = tape.days().len(),
        "loaded minute tape"
    );
    Ok(tape)
}

/// Write every finite sample of the tape, grouped by instrument.
pub fn write_tape<W: Write>(tape: &MinuteTape, writer: W) -> Result<(), DataError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let csv_err = |e: csv::Error| DataError::Csv(e.to_string());

    for instrument in tape.symbols() {
        for bar in tape.bars_for(instrument) {
            let Some(ts) = bar.timestamp() else {
                continue;
            };
            wtr.serialize(Row {
                symbol: instrument.to_string(),
                timestamp: ts.format(WRITE_FORMAT).to_string(),
                price: Some(bar.price),
            })
            .map_err(csv_err)?;
        }
    }
    wtr.flush().map_err(|e| DataError::Csv(e.to_string()))?;
    Ok(())
}

/// Write a minute tape to a CSV file.
pub fn save_tape(tape: &MinuteTape, path: &Path) -> Result<(), DataError> {
    let file = File::create(path)
        .map_err(|e| DataError::Csv(format!("create {}: {e}", path.display())))?;
    write_tape(tape, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MINUTES_PER_DAY;

    const SAMPLE: &str = "\
symbol,timestamp,price
AAA,2024-01-02 09:30,100.0
AAA,2024-01-02 09:31:00,100.5
BBB,2024-01-02 09:30,20.0
BBB,2024-01-02 09:31,
";

    #[test]
    fn reads_long_format() {
        let tape = read_tape(SAMPLE.as_bytes()).unwrap();
        assert_eq!(tape.instrument_count(), 2);
        assert_eq!(tape.days().len(), 1);
        let aaa = InstrumentId::from("AAA");
        assert_eq!(tape.price_at(&aaa, 1), Some(100.5));
        assert_eq!(tape.price_at(&InstrumentId::from("BBB"), 1), None);
    }

    #[test]
    fn rejects_out_of_session_rows() {
        let csv = "symbol,timestamp,price\nAAA,2024-01-02 16:00,1.0\n";
        assert!(matches!(
            read_tape(csv.as_bytes()),
            Err(DataError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_empty_symbol_even_without_price() {
        let csv = "symbol,timestamp,price\nAAA,2024-01-02 09:30,1.0\n,2024-01-02 09:31,\n";
        assert!(matches!(read_tape(csv.as_bytes()), Err(DataError::Csv(_))));
    }

    #[test]
    fn missing_minutes_become_gaps() {
        let csv = "symbol,timestamp,price\nAAA,2024-01-02 09:30,1.0\nAAA,2024-01-02 09:35,2.0\n";
        let tape = read_tape(csv.as_bytes()).unwrap();
        let aaa = InstrumentId::from("AAA");
        assert_eq!(tape.len(), MINUTES_PER_DAY);
        assert_eq!(tape.price_at(&aaa, 5), Some(2.0));
        assert_eq!(tape.price_at(&aaa, 3), None);
        assert_eq!(tape.missing_samples()[&aaa], MINUTES_PER_DAY - 2);
    }

    #[test]
    fn rejects_duplicate_minutes() {
        let csv = "symbol,timestamp,price\nAAA,2024-01-02 09:30,1.0\nAAA,2024-01-02 09:30:00,2.0\n";
        assert!(read_tape(csv.as_bytes()).is_err());
    }

    #[test]
    fn rejects_garbage_timestamp() {
        let csv = "symbol,timestamp,price\nAAA,yesterday,1.0\n";
        assert!(matches!(read_tape(csv.as_bytes()), Err(DataError::Csv(_))));
    }

    #[test]
    fn write_then_read_preserves_samples() {
        let tape = read_tape(SAMPLE.as_bytes()).unwrap();
        let mut buf = Vec::new();
        write_tape(&tape, &mut buf).unwrap();
        let back = read_tape(buf.as_slice()).unwrap();
        assert_eq!(back.dataset_hash(), tape.dataset_hash());
        assert_eq!(back.len(), MINUTES_PER_DAY);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tape.csv");
        let tape = read_tape(SAMPLE.as_bytes()).unwrap();
        save_tape(&tape, &path).unwrap();
        assert_eq!(load_tape(&path).unwrap().dataset_hash(), tape.dataset_hash());
    }
}
