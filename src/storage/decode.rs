// @file: kline_engine/src/storage/decode.rs
// @description: Decodes a daily kline archive (zip with one csv) into records with derived volumes.
// @author: LAS.

use csv::{ReaderBuilder, StringRecord};
use log::debug;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::ZipArchive;
use crate::core::errors::KlineError;
use crate::core::models::{Candle, KlineRecord};
use crate::core::timestamps::{infer_timestamp_unit, TimestampUnit};

// open_time, open, high, low, close, volume, close_time, quote_asset_volume,
// number_of_trades, taker_buy_base_volume, taker_buy_quote_volume, ignore
pub const COLUMN_COUNT: usize = 12;


//
// PUBLIC INTERFACE
//

pub fn read_day_archive(path: &Path) -> Result<Vec<KlineRecord>, KlineError> {
    let file: File = File::open(path)?;
    decode_day_archive(file, &path.display().to_string())
}

pub fn decode_day_bytes(bytes: &[u8], label: &str) -> Result<Vec<KlineRecord>, KlineError> {
    decode_day_archive(Cursor::new(bytes), label)
}

/// Reads the first `.csv` entry of the archive. `label` names the source in errors.
pub fn decode_day_archive<R: Read + Seek>(reader: R, label: &str) -> Result<Vec<KlineRecord>, KlineError> {
    let mut archive: ZipArchive<R> = ZipArchive::new(reader)?;

    // #1. Locate the CSV entry
    let mut csv_index: Option<usize> = None;
    for i in 0..archive.len() {
        if archive.by_index(i)?.name().to_ascii_lowercase().ends_with(".csv") {
            csv_index = Some(i);
            break;
        }
    }

    let csv_index: usize = csv_index.ok_or_else(|| KlineError::EmptyArchive { path: label.to_string() })?;

    let mut buffer: String = String::new();
    archive.by_index(csv_index)?.read_to_string(&mut buffer)?;

    // #2. Parse Rows
    let mut reader = ReaderBuilder::new()
        .has_headers(detect_csv_headers(&buffer))
        .flexible(true)
        .from_reader(buffer.as_bytes());

    let mut unit: Option<TimestampUnit> = None;
    let mut records: Vec<KlineRecord> = Vec::new();

    for result in reader.records() {
        let row: StringRecord = result?;
        let get_f64 = |idx: usize| -> f64 {
            row.get(idx)
                .and_then(|field| field.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        };

        let open_raw: f64 = get_f64(0);
        let close_raw: f64 = get_f64(6);

        if !open_raw.is_finite() || !close_raw.is_finite() {
            debug!("Skipping row without timestamps in {}: {:?}", label, row);
            continue;
        }

        // #3. Timestamp Unit
        // Decided once per day from the first timestamp; older files use ms, newer ones µs.
        let day_unit: TimestampUnit = match unit {
            Some(u) => u,
            None => {
                let u: TimestampUnit = infer_timestamp_unit(open_raw)?;
                unit = Some(u);
                u
            }
        };

        let candle: Candle = Candle {
            open_time: day_unit.to_millis(open_raw),
            open: get_f64(1),
            high: get_f64(2),
            low: get_f64(3),
            close: get_f64(4),
            volume: get_f64(5),
            close_time: day_unit.to_millis(close_raw),
            quote_asset_volume: get_f64(7),
            trade_count: get_f64(8),
            taker_buy_base_volume: get_f64(9),
            taker_buy_quote_volume: get_f64(10),
        };

        records.push(KlineRecord::from(candle));
    }

    if records.is_empty() {
        return Err(KlineError::EmptyArchive { path: label.to_string() });
    }

    Ok(records)
}

/// Newer archives start with a header line. A first field that is not a
/// number means the line is a header.
pub fn detect_csv_headers(buffer: &str) -> bool {
    match buffer.lines().next() {
        Some(first_line) => {
            let first_field: &str = first_line.split(',').next().unwrap_or("").trim();
            !first_field.is_empty() && first_field.parse::<f64>().is_err()
        }
        None => false,
    }
}
