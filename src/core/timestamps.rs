// @file: kline_engine/src/core/timestamps.rs
// @description: Timestamp unit inference for archive files whose precision changed over time.
// @author: LAS.

use crate::core::errors::KlineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimestampUnit {
    pub fn to_millis(self, value: f64) -> i64 {
        let millis: f64 = match self {
            TimestampUnit::Seconds => value * 1e3,
            TimestampUnit::Millis => value,
            TimestampUnit::Micros => value / 1e3,
            TimestampUnit::Nanos => value / 1e6,
        };
        millis.round() as i64
    }
}

/// Infers the unit from the magnitude of one sample.
///
/// | range           | unit    |
/// |-----------------|---------|
/// | `< 1e10`        | invalid |
/// | `[1e10, 1e12)`  | seconds |
/// | `[1e12, 1e15)`  | millis  |
/// | `[1e15, 1e18)`  | micros  |
/// | `>= 1e18`       | nanos   |
pub fn infer_timestamp_unit(value: f64) -> Result<TimestampUnit, KlineError> {
    // NaN fails every comparison below, so reject it explicitly
    if value.is_nan() || value < 1e10 {
        return Err(KlineError::TimestampTooSmall { value });
    }

    let unit: TimestampUnit = if value < 1e12 {
        TimestampUnit::Seconds
    } else if value < 1e15 {
        TimestampUnit::Millis
    } else if value < 1e18 {
        TimestampUnit::Micros
    } else {
        TimestampUnit::Nanos
    };

    Ok(unit)
}
