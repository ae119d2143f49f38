use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// UTC hours (inclusive) considered unusual for human-driven activity.
pub const UNUSUAL_HOURS: std::ops::RangeInclusive<u32> = 1..=5;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// stddev / mean, or `None` when the mean is zero.
pub fn variation_ratio(values: &[f64]) -> Option<f64> {
    let m = mean(values);
    if m == 0.0 {
        return None;
    }
    Some(std_dev(values) / m)
}

/// Seconds between consecutive timestamps. Input must be sorted.
pub fn deltas_secs(timestamps: &[DateTime<Utc>]) -> Vec<f64> {
    timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
        .collect()
}

pub fn is_unusual_hour(ts: &DateTime<Utc>) -> bool {
    UNUSUAL_HOURS.contains(&ts.hour())
}

pub fn utc_day(ts: &DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// `(value - mean) / stddev` style outlier test: `count > mean + k*stddev`.
pub fn is_outlier(value: f64, values: &[f64], k: f64) -> bool {
    value > mean(values) + k * std_dev(values)
}
