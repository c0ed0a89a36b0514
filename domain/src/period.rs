//! Pure timestamp-to-period-index arithmetic.
//!
//! Both functions are defensive: a zero window or a negative time value
//! (a malformed or malicious client timestamp) maps to period 0 rather
//! than panicking or dividing by zero.

/// `seconds / window`, with `window == 0` and negative `seconds` both
/// mapping to 0.
pub fn period(seconds: i64, window: u64) -> u64 {
    if window == 0 || seconds < 0 {
        return 0;
    }
    (seconds as u64) / window
}

/// `period(seconds_from_nanos(ns), window)`, truncating nanoseconds down
/// to whole seconds. Negative nanoseconds map to 0.
pub fn period_from_nanos(ns: i128, window: u64) -> u64 {
    if window == 0 || ns < 0 {
        return 0;
    }
    let secs = (ns / 1_000_000_000) as u64;
    period(secs as i64, window)
}
