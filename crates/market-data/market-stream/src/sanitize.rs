//! Numeric sanitizer for untrusted wire fields
//!
//! Exchange frames carry numbers as JSON strings ("68500.10") and occasionally as
//! JSON numbers. Every field is validated on its own so one corrupt field never
//! costs the whole message; what happens to an invalid field is decided by the
//! caller through the fallback it passes in.

use serde_json::Value;

/// Parse a raw field into a finite `f64`
///
/// Accepts JSON numbers and numeric strings. Anything else (null, bool, garbage
/// text, NaN, infinities) yields `None`.
#[must_use]
pub fn parse(raw: &Value) -> Option<f64> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}

/// Parse a raw field, substituting `fallback` when it is invalid
#[inline]
#[must_use]
pub fn sanitize(raw: &Value, fallback: f64) -> f64 {
    parse(raw).unwrap_or(fallback)
}

/// Parse a load-bearing price field
///
/// Zero and negative values are rejected the same way NaN is.
#[inline]
#[must_use]
pub fn positive(raw: &Value) -> Option<f64> {
    parse(raw).filter(|v| *v > 0.0)
}
