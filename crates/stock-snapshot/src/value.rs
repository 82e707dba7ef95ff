//! Scalar values and the sanitizer that makes them JSON-safe
//!
//! Provider data is noisy: floats arrive as NaN or infinity, fields go
//! missing, integers and text are mixed in the same record. Everything that
//! reaches a response passes through [`sanitize`] (or [`scrub`] for
//! pass-through collections) so that the output only ever holds finite
//! numbers, text, booleans and `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder emitted for an identity or valuation field the provider did not report
pub const NOT_AVAILABLE: &str = "N/A";

/// A raw scalar as delivered by a data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Scalar {
    /// Build a scalar from a JSON value
    ///
    /// Yahoo wraps many numbers as `{"raw": 1.5, "fmt": "1.50"}`; the raw
    /// number is taken. Arrays and other objects carry no scalar and give
    /// `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(
                n.as_i64()
                    .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            ),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Object(map) => match map.get("raw") {
                Some(raw) if !raw.is_object() => Self::from_json(raw),
                _ if map.is_empty() => Some(Self::Null),
                _ => None,
            },
            Value::Array(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::Float(value as f64), Self::Int)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A scalar that has been through [`sanitize`]
///
/// Floats inside are finite and carry at most two decimal places. The only
/// way to build one is through the sanitizer or the `"N/A"` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CleanValue(Scalar);

impl CleanValue {
    /// The `null` sentinel
    pub const fn null() -> Self {
        Self(Scalar::Null)
    }

    /// The `"N/A"` placeholder for a field the source did not report
    pub fn not_available() -> Self {
        Self(Scalar::Text(NOT_AVAILABLE.to_string()))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn is_not_available(&self) -> bool {
        matches!(&self.0, Scalar::Text(s) if s == NOT_AVAILABLE)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            Scalar::Float(f) => Some(f),
            Scalar::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn into_inner(self) -> Scalar {
        self.0
    }
}

impl From<CleanValue> for Scalar {
    fn from(value: CleanValue) -> Self {
        value.0
    }
}

/// Normalize a raw value into a JSON-safe one
///
/// Null and non-finite floats become `null`, finite floats are rounded to two
/// decimals, everything else passes through unchanged.
pub fn sanitize(value: impl Into<Scalar>) -> CleanValue {
    match value.into() {
        Scalar::Float(f) if !f.is_finite() => CleanValue::null(),
        Scalar::Float(f) => CleanValue(Scalar::Float(round2(f))),
        other => CleanValue(other),
    }
}

/// Null out non-finite floats without rounding
pub fn scrub(value: Scalar) -> Scalar {
    match value {
        Scalar::Float(f) if !f.is_finite() => Scalar::Null,
        other => other,
    }
}

/// Round to two decimals, settling on a fixed point of the rounding
///
/// Past roughly 2^43 the round trip through hundredths is inexact and one
/// pass can land on a neighbour that rounds differently again. Up to a few
/// extra passes are taken; if none settles the value is returned as is, so
/// that sanitizing twice never changes the result.
fn round2(value: f64) -> f64 {
    let mut current = round_hundredths(value);
    for _ in 0..4 {
        let next = round_hundredths(current);
        if next.to_bits() == current.to_bits() {
            return current;
        }
        current = next;
    }
    value
}

fn round_hundredths(value: f64) -> f64 {
    let scaled = value * 100.0;
    // Only overflows at magnitudes that hold no hundredths anyway.
    if scaled.is_finite() {
        scaled.round() / 100.0
    } else {
        value
    }
}
