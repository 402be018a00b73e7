//! Per-field coercion of raw feed text
//!
//! Feeds carry no column types, so every field is sniffed on its own:
//! empty text becomes NULL, text that fully parses as a finite number becomes a
//! number, and anything else is kept as the original string. Two rows can
//! therefore coerce the same column differently; `CoercionTracker` records the
//! columns where that happened so loaders can report them.

use feedload_core::Value;

/// Largest integer an f64 represents exactly (2^53)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Coerce one raw field.
///
/// Plain integer text that fits an `i64` is returned exactly as `Int64`.
/// Other numeric text goes through `f64`: integral results within the exactly
/// representable range still become `Int64` so SQLite stores them as integers,
/// the rest `Float64`. `NaN` and infinities are not numbers here and stay strings.
pub fn coerce_field(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }

    if let Ok(integer) = raw.parse::<i64>() {
        return Value::Int64(integer);
    }

    match raw.parse::<f64>() {
        Ok(number) if number.is_finite() => {
            if number.fract() == 0.0 && number.abs() <= MAX_EXACT_INTEGER {
                Value::Int64(number as i64)
            } else {
                Value::Float64(number)
            }
        }
        _ => Value::String(raw.to_string()),
    }
}

/// Observed value kinds per column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ColumnKinds {
    number: bool,
    string: bool,
}

/// Tracks which columns coerced to both numbers and strings within one file
#[derive(Debug, Clone, Default)]
pub struct CoercionTracker {
    columns: Vec<ColumnKinds>,
}

impl CoercionTracker {
    pub fn new(column_count: usize) -> Self {
        Self {
            columns: vec![ColumnKinds::default(); column_count],
        }
    }

    pub fn observe(&mut self, values: &[Value]) {
        for (kinds, value) in self.columns.iter_mut().zip(values) {
            match value {
                Value::Int64(_) | Value::Float64(_) => kinds.number = true,
                Value::String(_) => kinds.string = true,
                _ => {}
            }
        }
    }

    /// Indices of columns that saw both numeric and non-numeric text
    pub fn mixed_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, kinds)| kinds.number && kinds.string)
            .map(|(idx, _)| idx)
            .collect()
    }
}
