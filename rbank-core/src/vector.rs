//! Defensive cosine similarity.
//!
//! All similarity math in the crate funnels through [`cosine_similarity`],
//! which never panics and never divides by zero: malformed, mismatched, or
//! zero-magnitude inputs produce `0.0` and a warning instead of an error.
//!
//! [`cosine_of_json`] additionally accepts the loose shapes produced by
//! document stores — a bare JSON array, or an object wrapping the components
//! under a `values` / `_values` field — and unwraps them uniformly before
//! computing.

use serde_json::Value;
use tracing::warn;

/// Compute the cosine similarity between two vectors in double precision.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` when the vectors are
/// empty, of mismatched length, or either has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() {
        warn!(len_a = a.len(), len_b = b.len(), "cosine: empty vector");
        return 0.0;
    }
    if a.len() != b.len() {
        warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine: mismatched vector lengths"
        );
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut mag_a = 0.0_f64;
    let mut mag_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    // Guard against floating-point drift past the mathematical bounds.
    (dot / denom).clamp(-1.0, 1.0)
}

/// Unwrap a JSON value into a vector of components.
///
/// Accepts a bare array of numbers, or an object carrying the array under a
/// `values` or `_values` field (the wrapper shape document stores attach to
/// vector columns). Returns `None` for anything else, including arrays with
/// non-numeric or non-finite members.
#[must_use]
pub fn unwrap_vector(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let n = item.as_f64()?;
                if !n.is_finite() {
                    return None;
                }
                #[allow(clippy::cast_possible_truncation)]
                out.push(n as f32);
            }
            Some(out)
        }
        Value::Object(map) => map
            .get("values")
            .or_else(|| map.get("_values"))
            .and_then(unwrap_vector),
        _ => None,
    }
}

/// Cosine similarity over loose JSON inputs.
///
/// Unwraps both sides with [`unwrap_vector`]; any input that fails to unwrap
/// yields `0.0` with a warning.
#[must_use]
pub fn cosine_of_json(a: &Value, b: &Value) -> f64 {
    let (Some(va), Some(vb)) = (unwrap_vector(a), unwrap_vector(b)) else {
        warn!("cosine: input is not a vector shape");
        return 0.0;
    };
    cosine_similarity(&va, &vb)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
