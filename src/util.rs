//! Shared helpers: timestamps and money conversion.
//!
//! Money is stored and computed as integer cents. The JSON API speaks decimal
//! reais (`100.00`), so request amounts are converted once at the edge.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serializer};

use crate::error::msg;

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Largest amount accepted from clients: R$ 1.000.000,00.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000;

/// Convert a decimal reais amount into cents, rounding half up.
///
/// Returns None for NaN, infinities and amounts above `MAX_AMOUNT_CENTS`
/// in either direction.
pub fn reais_to_cents(reais: f64) -> Option<i64> {
    if !reais.is_finite() {
        return None;
    }
    let cents = (reais * 100.0).round();
    if cents.abs() > MAX_AMOUNT_CENTS as f64 {
        return None;
    }
    Some(cents as i64)
}

pub fn cents_to_reais(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Format cents as `R$ 85,00` for notifications.
pub fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}R$ {},{:02}", sign, abs / 100, abs % 100)
}

/// Serde adapter: cents field <-> decimal reais in JSON.
pub mod reais {
    use super::*;

    pub fn serialize<S: Serializer>(cents: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(cents_to_reais(*cents))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = f64::deserialize(deserializer)?;
        reais_to_cents(value).ok_or_else(|| serde::de::Error::custom(msg::AMOUNT_OUT_OF_RANGE))
    }
}

/// Serde adapter for optional cents fields.
pub mod reais_opt {
    use super::*;

    pub fn serialize<S: Serializer>(cents: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match cents {
            Some(c) => serializer.serialize_some(&cents_to_reais(*c)),
            None => serializer.serialize_none(),
        }
    }
}
