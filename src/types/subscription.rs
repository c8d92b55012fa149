//! Subscription window and usage ceiling types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{LictrackError, Result};

/// Published subscription sizes. Anything else is a negotiated custom limit.
const SUBSCRIPTION_LIMITS_FIXED: &[&str] = &[
    "3000", "7000", "12000", "18000", "30000", "60000", "100000", "200000", "300000", "500000",
    "1000000", "1500000", "2000000", "2000000+",
];

/// Internal sentinel for an unlimited subscription. The license DB has no
/// unbounded integer field, so `-1` stands in everywhere.
const UNLIMITED_SENTINEL: i64 = -1;

/// A subscription's usage ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionLimit {
    /// One of the published subscription sizes.
    Fixed(i64),
    Unlimited,
    /// A negotiated size outside the published catalog.
    Custom(i64),
}

impl SubscriptionLimit {
    /// Numeric ceiling; `Unlimited` is the `-1` sentinel.
    pub fn value(&self) -> i64 {
        match self {
            SubscriptionLimit::Fixed(value) | SubscriptionLimit::Custom(value) => *value,
            SubscriptionLimit::Unlimited => UNLIMITED_SENTINEL,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            SubscriptionLimit::Fixed(_) => "fixed",
            SubscriptionLimit::Unlimited => "unlimited",
            SubscriptionLimit::Custom(_) => "custom",
        }
    }

    /// Report rendering: a `(type, value)` pair.
    pub fn for_report(&self) -> (&'static str, i64) {
        (self.type_name(), self.value())
    }

    /// Config rendering. Custom limits stay explicitly tagged so the config
    /// store can tell them apart from fixed ones at re-read time, even though
    /// untagged scalars are accepted on input.
    pub fn for_config(&self) -> Value {
        match self {
            SubscriptionLimit::Fixed(value) => Value::from(value.to_string()),
            SubscriptionLimit::Unlimited => Value::from("2000000+"),
            SubscriptionLimit::Custom(value) => json!(["custom", value]),
        }
    }

    /// Parse a raw limit: either a `(type, value)` pair or a bare scalar.
    pub fn parse(raw: &Value) -> Result<Self> {
        if let Some((raw_type, raw_value)) = as_pair(raw) {
            return Self::parse_tagged(&scalar_key(raw_type), raw_value);
        }
        if raw.is_string() || raw.is_number() {
            return Self::parse_tagged(&scalar_key(raw), raw);
        }
        Err(LictrackError::TypeMismatch(format!(
            "subscription limit: expected pair or scalar, got {raw}"
        )))
    }

    fn parse_tagged(raw_type: &str, raw_value: &Value) -> Result<Self> {
        // Tag check first: the "2000000+" literal never survives integer coercion.
        if raw_type == "2000000+" || raw_type == "unlimited" {
            return Ok(SubscriptionLimit::Unlimited);
        }
        let value = coerce_int(raw_value).ok_or_else(|| {
            LictrackError::InvalidValue(format!("subscription limit: {raw_value}"))
        })?;
        if value == UNLIMITED_SENTINEL {
            return Ok(SubscriptionLimit::Unlimited);
        }
        if SUBSCRIPTION_LIMITS_FIXED.contains(&scalar_key(raw_value).as_str()) {
            return Ok(SubscriptionLimit::Fixed(value));
        }
        Ok(SubscriptionLimit::Custom(value))
    }
}

/// Report rendering of [`SubscriptionDetails`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubscriptionDetails {
    pub subscription_start: i64,
    pub subscription_end: i64,
    pub subscription_limit: (String, i64),
}

/// Config rendering; the limit keeps its config form (numeric string,
/// `"2000000+"`, or a tagged custom pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubscriptionDetailsForConfig {
    pub subscription_start: i64,
    pub subscription_end: i64,
    pub subscription_limit: Value,
}

/// Subscription window plus usage ceiling. Created once per parse, held for
/// the aggregation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionDetails {
    /// Unix epoch seconds.
    pub start: i64,
    /// Unix epoch seconds.
    pub end: i64,
    pub limit: SubscriptionLimit,
}

impl SubscriptionDetails {
    /// Parse either encoding still seen in the wild:
    /// old `["manual", {...}]` pairs or the current flat mapping.
    pub fn parse(raw: &Value) -> Result<Self> {
        if let Some((_source, details)) = as_pair(raw) {
            if !details.is_object() {
                return Err(LictrackError::TypeMismatch(format!(
                    "subscription details: expected mapping, got {details}"
                )));
            }
            return Self::from_fields(details);
        }
        if raw.is_object() {
            return Self::from_fields(raw);
        }
        Err(LictrackError::TypeMismatch(format!(
            "subscription details: expected pair or mapping, got {raw}"
        )))
    }

    fn from_fields(raw: &Value) -> Result<Self> {
        Ok(Self {
            start: epoch_field(raw, "subscription_start")?,
            end: epoch_field(raw, "subscription_end")?,
            limit: SubscriptionLimit::parse(detail_field(raw, "subscription_limit")?)?,
        })
    }

    pub fn for_report(&self) -> RawSubscriptionDetails {
        let (limit_type, limit_value) = self.limit.for_report();
        RawSubscriptionDetails {
            subscription_start: self.start,
            subscription_end: self.end,
            subscription_limit: (limit_type.to_string(), limit_value),
        }
    }

    pub fn for_config(&self) -> RawSubscriptionDetailsForConfig {
        RawSubscriptionDetailsForConfig {
            subscription_start: self.start,
            subscription_end: self.end,
            subscription_limit: self.limit.for_config(),
        }
    }
}

fn as_pair(raw: &Value) -> Option<(&Value, &Value)> {
    match raw.as_array() {
        Some(items) if items.len() == 2 => Some((&items[0], &items[1])),
        _ => None,
    }
}

/// Stringified form used for tags and the fixed-catalog membership test.
fn scalar_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lenient integer coercion: integers, truncated floats, numeric strings.
fn coerce_int(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return Some(f as i64);
    }
    value.as_str().and_then(|s| s.trim().parse::<i64>().ok())
}

fn detail_field<'a>(raw: &'a Value, key: &str) -> Result<&'a Value> {
    raw.get(key)
        .ok_or_else(|| LictrackError::MissingField(format!("subscription details: {key}")))
}

fn epoch_field(raw: &Value, key: &str) -> Result<i64> {
    let value = detail_field(raw, key)?;
    coerce_int(value).ok_or_else(|| LictrackError::InvalidValue(format!("{key}: {value}")))
}
