//! Protocol version resolution and the per-version sample parsers
//!
//! Nine historical wire-format versions are still accepted from submitters
//! that cannot be upgraded. Each version differs only in which fields its
//! samples carry and how missing ones default; subscription details share a
//! single parser across all of them.

mod v1;
mod v2;
mod v3;

use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::types::{LicenseUsageSample, LictrackError, Result, SubscriptionDetails};

/// The wire-format versions still accepted from submitters. Closed set: a
/// new protocol version is an explicit code change, not a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V1_0,
    V1_1,
    V1_2,
    V1_3,
    V1_4,
    V1_5,
    V2_0,
    V2_1,
    V3_0,
}

impl ProtocolVersion {
    /// All supported versions, oldest first.
    pub const ALL: [ProtocolVersion; 9] = [
        ProtocolVersion::V1_0,
        ProtocolVersion::V1_1,
        ProtocolVersion::V1_2,
        ProtocolVersion::V1_3,
        ProtocolVersion::V1_4,
        ProtocolVersion::V1_5,
        ProtocolVersion::V2_0,
        ProtocolVersion::V2_1,
        ProtocolVersion::V3_0,
    ];

    /// The version spoken by current submitters.
    pub const CURRENT: ProtocolVersion = ProtocolVersion::V3_0;

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1_0 => "1.0",
            ProtocolVersion::V1_1 => "1.1",
            ProtocolVersion::V1_2 => "1.2",
            ProtocolVersion::V1_3 => "1.3",
            ProtocolVersion::V1_4 => "1.4",
            ProtocolVersion::V1_5 => "1.5",
            ProtocolVersion::V2_0 => "2.0",
            ProtocolVersion::V2_1 => "2.1",
            ProtocolVersion::V3_0 => "3.0",
        }
    }

    /// Version literal → parser selection. No fallback: the nine literals are
    /// exhaustive.
    pub fn from_literal(raw: &str) -> Result<Self> {
        match raw {
            "1.0" => Ok(ProtocolVersion::V1_0),
            "1.1" => Ok(ProtocolVersion::V1_1),
            "1.2" => Ok(ProtocolVersion::V1_2),
            "1.3" => Ok(ProtocolVersion::V1_3),
            "1.4" => Ok(ProtocolVersion::V1_4),
            "1.5" => Ok(ProtocolVersion::V1_5),
            "2.0" => Ok(ProtocolVersion::V2_0),
            "2.1" => Ok(ProtocolVersion::V2_1),
            "3.0" => Ok(ProtocolVersion::V3_0),
            other => Err(LictrackError::InvalidValue(format!(
                "unknown protocol version: {other:?}"
            ))),
        }
    }

    /// Parse one history entry into a canonical sample.
    ///
    /// `instance_id` and `site_hash` are caller-supplied fallbacks for wire
    /// versions that predate the corresponding sample field. From 1.5 on the
    /// sample must carry its own instance ID.
    pub fn parse_sample(
        &self,
        instance_id: Option<Uuid>,
        site_hash: &str,
        raw: &Value,
    ) -> Result<LicenseUsageSample> {
        match self {
            ProtocolVersion::V1_0 => v1::parse_sample_v1_0(instance_id, site_hash, raw),
            ProtocolVersion::V1_1 | ProtocolVersion::V1_2 | ProtocolVersion::V1_3 => {
                v1::parse_sample_v1_1(instance_id, site_hash, raw)
            }
            ProtocolVersion::V1_4 => v1::parse_sample_v1_4(instance_id, site_hash, raw),
            ProtocolVersion::V1_5 => v1::parse_sample_v1_5(site_hash, raw),
            ProtocolVersion::V2_0 | ProtocolVersion::V2_1 => v2::parse_sample_v2_0(site_hash, raw),
            ProtocolVersion::V3_0 => v3::parse_sample_v3_0(site_hash, raw),
        }
    }

    /// Subscription details share one parser across all nine versions.
    pub fn parse_subscription_details(&self, raw: &Value) -> Result<SubscriptionDetails> {
        SubscriptionDetails::parse(raw)
    }
}

/// Resolve the declared protocol version of a raw report.
pub fn parse_protocol_version(raw: &Value) -> Result<ProtocolVersion> {
    let Some(obj) = raw.as_object() else {
        return Err(LictrackError::TypeMismatch(format!(
            "report: expected mapping, got {raw}"
        )));
    };
    let Some(raw_version) = obj.get("VERSION").and_then(Value::as_str) else {
        return Err(LictrackError::TypeMismatch(
            "report: VERSION must be a string".into(),
        ));
    };
    ProtocolVersion::from_literal(raw_version)
}

/// A parsed report: resolved protocol version plus canonical samples.
#[derive(Debug, Clone, PartialEq)]
pub struct LicenseUsageReport {
    pub version: ProtocolVersion,
    pub samples: Vec<LicenseUsageSample>,
}

impl LicenseUsageReport {
    /// Parse a full `{VERSION, history}` report envelope.
    ///
    /// History entries that fail to parse are logged and skipped; one
    /// malformed record never blocks its siblings.
    pub fn parse(instance_id: Option<Uuid>, site_hash: &str, raw: &Value) -> Result<Self> {
        let version = parse_protocol_version(raw)?;
        let Some(history) = raw.get("history").and_then(Value::as_array) else {
            return Err(LictrackError::TypeMismatch(
                "report: history must be a list".into(),
            ));
        };
        let mut samples = Vec::with_capacity(history.len());
        for entry in history {
            match version.parse_sample(instance_id, site_hash, entry) {
                Ok(sample) => samples.push(sample),
                Err(err) => warn!(
                    version = version.as_str(),
                    %err,
                    "skipping unparsable history entry"
                ),
            }
        }
        Ok(Self { version, samples })
    }
}

// Shared field access for the per-version parse functions. Field presence is
// strict: a version's parser only ever reads the fields that version defines,
// so defaults come from construction, not from fallbacks here.

pub(crate) fn sample_object<'a>(raw: &'a Value, version: &str) -> Result<&'a Map<String, Value>> {
    raw.as_object().ok_or_else(|| {
        LictrackError::TypeMismatch(format!("parse sample {version}: expected mapping, got {raw}"))
    })
}

/// The raw field wins when present, even empty; only an absent field falls
/// back to the caller-supplied site hash.
pub(crate) fn resolve_site_hash(
    obj: &Map<String, Value>,
    fallback: &str,
    version: &str,
) -> Result<String> {
    let site_hash = match obj.get("site_hash") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => String::new(),
        Some(other) => {
            return Err(LictrackError::TypeMismatch(format!(
                "parse sample {version}: site hash {other}"
            )))
        }
        None => fallback.to_owned(),
    };
    if site_hash.is_empty() {
        return Err(LictrackError::MissingField(format!(
            "parse sample {version}: no site hash"
        )));
    }
    Ok(site_hash)
}

pub(crate) fn required_instance_id(obj: &Map<String, Value>, version: &str) -> Result<Uuid> {
    let raw_id = match obj.get("instance_id") {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Null) | None => "",
        Some(other) => {
            return Err(LictrackError::TypeMismatch(format!(
                "parse sample {version}: instance ID {other}"
            )))
        }
    };
    if raw_id.is_empty() {
        return Err(LictrackError::MissingField(format!(
            "parse sample {version}: no instance ID"
        )));
    }
    Uuid::parse_str(raw_id).map_err(|_| {
        LictrackError::InvalidValue(format!("parse sample {version}: instance ID {raw_id:?}"))
    })
}

pub(crate) fn str_field(obj: &Map<String, Value>, key: &str, version: &str) -> Result<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(LictrackError::TypeMismatch(format!(
            "parse sample {version}: {key} {other}"
        ))),
        None => Err(LictrackError::MissingField(format!(
            "parse sample {version}: {key}"
        ))),
    }
}

pub(crate) fn bool_field(obj: &Map<String, Value>, key: &str, version: &str) -> Result<bool> {
    match obj.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(LictrackError::TypeMismatch(format!(
            "parse sample {version}: {key} {other}"
        ))),
        None => Err(LictrackError::MissingField(format!(
            "parse sample {version}: {key}"
        ))),
    }
}

pub(crate) fn int_field(obj: &Map<String, Value>, key: &str, version: &str) -> Result<i64> {
    match obj.get(key) {
        Some(value) => value.as_i64().ok_or_else(|| {
            LictrackError::TypeMismatch(format!("parse sample {version}: {key} {value}"))
        }),
        None => Err(LictrackError::MissingField(format!(
            "parse sample {version}: {key}"
        ))),
    }
}

pub(crate) fn count_field(obj: &Map<String, Value>, key: &str, version: &str) -> Result<u64> {
    match obj.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            LictrackError::TypeMismatch(format!("parse sample {version}: {key} {value}"))
        }),
        None => Err(LictrackError::MissingField(format!(
            "parse sample {version}: {key}"
        ))),
    }
}

/// Platform strings are capped at 50 characters, the width of the license DB
/// column they end up in.
pub(crate) fn parse_platform(platform: &str) -> String {
    platform.chars().take(50).collect()
}
