//! Canonical license usage sample types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{LictrackError, Result};

/// Wire shape of the submitted report envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLicenseUsageReport {
    #[serde(rename = "VERSION")]
    pub version: String,
    pub history: Vec<RawLicenseUsageSample>,
}

/// Wire shape of the extension flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLicenseUsageExtensions {
    pub ntop: bool,
}

/// Optional feature-usage indicators carried alongside the core counters.
/// Currently only network-topology monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseUsageExtensions {
    pub ntop: bool,
}

impl LicenseUsageExtensions {
    pub fn for_report(&self) -> RawLicenseUsageExtensions {
        RawLicenseUsageExtensions { ntop: self.ntop }
    }

    pub fn parse(raw: &Value) -> Result<Self> {
        let Some(obj) = raw.as_object() else {
            return Err(LictrackError::TypeMismatch(format!(
                "extensions: expected mapping, got {raw}"
            )));
        };
        Ok(Self {
            ntop: obj.get("ntop").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Resolve the extension flags from a raw sample.
    ///
    /// Old samples nest them (`{"extensions": {"ntop": ...}}`), new ones
    /// flatten them (`{"extension_ntop": ...}`). The flattened key wins when
    /// both are present.
    pub fn parse_from_sample(raw: &Value) -> Result<Self> {
        let Some(obj) = raw.as_object() else {
            return Err(LictrackError::TypeMismatch(format!(
                "extensions: expected sample mapping, got {raw}"
            )));
        };
        let ntop = obj
            .get("extension_ntop")
            .or_else(|| obj.get("extensions").and_then(|nested| nested.get("ntop")))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Self { ntop })
    }
}

/// Wire shape of one usage sample (the protocol 3.0 field set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLicenseUsageSample {
    pub instance_id: Option<String>,
    pub site_hash: String,
    pub version: String,
    pub edition: String,
    pub platform: String,
    pub is_cma: bool,
    pub sample_time: i64,
    pub timezone: String,
    pub num_hosts: u64,
    pub num_hosts_cloud: u64,
    pub num_hosts_shadow: u64,
    pub num_hosts_excluded: u64,
    pub num_services: u64,
    pub num_services_cloud: u64,
    pub num_services_shadow: u64,
    pub num_services_excluded: u64,
    pub num_synthetic_tests: u64,
    pub num_synthetic_tests_excluded: u64,
    pub extension_ntop: bool,
}

/// Canonical, version-independent usage sample. One instance per submitted
/// record, never mutated after parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseUsageSample {
    /// Absent in wire versions up to 1.4, where only the receiving
    /// installation knows its own ID.
    pub instance_id: Option<Uuid>,
    pub site_hash: String,
    pub version: String,
    pub edition: String,
    pub platform: String,
    pub is_cma: bool,
    /// Unix epoch seconds.
    pub sample_time: i64,
    pub timezone: String,
    pub num_hosts: u64,
    pub num_hosts_cloud: u64,
    pub num_hosts_shadow: u64,
    pub num_hosts_excluded: u64,
    pub num_services: u64,
    pub num_services_cloud: u64,
    pub num_services_shadow: u64,
    pub num_services_excluded: u64,
    pub num_synthetic_tests: u64,
    pub num_synthetic_tests_excluded: u64,
    pub extension_ntop: bool,
}

impl LicenseUsageSample {
    pub fn for_report(&self) -> RawLicenseUsageSample {
        RawLicenseUsageSample {
            instance_id: self.instance_id.map(|id| id.to_string()),
            site_hash: self.site_hash.clone(),
            version: self.version.clone(),
            edition: self.edition.clone(),
            platform: self.platform.clone(),
            is_cma: self.is_cma,
            sample_time: self.sample_time,
            timezone: self.timezone.clone(),
            num_hosts: self.num_hosts,
            num_hosts_cloud: self.num_hosts_cloud,
            num_hosts_shadow: self.num_hosts_shadow,
            num_hosts_excluded: self.num_hosts_excluded,
            num_services: self.num_services,
            num_services_cloud: self.num_services_cloud,
            num_services_shadow: self.num_services_shadow,
            num_services_excluded: self.num_services_excluded,
            num_synthetic_tests: self.num_synthetic_tests,
            num_synthetic_tests_excluded: self.num_synthetic_tests_excluded,
            extension_ntop: self.extension_ntop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extensions_report_idempotent() {
        for ntop in [false, true] {
            let extensions = LicenseUsageExtensions { ntop };
            let raw = serde_json::to_value(extensions.for_report()).unwrap();
            assert_eq!(LicenseUsageExtensions::parse(&raw).unwrap(), extensions);
        }
    }

    #[test]
    fn test_extensions_parse_defaults_false() {
        assert!(!LicenseUsageExtensions::parse(&json!({})).unwrap().ntop);
    }

    #[test]
    fn test_extensions_parse_rejects_non_mapping() {
        assert!(matches!(
            LicenseUsageExtensions::parse(&json!([1, 2])),
            Err(LictrackError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_extensions_from_sample_flattened_wins() {
        let raw = json!({
            "extension_ntop": true,
            "extensions": {"ntop": false},
        });
        assert!(LicenseUsageExtensions::parse_from_sample(&raw).unwrap().ntop);

        let raw = json!({
            "extension_ntop": false,
            "extensions": {"ntop": true},
        });
        assert!(!LicenseUsageExtensions::parse_from_sample(&raw).unwrap().ntop);
    }

    #[test]
    fn test_extensions_from_sample_nested_fallback() {
        let raw = json!({"extensions": {"ntop": true}});
        assert!(LicenseUsageExtensions::parse_from_sample(&raw).unwrap().ntop);

        assert!(!LicenseUsageExtensions::parse_from_sample(&json!({}))
            .unwrap()
            .ntop);
    }

    fn minimal_sample() -> LicenseUsageSample {
        LicenseUsageSample {
            instance_id: Uuid::parse_str("650b1f5e-9d21-43e9-ad54-24b3392b3d81").ok(),
            site_hash: "a1b2c3".into(),
            version: "2.3.0p5".into(),
            edition: "cee".into(),
            platform: "Ubuntu 22.04".into(),
            is_cma: false,
            sample_time: 1_704_100_000,
            timezone: "Europe/Berlin".into(),
            num_hosts: 12,
            num_hosts_cloud: 1,
            num_hosts_shadow: 0,
            num_hosts_excluded: 2,
            num_services: 340,
            num_services_cloud: 10,
            num_services_shadow: 0,
            num_services_excluded: 5,
            num_synthetic_tests: 3,
            num_synthetic_tests_excluded: 0,
            extension_ntop: true,
        }
    }

    #[test]
    fn test_sample_for_report_stringifies_instance_id() {
        let report = minimal_sample().for_report();
        assert_eq!(
            report.instance_id.as_deref(),
            Some("650b1f5e-9d21-43e9-ad54-24b3392b3d81")
        );
        assert_eq!(report.num_services, 340);
        assert!(report.extension_ntop);
    }

    #[test]
    fn test_sample_for_report_keeps_absent_instance_id() {
        let sample = LicenseUsageSample {
            instance_id: None,
            ..minimal_sample()
        };
        assert_eq!(sample.for_report().instance_id, None);
    }

    #[test]
    fn test_report_envelope_serde_round_trip() {
        let raw = RawLicenseUsageReport {
            version: "3.0".into(),
            history: vec![minimal_sample().for_report()],
        };
        let value = serde_json::to_value(&raw).unwrap();
        assert_eq!(value["VERSION"], json!("3.0"));
        let back: RawLicenseUsageReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, raw);
    }
}
