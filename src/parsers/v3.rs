//! Parser for the current 3.0 wire format

use serde_json::Value;

use super::{
    bool_field, count_field, int_field, parse_platform, required_instance_id, resolve_site_hash,
    sample_object, str_field,
};
use crate::types::{LicenseUsageExtensions, LicenseUsageSample, Result};

/// 3.0: the full field set, including synthetic test counters.
pub(super) fn parse_sample_v3_0(site_hash: &str, raw: &Value) -> Result<LicenseUsageSample> {
    const VERSION: &str = "3.0";
    let obj = sample_object(raw, VERSION)?;
    let instance_id = required_instance_id(obj, VERSION)?;
    let site_hash = resolve_site_hash(obj, site_hash, VERSION)?;
    let extensions = LicenseUsageExtensions::parse_from_sample(raw)?;
    Ok(LicenseUsageSample {
        instance_id: Some(instance_id),
        site_hash,
        version: str_field(obj, "version", VERSION)?,
        edition: str_field(obj, "edition", VERSION)?,
        platform: parse_platform(&str_field(obj, "platform", VERSION)?),
        is_cma: bool_field(obj, "is_cma", VERSION)?,
        sample_time: int_field(obj, "sample_time", VERSION)?,
        timezone: str_field(obj, "timezone", VERSION)?,
        num_hosts: count_field(obj, "num_hosts", VERSION)?,
        num_hosts_cloud: count_field(obj, "num_hosts_cloud", VERSION)?,
        num_hosts_shadow: count_field(obj, "num_hosts_shadow", VERSION)?,
        num_hosts_excluded: count_field(obj, "num_hosts_excluded", VERSION)?,
        num_services: count_field(obj, "num_services", VERSION)?,
        num_services_cloud: count_field(obj, "num_services_cloud", VERSION)?,
        num_services_shadow: count_field(obj, "num_services_shadow", VERSION)?,
        num_services_excluded: count_field(obj, "num_services_excluded", VERSION)?,
        num_synthetic_tests: count_field(obj, "num_synthetic_tests", VERSION)?,
        num_synthetic_tests_excluded: count_field(obj, "num_synthetic_tests_excluded", VERSION)?,
        extension_ntop: extensions.ntop,
    })
}
