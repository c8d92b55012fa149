//! Parsers for the 1.x wire-format family

use serde_json::Value;
use uuid::Uuid;

use super::{
    bool_field, count_field, int_field, parse_platform, required_instance_id, resolve_site_hash,
    sample_object, str_field,
};
use crate::types::{LicenseUsageExtensions, LicenseUsageSample, Result};

/// 1.0: oldest field set. No excluded counters yet; identity comes entirely
/// from the caller.
pub(super) fn parse_sample_v1_0(
    instance_id: Option<Uuid>,
    site_hash: &str,
    raw: &Value,
) -> Result<LicenseUsageSample> {
    const VERSION: &str = "1.0";
    let obj = sample_object(raw, VERSION)?;
    let site_hash = resolve_site_hash(obj, site_hash, VERSION)?;
    let extensions = LicenseUsageExtensions::parse_from_sample(raw)?;
    Ok(LicenseUsageSample {
        instance_id,
        site_hash,
        version: str_field(obj, "version", VERSION)?,
        edition: str_field(obj, "edition", VERSION)?,
        platform: parse_platform(&str_field(obj, "platform", VERSION)?),
        is_cma: bool_field(obj, "is_cma", VERSION)?,
        sample_time: int_field(obj, "sample_time", VERSION)?,
        timezone: str_field(obj, "timezone", VERSION)?,
        num_hosts: count_field(obj, "num_hosts", VERSION)?,
        num_hosts_cloud: 0,
        num_hosts_shadow: 0,
        num_hosts_excluded: 0,
        num_services: count_field(obj, "num_services", VERSION)?,
        num_services_cloud: 0,
        num_services_shadow: 0,
        num_services_excluded: 0,
        num_synthetic_tests: 0,
        num_synthetic_tests_excluded: 0,
        extension_ntop: extensions.ntop,
    })
}

/// 1.1/1.2/1.3: adds the excluded-host and excluded-service counters.
pub(super) fn parse_sample_v1_1(
    instance_id: Option<Uuid>,
    site_hash: &str,
    raw: &Value,
) -> Result<LicenseUsageSample> {
    const VERSION: &str = "1.1/1.2/1.3";
    let obj = sample_object(raw, VERSION)?;
    let site_hash = resolve_site_hash(obj, site_hash, VERSION)?;
    let extensions = LicenseUsageExtensions::parse_from_sample(raw)?;
    Ok(LicenseUsageSample {
        instance_id,
        site_hash,
        version: str_field(obj, "version", VERSION)?,
        edition: str_field(obj, "edition", VERSION)?,
        platform: parse_platform(&str_field(obj, "platform", VERSION)?),
        is_cma: bool_field(obj, "is_cma", VERSION)?,
        sample_time: int_field(obj, "sample_time", VERSION)?,
        timezone: str_field(obj, "timezone", VERSION)?,
        num_hosts: count_field(obj, "num_hosts", VERSION)?,
        num_hosts_cloud: 0,
        num_hosts_shadow: 0,
        num_hosts_excluded: count_field(obj, "num_hosts_excluded", VERSION)?,
        num_services: count_field(obj, "num_services", VERSION)?,
        num_services_cloud: 0,
        num_services_shadow: 0,
        num_services_excluded: count_field(obj, "num_services_excluded", VERSION)?,
        num_synthetic_tests: 0,
        num_synthetic_tests_excluded: 0,
        extension_ntop: extensions.ntop,
    })
}

/// 1.4: adds the shadow-host count, still under its old field name.
pub(super) fn parse_sample_v1_4(
    instance_id: Option<Uuid>,
    site_hash: &str,
    raw: &Value,
) -> Result<LicenseUsageSample> {
    const VERSION: &str = "1.4";
    let obj = sample_object(raw, VERSION)?;
    let site_hash = resolve_site_hash(obj, site_hash, VERSION)?;
    let extensions = LicenseUsageExtensions::parse_from_sample(raw)?;
    Ok(LicenseUsageSample {
        instance_id,
        site_hash,
        version: str_field(obj, "version", VERSION)?,
        edition: str_field(obj, "edition", VERSION)?,
        platform: parse_platform(&str_field(obj, "platform", VERSION)?),
        is_cma: bool_field(obj, "is_cma", VERSION)?,
        sample_time: int_field(obj, "sample_time", VERSION)?,
        timezone: str_field(obj, "timezone", VERSION)?,
        num_hosts: count_field(obj, "num_hosts", VERSION)?,
        num_hosts_cloud: 0,
        num_hosts_shadow: count_field(obj, "num_shadow_hosts", VERSION)?,
        num_hosts_excluded: count_field(obj, "num_hosts_excluded", VERSION)?,
        num_services: count_field(obj, "num_services", VERSION)?,
        num_services_cloud: 0,
        num_services_shadow: 0,
        num_services_excluded: count_field(obj, "num_services_excluded", VERSION)?,
        num_synthetic_tests: 0,
        num_synthetic_tests_excluded: 0,
        extension_ntop: extensions.ntop,
    })
}

/// 1.5: first version where the submitter reports its own instance ID.
pub(super) fn parse_sample_v1_5(site_hash: &str, raw: &Value) -> Result<LicenseUsageSample> {
    const VERSION: &str = "1.5";
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
        num_hosts_cloud: 0,
        num_hosts_shadow: count_field(obj, "num_shadow_hosts", VERSION)?,
        num_hosts_excluded: count_field(obj, "num_hosts_excluded", VERSION)?,
        num_services: count_field(obj, "num_services", VERSION)?,
        num_services_cloud: 0,
        num_services_shadow: 0,
        num_services_excluded: count_field(obj, "num_services_excluded", VERSION)?,
        num_synthetic_tests: 0,
        num_synthetic_tests_excluded: 0,
        extension_ntop: extensions.ntop,
    })
}
