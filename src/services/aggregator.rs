//! Monthly service-average aggregation against a subscription window
//!
//! Irregular `(timestamp, count)` pairs are bucketed into local calendar
//! days, then into month windows anchored at the subscription start date.
//! Only fully elapsed months that lie inside the subscription are averaged;
//! the running month and anything past the subscription end stay out.

use std::collections::BTreeMap;

use chrono::{Local, Months, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::types::{LictrackError, Result};

/// Upstream keeps at most 400 days of per-site history; older daily buckets
/// are dropped to match.
const DAILY_RETENTION_CAP: usize = 400;

/// Service ceiling of the free tier.
const FREE_TIER_LIMIT: u64 = 3;

/// Usage ceiling as seen by the aggregation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationLimit {
    Unlimited,
    /// Free tier, with its fixed ceiling of [`FREE_TIER_LIMIT`] services.
    Free,
    /// Positive service ceiling.
    Limited(u64),
}

/// Subscription window plus ceiling, reduced to what aggregation needs.
///
/// A missing start or end disables monthly averaging; daily data still flows
/// through. A missing limit disables exceedance detection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionForAggregation {
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<AggregationLimit>,
}

impl SubscriptionForAggregation {
    pub fn new(
        start: Option<i64>,
        end: Option<i64>,
        limit: Option<AggregationLimit>,
    ) -> Result<Self> {
        if limit == Some(AggregationLimit::Limited(0)) {
            return Err(LictrackError::InvalidValue(
                "subscription limit must be positive".into(),
            ));
        }
        Ok(Self { start, end, limit })
    }

    pub fn is_free(&self) -> bool {
        self.limit == Some(AggregationLimit::Free)
    }

    /// The numeric ceiling, if there is one.
    pub fn real_limit(&self) -> Option<u64> {
        match self.limit? {
            AggregationLimit::Unlimited => None,
            AggregationLimit::Free => Some(FREE_TIER_LIMIT),
            AggregationLimit::Limited(limit) => Some(limit),
        }
    }

    pub fn for_report(&self) -> RawSubscriptionForAggregation {
        RawSubscriptionForAggregation {
            start: self.start,
            end: self.end,
            limit: self.limit.map(|limit| match limit {
                AggregationLimit::Unlimited => json!("unlimited"),
                AggregationLimit::Free => json!(FREE_TIER_LIMIT),
                AggregationLimit::Limited(value) => json!(value),
            }),
        }
    }
}

/// One day's summed service count before aggregation, or one month's average
/// after.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyServiceAverage {
    pub sample_date: NaiveDate,
    pub num_services: f64,
}

impl MonthlyServiceAverage {
    /// Rendering for the report consumer: local-midnight epoch plus value.
    pub fn for_report(&self) -> ServiceReport {
        ServiceReport {
            sample_time: local_midnight_epoch(self.sample_date),
            num_services: self.num_services,
        }
    }
}

/// One point of the daily or monthly series, report form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub sample_time: f64,
    pub num_services: f64,
}

/// Report form of [`SubscriptionForAggregation`]; the limit flattens to
/// `"unlimited"`, a bare integer, or null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSubscriptionForAggregation {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<Value>,
}

/// The full aggregation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMonthlyServiceAggregation {
    pub subscription_details: RawSubscriptionForAggregation,
    pub daily_services: Vec<ServiceReport>,
    pub monthly_service_averages: Vec<ServiceReport>,
    pub last_service_report: Option<ServiceReport>,
    pub highest_service_report: Option<ServiceReport>,
    pub subscription_exceeded_first: Option<ServiceReport>,
}

/// Buckets `(timestamp, count)` pairs into days, then averages fully elapsed
/// months inside the subscription window.
///
/// Input pairs need not be sorted or deduplicated; bucketing takes care of
/// both before the month scan runs.
pub struct MonthlyServiceAverages {
    subscription: SubscriptionForAggregation,
    daily_services: Vec<MonthlyServiceAverage>,
    today: NaiveDate,
}

impl MonthlyServiceAverages {
    pub fn new(subscription: SubscriptionForAggregation, short_samples: &[(i64, u64)]) -> Self {
        Self::with_today(subscription, short_samples, Local::now().date_naive())
    }

    /// Like [`MonthlyServiceAverages::new`] with an explicit "today", for
    /// deterministic callers.
    pub fn with_today(
        subscription: SubscriptionForAggregation,
        short_samples: &[(i64, u64)],
        today: NaiveDate,
    ) -> Self {
        Self {
            subscription,
            daily_services: calculate_daily_services(short_samples),
            today,
        }
    }

    /// Daily buckets after retention, ascending by day.
    pub fn daily_services(&self) -> &[MonthlyServiceAverage] {
        &self.daily_services
    }

    pub fn get_aggregation(&self) -> RawMonthlyServiceAggregation {
        let monthly = self.calculate_averages();
        debug!(
            days = self.daily_services.len(),
            months = monthly.len(),
            "aggregated license usage"
        );
        RawMonthlyServiceAggregation {
            subscription_details: self.subscription.for_report(),
            daily_services: self
                .daily_services
                .iter()
                .map(MonthlyServiceAverage::for_report)
                .collect(),
            monthly_service_averages: monthly
                .iter()
                .map(MonthlyServiceAverage::for_report)
                .collect(),
            last_service_report: monthly.last().map(MonthlyServiceAverage::for_report),
            highest_service_report: highest(&monthly).map(MonthlyServiceAverage::for_report),
            subscription_exceeded_first: self
                .subscription_exceeded_first(&monthly)
                .map(MonthlyServiceAverage::for_report),
        }
    }

    fn calculate_averages(&self) -> Vec<MonthlyServiceAverage> {
        if self.daily_services.is_empty() {
            return Vec::new();
        }
        let (Some(start), Some(end)) = (self.subscription.start, self.subscription.end) else {
            // Without a subscription window there is nothing to anchor the
            // month windows to.
            return Vec::new();
        };
        let (Some(mut month_start), Some(subscription_end_date)) =
            (local_day(start), local_day(end))
        else {
            warn!(start, end, "subscription window outside representable time range");
            return Vec::new();
        };
        let Some(mut month_end) = next_month(month_start) else {
            return Vec::new();
        };

        // Forward scan over ascending days; the window advances at most one
        // month per encountered day.
        debug_assert!(self
            .daily_services
            .windows(2)
            .all(|pair| pair[0].sample_date < pair[1].sample_date));

        // Insertion order is chronological, so a Vec keeps months ordered
        // without re-sorting.
        let mut months: Vec<(NaiveDate, u64, u32)> = Vec::new();
        for daily in &self.daily_services {
            if daily.sample_date >= month_end {
                month_start = month_end;
                month_end = match next_month(month_start) {
                    Some(date) => date,
                    None => break,
                };
            }

            if month_end >= self.today || month_end > subscription_end_date {
                // The running month is not complete yet, and nothing after it
                // can be either.
                break;
            }

            if month_start <= daily.sample_date && daily.sample_date < month_end {
                match months.last_mut() {
                    Some((current, sum, days)) if *current == month_start => {
                        *sum += daily.num_services as u64;
                        *days += 1;
                    }
                    _ => months.push((month_start, daily.num_services as u64, 1)),
                }
            }
        }

        months
            .into_iter()
            .map(|(month, sum, days)| MonthlyServiceAverage {
                sample_date: month,
                num_services: sum as f64 / f64::from(days),
            })
            .collect()
    }

    fn subscription_exceeded_first<'a>(
        &self,
        monthly: &'a [MonthlyServiceAverage],
    ) -> Option<&'a MonthlyServiceAverage> {
        let limit = self.subscription.real_limit()?;
        monthly
            .iter()
            .find(|average| average.num_services >= limit as f64)
    }
}

fn calculate_daily_services(short_samples: &[(i64, u64)]) -> Vec<MonthlyServiceAverage> {
    let mut daily: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for &(sample_time, num_services) in short_samples {
        let Some(day) = local_day(sample_time) else {
            warn!(sample_time, "skipping sample outside representable time range");
            continue;
        };
        *daily.entry(day).or_insert(0) += num_services;
    }

    let skip = daily.len().saturating_sub(DAILY_RETENTION_CAP);
    daily
        .into_iter()
        .skip(skip)
        .map(|(sample_date, num_services)| MonthlyServiceAverage {
            sample_date,
            num_services: num_services as f64,
        })
        .collect()
}

/// Ties keep the earliest month, so only a strictly higher average wins.
fn highest(monthly: &[MonthlyServiceAverage]) -> Option<&MonthlyServiceAverage> {
    monthly
        .iter()
        .fold(None, |best: Option<&MonthlyServiceAverage>, candidate| {
            match best {
                Some(best) if best.num_services >= candidate.num_services => Some(best),
                _ => Some(candidate),
            }
        })
}

/// Local calendar day containing an epoch timestamp.
fn local_day(epoch: i64) -> Option<NaiveDate> {
    Local.timestamp_opt(epoch, 0).single().map(|dt| dt.date_naive())
}

/// Local midnight of a day, as an epoch float for report consumers.
fn local_midnight_epoch(date: NaiveDate) -> f64 {
    let midnight = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(dt) => dt.timestamp() as f64,
        // Midnight skipped by a DST jump: fall back to the UTC reading.
        None => midnight.and_utc().timestamp() as f64,
    }
}

/// One calendar month forward, end-of-month clamped (Jan 31 → Feb 28/29).
fn next_month(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn noon_ts(day: NaiveDate) -> i64 {
        Local
            .from_local_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
            .unwrap()
            .timestamp()
    }

    fn midnight_ts(day: NaiveDate) -> i64 {
        Local
            .from_local_datetime(&day.and_time(NaiveTime::MIN))
            .earliest()
            .unwrap()
            .timestamp()
    }

    fn subscription(start: NaiveDate, end: NaiveDate) -> SubscriptionForAggregation {
        SubscriptionForAggregation::new(Some(midnight_ts(start)), Some(midnight_ts(end)), None)
            .unwrap()
    }

    /// One sample per day at `per_day` services over `[first, last]`.
    fn daily_samples(first: NaiveDate, last: NaiveDate, per_day: u64) -> Vec<(i64, u64)> {
        let mut samples = Vec::new();
        let mut day = first;
        while day <= last {
            samples.push((noon_ts(day), per_day));
            day = day.succ_opt().unwrap();
        }
        samples
    }

    #[test]
    fn test_daily_bucketing_sums_within_day() {
        let day1 = date(2024, 1, 1);
        let day2 = date(2024, 1, 2);
        let samples = vec![(noon_ts(day1), 5), (noon_ts(day1) + 60, 3), (noon_ts(day2), 10)];
        let averages = MonthlyServiceAverages::with_today(
            SubscriptionForAggregation::new(None, None, None).unwrap(),
            &samples,
            date(2024, 2, 1),
        );
        let daily: Vec<(NaiveDate, f64)> = averages
            .daily_services()
            .iter()
            .map(|d| (d.sample_date, d.num_services))
            .collect();
        assert_eq!(daily, vec![(day1, 8.0), (day2, 10.0)]);
    }

    #[test]
    fn test_daily_bucketing_sorts_unsorted_input() {
        let day1 = date(2024, 1, 1);
        let day2 = date(2024, 1, 2);
        let samples = vec![(noon_ts(day2), 10), (noon_ts(day1), 5)];
        let averages = MonthlyServiceAverages::with_today(
            SubscriptionForAggregation::new(None, None, None).unwrap(),
            &samples,
            date(2024, 2, 1),
        );
        assert_eq!(averages.daily_services()[0].sample_date, day1);
        assert_eq!(averages.daily_services()[1].sample_date, day2);
    }

    #[test]
    fn test_retention_keeps_most_recent_400_days() {
        let first = date(2023, 1, 1);
        let samples = daily_samples(first, first + Duration::days(499), 1);
        assert_eq!(samples.len(), 500);
        let averages = MonthlyServiceAverages::with_today(
            SubscriptionForAggregation::new(None, None, None).unwrap(),
            &samples,
            date(2024, 6, 1),
        );
        let daily = averages.daily_services();
        assert_eq!(daily.len(), 400);
        // The oldest 100 days are gone.
        assert_eq!(daily[0].sample_date, first + Duration::days(100));
        assert_eq!(daily[399].sample_date, first + Duration::days(499));
    }

    #[test]
    fn test_monthly_averages_complete_months_only() {
        let start = date(2024, 1, 1);
        let end = date(2024, 4, 1);
        let mut samples = daily_samples(date(2024, 1, 1), date(2024, 1, 31), 10);
        samples.extend(daily_samples(date(2024, 2, 1), date(2024, 2, 29), 20));
        // Partial March data.
        samples.extend(daily_samples(date(2024, 3, 1), date(2024, 3, 10), 30));

        let averages =
            MonthlyServiceAverages::with_today(subscription(start, end), &samples, date(2024, 4, 1));
        let aggregation = averages.get_aggregation();

        assert_eq!(aggregation.monthly_service_averages.len(), 2);
        assert_eq!(aggregation.monthly_service_averages[0].num_services, 10.0);
        assert_eq!(aggregation.monthly_service_averages[1].num_services, 20.0);
        assert_eq!(
            aggregation.monthly_service_averages[0].sample_time,
            midnight_ts(date(2024, 1, 1)) as f64
        );

        let last = aggregation.last_service_report.unwrap();
        assert_eq!(last.num_services, 20.0);
        let highest = aggregation.highest_service_report.unwrap();
        assert_eq!(highest.num_services, 20.0);
    }

    #[test]
    fn test_monthly_average_divides_by_days_with_data() {
        // Ten days of data inside January: average over 10 days, not 31.
        let samples = daily_samples(date(2024, 1, 5), date(2024, 1, 14), 7);
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 1, 1), date(2024, 6, 1)),
            &samples,
            date(2024, 3, 1),
        );
        let aggregation = averages.get_aggregation();
        assert_eq!(aggregation.monthly_service_averages.len(), 1);
        assert_eq!(aggregation.monthly_service_averages[0].num_services, 7.0);
    }

    #[test]
    fn test_current_month_excluded() {
        // Data through March 10, today March 20: the running March window is
        // incomplete and must not be averaged.
        let samples = daily_samples(date(2024, 3, 1), date(2024, 3, 10), 10);
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 3, 1), date(2024, 12, 1)),
            &samples,
            date(2024, 3, 20),
        );
        let aggregation = averages.get_aggregation();
        assert!(aggregation.monthly_service_averages.is_empty());
        assert!(aggregation.last_service_report.is_none());
        assert!(aggregation.highest_service_report.is_none());
        // Daily data still flows.
        assert_eq!(aggregation.daily_services.len(), 10);
    }

    #[test]
    fn test_months_past_subscription_end_excluded() {
        // Subscription ends Feb 1; February data falls outside it.
        let mut samples = daily_samples(date(2024, 1, 1), date(2024, 1, 31), 10);
        samples.extend(daily_samples(date(2024, 2, 1), date(2024, 2, 29), 20));
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 1, 1), date(2024, 2, 1)),
            &samples,
            date(2024, 6, 1),
        );
        let aggregation = averages.get_aggregation();
        assert_eq!(aggregation.monthly_service_averages.len(), 1);
        assert_eq!(aggregation.monthly_service_averages[0].num_services, 10.0);
    }

    #[test]
    fn test_month_windows_anchor_at_subscription_start() {
        // Mid-month start: windows run the 15th to the 15th.
        let samples = daily_samples(date(2024, 1, 15), date(2024, 2, 20), 10);
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 1, 15), date(2024, 4, 1)),
            &samples,
            date(2024, 4, 1),
        );
        let aggregation = averages.get_aggregation();
        assert_eq!(aggregation.monthly_service_averages.len(), 2);
        assert_eq!(
            aggregation.monthly_service_averages[0].sample_time,
            midnight_ts(date(2024, 1, 15)) as f64
        );
        assert_eq!(
            aggregation.monthly_service_averages[1].sample_time,
            midnight_ts(date(2024, 2, 15)) as f64
        );
    }

    #[test]
    fn test_days_before_subscription_start_ignored() {
        let mut samples = daily_samples(date(2023, 12, 20), date(2023, 12, 31), 99);
        samples.extend(daily_samples(date(2024, 1, 1), date(2024, 1, 31), 10));
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 1, 1), date(2024, 6, 1)),
            &samples,
            date(2024, 3, 1),
        );
        let aggregation = averages.get_aggregation();
        assert_eq!(aggregation.monthly_service_averages.len(), 1);
        assert_eq!(aggregation.monthly_service_averages[0].num_services, 10.0);
    }

    #[test]
    fn test_no_window_disables_monthly_averaging() {
        let samples = daily_samples(date(2024, 1, 1), date(2024, 1, 31), 10);
        for (start, end) in [
            (None, Some(midnight_ts(date(2024, 6, 1)))),
            (Some(midnight_ts(date(2024, 1, 1))), None),
            (None, None),
        ] {
            let averages = MonthlyServiceAverages::with_today(
                SubscriptionForAggregation::new(start, end, None).unwrap(),
                &samples,
                date(2024, 6, 1),
            );
            let aggregation = averages.get_aggregation();
            assert!(aggregation.monthly_service_averages.is_empty());
            assert_eq!(aggregation.daily_services.len(), 31);
        }
    }

    #[test]
    fn test_highest_tie_keeps_first_month() {
        let mut samples = daily_samples(date(2024, 1, 1), date(2024, 1, 31), 20);
        samples.extend(daily_samples(date(2024, 2, 1), date(2024, 2, 29), 20));
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 1, 1), date(2024, 3, 1)),
            &samples,
            date(2024, 3, 2),
        );
        let aggregation = averages.get_aggregation();
        assert_eq!(aggregation.monthly_service_averages.len(), 2);
        let highest = aggregation.highest_service_report.unwrap();
        assert_eq!(highest.sample_time, midnight_ts(date(2024, 1, 1)) as f64);
        let last = aggregation.last_service_report.unwrap();
        assert_eq!(last.sample_time, midnight_ts(date(2024, 2, 1)) as f64);
    }

    #[test]
    fn test_subscription_exceeded_first_month_at_or_over_limit() {
        let mut samples = daily_samples(date(2024, 1, 1), date(2024, 1, 31), 10);
        samples.extend(daily_samples(date(2024, 2, 1), date(2024, 2, 29), 20));
        let sub = SubscriptionForAggregation::new(
            Some(midnight_ts(date(2024, 1, 1))),
            Some(midnight_ts(date(2024, 4, 1))),
            Some(AggregationLimit::Limited(15)),
        )
        .unwrap();
        let aggregation =
            MonthlyServiceAverages::with_today(sub, &samples, date(2024, 4, 1)).get_aggregation();
        // February is the first month at or over the limit, not January.
        let exceeded = aggregation.subscription_exceeded_first.unwrap();
        assert_eq!(exceeded.sample_time, midnight_ts(date(2024, 2, 1)) as f64);
        assert_eq!(exceeded.num_services, 20.0);
    }

    #[test]
    fn test_exceedance_needs_a_real_limit() {
        let samples = daily_samples(date(2024, 1, 1), date(2024, 1, 31), 1_000_000);
        for limit in [None, Some(AggregationLimit::Unlimited)] {
            let sub = SubscriptionForAggregation::new(
                Some(midnight_ts(date(2024, 1, 1))),
                Some(midnight_ts(date(2024, 4, 1))),
                limit,
            )
            .unwrap();
            let aggregation = MonthlyServiceAverages::with_today(sub, &samples, date(2024, 4, 1))
                .get_aggregation();
            assert!(!aggregation.monthly_service_averages.is_empty());
            assert!(aggregation.subscription_exceeded_first.is_none());
        }
    }

    #[test]
    fn test_free_tier_limit() {
        let sub = SubscriptionForAggregation::new(None, None, Some(AggregationLimit::Free)).unwrap();
        assert!(sub.is_free());
        assert_eq!(sub.real_limit(), Some(3));

        let sub =
            SubscriptionForAggregation::new(None, None, Some(AggregationLimit::Unlimited)).unwrap();
        assert!(!sub.is_free());
        assert_eq!(sub.real_limit(), None);
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        assert!(matches!(
            SubscriptionForAggregation::new(None, None, Some(AggregationLimit::Limited(0))),
            Err(LictrackError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_report_limit_rendering() {
        let sub =
            SubscriptionForAggregation::new(Some(1), Some(2), Some(AggregationLimit::Unlimited))
                .unwrap();
        assert_eq!(sub.for_report().limit, Some(json!("unlimited")));

        let sub = SubscriptionForAggregation::new(None, None, Some(AggregationLimit::Free)).unwrap();
        assert_eq!(sub.for_report().limit, Some(json!(3)));

        let sub =
            SubscriptionForAggregation::new(None, None, Some(AggregationLimit::Limited(7000)))
                .unwrap();
        assert_eq!(sub.for_report().limit, Some(json!(7000)));

        let sub = SubscriptionForAggregation::new(None, None, None).unwrap();
        assert_eq!(sub.for_report().limit, None);
    }

    #[test]
    fn test_aggregation_report_serializes_nulls() {
        let averages = MonthlyServiceAverages::with_today(
            SubscriptionForAggregation::new(None, None, None).unwrap(),
            &[],
            date(2024, 1, 1),
        );
        let value = serde_json::to_value(averages.get_aggregation()).unwrap();
        assert_eq!(value["last_service_report"], Value::Null);
        assert_eq!(value["subscription_details"]["start"], Value::Null);
        assert_eq!(value["daily_services"], json!([]));
    }

    #[test]
    fn test_month_advance_clamps_short_months() {
        // Anchored at Jan 31: the next window boundary clamps to Feb 29.
        let samples = daily_samples(date(2024, 1, 31), date(2024, 2, 28), 10);
        let averages = MonthlyServiceAverages::with_today(
            subscription(date(2024, 1, 31), date(2024, 6, 1)),
            &samples,
            date(2024, 4, 1),
        );
        let aggregation = averages.get_aggregation();
        assert_eq!(aggregation.monthly_service_averages.len(), 1);
        // Jan 31 through Feb 28 inclusive is 29 days with data.
        assert_eq!(aggregation.monthly_service_averages[0].num_services, 10.0);
        assert_eq!(
            aggregation.monthly_service_averages[0].sample_time,
            midnight_ts(date(2024, 1, 31)) as f64
        );
    }
}
