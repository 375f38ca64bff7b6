//! Financial and campaign-performance report math.
//!
//! Aggregation queries live in the db crate; this module turns raw sums and
//! counts into the report shapes and owns all rounding rules.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::CoreError;
use crate::types::{DbId, Money, Timestamp};

/// Default report window when no start date is given.
pub const DEFAULT_REPORT_WINDOW_DAYS: i64 = 30;

/// Decimal places kept on `avg_cost_per_message`.
pub const AVG_COST_SCALE: u32 = 4;

// ---------------------------------------------------------------------------
// Percentages
// ---------------------------------------------------------------------------

/// `count * 100 / total`, rounded to 2 decimals; 0 when `total` is 0.
pub fn percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = count as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Campaign performance
// ---------------------------------------------------------------------------

/// Raw message counts for one campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignCounts {
    pub recipients: i64,
    pub attempted: i64,
    /// Messages in sent, delivered or read.
    pub sent: i64,
    /// Messages in delivered or read.
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignPerformance {
    pub campaign_id: DbId,
    pub campaign_name: String,
    pub status: String,
    pub total_recipients: i64,
    pub total_messages_attempted: i64,
    pub total_sent: i64,
    pub total_delivered: i64,
    pub total_read: i64,
    pub total_failed: i64,
    pub sent_rate_percentage: f64,
    pub delivery_rate_percentage: f64,
    pub read_rate_percentage: f64,
    pub failure_rate_percentage: f64,
}

impl CampaignPerformance {
    pub fn from_counts(
        campaign_id: DbId,
        campaign_name: String,
        status: String,
        counts: CampaignCounts,
    ) -> Self {
        let attempted = counts.attempted;
        Self {
            campaign_id,
            campaign_name,
            status,
            total_recipients: counts.recipients,
            total_messages_attempted: attempted,
            total_sent: counts.sent,
            total_delivered: counts.delivered,
            total_read: counts.read,
            total_failed: counts.failed,
            sent_rate_percentage: percentage(counts.sent, attempted),
            delivery_rate_percentage: percentage(counts.delivered, attempted),
            read_rate_percentage: percentage(counts.read, attempted),
            failure_rate_percentage: percentage(counts.failed, attempted),
        }
    }
}

// ---------------------------------------------------------------------------
// Financial summary
// ---------------------------------------------------------------------------

/// Ledger sums over a period, all as positive magnitudes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub top_ups: Money,
    pub deductions: Money,
    pub refunds: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub total_top_ups: Money,
    /// Deductions net of refunds.
    pub total_deductions: Money,
    pub total_refunds: Money,
    pub net_change: Money,
    pub avg_cost_per_message: Money,
    pub current_balance: Money,
    /// The client's pricing currency; every amount above is in it.
    pub currency: String,
    pub total_messages_sent: i64,
}

impl FinancialSummary {
    pub fn compute(
        range: ReportRange,
        totals: LedgerTotals,
        messages_sent: i64,
        current_balance: Money,
        currency: String,
    ) -> Self {
        let net_deductions = totals.deductions - totals.refunds;
        let avg = if messages_sent > 0 {
            (net_deductions / Decimal::from(messages_sent))
                .round_dp_with_strategy(AVG_COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
        } else {
            Decimal::ZERO
        };

        Self {
            start_date: range.start,
            end_date: range.end,
            total_top_ups: totals.top_ups,
            total_deductions: net_deductions,
            total_refunds: totals.refunds,
            net_change: totals.top_ups - net_deductions,
            avg_cost_per_message: avg,
            current_balance,
            currency,
            total_messages_sent: messages_sent,
        }
    }
}

/// One UTC day of ledger activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTransactions {
    pub date: NaiveDate,
    pub total_top_ups: Money,
    pub total_deductions: Money,
    pub total_refunds: Money,
    pub transaction_count: i64,
}

// ---------------------------------------------------------------------------
// Date ranges
// ---------------------------------------------------------------------------

/// Inclusive `[start, end]` report window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

fn start_of_day(date: NaiveDate) -> Timestamp {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Parse a report bound: RFC 3339, or `YYYY-MM-DD`.
///
/// A date-only end bound covers the whole day (up to the last microsecond).
pub fn parse_report_bound(raw: &str, is_end: bool) -> Result<Timestamp, CoreError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        CoreError::Validation(format!(
            "Invalid date '{raw}'. Use YYYY-MM-DD or an RFC 3339 timestamp"
        ))
    })?;
    let start = start_of_day(date);
    Ok(if is_end {
        start + Duration::days(1) - Duration::microseconds(1)
    } else {
        start
    })
}

/// Resolve optional bounds; defaults to the last 30 days ending `now`.
pub fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    now: Timestamp,
) -> Result<ReportRange, CoreError> {
    let end = match end {
        Some(s) if !s.trim().is_empty() => parse_report_bound(s, true)?,
        _ => now,
    };
    let start = match start {
        Some(s) if !s.trim().is_empty() => parse_report_bound(s, false)?,
        _ => end - Duration::days(DEFAULT_REPORT_WINDOW_DAYS),
    };
    if start > end {
        return Err(CoreError::Validation(
            "start_date must not be after end_date".to_string(),
        ));
    }
    Ok(ReportRange { start, end })
}

/// Half-open `[start, next_day)` bounds for one UTC day.
pub fn day_bounds(date: NaiveDate) -> (Timestamp, Timestamp) {
    let start = start_of_day(date);
    (start, start + Duration::days(1))
}

pub fn parse_day(raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::Validation(format!("Invalid date '{raw}'. Use YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn range() -> ReportRange {
        let now = Utc::now();
        ReportRange {
            start: now - Duration::days(1),
            end: now,
        }
    }

    #[test]
    fn percentage_rounds_and_guards_zero() {
        assert_eq!(percentage(7, 10), 70.0);
        assert_eq!(percentage(3, 10), 30.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn performance_scenario() {
        let p = CampaignPerformance::from_counts(
            1,
            "promo".into(),
            "COMPLETED".into(),
            CampaignCounts {
                recipients: 10,
                attempted: 10,
                sent: 7,
                delivered: 7,
                read: 2,
                failed: 3,
            },
        );
        assert_eq!(p.delivery_rate_percentage, 70.0);
        assert_eq!(p.failure_rate_percentage, 30.0);
        assert_eq!(p.read_rate_percentage, 20.0);
    }

    #[test]
    fn performance_with_no_attempts() {
        let p = CampaignPerformance::from_counts(
            1,
            "x".into(),
            "DRAFT".into(),
            CampaignCounts::default(),
        );
        assert_eq!(p.sent_rate_percentage, 0.0);
        assert_eq!(p.failure_rate_percentage, 0.0);
    }

    #[test]
    fn avg_cost_zero_without_messages() {
        let s = FinancialSummary::compute(
            range(),
            LedgerTotals {
                top_ups: dec!(10),
                deductions: dec!(0),
                refunds: dec!(0),
            },
            0,
            dec!(10),
            "USD".to_string(),
        );
        assert_eq!(s.avg_cost_per_message, dec!(0));
        assert_eq!(s.net_change, dec!(10));
        assert_eq!(s.currency, "USD");
    }

    #[test]
    fn refunds_net_out_of_deductions() {
        let s = FinancialSummary::compute(
            range(),
            LedgerTotals {
                top_ups: dec!(1.00),
                deductions: dec!(0.09),
                refunds: dec!(0.03),
            },
            2,
            dec!(0.94),
            "USD".to_string(),
        );
        assert_eq!(s.total_deductions, dec!(0.06));
        assert_eq!(s.net_change, dec!(0.94));
        assert_eq!(s.avg_cost_per_message, dec!(0.03));
    }

    #[test]
    fn avg_cost_rounds_to_four_places() {
        let s = FinancialSummary::compute(
            range(),
            LedgerTotals {
                top_ups: dec!(0),
                deductions: dec!(0.1),
                refunds: dec!(0),
            },
            3,
            dec!(0),
            "USD".to_string(),
        );
        assert_eq!(s.avg_cost_per_message, dec!(0.0333));
    }

    #[test]
    fn date_only_end_covers_whole_day() {
        let end = parse_report_bound("2024-03-10", true).unwrap();
        assert_eq!(end.to_rfc3339(), "2024-03-10T23:59:59.999999+00:00");
        let start = parse_report_bound("2024-03-10", false).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-10T00:00:00+00:00");
    }

    #[test]
    fn rfc3339_bounds_pass_through() {
        let t = parse_report_bound("2024-03-10T12:00:00+02:00", true).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-10T10:00:00+00:00");
        assert!(parse_report_bound("10/03/2024", false).is_err());
    }

    #[test]
    fn range_defaults_and_ordering() {
        let now = Utc::now();
        let r = resolve_range(None, None, now).unwrap();
        assert_eq!(r.end, now);
        assert_eq!(r.end - r.start, Duration::days(30));

        assert!(resolve_range(Some("2024-03-11"), Some("2024-03-10"), now).is_err());
        assert!(resolve_range(Some("2024-03-10"), Some("2024-03-10"), now).is_ok());
    }

    #[test]
    fn day_bounds_are_half_open() {
        let d = parse_day("2024-02-29").unwrap();
        let (s, e) = day_bounds(d);
        assert_eq!(e - s, Duration::days(1));
        assert!(parse_day("2023-02-29").is_err());
    }
}
