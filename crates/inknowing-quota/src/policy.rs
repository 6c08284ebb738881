// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Membership tier to quota policy mapping and period arithmetic.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, TimeZone, Utc};
use inknowing_core::{MembershipTier, PeriodKind};

/// One row of the quota policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub period: PeriodKind,
    pub granted: i64,
}

/// The policy table, consulted at session start and on period reset.
pub fn policy_for(tier: MembershipTier) -> QuotaPolicy {
    match tier {
        MembershipTier::Free => QuotaPolicy {
            period: PeriodKind::Daily,
            granted: 20,
        },
        MembershipTier::Basic => QuotaPolicy {
            period: PeriodKind::Monthly,
            granted: 200,
        },
        MembershipTier::Premium => QuotaPolicy {
            period: PeriodKind::Monthly,
            granted: 500,
        },
        MembershipTier::Super => QuotaPolicy {
            period: PeriodKind::Monthly,
            granted: 1000,
        },
    }
}

/// The current period's start key and reset instant for a period kind.
///
/// Daily periods reset at the next UTC midnight; monthly periods on the
/// first of the next month.
pub fn period_bounds(period: PeriodKind, now: DateTime<Utc>) -> (String, String) {
    match period {
        PeriodKind::Daily => {
            let start = now.format("%Y-%m-%d").to_string();
            let reset = (now.date_naive() + ChronoDuration::days(1))
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
                .unwrap_or(now);
            (start, reset.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        }
        PeriodKind::Monthly => {
            let start = format!("{}-{:02}-01", now.year(), now.month());
            let first_of_month = now
                .date_naive()
                .with_day(1)
                .unwrap_or(now.date_naive());
            let reset = (first_of_month + Months::new(1))
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
                .unwrap_or(now);
            (start, reset.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table_matches_plans() {
        assert_eq!(
            policy_for(MembershipTier::Free),
            QuotaPolicy {
                period: PeriodKind::Daily,
                granted: 20
            }
        );
        assert_eq!(policy_for(MembershipTier::Basic).granted, 200);
        assert_eq!(policy_for(MembershipTier::Premium).granted, 500);
        assert_eq!(policy_for(MembershipTier::Super).granted, 1000);
        assert_eq!(policy_for(MembershipTier::Super).period, PeriodKind::Monthly);
    }

    #[test]
    fn daily_bounds_reset_next_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap();
        let (start, reset) = period_bounds(PeriodKind::Daily, now);
        assert_eq!(start, "2026-03-01");
        assert_eq!(reset, "2026-03-02T00:00:00Z");
    }

    #[test]
    fn monthly_bounds_reset_first_of_next_month() {
        let now = Utc.with_ymd_and_hms(2026, 12, 15, 8, 0, 0).unwrap();
        let (start, reset) = period_bounds(PeriodKind::Monthly, now);
        assert_eq!(start, "2026-12-01");
        assert_eq!(reset, "2027-01-01T00:00:00Z");
    }
}
