//! Window planning - decides which date ranges and report months to request.
//!
//! An incremental sync looks back a few hours from `now`; a full sync covers
//! the year to date. Long full-sync ranges are cut into calendar-month chunks,
//! produced lazily by [`Windows`], so that no single request spans more than a
//! month. All times are naive local date-times, matching what the API expects
//! in its query parameters.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

use crate::config::SyncSettings;
use crate::config::settings::MAX_LOOKBACK_HOURS;

/// Which range a run reprocesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Short lookback window ending at `now`
    Incremental,
    /// Everything since January 1 of the current year
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// A half-open `[start, end)` date range fetched as one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// Inclusive start
    pub start: NaiveDateTime,
    /// Exclusive end
    pub end: NaiveDateTime,
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// One month of the project cost report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportMonth {
    /// Calendar year
    pub year: i32,
    /// Month, 1-based
    pub month: u32,
}

impl fmt::Display for ReportMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

/// Lazy, chronologically ordered sequence of chunks.
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: Option<NaiveDateTime>,
    end: NaiveDateTime,
    month_aligned: bool,
}

impl Windows {
    fn new(start: NaiveDateTime, end: NaiveDateTime, month_aligned: bool) -> Self {
        Self {
            next_start: (start < end).then_some(start),
            end,
            month_aligned,
        }
    }
}

impl Iterator for Windows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let start = self.next_start?;
        let stop = if self.month_aligned {
            first_of_next_month(start).min(self.end)
        } else {
            self.end
        };
        self.next_start = (stop < self.end).then_some(stop);
        Some(DateWindow { start, end: stop })
    }
}

/// Plans the transaction windows of one run.
#[must_use]
pub fn plan_windows(mode: SyncMode, now: NaiveDateTime, settings: &SyncSettings) -> Windows {
    match mode {
        SyncMode::Incremental => {
            // Unvalidated settings must not overflow the date arithmetic.
            let lookback = Duration::hours(settings.lookback_hours.clamp(1, MAX_LOOKBACK_HOURS));
            Windows::new(now - lookback, now, false)
        }
        SyncMode::Full => {
            let start = start_of_year(now.year());
            let split = (now - start).num_days() > settings.chunk_threshold_days;
            Windows::new(start, now, split)
        }
    }
}

/// Plans the report months of one run, in ascending order.
#[must_use]
pub fn report_months(mode: SyncMode, now: NaiveDateTime) -> Vec<ReportMonth> {
    let year = now.year();
    let first = match mode {
        SyncMode::Incremental => now.month(),
        SyncMode::Full => 1,
    };
    (first..=now.month())
        .map(|month| ReportMonth { year, month })
        .collect()
}

/// Midnight of the first day of the month following `at`.
fn first_of_next_month(at: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    month_start(year, month)
}

fn start_of_year(year: i32) -> NaiveDateTime {
    month_start(year, 1)
}

fn month_start(year: i32, month: u32) -> NaiveDateTime {
    // Day 1 exists in every month of every representable year.
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_incremental_is_single_lookback_window() {
        let now = at(2025, 3, 10, 14, 30);
        let windows: Vec<_> = plan_windows(SyncMode::Incremental, now, &SyncSettings::default())
            .collect();
        assert_eq!(
            windows,
            vec![DateWindow {
                start: at(2025, 3, 10, 12, 30),
                end: now
            }]
        );
    }

    #[test]
    fn test_out_of_range_lookback_is_clamped() {
        let now = at(2025, 3, 10, 14, 30);
        let settings = SyncSettings {
            lookback_hours: i64::MAX,
            ..SyncSettings::default()
        };
        let windows: Vec<_> = plan_windows(SyncMode::Incremental, now, &settings).collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, now - Duration::hours(MAX_LOOKBACK_HOURS));
        assert_eq!(windows[0].end, now);
    }

    #[test]
    fn test_incremental_crosses_midnight_and_year() {
        let now = at(2025, 1, 1, 1, 0);
        let windows: Vec<_> = plan_windows(SyncMode::Incremental, now, &SyncSettings::default())
            .collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, at(2024, 12, 31, 23, 0));
    }

    #[test]
    fn test_full_sync_january_to_mid_august() {
        let now = at(2025, 8, 15, 0, 0);
        let windows: Vec<_> =
            plan_windows(SyncMode::Full, now, &SyncSettings::default()).collect();

        assert_eq!(windows.len(), 8);
        assert_eq!(windows[0].start, at(2025, 1, 1, 0, 0));
        for (index, window) in windows.iter().enumerate() {
            let month = u32::try_from(index).unwrap() + 1;
            assert_eq!(window.start, at(2025, month, 1, 0, 0));
            if month < 8 {
                assert_eq!(window.end, at(2025, month + 1, 1, 0, 0));
            }
        }
        assert_eq!(windows[7].end, now);

        // Consecutive: each chunk starts where the previous ended
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_full_sync_short_range_is_single_chunk() {
        let now = at(2025, 1, 20, 9, 0);
        let windows: Vec<_> =
            plan_windows(SyncMode::Full, now, &SyncSettings::default()).collect();
        assert_eq!(
            windows,
            vec![DateWindow {
                start: at(2025, 1, 1, 0, 0),
                end: now
            }]
        );
    }

    #[test]
    fn test_full_sync_on_new_year_midnight_is_empty() {
        let now = at(2025, 1, 1, 0, 0);
        assert_eq!(
            plan_windows(SyncMode::Full, now, &SyncSettings::default()).count(),
            0
        );
    }

    #[test]
    fn test_month_chunks_roll_over_december() {
        let end = at(2025, 2, 10, 0, 0);
        let windows: Vec<_> = Windows::new(at(2024, 11, 15, 6, 0), end, true).collect();
        assert_eq!(
            windows,
            vec![
                DateWindow {
                    start: at(2024, 11, 15, 6, 0),
                    end: at(2024, 12, 1, 0, 0)
                },
                DateWindow {
                    start: at(2024, 12, 1, 0, 0),
                    end: at(2025, 1, 1, 0, 0)
                },
                DateWindow {
                    start: at(2025, 1, 1, 0, 0),
                    end: at(2025, 2, 1, 0, 0)
                },
                DateWindow {
                    start: at(2025, 2, 1, 0, 0),
                    end
                },
            ]
        );
    }

    #[test]
    fn test_full_sync_on_december_31() {
        let now = at(2024, 12, 31, 23, 0);
        let windows: Vec<_> =
            plan_windows(SyncMode::Full, now, &SyncSettings::default()).collect();
        assert_eq!(windows.len(), 12);
        assert_eq!(windows[11].start, at(2024, 12, 1, 0, 0));
        assert_eq!(windows[11].end, now);
    }

    #[test]
    fn test_report_months() {
        let now = at(2025, 4, 3, 10, 0);
        assert_eq!(
            report_months(SyncMode::Incremental, now),
            vec![ReportMonth {
                year: 2025,
                month: 4
            }]
        );
        let months: Vec<u32> = report_months(SyncMode::Full, now)
            .into_iter()
            .map(|m| m.month)
            .collect();
        assert_eq!(months, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_report_months_in_january() {
        let now = at(2025, 1, 31, 10, 0);
        assert_eq!(report_months(SyncMode::Full, now).len(), 1);
    }
}
