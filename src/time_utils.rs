// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use crate::config::FirstSyncWindow;
use chrono::{DateTime, Datelike, Days, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// First day of the month `date` falls in.
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Start date of the fetch window for an account that was never synced.
pub fn first_sync_start(window: FirstSyncWindow, now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    match window {
        FirstSyncWindow::CurrentMonth => start_of_month(today),
        FirstSyncWindow::LastDays(days) => today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN),
    }
}
