// Copyright (C) 2017 Hove and/or its affiliates.
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, version 3.

// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.

// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>

//! Periods of application of the disruptions.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::{max, min};
use thiserror::Error;

/// Errors on the construction of periods
#[derive(Debug, Error, PartialEq)]
pub enum TimePeriodError {
    /// The start must be strictly before the end
    #[error("bad time period, start {0} must be strictly lower than end {1}")]
    StartAfterEnd(NaiveDateTime, NaiveDateTime),
    /// Begin date after end date in an application pattern
    #[error("bad application pattern, begin date {0} is after end date {1}")]
    BeginAfterEnd(NaiveDate, NaiveDate),
}

/// An half open interval of time.
/// A instant `t` is contained in it
/// if and only if
///  `start <= t < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePeriod {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimePeriod {
    #[allow(missing_docs)]
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<TimePeriod, TimePeriodError> {
        if start < end {
            Ok(TimePeriod { start, end })
        } else {
            Err(TimePeriodError::StartAfterEnd(start, end))
        }
    }

    #[allow(missing_docs)]
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    #[allow(missing_docs)]
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    #[allow(missing_docs)]
    pub fn contains(&self, t: &NaiveDateTime) -> bool {
        self.start <= *t && *t < self.end
    }

    /// True if the two half open periods share at least one instant.
    pub fn intersects(&self, other: &Self) -> bool {
        self.contains(&other.start) || other.contains(&self.start)
    }

    /// True if the closed window `[first, last]` shares at least one
    /// instant with this period.
    pub fn touches(&self, first: NaiveDateTime, last: NaiveDateTime) -> bool {
        first < self.end && self.start <= last
    }

    /// Dates on which a vehicle journey leaving may be concerned by this
    /// period: the day before its start (for vehicle journeys running
    /// past midnight) up to the day of its end.
    pub fn dates_possibly_concerned(&self) -> DateIter {
        DateIter::new(self.start.date() - Duration::days(1), self.end.date())
    }
}

/// Intersection of two periods, if not empty.
pub fn intersection(lhs: &TimePeriod, rhs: &TimePeriod) -> Option<TimePeriod> {
    TimePeriod::new(max(lhs.start, rhs.start), min(lhs.end, rhs.end)).ok()
}

/// Sort the periods and merge the overlapping or contiguous ones.
pub fn merge(mut periods: Vec<TimePeriod>) -> Vec<TimePeriod> {
    periods.sort();
    let mut merged: Vec<TimePeriod> = Vec::with_capacity(periods.len());
    for period in periods {
        match merged.last_mut() {
            Some(last) if period.start <= last.end => last.end = max(last.end, period.end),
            _ => merged.push(period),
        }
    }
    merged
}

/// A slot of time during a day. If `end` is not after `begin`, the slot
/// ends the day after.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSlot {
    #[allow(missing_docs)]
    pub begin: NaiveTime,
    #[allow(missing_docs)]
    pub end: NaiveTime,
}

/// Weekly recurrence of time slots between two dates, e.g.
/// "every friday and saturday from 12:00 to 13:00 from date A to date B".
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationPattern {
    /// First date of the pattern, included
    pub begin_date: NaiveDate,
    /// Last date of the pattern, included
    pub end_date: NaiveDate,
    /// Time slots, ordered and not overlapping
    pub time_slots: Vec<TimeSlot>,
    /// Active days of the week, monday first
    pub week_pattern: [bool; 7],
}

impl ApplicationPattern {
    #[allow(missing_docs)]
    pub fn new(
        begin_date: NaiveDate,
        end_date: NaiveDate,
        week_pattern: [bool; 7],
        time_slots: Vec<TimeSlot>,
    ) -> Result<Self, TimePeriodError> {
        if begin_date > end_date {
            return Err(TimePeriodError::BeginAfterEnd(begin_date, end_date));
        }
        Ok(ApplicationPattern {
            begin_date,
            end_date,
            time_slots,
            week_pattern,
        })
    }

    /// Is the pattern active on `date`'s day of the week.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.week_pattern[date.weekday().num_days_from_monday() as usize]
    }

    /// Concrete periods described by the pattern, merged.
    pub fn occurrences(&self) -> Vec<TimePeriod> {
        let mut periods = Vec::new();
        for date in DateIter::new(self.begin_date, self.end_date) {
            if !self.is_active_on(date) {
                continue;
            }
            for slot in &self.time_slots {
                let start = date.and_time(slot.begin);
                let end = if slot.end > slot.begin {
                    date.and_time(slot.end)
                } else {
                    (date + Duration::days(1)).and_time(slot.end)
                };
                if let Ok(period) = TimePeriod::new(start, end) {
                    periods.push(period);
                }
            }
        }
        merge(periods)
    }
}

/// Periods during which an impact applies: the application periods,
/// restricted to the occurrences of the application patterns if any.
pub fn effective_periods(
    application_periods: &[TimePeriod],
    application_patterns: &[ApplicationPattern],
) -> Vec<TimePeriod> {
    if application_patterns.is_empty() {
        return merge(application_periods.to_vec());
    }
    let occurrences = merge(
        application_patterns
            .iter()
            .flat_map(ApplicationPattern::occurrences)
            .collect(),
    );
    let mut periods = Vec::new();
    for period in application_periods {
        for occurrence in &occurrences {
            if let Some(common) = intersection(period, occurrence) {
                periods.push(common);
            }
        }
    }
    merge(periods)
}

// Yields all dates between current_date (included)
// and last_date (also included)
#[allow(missing_docs)]
pub struct DateIter {
    has_current_date: Option<NaiveDate>,
    last_date: NaiveDate,
}

impl DateIter {
    #[allow(missing_docs)]
    pub fn new(first_date: NaiveDate, last_date: NaiveDate) -> Self {
        DateIter {
            has_current_date: if first_date <= last_date {
                Some(first_date)
            } else {
                None
            },
            last_date,
        }
    }
}

impl Iterator for DateIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current_date = self.has_current_date?;
        if current_date <= self.last_date {
            self.has_current_date = current_date.succ_opt();
            Some(current_date)
        } else {
            self.has_current_date = None;
            None
        }
    }
}
