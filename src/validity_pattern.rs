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

//! Day validity of the transit objects.
//!
//! A [`ValidityPattern`] is a fixed width set of days anchored on a
//! `beginning_date`: day `i` of the pattern is `beginning_date + i`.
//! Dates outside of the representable window are silently ignored.

use anyhow::{bail, Error};
use chrono::{Duration, NaiveDate};
use std::{fmt, ops, str::FromStr};

const NB_WORDS: usize = 7;
const WORD_SIZE: usize = 64;

/// Number of days a validity pattern can represent.
pub const NB_DAYS: usize = NB_WORDS * WORD_SIZE;

/// Fixed width bit vector, bit `i` being the day `i`.
///
/// The textual representation lists the days in increasing order, day 0
/// first, and stops at the last active day: `"0110"` is active on days 1
/// and 2.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Days([u64; NB_WORDS]);

impl Days {
    /// All the representable days.
    pub fn all() -> Self {
        Days([u64::MAX; NB_WORDS])
    }

    /// Is the day active. Days out of range are never active.
    pub fn test(&self, day: usize) -> bool {
        day < NB_DAYS && self.0[day / WORD_SIZE] & (1 << (day % WORD_SIZE)) != 0
    }

    /// Activate a day, out of range days are ignored.
    pub fn set(&mut self, day: usize) {
        if day < NB_DAYS {
            self.0[day / WORD_SIZE] |= 1 << (day % WORD_SIZE);
        }
    }

    /// Deactivate a day, out of range days are ignored.
    pub fn reset(&mut self, day: usize) {
        if day < NB_DAYS {
            self.0[day / WORD_SIZE] &= !(1 << (day % WORD_SIZE));
        }
    }

    /// True if no day is active.
    pub fn none(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    /// True if at least one day is active.
    pub fn any(&self) -> bool {
        !self.none()
    }

    /// Number of active days.
    pub fn count(&self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Active days, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NB_DAYS).filter(move |day| self.test(*day))
    }
}

impl ops::BitAnd for Days {
    type Output = Days;
    fn bitand(mut self, rhs: Days) -> Days {
        self &= rhs;
        self
    }
}

impl ops::BitAndAssign for Days {
    fn bitand_assign(&mut self, rhs: Days) {
        for (word, other) in self.0.iter_mut().zip(rhs.0.iter()) {
            *word &= *other;
        }
    }
}

impl ops::BitOr for Days {
    type Output = Days;
    fn bitor(mut self, rhs: Days) -> Days {
        self |= rhs;
        self
    }
}

impl ops::BitOrAssign for Days {
    fn bitor_assign(&mut self, rhs: Days) {
        for (word, other) in self.0.iter_mut().zip(rhs.0.iter()) {
            *word |= *other;
        }
    }
}

impl ops::Not for Days {
    type Output = Days;
    fn not(self) -> Days {
        let mut res = self;
        for word in res.0.iter_mut() {
            *word = !*word;
        }
        res
    }
}

// Day `i` becomes day `i + n`, days pushed past the window are lost.
impl ops::Shl<usize> for Days {
    type Output = Days;
    fn shl(self, n: usize) -> Days {
        let mut res = [0u64; NB_WORDS];
        if n >= NB_DAYS {
            return Days(res);
        }
        let word_shift = n / WORD_SIZE;
        let bit_shift = n % WORD_SIZE;
        for i in word_shift..NB_WORDS {
            let src = i - word_shift;
            let mut word = self.0[src] << bit_shift;
            if bit_shift > 0 && src > 0 {
                word |= self.0[src - 1] >> (WORD_SIZE - bit_shift);
            }
            res[i] = word;
        }
        Days(res)
    }
}

impl ops::ShlAssign<usize> for Days {
    fn shl_assign(&mut self, n: usize) {
        *self = *self << n;
    }
}

// Day `i` becomes day `i - n`, days before day 0 are lost.
impl ops::Shr<usize> for Days {
    type Output = Days;
    fn shr(self, n: usize) -> Days {
        let mut res = [0u64; NB_WORDS];
        if n >= NB_DAYS {
            return Days(res);
        }
        let word_shift = n / WORD_SIZE;
        let bit_shift = n % WORD_SIZE;
        for (i, word) in res.iter_mut().enumerate().take(NB_WORDS - word_shift) {
            let src = i + word_shift;
            let mut shifted = self.0[src] >> bit_shift;
            if bit_shift > 0 && src + 1 < NB_WORDS {
                shifted |= self.0[src + 1] << (WORD_SIZE - bit_shift);
            }
            *word = shifted;
        }
        Days(res)
    }
}

impl ops::ShrAssign<usize> for Days {
    fn shr_assign(&mut self, n: usize) {
        *self = *self >> n;
    }
}

impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = match self.iter().last() {
            Some(last) => last,
            None => return write!(f, "0"),
        };
        for day in 0..=last {
            write!(f, "{}", if self.test(day) { '1' } else { '0' })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Days({})", self)
    }
}

impl FromStr for Days {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > NB_DAYS {
            bail!("{} days do not fit in a validity pattern", s.len());
        }
        let mut days = Days::default();
        for (day, c) in s.chars().enumerate() {
            match c {
                '1' => days.set(day),
                '0' => {}
                _ => bail!("invalid day '{}' in validity pattern '{}'", c, s),
            }
        }
        Ok(days)
    }
}

/// Days of activity of an object, anchored on `beginning_date`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValidityPattern {
    /// Date of the day 0.
    pub beginning_date: NaiveDate,
    /// Active days.
    pub days: Days,
}

impl ValidityPattern {
    /// A pattern without any active day.
    pub fn new(beginning_date: NaiveDate) -> Self {
        ValidityPattern {
            beginning_date,
            days: Days::default(),
        }
    }

    /// A pattern with the given active days.
    pub fn with_days(beginning_date: NaiveDate, days: Days) -> Self {
        ValidityPattern {
            beginning_date,
            days,
        }
    }

    /// Index of `date` in the pattern, `None` if it is not representable.
    pub fn day_index(&self, date: NaiveDate) -> Option<usize> {
        let offset = date.signed_duration_since(self.beginning_date).num_days();
        if offset < 0 || offset >= NB_DAYS as i64 {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Date of the day `day`.
    pub fn date(&self, day: usize) -> NaiveDate {
        self.beginning_date + Duration::days(day as i64)
    }

    /// Is the day `day` active.
    pub fn check(&self, day: usize) -> bool {
        self.days.test(day)
    }

    /// Is `date` active.
    pub fn check_date(&self, date: NaiveDate) -> bool {
        self.day_index(date)
            .map(|day| self.check(day))
            .unwrap_or(false)
    }

    /// Activate `date`, ignored if not representable.
    pub fn add(&mut self, date: NaiveDate) {
        if let Some(day) = self.day_index(date) {
            self.days.set(day);
        }
    }

    /// Deactivate `date`, ignored if not representable.
    pub fn remove(&mut self, date: NaiveDate) {
        if let Some(day) = self.day_index(date) {
            self.days.reset(day);
        }
    }

    /// True if no day is active.
    pub fn none(&self) -> bool {
        self.days.none()
    }

    /// Active dates, in increasing order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.iter().map(move |day| self.date(day))
    }
}
