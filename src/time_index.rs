// src/time_index.rs

use crate::error::CohortError;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Calendar unit of a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// "YYYYMM"
    Month,
    /// "YYYYMMDD"
    Day,
}

/// A calendar bucket parsed from its textual key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    Month { year: i32, month: u32 },
    Day(NaiveDate),
}

impl Bucket {
    pub fn granularity(&self) -> Granularity {
        match self {
            Bucket::Month { .. } => Granularity::Month,
            Bucket::Day(_) => Granularity::Day,
        }
    }
}

pub fn parse_bucket(key: &str) -> Result<Bucket, CohortError> {
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CohortError::format(key, "bucket keys are numeric"));
    }
    if key.len() != 6 && key.len() != 8 {
        return Err(CohortError::format(
            key,
            format!("expected 6 or 8 digits, got {}", key.len()),
        ));
    }

    let year: i32 = key[..4].parse().map_err(|_| CohortError::format(key, "bad year"))?;
    let month: u32 = key[4..6].parse().map_err(|_| CohortError::format(key, "bad month"))?;
    if !(1..=12).contains(&month) {
        return Err(CohortError::format(key, format!("month {month} out of range")));
    }

    if key.len() == 6 {
        return Ok(Bucket::Month { year, month });
    }

    let day: u32 = key[6..8].parse().map_err(|_| CohortError::format(key, "bad day"))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(Bucket::Day)
        .ok_or_else(|| CohortError::format(key, format!("{year}-{month:02} has no day {day}")))
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}{month:02}")
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Dense, gap-free index over every bucket between two endpoints (inclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeIndex {
    granularity: Granularity,
    buckets: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl TimeIndex {
    /// Builds the range `[from, to]`. Both keys must share a granularity.
    /// A `from` later than `to` yields an empty index.
    pub fn build(from: &str, to: &str) -> Result<Self, CohortError> {
        let start = parse_bucket(from)?;
        let end = parse_bucket(to)?;

        let buckets = match (start, end) {
            (Bucket::Month { year: y0, month: m0 }, Bucket::Month { year: y1, month: m1 }) => {
                (month_ordinal(y0, m0)..=month_ordinal(y1, m1))
                    .map(|o| {
                        let (year, month) = from_month_ordinal(o);
                        month_key(year, month)
                    })
                    .collect()
            }
            (Bucket::Day(a), Bucket::Day(b)) => a.iter_days().take_while(|d| *d <= b).map(day_key).collect(),
            _ => {
                return Err(CohortError::format(
                    to,
                    format!("granularity differs from the range start '{from}'"),
                ))
            }
        };

        Ok(Self::from_buckets(start.granularity(), buckets))
    }

    /// Daily index covering whole months, from the first day of `from_month`
    /// to the last day of `to_month`.
    pub fn days_spanning(from_month: &str, to_month: &str) -> Result<Self, CohortError> {
        let (first, _) = month_bounds(from_month)?;
        let (_, last) = month_bounds(to_month)?;
        Self::build(&day_key(first), &day_key(last))
    }

    fn from_buckets(granularity: Granularity, buckets: Vec<String>) -> Self {
        let lookup = buckets.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();
        Self { granularity, buckets, lookup }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Position of `key`, or `None` when it lies outside the range
    pub fn get(&self, key: &str) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    pub fn key(&self, index: usize) -> Option<&str> {
        self.buckets.get(index).map(String::as_str)
    }

    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    /// Display label of a bucket, "MM / YYYY" or "DD / MM / YYYY"
    pub fn label(&self, index: usize) -> Option<String> {
        let key = self.key(index)?;
        Some(match self.granularity {
            Granularity::Month => format!("{} / {}", &key[4..6], &key[..4]),
            Granularity::Day => format!("{} / {} / {}", &key[6..8], &key[4..6], &key[..4]),
        })
    }
}

fn month_ordinal(year: i32, month: u32) -> i64 {
    year as i64 * 12 + (month as i64 - 1)
}

fn from_month_ordinal(ordinal: i64) -> (i32, u32) {
    (ordinal.div_euclid(12) as i32, (ordinal.rem_euclid(12) + 1) as u32)
}

fn expect_month(ym: &str) -> Result<(i32, u32), CohortError> {
    match parse_bucket(ym)? {
        Bucket::Month { year, month } => Ok((year, month)),
        Bucket::Day(_) => Err(CohortError::format(ym, "expected a YYYYMM month key")),
    }
}

/// First and last calendar day of the month `ym`
pub fn month_bounds(ym: &str) -> Result<(NaiveDate, NaiveDate), CohortError> {
    let (year, month) = expect_month(ym)?;
    let (next_year, next_month) = from_month_ordinal(month_ordinal(year, month) + 1);

    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt());
    first
        .zip(last)
        .ok_or_else(|| CohortError::format(ym, "month outside the supported calendar"))
}

/// The month key `months` after `ym`, rolling over year boundaries
pub fn add_months(ym: &str, months: u32) -> Result<String, CohortError> {
    let (year, month) = expect_month(ym)?;
    let (year, month) = from_month_ordinal(month_ordinal(year, month) + months as i64);
    Ok(month_key(year, month))
}
