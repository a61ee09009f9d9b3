//! Reporting-period classification for statements.

use chrono::{Datelike, NaiveDate};

use tally_domain::Period;

/// Earliest and latest date of a non-empty set of dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl DateSpan {
    pub fn from_dates<I>(dates: I) -> Option<Self>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut iter = dates.into_iter();
        let first = iter.next()?;
        let (earliest, latest) = iter.fold((first, first), |(lo, hi), date| {
            (lo.min(date), hi.max(date))
        });
        Some(Self { earliest, latest })
    }

    pub fn days(&self) -> i64 {
        (self.latest - self.earliest).num_days()
    }

    /// Six consecutive months that fill one calendar half (Jan–Jun or Jul–Dec).
    pub fn is_calendar_half(&self) -> bool {
        let (start, end) = (self.earliest, self.latest);
        start.year() == end.year()
            && matches!(start.month(), 1 | 7)
            && end.month() == start.month() + 5
    }
}

/// Classifies the reporting period covered by `dates`.
///
/// The half-year rule wins over the span rules; the span rules are then
/// evaluated in order and anything left over is a fiscal year.
pub fn classify<I>(dates: I) -> Option<Period>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let span = DateSpan::from_dates(dates)?;
    Some(classify_span(&span))
}

pub fn classify_span(span: &DateSpan) -> Period {
    if span.is_calendar_half() {
        return Period::SemiAnnual;
    }
    match span.days() {
        days if days <= 1 => Period::Daily,
        days if days <= 7 => Period::Weekly,
        days if days <= 31 => Period::Monthly,
        days if days >= 365 => Period::Annual,
        days if days >= 120 => Period::Quarterly,
        _ => Period::FiscalYear,
    }
}
