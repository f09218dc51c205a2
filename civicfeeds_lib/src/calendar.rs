//! Calendar helpers for month-by-month date-range queries.

use chrono::NaiveDate;

use crate::error::ScrapeError;

/// First and last calendar day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), ScrapeError> {
    let invalid = || ScrapeError::InvalidDate { year, month };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(invalid)?;
    Ok((first, last))
}

/// `M/DD/YYYY`, the format the postback form expects (month unpadded).
pub fn form_date(date: NaiveDate) -> String {
    use chrono::Datelike;
    format!("{}/{:02}/{}", date.month(), date.day(), date.year())
}

/// Every (year, month) from `start` to `end` inclusive, ascending.
pub fn months_between(start: (i32, u32), end: (i32, u32)) -> Vec<(i32, u32)> {
    let mut out = Vec::new();
    let (mut year, mut month) = start;
    while (year, month) <= end {
        out.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn end_date_is_last_day_of_every_month() {
        for year in [1999, 2000, 2019, 2020, 2021, 2100] {
            for month in 1..=12 {
                let (first, last) = month_bounds(year, month).unwrap();
                assert_eq!(first.day(), 1);
                assert_eq!(last.month(), month);
                assert_eq!(last.year(), year);
                // the day after the last day starts a new month
                assert_eq!(last.succ_opt().unwrap().day(), 1);
            }
        }
    }

    #[test]
    fn december_wraps_into_next_year() {
        let (first, last) = month_bounds(2020, 12).unwrap();
        assert_eq!(form_date(first), "12/01/2020");
        assert_eq!(form_date(last), "12/31/2020");
    }

    #[test]
    fn leap_year_february() {
        assert_eq!(month_bounds(2020, 2).unwrap().1.day(), 29);
        assert_eq!(month_bounds(2021, 2).unwrap().1.day(), 28);
        assert_eq!(month_bounds(2000, 2).unwrap().1.day(), 29);
        assert_eq!(month_bounds(1900, 2).unwrap().1.day(), 28);
    }

    #[test]
    fn invalid_month_rejected() {
        assert!(matches!(
            month_bounds(2020, 13),
            Err(ScrapeError::InvalidDate { year: 2020, month: 13 })
        ));
        assert!(month_bounds(2020, 0).is_err());
    }

    #[test]
    fn form_date_format() {
        let (first, last) = month_bounds(2021, 4).unwrap();
        assert_eq!(form_date(first), "4/01/2021");
        assert_eq!(form_date(last), "4/30/2021");
    }

    #[test]
    fn months_between_spans_years() {
        let months = months_between((2020, 11), (2021, 2));
        assert_eq!(months, vec![(2020, 11), (2020, 12), (2021, 1), (2021, 2)]);
        assert_eq!(months_between((2020, 1), (2020, 12)).len(), 12);
        assert!(months_between((2021, 1), (2020, 12)).is_empty());
    }
}
