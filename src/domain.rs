use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SfaError;

pub const UNKNOWN_YEAR_LABEL: &str = "UnknownYear";

pub fn current_calendar_year() -> u16 {
    chrono::Utc::now().year() as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AcademicYear {
    start: u16,
    end: u16,
}

impl AcademicYear {
    pub fn from_start(start: u16) -> Self {
        Self {
            start,
            end: start + 1,
        }
    }

    pub fn from_filename(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        let re = Regex::new(r"sfa(\d{2})(\d{2})").unwrap();
        let caps = re.captures(&lowered)?;
        let start: u16 = caps[1].parse().ok()?;
        let end: u16 = caps[2].parse().ok()?;
        Some(Self {
            start: 2000 + start,
            end: 2000 + end,
        })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn start_two_digit(&self) -> u16 {
        self.start % 100
    }

    pub fn end_two_digit(&self) -> u16 {
        self.end % 100
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

pub fn year_label(year: Option<AcademicYear>) -> String {
    match year {
        Some(year) => year.label(),
        None => UNKNOWN_YEAR_LABEL.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StartYear(u16);

impl StartYear {
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for StartYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StartYear {
    type Err = SfaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parsed: u16 = trimmed
            .parse()
            .map_err(|_| SfaError::InvalidYearBound(value.to_string()))?;
        let full = match parsed {
            0..=99 => 2000 + parsed,
            2000..=2099 => parsed,
            _ => return Err(SfaError::InvalidYearBound(value.to_string())),
        };
        Ok(Self(full))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    first: StartYear,
    last: StartYear,
}

impl YearRange {
    pub fn new(first: StartYear, last: StartYear) -> Result<Self, SfaError> {
        if first > last {
            return Err(SfaError::InvalidYearRange(format!(
                "first start year {} is after last start year {}",
                first.value(),
                last.value()
            )));
        }
        Ok(Self { first, last })
    }

    pub fn years(&self) -> Vec<AcademicYear> {
        (self.first.0..=self.last.0)
            .map(AcademicYear::from_start)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn year_from_filename() {
        let year = AcademicYear::from_filename("SFA1314.csv").unwrap();
        assert_eq!(year.label(), "2013-2014");
        assert_eq!(year.start_two_digit(), 13);
        assert_eq!(year.end_two_digit(), 14);
    }

    #[test]
    fn year_from_revised_filename() {
        let year = AcademicYear::from_filename("sfa1415_rv.csv").unwrap();
        assert_eq!(year.label(), "2014-2015");
    }

    #[test]
    fn year_from_unmatched_filename() {
        assert!(AcademicYear::from_filename("combined_ipeds_sfa.csv").is_none());
        assert_eq!(year_label(None), UNKNOWN_YEAR_LABEL);
    }

    #[test]
    fn parse_start_year_two_digit() {
        let year: StartYear = "13".parse().unwrap();
        assert_eq!(year.value(), 2013);
    }

    #[test]
    fn parse_start_year_four_digit() {
        let year: StartYear = "2022".parse().unwrap();
        assert_eq!(year.value(), 2022);
    }

    #[test]
    fn parse_start_year_out_of_range() {
        let err = "1999".parse::<StartYear>().unwrap_err();
        assert_matches!(err, SfaError::InvalidYearBound(_));
        let err = "20xx".parse::<StartYear>().unwrap_err();
        assert_matches!(err, SfaError::InvalidYearBound(_));
    }

    #[test]
    fn year_range_orders_bounds() {
        let first: StartYear = "13".parse().unwrap();
        let last: StartYear = "15".parse().unwrap();
        let range = YearRange::new(first, last).unwrap();
        let years = range.years();
        assert_eq!(years.len(), 3);
        assert_eq!(years[0].label(), "2013-2014");
        assert_eq!(years[2].label(), "2015-2016");

        let err = YearRange::new(last, first).unwrap_err();
        assert_matches!(err, SfaError::InvalidYearRange(_));
    }
}
