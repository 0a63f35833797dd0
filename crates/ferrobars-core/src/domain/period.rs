use std::fmt::{Display, Formatter};
use std::str::FromStr;

use time::{Date, Month, PrimitiveDateTime};

use crate::ValidationError;

/// A calendar look-back used to bound read windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Months(u32),
    Years(u32),
}

impl Default for Period {
    fn default() -> Self {
        Self::Months(6)
    }
}

impl Period {
    /// Parse `<n>mo`, `<n>y` or `<n>yr` (case-insensitive, `n > 0`).
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_lowercase();
        let invalid = || ValidationError::InvalidPeriod {
            value: input.to_string(),
        };

        let (digits, years) = if let Some(digits) = normalized.strip_suffix("mo") {
            (digits, false)
        } else if let Some(digits) = normalized.strip_suffix("yr") {
            (digits, true)
        } else if let Some(digits) = normalized.strip_suffix('y') {
            (digits, true)
        } else {
            return Err(invalid());
        };

        let count = digits.parse::<u32>().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        Ok(if years {
            Self::Years(count)
        } else {
            Self::Months(count)
        })
    }

    /// Parse a period, falling back to six months when absent or unrecognized.
    pub fn parse_or_default(input: Option<&str>) -> Self {
        input
            .and_then(|value| Self::parse(value).ok())
            .unwrap_or_default()
    }

    pub const fn months(self) -> i64 {
        match self {
            Self::Months(count) => count as i64,
            Self::Years(count) => count as i64 * 12,
        }
    }

    /// Step `end` back by this many calendar months, clamping the day to the
    /// length of the target month (2024-03-31 minus 1mo is 2024-02-29).
    ///
    /// Returns `None` when the result would precede the representable range.
    pub fn start_before(self, end: PrimitiveDateTime) -> Option<PrimitiveDateTime> {
        let date = end.date();
        let index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1
            - self.months();

        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = Month::try_from(u8::try_from(index.rem_euclid(12) + 1).ok()?).ok()?;
        let day = date.day().min(time::util::days_in_year_month(year, month));

        let start = Date::from_calendar_date(year, month, day).ok()?;
        Some(PrimitiveDateTime::new(start, end.time()))
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Months(count) => write!(f, "{count}mo"),
            Self::Years(count) => write!(f, "{count}y"),
        }
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn accepts_month_and_both_year_suffixes() {
        assert_eq!(Period::parse("3mo"), Ok(Period::Months(3)));
        assert_eq!(Period::parse("2Y"), Ok(Period::Years(2)));
        assert_eq!(Period::parse(" 1yr "), Ok(Period::Years(1)));
    }

    #[test]
    fn unrecognized_periods_fall_back_to_six_months() {
        for value in ["", "6m", "0mo", "xmo", "-1y", "10d"] {
            assert_eq!(Period::parse_or_default(Some(value)), Period::Months(6), "{value}");
        }
        assert_eq!(Period::parse_or_default(None), Period::Months(6));
    }

    #[test]
    fn subtraction_is_calendar_based_and_clamps_to_month_end() {
        assert_eq!(
            Period::Months(3).start_before(datetime!(2024-06-30 00:00:00)),
            Some(datetime!(2024-03-30 00:00:00))
        );
        assert_eq!(
            Period::Months(1).start_before(datetime!(2024-03-31 00:00:00)),
            Some(datetime!(2024-02-29 00:00:00))
        );
        assert_eq!(
            Period::Years(1).start_before(datetime!(2024-02-29 00:00:00)),
            Some(datetime!(2023-02-28 00:00:00))
        );
        assert_eq!(
            Period::Months(14).start_before(datetime!(2024-01-15 09:30:00)),
            Some(datetime!(2022-11-15 09:30:00))
        );
    }
}
