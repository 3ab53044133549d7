use std::{fmt, str::FromStr, time::Duration};

/// A positive duration written in Go's `time.Duration` syntax, e.g. `12h`,
/// `1h30m`, or `500ms`.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Interval(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("interval must be positive")]
    NotPositive,

    #[error("interval is too large")]
    Overflow,
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

// === impl Interval ===

impl From<Interval> for Duration {
    fn from(Interval(duration): Interval) -> Self {
        duration
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl FromStr for Interval {
    type Err = ParseError;

    fn from_str(mut s: &str) -> Result<Self, Self::Err> {
        fn unit(val: f64, unit: &str) -> Result<Duration, ParseError> {
            const MINUTE: Duration = Duration::from_secs(60);
            let base = match unit {
                "ns" => Duration::from_nanos(1),
                // U+00B5 is the micro sign; U+03BC is the Greek letter mu.
                "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
                "ms" => Duration::from_millis(1),
                "s" => Duration::from_secs(1),
                "m" => MINUTE,
                "h" => MINUTE * 60,
                _ => return Err(ParseError::InvalidUnit),
            };
            Duration::try_from_secs_f64(base.as_secs_f64() * val)
                .map_err(|_| ParseError::Overflow)
        }

        s = s.trim();
        if s.starts_with('-') {
            return Err(ParseError::NotPositive);
        }
        s = s.trim_start_matches('+');

        let mut total = Duration::ZERO;
        while !s.is_empty() {
            let Some(unit_start) = s.find(|c: char| c.is_alphabetic()) else {
                return Err(ParseError::NoUnit);
            };
            let (val, rest) = s.split_at(unit_start);
            let val = val.parse::<f64>()?;
            let unit_end = rest
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(rest.len());
            let (name, rest) = rest.split_at(unit_end);
            total = total
                .checked_add(unit(val, name)?)
                .ok_or(ParseError::Overflow)?;
            s = rest;
        }

        if total.is_zero() {
            return Err(ParseError::NotPositive);
        }
        Ok(Self(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Duration, ParseError> {
        s.parse::<Interval>().map(Into::into)
    }

    #[test]
    fn parses_go_durations() {
        assert_eq!(parse("12h"), Ok(Duration::from_secs(12 * 60 * 60)));
        assert_eq!(parse("1h30m"), Ok(Duration::from_secs(90 * 60)));
        assert_eq!(parse("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse("+2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse("1\u{00b5}s"), Ok(Duration::from_micros(1)));
    }

    #[test]
    fn rejects_invalid_intervals() {
        assert_eq!(parse("30"), Err(ParseError::NoUnit));
        assert_eq!(parse("30d"), Err(ParseError::InvalidUnit));
        assert_eq!(parse("-1h"), Err(ParseError::NotPositive));
        assert_eq!(parse("0s"), Err(ParseError::NotPositive));
        assert_eq!(parse(""), Err(ParseError::NotPositive));
        assert!(matches!(parse("xs"), Err(ParseError::NotANumber(_))));
    }

    #[test]
    fn rejects_huge_intervals() {
        assert_eq!(parse("99999999999999999999h"), Err(ParseError::Overflow));
        assert_eq!(
            parse("5000000000000000h5000000000000000h"),
            Err(ParseError::Overflow)
        );
    }
}
