//! Parameter ranges given on the command line as `VALUE` or `START,COUNT,END`.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSpec {
    pub start: f64,
    pub count: usize,
    pub end: f64,
}

impl RangeSpec {
    pub fn fixed(value: f64) -> RangeSpec {
        RangeSpec { start: value, count: 1, end: value }
    }

    pub fn new(start: f64, count: usize, end: f64) -> Result<RangeSpec> {
        if count == 0 {
            return Err(Error::InvalidRange(format!("{}..{} has no points", start, end)))
        }
        Ok(RangeSpec { start, count, end })
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.count == 1 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{},{},{}", self.start, self.count, self.end)
        }
    }
}

impl FromStr for RangeSpec {
    type Err = Error;

    fn from_str(arg: &str) -> Result<RangeSpec> {
        fn parse_field<T: FromStr>(arg: &str, field: &str, what: &str) -> Result<T> {
            field.trim().parse::<T>().map_err(|_|
                Error::InvalidRange(format!("{:?}: {} {:?} is not a number", arg, what, field)))
        }

        match arg.split(',').collect::<Vec<_>>()[..] {
            [value] =>
                Ok(RangeSpec::fixed(parse_field(arg, value, "value")?)),
            [start, count, end] => {
                let start = parse_field(arg, start, "start")?;
                let count = parse_field(arg, count, "point count")?;
                let end = parse_field(arg, end, "end")?;
                RangeSpec::new(start, count, end)
            }
            _ => Err(Error::InvalidRange(
                format!("{:?}: expected VALUE or START,COUNT,END", arg))),
        }
    }
}

/// How the points of a range are distributed between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    Linear,
    Log,
}

impl Scale {
    /// Value of point `index` out of `range.count`, both endpoints inclusive.
    ///
    /// A single-point range always yields `range.start`; `range.end` is not looked at, so
    /// a log scale never divides by zero or takes the logarithm of `end / start` there.
    pub fn resolve(self, range: &RangeSpec, index: usize) -> f64 {
        if range.count <= 1 {
            return range.start
        }
        let steps = (range.count - 1) as f64;
        let index = index as f64;
        match self {
            Self::Linear =>
                range.start + index * (range.end - range.start) / steps,
            Self::Log =>
                (range.start.ln() + index * (range.end / range.start).ln() / steps).exp(),
        }
    }

    /// Checks that every point of `range` is representable on this scale.
    pub fn validate(self, range: &RangeSpec) -> Result<()> {
        match self {
            Self::Linear => Ok(()),
            Self::Log if range.start > 0.0 && (range.count == 1 || range.end > 0.0) => Ok(()),
            Self::Log => Err(Error::InvalidRange(
                format!("{} cannot be log-scaled; both endpoints must be positive", range))),
        }
    }
}
