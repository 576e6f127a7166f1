//! Scalar values stored in fact properties.
//!
//! Two notions of equality live here:
//! - structural (`PartialEq`): used to deduplicate a property's value list
//! - query equality (`Value::matches`): numeric across Int/Float, timestamps
//!   truncated to whole seconds; used by `eq` and the equality index
//!
//! `ValueKey` is the hashable projection of query equality, so that
//! `a.matches(b)` holds exactly when `a.key() == b.key()`.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FactbaseError, Result};

/// A single scalar held by a fact property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Time(DateTime<Utc>),
    Bool(bool),
}

/// Hashable form of a value under query equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Int(i64),
    /// Bits of a float with a fractional part (or outside the i64 range)
    Float(u64),
    Str(String),
    /// Whole seconds since the epoch
    Time(i64),
    Bool(bool),
}

/// Float that denotes exactly an i64, if any.
// 2^63 is exactly representable; anything at or above it overflows i64
const LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// Exact order of an i64 against a float, without rounding the integer.
fn int_vs_float(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f >= LIMIT {
        return Some(Ordering::Less);
    }
    if f < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)),
        unequal => Some(unequal),
    }
}

impl Value {
    /// Parse a `YYYY-MM-DDTHH:MM:SSZ` timestamp.
    pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
        if !looks_like_time(s) {
            return None;
        }
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Type name as reported by the `type` operator.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Time(_) => "Time",
            Value::Bool(_) => "Boolean",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Reject values a property may never hold.
    pub fn validate(&self) -> Result<()> {
        match self {
            Value::Str(s) if s.is_empty() => {
                Err(FactbaseError::Invariant("a property value can't be empty".to_string()))
            }
            Value::Float(f) if f.is_nan() => {
                Err(FactbaseError::Invariant("a property value can't be NaN".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Times cut to whole seconds, the precision facts store them with.
    pub(crate) fn normalized(self) -> Value {
        match self {
            Value::Time(t) => Value::Time(t.trunc_subsecs(0)),
            other => other,
        }
    }

    /// Query equality.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => {
                integral(*f) == Some(*i)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a.timestamp() == b.timestamp(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }

    pub fn key(&self) -> ValueKey {
        match self {
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) => match integral(*f) {
                Some(i) => ValueKey::Int(i),
                None => ValueKey::Float(f.to_bits()),
            },
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Time(t) => ValueKey::Time(t.timestamp()),
            Value::Bool(b) => ValueKey::Bool(*b),
        }
    }

    /// Ordering used by `lt`/`gt`/`lte`/`gte`; `None` for incomparable kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.timestamp().cmp(&b.timestamp())),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(i), Value::Float(f)) => int_vs_float(*i, *f),
            (Value::Float(f), Value::Int(i)) => int_vs_float(*i, *f).map(Ordering::reverse),
            _ => None,
        }
    }

    /// Comparable family: values of different ranks never compare.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::Time(_) => 3,
        }
    }

    /// Total order: kind rank first, then `compare` within a kind.
    ///
    /// Consistent with `compare` wherever `compare` is defined, which is what
    /// lets sorted index structures answer range predictions.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => match (self, other) {
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                (a, b) => a.compare(b).unwrap_or(Ordering::Equal),
            },
            unequal => unequal,
        }
    }

    /// Text without literal quoting, as produced by `concat` and `to_string`.
    pub fn plain(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Strict shape check for `YYYY-MM-DDTHH:MM:SSZ`.
pub(crate) fn looks_like_time(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 20 {
        return false;
    }
    b.iter().enumerate().all(|(i, c)| match i {
        4 | 7 => *c == b'-',
        10 => *c == b'T',
        13 | 16 => *c == b':',
        19 => *c == b'Z',
        _ => c.is_ascii_digit(),
    })
}

fn fmt_float(f: f64) -> String {
    let s = format!("{:?}", f);
    if s.contains('.') || s.contains("inf") || s.contains("NaN") {
        return s;
    }
    // `{:?}` gives "1e20" for large magnitudes; keep a decimal point
    match s.split_once('e') {
        Some((m, e)) => format!("{}.0e{}", m, e),
        None => format!("{}.0", s),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", fmt_float(*x)),
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'").replace('"', "\\\"")),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v.trunc_subsecs(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, nanos: u32) -> Value {
        Value::Time(Utc.timestamp_opt(secs, nanos).unwrap())
    }

    #[test]
    fn test_numeric_matching_across_kinds() {
        assert!(Value::Int(3).matches(&Value::Float(3.0)));
        assert!(!Value::Int(3).matches(&Value::Float(3.5)));
        assert!(!Value::Int(3).matches(&Value::Str("3".into())));
        assert_eq!(Value::Int(3).key(), Value::Float(3.0).key());
        assert_ne!(Value::Int(3).key(), Value::Float(3.5).key());
    }

    #[test]
    fn test_time_equality_truncates_to_seconds() {
        assert!(at(100, 0).matches(&at(100, 999_000_000)));
        assert!(!at(100, 0).matches(&at(101, 0)));
        assert_eq!(at(100, 0).key(), at(100, 500).key());
        // structural equality still distinguishes them
        assert_ne!(at(100, 0), at(100, 500));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::Int(1).compare(&Value::from("a")), None);
        assert_eq!(Value::Bool(true).compare(&Value::Bool(false)), None);
    }

    #[test]
    fn test_large_ints_compare_exactly_with_floats() {
        let big = 9_007_199_254_740_992i64; // 2^53
        let f = Value::Float(big as f64);
        assert_eq!(Value::Int(big + 1).compare(&f), Some(Ordering::Greater));
        assert_eq!(f.compare(&Value::Int(big + 1)), Some(Ordering::Less));
        assert_eq!(Value::Int(big).compare(&f), Some(Ordering::Equal));
        assert_eq!(Value::Int(-3).compare(&Value::Float(-2.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(-2).compare(&Value::Float(-2.5)), Some(Ordering::Greater));
        assert_eq!(Value::Int(i64::MAX).compare(&Value::Float(1e19)), Some(Ordering::Less));
        assert_eq!(Value::Int(i64::MIN).compare(&Value::Float(f64::NEG_INFINITY)), Some(Ordering::Greater));

        let mut vv = vec![Value::Int(big + 1), f.clone(), Value::Int(big - 1), Value::Float(big as f64 + 2.0)];
        vv.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            vv,
            vec![Value::Int(big - 1), f, Value::Int(big + 1), Value::Float(big as f64 + 2.0)]
        );
    }

    #[test]
    fn test_times_keep_whole_seconds() {
        assert_eq!(at(100, 500_000_000).normalized(), at(100, 0));
        assert_eq!(Value::from(Utc.timestamp_opt(7, 250).unwrap()), at(7, 0));
        assert_eq!(at(100, 500_000_000).compare(&at(100, 0)), Some(Ordering::Equal));
        assert_eq!(at(100, 0).compare(&at(101, 0)), Some(Ordering::Less));
    }

    #[test]
    fn test_total_order_groups_kinds() {
        let mut vv = vec![
            Value::from("z"),
            Value::Int(5),
            Value::Bool(true),
            at(0, 0),
            Value::Float(-1.5),
        ];
        vv.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            vv,
            vec![Value::Bool(true), Value::Float(-1.5), Value::Int(5), Value::from("z"), at(0, 0)]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(-4).to_string(), "-4");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(1e20).to_string(), "1.0e20");
        assert_eq!(Value::from("it's").to_string(), "'it\\'s'");
        assert_eq!(at(0, 0).to_string(), "1970-01-01T00:00:00Z");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_parse_time() {
        let t = Value::parse_time("2024-03-01T12:30:05Z").unwrap();
        assert_eq!(t.timestamp(), 1_709_296_205);
        assert!(Value::parse_time("2024-03-01 12:30:05Z").is_none());
        assert!(Value::parse_time("2024-13-01T12:30:05Z").is_none());
        assert!(Value::parse_time("2024-03-01T12:30:05+01:00").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(Value::from("").validate().is_err());
        assert!(Value::Float(f64::NAN).validate().is_err());
        assert!(Value::Int(0).validate().is_ok());
    }
}
