//! Arithmetic and casts.
//!
//! Arithmetic takes the first (and only) value of each side. Times can be
//! shifted by a number of seconds or by a duration string like `"3 days"`.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{FactbaseError, Result};
use crate::term::Term;
use crate::value::Value;

use super::{arity, Outcome, Scope};

#[derive(Clone, Copy, PartialEq)]
enum Arith {
    Plus,
    Minus,
    Times,
    Div,
}

impl Arith {
    fn name(self) -> &'static str {
        match self {
            Arith::Plus => "plus",
            Arith::Minus => "minus",
            Arith::Times => "times",
            Arith::Div => "div",
        }
    }
}

fn overflow(op: Arith) -> FactbaseError {
    FactbaseError::Arithmetic(format!("overflow in '{}'", op.name()))
}

fn arithmetic(term: &Term, scope: &Scope<'_>, op: Arith) -> Result<Outcome> {
    arity(term, 2)?;
    let Some(a) = scope.scalar(&term.operands()[0])? else {
        return Ok(Outcome::Nil);
    };
    let Some(b) = scope.scalar(&term.operands()[1])? else {
        return Ok(Outcome::Nil);
    };
    apply(op, &a, &b).map(Outcome::value)
}

fn apply(op: Arith, a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let r = match op {
                Arith::Plus => x.checked_add(*y),
                Arith::Minus => x.checked_sub(*y),
                Arith::Times => x.checked_mul(*y),
                Arith::Div => {
                    if *y == 0 {
                        return Err(FactbaseError::Arithmetic("division by zero".to_string()));
                    }
                    x.checked_div(*y)
                }
            };
            r.map(Value::Int).ok_or_else(|| overflow(op))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            let r = match op {
                Arith::Plus => x + y,
                Arith::Minus => x - y,
                Arith::Times => x * y,
                Arith::Div => {
                    if y == 0.0 {
                        return Err(FactbaseError::Arithmetic("division by zero".to_string()));
                    }
                    x / y
                }
            };
            Ok(Value::Float(r))
        }
        (Value::Time(t), shift) if matches!(op, Arith::Plus | Arith::Minus) => {
            if let Value::Time(u) = shift {
                if op == Arith::Minus {
                    let secs = (*t - *u).num_milliseconds() as f64 / 1000.0;
                    return Ok(Value::Float(secs));
                }
            }
            let delta = delta(shift)?;
            let moved = if op == Arith::Plus {
                t.checked_add_signed(delta)
            } else {
                t.checked_sub_signed(delta)
            };
            moved.map(Value::from).ok_or_else(|| overflow(op))
        }
        (Value::Str(x), Value::Str(y)) if op == Arith::Plus => Ok(Value::Str(format!("{}{}", x, y))),
        _ => Err(FactbaseError::Type(format!(
            "can't {} {} and {}",
            op.name(),
            a.kind(),
            b.kind()
        ))),
    }
}

/// Offset for time arithmetic: seconds, or `"<n> <unit>"`.
fn delta(shift: &Value) -> Result<TimeDelta> {
    let bad = || FactbaseError::Type(format!("a time offset expected, got {}", shift));
    match shift {
        Value::Int(secs) => TimeDelta::try_seconds(*secs).ok_or_else(bad),
        Value::Float(secs) => TimeDelta::try_milliseconds((secs * 1000.0) as i64).ok_or_else(bad),
        Value::Str(s) => {
            let mut parts = s.split_whitespace();
            let (Some(n), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(bad());
            };
            let n: i64 = n.parse().map_err(|_| bad())?;
            let unit = match unit.trim_end_matches('s') {
                "second" => 1,
                "minute" => 60,
                "hour" => 3600,
                "day" => 86_400,
                "week" => 604_800,
                _ => return Err(bad()),
            };
            n.checked_mul(unit)
                .and_then(TimeDelta::try_seconds)
                .ok_or_else(bad)
        }
        _ => Err(bad()),
    }
}

pub(super) fn plus(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arithmetic(term, scope, Arith::Plus)
}

pub(super) fn minus(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arithmetic(term, scope, Arith::Minus)
}

pub(super) fn times(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arithmetic(term, scope, Arith::Times)
}

pub(super) fn div(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arithmetic(term, scope, Arith::Div)
}

// ── Casts ───────────────────────────────────────────────────────────

/// Apply `cast` to every value of the only operand.
fn cast(term: &Term, scope: &Scope<'_>, cast: fn(&Value) -> Result<Value>) -> Result<Outcome> {
    arity(term, 1)?;
    match scope.values(&term.operands()[0])? {
        None => Ok(Outcome::Nil),
        Some(vv) => Ok(Outcome::Values(
            vv.iter().map(cast).collect::<Result<Vec<_>>>()?,
        )),
    }
}

fn cant(v: &Value, into: &str) -> FactbaseError {
    FactbaseError::Type(format!("can't convert {} to {}", v, into))
}

fn truncate(f: f64, v: &Value) -> Result<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = f.trunc();
    if t.is_finite() && (-LIMIT..LIMIT).contains(&t) {
        Ok(t as i64)
    } else {
        Err(cant(v, "Integer"))
    }
}

pub(super) fn to_string(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    cast(term, scope, |v| Ok(Value::Str(v.plain())))
}

pub(super) fn to_integer(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    cast(term, scope, |v| match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => truncate(*f, v).map(Value::Int),
        Value::Time(t) => Ok(Value::Int(t.timestamp())),
        Value::Str(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => {
                    let f: f64 = s.parse().map_err(|_| cant(v, "Integer"))?;
                    truncate(f, v).map(Value::Int)
                }
            }
        }
        Value::Bool(_) => Err(cant(v, "Integer")),
    })
}

pub(super) fn to_float(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    cast(term, scope, |v| match v {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Time(t) => Ok(Value::Float(t.timestamp_millis() as f64 / 1000.0)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| !f.is_nan())
            .map(Value::Float)
            .ok_or_else(|| cant(v, "Float")),
        Value::Bool(_) => Err(cant(v, "Float")),
    })
}

pub(super) fn to_time(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    cast(term, scope, |v| match v {
        Value::Time(t) => Ok(Value::from(*t)),
        Value::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)
            .map(Value::from)
            .ok_or_else(|| cant(v, "Time")),
        Value::Float(secs) => DateTime::<Utc>::from_timestamp_millis((secs * 1000.0) as i64)
            .map(Value::from)
            .ok_or_else(|| cant(v, "Time")),
        Value::Str(s) => Value::parse_time(s.trim())
            .or_else(|| {
                DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            })
            .or_else(|| {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            })
            .map(Value::from)
            .ok_or_else(|| cant(v, "Time")),
        Value::Bool(_) => Err(cant(v, "Time")),
    })
}
