//! Aggregation: `agg` and `empty` run sub-queries; the reducers (`count`,
//! `sum`, `min`, `max`, `first`, `nth`) fold over the candidate set.

use std::cmp::Ordering;

use crate::error::{FactbaseError, Result};
use crate::term::Term;
use crate::value::Value;

use super::{arity, prop_name, Outcome, Scope};

/// `(agg selector reducer)`: select a subset, then reduce it with no subject.
pub(super) fn agg(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let reducer = term.operands()[1].as_term().ok_or_else(|| {
        FactbaseError::Type(format!(
            "a term expected as the reducer, got {}",
            term.operands()[1]
        ))
    })?;
    let subset = scope.select(&term.operands()[0])?;
    scope.reduce(reducer, subset)
}

pub(super) fn empty(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    Ok(Outcome::Bool(scope.select(&term.operands()[0])?.is_empty()))
}

pub(super) fn count(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 0)?;
    Ok(Outcome::value(Value::Int(scope.size() as i64)))
}

/// Every value of `prop` across the candidate set, in order.
fn gather(scope: &Scope<'_>, prop: &str) -> Vec<Value> {
    scope
        .candidates()
        .entries()
        .iter()
        .filter_map(|e| e.get(prop))
        .flatten()
        .collect()
}

pub(super) fn sum(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let prop = prop_name(term, 0)?;
    let values = gather(scope, prop);
    let mut integral = true;
    for v in &values {
        match v {
            Value::Int(_) => {}
            Value::Float(_) => integral = false,
            other => {
                return Err(FactbaseError::Type(format!(
                    "can't sum {} in '{}'",
                    other.kind(),
                    prop
                )))
            }
        }
    }
    if integral {
        let total = values
            .iter()
            .filter_map(Value::as_i64)
            .try_fold(0i64, |acc, i| acc.checked_add(i))
            .ok_or_else(|| FactbaseError::Arithmetic(format!("overflow while summing '{}'", prop)))?;
        return Ok(Outcome::value(Value::Int(total)));
    }
    let total: f64 = values.iter().filter_map(Value::as_f64).sum();
    Ok(Outcome::value(Value::Float(total)))
}

fn extreme(term: &Term, scope: &Scope<'_>, keep: Ordering) -> Result<Outcome> {
    arity(term, 1)?;
    let prop = prop_name(term, 0)?;
    let best = gather(scope, prop)
        .into_iter()
        .reduce(|best, v| if v.total_cmp(&best) == keep { v } else { best });
    Ok(best.map_or(Outcome::Nil, Outcome::value))
}

pub(super) fn min(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    extreme(term, scope, Ordering::Less)
}

pub(super) fn max(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    extreme(term, scope, Ordering::Greater)
}

/// Values of `prop` on the first candidate that has it.
pub(super) fn first(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let prop = prop_name(term, 0)?;
    let found = scope.candidates().entries().iter().find_map(|e| e.get(prop));
    Ok(found.map_or(Outcome::Nil, Outcome::Values))
}

/// `(nth pos prop)`: values of `prop` on the candidate at `pos`.
pub(super) fn nth(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let pos = match scope.scalar(&term.operands()[0])? {
        Some(Value::Int(i)) if i >= 0 => i as usize,
        other => {
            return Err(FactbaseError::Type(format!(
                "a non-negative integer expected as the position, got {}",
                other.map_or("nil".to_string(), |v| v.to_string())
            )))
        }
    };
    let prop = prop_name(term, 1)?;
    let found = scope.candidates().entries().get(pos).and_then(|e| e.get(prop));
    Ok(found.map_or(Outcome::Nil, Outcome::Values))
}
