//! `eq`, `lt`, `lte`, `gt`, `gte`
//!
//! Existential over both sides: true if any left value relates to any right
//! value. A nil side is never related to anything.

use std::cmp::Ordering;

use crate::error::Result;
use crate::term::Term;
use crate::value::Value;

use super::{arity, Outcome, Scope};

fn related(term: &Term, scope: &Scope<'_>, test: fn(&Value, &Value) -> bool) -> Result<Outcome> {
    arity(term, 2)?;
    let lhs = scope.values(&term.operands()[0])?;
    let rhs = scope.values(&term.operands()[1])?;
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return Ok(Outcome::Bool(false));
    };
    Ok(Outcome::Bool(
        lhs.iter().any(|a| rhs.iter().any(|b| test(a, b))),
    ))
}

pub(super) fn eq(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    related(term, scope, |a, b| a.matches(b))
}

pub(super) fn lt(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    related(term, scope, |a, b| a.compare(b) == Some(Ordering::Less))
}

pub(super) fn lte(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    related(term, scope, |a, b| {
        matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal))
    })
}

pub(super) fn gt(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    related(term, scope, |a, b| a.compare(b) == Some(Ordering::Greater))
}

pub(super) fn gte(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    related(term, scope, |a, b| {
        matches!(a.compare(b), Some(Ordering::Greater | Ordering::Equal))
    })
}
