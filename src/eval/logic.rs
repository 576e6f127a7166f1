//! Boolean connectives and existence checks.

use crate::error::Result;
use crate::term::Term;
use crate::value::Value;

use super::{arity, Outcome, Scope};

pub(super) fn and(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    for o in term.operands() {
        if !scope.boolean(o)? {
            return Ok(Outcome::Bool(false));
        }
    }
    Ok(Outcome::Bool(true))
}

pub(super) fn or(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    for o in term.operands() {
        if scope.boolean(o)? {
            return Ok(Outcome::Bool(true));
        }
    }
    Ok(Outcome::Bool(false))
}

pub(super) fn not(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    Ok(Outcome::Bool(!scope.boolean(&term.operands()[0])?))
}

pub(super) fn always(term: &Term, _scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 0)?;
    Ok(Outcome::Bool(true))
}

pub(super) fn never(term: &Term, _scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 0)?;
    Ok(Outcome::Bool(false))
}

/// Implication.
pub(super) fn when(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let oo = term.operands();
    Ok(Outcome::Bool(!scope.boolean(&oo[0])? || scope.boolean(&oo[1])?))
}

/// First operand unless it's nil, otherwise the second.
pub(super) fn either(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    match scope.eval(&term.operands()[0])? {
        Outcome::Nil => scope.eval(&term.operands()[1]),
        found => Ok(found),
    }
}

fn count(term: &Term, scope: &Scope<'_>) -> Result<usize> {
    arity(term, 1)?;
    Ok(scope.values(&term.operands()[0])?.map_or(0, |vv| vv.len()))
}

pub(super) fn exists(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    Ok(Outcome::Bool(count(term, scope)? > 0))
}

pub(super) fn absent(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    Ok(Outcome::Bool(count(term, scope)? == 0))
}

pub(super) fn one(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    Ok(Outcome::Bool(count(term, scope)? == 1))
}

pub(super) fn many(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    Ok(Outcome::Bool(count(term, scope)? > 1))
}

pub(super) fn nil(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    Ok(Outcome::Bool(matches!(
        scope.eval(&term.operands()[0])?,
        Outcome::Nil
    )))
}

pub(super) fn size(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    Ok(Outcome::value(Value::Int(count(term, scope)? as i64)))
}

/// `type`: name of the operand's kind.
pub(super) fn kind(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let name = match scope.values(&term.operands()[0])?.as_deref() {
        None => "nil",
        Some([single]) => single.kind(),
        Some(_) => "Array",
    };
    Ok(Outcome::value(Value::from(name)))
}
