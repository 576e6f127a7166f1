//! Stateful `prev`/`unique` and the fact-set operators `sorted`, `inverted`, `head`.

use std::sync::Arc;

use crate::error::{FactbaseError, Result};
use crate::fact::Entry;
use crate::term::Term;
use crate::value::{Value, ValueKey};

use super::{address, arity, arity_between, prop_name, Outcome, Scope};

/// Value of the operand on the previously evaluated fact of this run.
pub(super) fn prev(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let current = scope.values(&term.operands()[0])?;
    let before = scope
        .run()
        .prev
        .borrow_mut()
        .insert(address(term), current)
        .flatten();
    Ok(before.map_or(Outcome::Nil, Outcome::Values))
}

/// Identity used by `unique`; `None` when any part is missing.
pub(crate) fn unique_key(parts: Vec<Option<Vec<Value>>>) -> Option<Vec<Vec<ValueKey>>> {
    parts
        .into_iter()
        .map(|vv| vv.map(|vv| vv.iter().map(Value::key).collect()))
        .collect()
}

/// True the first time a combination of operand values is seen in this run.
pub(super) fn unique(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity_between(term, 1, usize::MAX)?;
    let parts = term
        .operands()
        .iter()
        .map(|o| scope.values(o))
        .collect::<Result<Vec<_>>>()?;
    let Some(key) = unique_key(parts) else {
        return Ok(Outcome::Bool(false));
    };
    let fresh = scope
        .run()
        .seen
        .borrow_mut()
        .entry(address(term))
        .or_default()
        .insert(key);
    Ok(Outcome::Bool(fresh))
}

/// Facts selected by `term`, ordered by the first value of `prop`.
/// Facts without the property are dropped.
pub(super) fn sorted(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let prop = prop_name(term, 0)?;
    let mut keyed: Vec<(Value, Arc<Entry>)> = scope
        .select(&term.operands()[1])?
        .into_iter()
        .filter_map(|e| {
            let first = e.read().get(prop).and_then(|vv| vv.first().cloned());
            first.map(|v| (v, e))
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(Outcome::Facts(keyed.into_iter().map(|(_, e)| e).collect()))
}

pub(super) fn inverted(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let mut facts = scope.select(&term.operands()[0])?;
    facts.reverse();
    Ok(Outcome::Facts(facts))
}

pub(super) fn head(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let limit = match scope.scalar(&term.operands()[0])? {
        Some(Value::Int(n)) if n >= 0 => n as usize,
        other => {
            return Err(FactbaseError::Type(format!(
                "a non-negative integer expected as the limit, got {}",
                other.map_or("nil".to_string(), |v| v.to_string())
            )))
        }
    };
    let mut facts = scope.select(&term.operands()[1])?;
    facts.truncate(limit);
    Ok(Outcome::Facts(facts))
}
