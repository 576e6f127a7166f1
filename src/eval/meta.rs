//! Derivations (`as`, `join`), operator definitions (`defn`, `undef`),
//! debugging (`traced`, `assert`) and `env`.

use tracing::info;

use crate::error::{FactbaseError, Result};
use crate::fact::validate_name;
use crate::term::Term;
use crate::value::Value;

use super::{arity, arity_between, prop_name, Outcome, Scope};

/// `(as prop term)`: derive `prop` on the current fact from the term's values.
pub(super) fn derive(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let prop = prop_name(term, 0)?;
    validate_name(prop)?;
    if let Some(values) = scope.values(&term.operands()[1])? {
        for v in values {
            scope.derive(prop, v)?;
        }
    }
    Ok(Outcome::Bool(true))
}

/// Parse `"to<=from,same"` into `(target, source)` pairs.
fn mapping(text: &str) -> Result<Vec<(String, String)>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (to, from) = part.split_once("<=").unwrap_or((part, part));
            let (to, from) = (to.trim(), from.trim());
            validate_name(to)?;
            validate_name(from)?;
            Ok((to.to_string(), from.to_string()))
        })
        .collect()
}

/// `(join "to<=from,..." term)`: copy properties of every fact the term
/// selects onto the current fact's overlay.
pub(super) fn join(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let Some(Value::Str(text)) = scope.scalar(&term.operands()[0])? else {
        return Err(FactbaseError::Type(
            "a mapping string expected as the first operand".to_string(),
        ));
    };
    let pairs = mapping(&text)?;
    for entry in scope.select(&term.operands()[1])? {
        let props = entry.read();
        for (to, from) in &pairs {
            for v in props.get(from).unwrap_or_default() {
                scope.derive(to, v.clone())?;
            }
        }
    }
    Ok(Outcome::Bool(true))
}

/// `(defn name "body")`: install a user-defined operator in this engine.
pub(super) fn defn(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let name = prop_name(term, 0)?;
    let Some(Value::Str(body)) = scope.scalar(&term.operands()[1])? else {
        return Err(FactbaseError::Type(
            "the body of an operator must be a string".to_string(),
        ));
    };
    let engine = scope.backing().engine();
    let body = engine.syntax.parse(&body)?;
    engine.registry.define_macro(name, body)?;
    Ok(Outcome::Bool(true))
}

pub(super) fn undef(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let name = prop_name(term, 0)?;
    scope.backing().engine().registry.undefine(name);
    Ok(Outcome::Bool(true))
}

pub(super) fn traced(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 1)?;
    let operand = &term.operands()[0];
    let out = scope.eval(operand)?;
    info!(term = %operand, result = %out, "traced");
    Ok(out)
}

/// `(assert "message" term)`: fail the query unless the term holds.
pub(super) fn assert(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let message = scope
        .values(&term.operands()[0])?
        .and_then(|vv| vv.into_iter().next())
        .map_or_else(String::new, |v| v.plain());
    if !scope.boolean(&term.operands()[1])? {
        return Err(FactbaseError::Assertion(message));
    }
    Ok(Outcome::Bool(true))
}

/// `(env name [default])`: the upper-cased process environment variable.
pub(super) fn env(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity_between(term, 1, 2)?;
    let oo = term.operands();
    let name = match &oo[0] {
        crate::term::Operand::Prop(p) => p.clone(),
        other => match scope.scalar(other)? {
            Some(Value::Str(s)) => s,
            _ => {
                return Err(FactbaseError::Type(
                    "a variable name expected as the first operand".to_string(),
                ))
            }
        },
    }
    .to_uppercase();
    match std::env::var(&name) {
        Ok(v) if !v.is_empty() => Ok(Outcome::value(Value::Str(v))),
        _ => match oo.get(1) {
            Some(default) => scope.eval(default),
            None => Err(FactbaseError::Env(name)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping() {
        assert_eq!(
            mapping("total<=size, name").unwrap(),
            vec![
                ("total".to_string(), "size".to_string()),
                ("name".to_string(), "name".to_string())
            ]
        );
        assert!(mapping("Bad<=x").is_err());
    }
}
