//! Term evaluator
//!
//! Evaluates a `Term` against one fact (the *subject*) within a candidate set.
//! Built-in operators live in the submodules, grouped by family; user-defined
//! operators are looked up in the engine's `Registry`.

mod aggregates;
mod compare;
mod logic;
mod math;
mod meta;
mod ordering;
mod registry;
mod strings;

#[cfg(test)]
mod tests;

pub use registry::{Operator, Registry};
pub(crate) use ordering::unique_key;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use regex_lite::Regex;

use crate::error::{FactbaseError, Result};
use crate::fact::{Entry, Props};
use crate::store::{Backing, Candidates};
use crate::term::{Operand, Term};
use crate::value::{Value, ValueKey};

use registry::Custom;

/// Values bound to `$name` references for one query run.
pub type Params = HashMap<String, Vec<Value>>;

/// Operators whose result is an ordered set of facts rather than a value.
const FACT_SETS: [&str; 3] = ["sorted", "inverted", "head"];

pub(crate) fn produces_facts(term: &Term) -> bool {
    FACT_SETS.contains(&term.op())
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Result of evaluating a term.
#[derive(Debug, Clone)]
pub enum Outcome {
    Nil,
    Bool(bool),
    Values(Vec<Value>),
    Facts(Vec<Arc<Entry>>),
}

impl Outcome {
    /// `Values`, or `Nil` when there is nothing to hold.
    pub fn values(vv: Vec<Value>) -> Self {
        if vv.is_empty() {
            Outcome::Nil
        } else {
            Outcome::Values(vv)
        }
    }

    pub fn value(v: Value) -> Self {
        Outcome::Values(vec![v])
    }

    /// Boolean reading: nil is false, a lone boolean is itself.
    pub fn truthy(&self) -> Result<bool> {
        match self {
            Outcome::Nil => Ok(false),
            Outcome::Bool(b) => Ok(*b),
            Outcome::Values(vv) => match vv.as_slice() {
                [Value::Bool(b)] => Ok(*b),
                _ => Err(FactbaseError::Type(format!("boolean expected, got {}", self))),
            },
            Outcome::Facts(_) => Err(FactbaseError::Type(format!("boolean expected, got {}", self))),
        }
    }

    /// Value list, or `None` for nil; booleans become a one-value list.
    pub fn into_values(self) -> Result<Option<Vec<Value>>> {
        match self {
            Outcome::Nil => Ok(None),
            Outcome::Bool(b) => Ok(Some(vec![Value::Bool(b)])),
            Outcome::Values(vv) => Ok(Some(vv)),
            Outcome::Facts(ff) => Err(FactbaseError::Type(format!(
                "values expected, got a set of {} facts",
                ff.len()
            ))),
        }
    }
}

impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Outcome::Nil, Outcome::Nil) => true,
            (Outcome::Bool(a), Outcome::Bool(b)) => a == b,
            (Outcome::Values(a), Outcome::Values(b)) => a == b,
            (Outcome::Facts(a), Outcome::Facts(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id() == y.id())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Nil => write!(f, "nil"),
            Outcome::Bool(b) => write!(f, "{}", b),
            Outcome::Values(vv) => {
                let items: Vec<String> = vv.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Outcome::Facts(ff) => write!(f, "{} facts", ff.len()),
        }
    }
}

// ── Per-run state ───────────────────────────────────────────────────

/// State that lives for one pass over a candidate set.
///
/// Keyed by term address: terms are shared and immutable, so stateful
/// operators keep their memory here rather than on the term.
#[derive(Default)]
pub(crate) struct Run {
    prev: RefCell<HashMap<usize, Option<Vec<Value>>>>,
    seen: RefCell<HashMap<usize, HashSet<Vec<Vec<ValueKey>>>>>,
    cache: RefCell<HashMap<usize, Outcome>>,
    regexes: RefCell<HashMap<String, Regex>>,
    /// Macro bodies evaluated in this run, held so their addresses stay unique
    pinned: RefCell<Vec<Arc<Term>>>,
}

fn address(term: &Term) -> usize {
    term as *const Term as usize
}

// ── Scope ───────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
pub(crate) struct Subject<'a> {
    entry: &'a Arc<Entry>,
    overlay: &'a RefCell<Props>,
}

/// Everything an operator can see while it evaluates.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    subject: Option<Subject<'a>>,
    candidates: &'a Candidates,
    params: &'a Params,
    run: &'a Run,
    backing: &'a Arc<dyn Backing>,
    depth: usize,
}

impl<'a> Scope<'a> {
    /// Evaluate any operand.
    pub fn eval(&self, operand: &Operand) -> Result<Outcome> {
        match operand {
            Operand::Literal(v) => Ok(Outcome::value(v.clone())),
            Operand::Prop(p) => Ok(self.fact(p).map_or(Outcome::Nil, Outcome::Values)),
            Operand::Var(v) => Ok(self
                .params
                .get(v)
                .filter(|vv| !vv.is_empty())
                .map_or(Outcome::Nil, |vv| Outcome::Values(vv.clone()))),
            Operand::Term(t) => self.eval_term(t),
        }
    }

    /// Evaluate to a value list; `None` for nil.
    pub fn values(&self, operand: &Operand) -> Result<Option<Vec<Value>>> {
        self.eval(operand)?.into_values()
    }

    /// Evaluate in boolean context.
    pub fn boolean(&self, operand: &Operand) -> Result<bool> {
        self.eval(operand)?.truthy()
    }

    /// Evaluate to at most one value.
    pub fn scalar(&self, operand: &Operand) -> Result<Option<Value>> {
        match self.values(operand)? {
            None => Ok(None),
            Some(mut vv) if vv.len() == 1 => Ok(vv.pop()),
            Some(vv) => Err(FactbaseError::Type(format!(
                "a single value expected at {}, got {} values",
                operand,
                vv.len()
            ))),
        }
    }

    /// Property of the fact being evaluated, with overlay values merged in.
    pub fn fact(&self, prop: &str) -> Option<Vec<Value>> {
        let subject = self.subject?;
        let mut values = subject.entry.get(prop).unwrap_or_default();
        if let Some(extra) = subject.overlay.borrow().get(prop) {
            for v in extra {
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
        }
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    pub fn param(&self, name: &str) -> Option<&[Value]> {
        self.params.get(name).map(Vec::as_slice)
    }

    /// Number of facts in the candidate set.
    pub fn size(&self) -> usize {
        self.candidates.len()
    }

    pub(crate) fn candidates(&self) -> &'a Candidates {
        self.candidates
    }

    pub(crate) fn params(&self) -> &'a Params {
        self.params
    }

    pub(crate) fn run(&self) -> &'a Run {
        self.run
    }

    pub(crate) fn backing(&self) -> &'a Arc<dyn Backing> {
        self.backing
    }

    pub(crate) fn subject(&self) -> Option<Subject<'a>> {
        self.subject
    }

    pub(crate) fn eval_term(&self, term: &Term) -> Result<Outcome> {
        let cacheable = term.is_static()
            && !term.is_abstract()
            && !term.is_stateful()
            && only_builtins(term);
        let key = address(term);
        if cacheable {
            if let Some(hit) = self.run.cache.borrow().get(&key) {
                return Ok(hit.clone());
            }
        }
        let out = self.dispatch(term).map_err(|e| e.at(term))?;
        if cacheable {
            self.run.cache.borrow_mut().insert(key, out.clone());
        }
        Ok(out)
    }

    fn dispatch(&self, term: &Term) -> Result<Outcome> {
        if let Some(f) = builtin(term.op()) {
            return f(term, self);
        }
        // cloned out so the registry lock isn't held while evaluating
        let custom = self.backing.engine().registry.lookup(term.op());
        match custom {
            Some(Custom::Native(op)) => op.evaluate(term, self),
            Some(Custom::Macro(body)) => self.expand(term, body),
            None => Err(FactbaseError::UnknownOperator(term.op().to_string())),
        }
    }

    /// Evaluate a user-defined operator: operands bound to `$_1`, `$_2`, ...
    fn expand(&self, term: &Term, body: Arc<Term>) -> Result<Outcome> {
        let limit = self.backing.engine().tuning.max_depth;
        if self.depth >= limit {
            return Err(FactbaseError::Invariant(format!(
                "operator '{}' nested deeper than {}",
                term.op(),
                limit
            )));
        }
        let mut params = self.params.clone();
        for (i, o) in term.operands().iter().enumerate() {
            let name = format!("_{}", i + 1);
            match self.values(o)? {
                Some(vv) => params.insert(name, vv),
                None => params.remove(&name),
            };
        }
        self.run.pinned.borrow_mut().push(body.clone());
        let inner = Scope {
            params: &params,
            depth: self.depth + 1,
            ..*self
        };
        inner.eval_term(&body)
    }

    /// Parameters for a sub-query: the subject's properties over the outer params.
    pub(crate) fn sub_params(&self) -> Params {
        let mut params = self.params.clone();
        if let Some(subject) = self.subject {
            let mut props = subject.entry.snapshot();
            props.merge(&subject.overlay.borrow());
            for (name, values) in props.iter() {
                params.insert(name.to_string(), values.to_vec());
            }
        }
        params
    }

    /// Run `operand` as a sub-query over this scope's candidates.
    pub(crate) fn select(&self, operand: &Operand) -> Result<Vec<Arc<Entry>>> {
        let term = operand.as_term().ok_or_else(|| {
            FactbaseError::Type(format!("a term expected as a sub-query, got {}", operand))
        })?;
        let params = self.sub_params();
        let mut out = Vec::new();
        select(term, self.candidates, &params, self.backing, self.depth, &mut |hit| {
            out.push(hit.entry);
            Ok(())
        })?;
        Ok(out)
    }

    /// Evaluate `term` with no subject over an explicit fact list.
    pub(crate) fn reduce(&self, term: &Term, entries: Vec<Arc<Entry>>) -> Result<Outcome> {
        let candidates = Candidates::ephemeral(entries);
        let run = Run::default();
        let scope = Scope {
            subject: None,
            candidates: &candidates,
            run: &run,
            ..*self
        };
        scope.eval_term(term)
    }

    /// Write into the overlay of the fact being evaluated.
    pub(crate) fn derive(&self, prop: &str, value: Value) -> Result<()> {
        let subject = self.subject.ok_or_else(|| {
            FactbaseError::Type(format!("no fact to derive '{}' on", prop))
        })?;
        value.validate()?;
        subject.overlay.borrow_mut().append(prop, value);
        Ok(())
    }
}

impl<'a> Subject<'a> {
    pub(crate) fn entry(&self) -> &'a Arc<Entry> {
        self.entry
    }
}

// ── Selection ───────────────────────────────────────────────────────

/// A fact that satisfied a query, with whatever `as`/`join` derived on it.
pub(crate) struct Hit {
    pub(crate) entry: Arc<Entry>,
    pub(crate) overlay: Props,
}

/// Evaluate `term` over `candidates`, passing matching facts to `sink` in order.
///
/// Uses the pushdown index when the candidate set is identified; the index
/// lock is released before any fact is evaluated.
pub(crate) fn select(
    term: &Term,
    candidates: &Candidates,
    params: &Params,
    backing: &Arc<dyn Backing>,
    depth: usize,
    sink: &mut dyn FnMut(Hit) -> Result<()>,
) -> Result<usize> {
    let run = Run::default();
    let scope = Scope {
        subject: None,
        candidates,
        params,
        run: &run,
        backing,
        depth,
    };
    if produces_facts(term) {
        let entries = match scope.eval_term(term)? {
            Outcome::Facts(ff) => ff,
            Outcome::Nil => Vec::new(),
            other => {
                return Err(FactbaseError::Type(format!("facts expected, got {}", other)).at(term))
            }
        };
        let total = entries.len();
        for entry in entries {
            sink(Hit {
                entry,
                overlay: Props::new(),
            })?;
        }
        return Ok(total);
    }

    let engine = backing.engine();
    let predicted = if engine.tuning.indexing {
        backing
            .index()
            .lock()
            .predict(term, candidates, params, &engine.tuning)
    } else {
        None
    };
    let all = candidates.entries();
    let mut test = |entry: &Arc<Entry>| -> Result<bool> {
        let overlay = RefCell::new(Props::new());
        let here = Scope {
            subject: Some(Subject {
                entry,
                overlay: &overlay,
            }),
            ..scope
        };
        if here.eval_term(term)?.truthy().map_err(|e| e.at(term))? {
            sink(Hit {
                entry: entry.clone(),
                overlay: overlay.into_inner(),
            })?;
            return Ok(true);
        }
        Ok(false)
    };
    let mut total = 0;
    match predicted {
        Some(positions) => {
            for pos in positions {
                if let Some(entry) = all.get(pos) {
                    total += test(entry)? as usize;
                }
            }
        }
        None => {
            for entry in all {
                total += test(entry)? as usize;
            }
        }
    }
    Ok(total)
}

/// Evaluate `term` once with no subject, as `Query::one` does.
pub(crate) fn evaluate(
    term: &Term,
    candidates: &Candidates,
    params: &Params,
    backing: &Arc<dyn Backing>,
) -> Result<Outcome> {
    let run = Run::default();
    let scope = Scope {
        subject: None,
        candidates,
        params,
        run: &run,
        backing,
        depth: 0,
    };
    scope.eval_term(term)
}

// ── Built-in table ──────────────────────────────────────────────────

type Builtin = fn(&Term, &Scope<'_>) -> Result<Outcome>;

/// True if every operator in the term is built in. User-defined operators
/// may read the current fact whatever their operands are.
fn only_builtins(term: &Term) -> bool {
    builtin(term.op()).is_some()
        && term
            .operands()
            .iter()
            .filter_map(Operand::as_term)
            .all(|t| only_builtins(t))
}

pub(crate) fn builtin(op: &str) -> Option<Builtin> {
    let f: Builtin = match op {
        "eq" => compare::eq,
        "lt" => compare::lt,
        "lte" => compare::lte,
        "gt" => compare::gt,
        "gte" => compare::gte,

        "and" => logic::and,
        "or" => logic::or,
        "not" => logic::not,
        "always" => logic::always,
        "never" => logic::never,
        "when" => logic::when,
        "either" => logic::either,
        "exists" => logic::exists,
        "absent" => logic::absent,
        "one" => logic::one,
        "many" => logic::many,
        "nil" => logic::nil,
        "size" => logic::size,
        "type" => logic::kind,

        "plus" => math::plus,
        "minus" => math::minus,
        "times" => math::times,
        "div" => math::div,
        "to_string" => math::to_string,
        "to_integer" => math::to_integer,
        "to_float" => math::to_float,
        "to_time" => math::to_time,

        "concat" => strings::concat,
        "sprintf" => strings::sprintf,
        "matches" => strings::matches,

        "prev" => ordering::prev,
        "unique" => ordering::unique,
        "sorted" => ordering::sorted,
        "inverted" => ordering::inverted,
        "head" => ordering::head,

        "agg" => aggregates::agg,
        "empty" => aggregates::empty,
        "count" => aggregates::count,
        "sum" => aggregates::sum,
        "min" => aggregates::min,
        "max" => aggregates::max,
        "first" => aggregates::first,
        "nth" => aggregates::nth,

        "as" => meta::derive,
        "join" => meta::join,
        "defn" => meta::defn,
        "undef" => meta::undef,
        "traced" => meta::traced,
        "assert" => meta::assert,
        "env" => meta::env,
        _ => return None,
    };
    Some(f)
}

// ── Operand helpers ─────────────────────────────────────────────────

pub(crate) fn arity(term: &Term, expected: usize) -> Result<()> {
    arity_between(term, expected, expected)
}

pub(crate) fn arity_between(term: &Term, min: usize, max: usize) -> Result<()> {
    let actual = term.operands().len();
    if actual < min || actual > max {
        return Err(FactbaseError::Arity {
            operator: term.op().to_string(),
            expected: if actual < min { min } else { max },
            actual,
        });
    }
    Ok(())
}

/// Operand `i` as a bare property name.
pub(crate) fn prop_name(term: &Term, i: usize) -> Result<&str> {
    term.operands()
        .get(i)
        .and_then(Operand::as_prop)
        .ok_or_else(|| {
            FactbaseError::Type(format!(
                "a property name expected as operand #{} of '{}'",
                i + 1,
                term.op()
            ))
        })
}
