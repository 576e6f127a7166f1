//! Query AST
//!
//! A term is an operator name with an ordered list of operands. Terms are
//! immutable once parsed and shared between threads through `Arc`.

mod parser;


pub use parser::{parse, Syntax};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Operators whose result depends on facts evaluated before the current one,
/// or which write into the current fact's overlay.
const STATEFUL: [&str; 4] = ["prev", "unique", "as", "join"];

/// One operand of a term.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// Bare identifier, resolved against the fact being evaluated
    Prop(String),
    /// `$name`, resolved against the parameters of the query run
    Var(String),
    Term(Arc<Term>),
}

impl Operand {
    pub fn as_term(&self) -> Option<&Arc<Term>> {
        match self {
            Operand::Term(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_prop(&self) -> Option<&str> {
        match self {
            Operand::Prop(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{}", v),
            Operand::Prop(p) => write!(f, "{}", p),
            Operand::Var(v) => write!(f, "${}", v),
            Operand::Term(t) => write!(f, "{}", t),
        }
    }
}

/// A parsed query node.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    op: String,
    operands: Vec<Operand>,
}

impl Term {
    pub fn new(op: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            op: op.into(),
            operands,
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// True if the value of this term doesn't depend on the fact being
    /// evaluated: no bare property operands, and every sub-term static.
    /// `agg` always qualifies, since it only looks at the fact through `$` names.
    pub fn is_static(&self) -> bool {
        if self.op == "agg" {
            return true;
        }
        self.operands.iter().all(|o| match o {
            Operand::Prop(_) => false,
            Operand::Term(t) => t.is_static(),
            _ => true,
        })
    }

    /// True if the term refers to a `$` parameter anywhere.
    pub fn is_abstract(&self) -> bool {
        self.operands.iter().any(|o| match o {
            Operand::Var(_) => true,
            Operand::Term(t) => t.is_abstract(),
            _ => false,
        })
    }

    /// True if the term contains an operator with per-run state or side effects.
    pub fn is_stateful(&self) -> bool {
        STATEFUL.contains(&self.op.as_str())
            || self
                .operands
                .iter()
                .filter_map(Operand::as_term)
                .any(|t| t.is_stateful())
    }

    /// Every operator name used in the term, including nested ones.
    pub fn operators(&self) -> HashSet<&str> {
        let mut out = HashSet::new();
        self.collect_operators(&mut out);
        out
    }

    fn collect_operators<'a>(&'a self, out: &mut HashSet<&'a str>) {
        out.insert(self.op.as_str());
        for t in self.operands.iter().filter_map(Operand::as_term) {
            t.collect_operators(out);
        }
    }

    /// Normalize `and`/`or`: drop duplicate children (by printed form) and
    /// collapse a single remaining sub-term into its parent.
    pub fn simplify(self) -> Term {
        let operands: Vec<Operand> = self
            .operands
            .into_iter()
            .map(|o| match o {
                Operand::Term(t) => Operand::Term(Arc::new(Arc::unwrap_or_clone(t).simplify())),
                other => other,
            })
            .collect();
        if self.op != "and" && self.op != "or" {
            return Term::new(self.op, operands);
        }
        let mut seen = HashSet::new();
        let mut unique: Vec<Operand> = operands
            .into_iter()
            .filter(|o| seen.insert(o.to_string()))
            .collect();
        // a lone literal or property stays wrapped
        if let [Operand::Term(_)] = unique.as_slice() {
            if let Some(Operand::Term(t)) = unique.pop() {
                return Arc::unwrap_or_clone(t);
            }
        }
        Term::new(self.op, unique)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.op)?;
        for o in &self.operands {
            write!(f, " {}", o)?;
        }
        write!(f, ")")
    }
}
