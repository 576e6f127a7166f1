//! Per-engine table of user-defined operators.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{FactbaseError, Result};
use crate::term::Term;

use super::{builtin, Outcome, Scope};

/// A native operator installed with `Registry::define`.
///
/// Closures of the right shape implement it:
/// ```ignore
/// fb.registry().define("twice", Arc::new(|t: &Term, s: &Scope<'_>| -> Result<Outcome> { ... }))?;
/// ```
pub trait Operator: Send + Sync {
    fn evaluate(&self, term: &Term, scope: &Scope<'_>) -> Result<Outcome>;
}

impl<F> Operator for F
where
    F: Fn(&Term, &Scope<'_>) -> Result<Outcome> + Send + Sync,
{
    fn evaluate(&self, term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
        self(term, scope)
    }
}

#[derive(Clone)]
pub(crate) enum Custom {
    Native(Arc<dyn Operator>),
    /// Defined by `defn` from query text
    Macro(Arc<Term>),
}

/// Operator names → user-defined evaluators, shared by a store and its
/// transactions. Built-in names are never shadowed.
#[derive(Default)]
pub struct Registry {
    ops: RwLock<HashMap<String, Custom>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a native operator. Replaces an earlier user-defined one.
    pub fn define(&self, name: &str, op: Arc<dyn Operator>) -> Result<()> {
        self.install(name, Custom::Native(op))
    }

    pub(crate) fn define_macro(&self, name: &str, body: Arc<Term>) -> Result<()> {
        self.install(name, Custom::Macro(body))
    }

    fn install(&self, name: &str, op: Custom) -> Result<()> {
        if builtin(name).is_some() {
            return Err(FactbaseError::Invariant(format!(
                "built-in operator '{}' can't be redefined",
                name
            )));
        }
        if !crate::fact::is_identifier(name) {
            return Err(FactbaseError::Invariant(format!(
                "invalid operator name '{}'",
                name
            )));
        }
        self.ops.write().insert(name.to_string(), op);
        Ok(())
    }

    /// Remove a user-defined operator; false if there was none.
    pub fn undefine(&self, name: &str) -> bool {
        self.ops.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ops.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Custom> {
        self.ops.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Operator> {
        Arc::new(|_: &Term, _: &Scope<'_>| -> Result<Outcome> { Ok(Outcome::Nil) })
    }

    #[test]
    fn test_define_and_undefine() {
        let r = Registry::new();
        r.define("twice", noop()).unwrap();
        assert!(r.contains("twice"));
        assert_eq!(r.names(), vec!["twice"]);
        assert!(r.undefine("twice"));
        assert!(!r.undefine("twice"));
    }

    #[test]
    fn test_builtins_are_protected() {
        let r = Registry::new();
        let err = r.define("eq", noop()).unwrap_err();
        assert_eq!(err.code(), "INVARIANT");
        assert!(r.define("Bad-Name", noop()).is_err());
    }
}
