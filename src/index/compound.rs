//! `and`, `or`, `not` over sub-predictions, and the rules for terms with
//! stateful operators.

use std::collections::HashSet;

use crate::eval::{builtin, unique_key};
use crate::term::{Operand, Term};

use super::{Guess, Prediction};

// ── Sorted position sets ────────────────────────────────────────────

pub(super) fn intersect(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

pub(super) fn union(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Elements of `a` not in `b`.
pub(super) fn difference(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x {
            j += 1;
        }
        if j >= b.len() || b[j] != x {
            out.push(x);
        }
    }
    out
}

// ── Stateful terms ──────────────────────────────────────────────────

/// Terms that must see exactly the facts that reach them, in order:
/// stateful built-ins, and user-defined operators whose bodies we can't see.
fn barrier(term: &Term) -> bool {
    term.is_stateful() || term.operators().iter().any(|op| builtin(op).is_none())
}

/// `(unique a $b ...)` with nothing but properties and variables.
fn plain_unique(term: &Term) -> bool {
    term.op() == "unique"
        && !term.operands().is_empty()
        && term
            .operands()
            .iter()
            .all(|o| matches!(o, Operand::Prop(_) | Operand::Var(_)))
}

impl Guess<'_> {
    /// Entry point: applies the rules for stateful operators, then guesses.
    ///
    /// - a root `unique` is simulated over the whole set
    /// - in a root `and`, only conjuncts before the first stateful one narrow
    ///   the set; a plain `unique` there is simulated over their intersection
    ///   when that intersection is exact
    /// - a stateful operator anywhere else disables prediction
    pub(super) fn root(&mut self, term: &Term) -> Option<Prediction> {
        if !barrier(term) {
            return self.guess(term);
        }
        if plain_unique(term) {
            let all = self.all();
            return Some(self.simulate_unique(term, &all.positions));
        }
        if term.op() != "and" {
            return None;
        }
        let oo = term.operands();
        let k = oo
            .iter()
            .position(|o| o.as_term().is_some_and(|t| barrier(t)))?;
        let narrowed = if k == 0 { None } else { self.and(&oo[..k]) };
        let stateful = oo[k].as_term()?;
        if plain_unique(stateful) {
            let context = match narrowed {
                None if k == 0 => Some(self.all()),
                Some(ref p) if p.exact => Some(p.clone()),
                _ => None,
            };
            if let Some(context) = context {
                let mut p = self.simulate_unique(stateful, &context.positions);
                p.exact = k + 1 == oo.len();
                return Some(p);
            }
        }
        narrowed.map(|p| Prediction {
            positions: p.positions,
            exact: false,
        })
    }

    /// First fact of every distinct tuple, as `unique` would see them in order.
    fn simulate_unique(&self, term: &Term, positions: &[usize]) -> Prediction {
        let entries = self.candidates.entries();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &pos in positions {
            let Some(entry) = entries.get(pos) else {
                continue;
            };
            let props = entry.read();
            let parts = term
                .operands()
                .iter()
                .map(|o| match o {
                    Operand::Prop(p) => props.get(p).map(<[_]>::to_vec),
                    Operand::Var(v) => self.params.get(v).filter(|vv| !vv.is_empty()).cloned(),
                    _ => None,
                })
                .collect();
            if let Some(key) = unique_key(parts) {
                if seen.insert(key) {
                    out.push(pos);
                }
            }
        }
        Prediction::exact(out)
    }

    pub(super) fn not(&mut self, term: &Term) -> Option<Prediction> {
        let [Operand::Term(sub)] = term.operands() else {
            return None;
        };
        let inner = self.guess(sub)?;
        if !inner.exact {
            return None;
        }
        let all = self.all();
        Some(Prediction::exact(difference(&all.positions, &inner.positions)))
    }

    /// Bitmask when every conjunct is a plain equality, otherwise intersect
    /// sub-predictions smallest first and stop once the result is narrow enough.
    pub(super) fn and(&mut self, operands: &[Operand]) -> Option<Prediction> {
        let terms: Vec<&Term> = operands
            .iter()
            .filter_map(Operand::as_term)
            .map(|t| &**t)
            .collect();
        let mut exact = terms.len() == operands.len();
        if exact {
            if let Some(positions) = self.bitmask(&terms) {
                return Some(Prediction { positions, exact });
            }
        }
        let mut predictions = Vec::new();
        for t in terms {
            match self.guess(t) {
                Some(p) => predictions.push(p),
                None => exact = false,
            }
        }
        predictions.sort_by_key(|p| p.positions.len());
        let mut rest = predictions.into_iter();
        let mut acc = rest.next()?;
        exact &= acc.exact;
        let cutoff = self.tuning.and_cutoff(self.len());
        for p in rest {
            if acc.positions.len() < cutoff {
                exact = false;
                break;
            }
            acc.positions = intersect(&acc.positions, &p.positions);
            exact &= p.exact;
        }
        Some(Prediction {
            positions: acc.positions,
            exact,
        })
    }

    /// Union of every disjunct; gives up on narrowing once it covers too much.
    pub(super) fn or(&mut self, term: &Term) -> Option<Prediction> {
        let cutoff = self.tuning.or_cutoff(self.len());
        let mut acc = Prediction::exact(Vec::new());
        for o in term.operands() {
            let p = self.guess(o.as_term()?)?;
            acc.positions = union(&acc.positions, &p.positions);
            acc.exact &= p.exact;
            if acc.positions.len() > cutoff {
                let mut all = self.all();
                all.exact = false;
                return Some(all);
            }
        }
        Some(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_algebra() {
        let a = [1, 3, 5, 7];
        let b = [3, 4, 5];
        assert_eq!(intersect(&a, &b), vec![3, 5]);
        assert_eq!(union(&a, &b), vec![1, 3, 4, 5, 7]);
        assert_eq!(difference(&a, &b), vec![1, 7]);
        assert_eq!(difference(&b, &[]), vec![3, 4, 5]);
    }
}
