//! Predicate pushdown
//!
//! A side table of incrementally fed structures, used to narrow a candidate
//! set before every remaining fact is evaluated. A prediction is always a
//! superset of the facts the term would accept; `None` means "evaluate all".
//!
//! Slots are keyed by `(SetId, property)`. Each remembers how many facts of
//! its set it has folded, so a later prediction only scans newly appended
//! facts. Writing to a fact that some slot already folded clears the table.

mod bitmask;
mod compound;
mod equality;
mod presence;
mod range;


use std::collections::{HashMap, HashSet};

use roaring::RoaringBitmap;
use tracing::{debug, trace};

use crate::config::Tuning;
use crate::eval::Params;
use crate::fact::FactId;
use crate::store::{Candidates, SetId};
use crate::term::{Operand, Term};
use crate::value::Value;

use bitmask::Bitmask;
use equality::Equality;
use presence::Presence;
use range::Range;

/// Incremental state of one strategy.
trait Strategy: Default {
    fn fold(&mut self, pos: usize, values: Option<&[Value]>);

    /// Called once after a batch of folds.
    fn settle(&mut self) {}
}

struct Fed<S> {
    mark: usize,
    strategy: S,
}

type SlotKey = (SetId, String);

/// Narrowed candidate positions, ascending. `exact` means the positions are
/// precisely the facts the term accepts, which `not` needs to complement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Prediction {
    positions: Vec<usize>,
    exact: bool,
}

impl Prediction {
    fn exact(positions: Vec<usize>) -> Self {
        Self {
            positions,
            exact: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Live per-property structures
    pub slots: usize,
    /// Facts folded since the index was created, across clears
    pub scans: u64,
}

#[derive(Default)]
pub struct Index {
    presence: HashMap<SlotKey, Fed<Presence>>,
    equality: HashMap<SlotKey, Fed<Equality>>,
    range: HashMap<SlotKey, Fed<Range>>,
    bitmask: HashMap<SlotKey, Fed<Bitmask>>,
    folded: HashSet<FactId>,
    scans: u64,
}

/// Fold facts appended since the slot's mark, then hand out the slot.
fn feed<'a, S: Strategy>(
    slots: &'a mut HashMap<SlotKey, Fed<S>>,
    folded: &mut HashSet<FactId>,
    scans: &mut u64,
    set: SetId,
    candidates: &Candidates,
    prop: &str,
) -> &'a S {
    let fed = slots
        .entry((set, prop.to_string()))
        .or_insert_with(|| Fed {
            mark: 0,
            strategy: S::default(),
        });
    let entries = candidates.entries();
    if fed.mark < entries.len() {
        for (pos, entry) in entries.iter().enumerate().skip(fed.mark) {
            fed.strategy.fold(pos, entry.read().get(prop));
            folded.insert(entry.id());
            *scans += 1;
        }
        fed.mark = entries.len();
        fed.strategy.settle();
    }
    &fed.strategy
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            slots: self.presence.len() + self.equality.len() + self.range.len() + self.bitmask.len(),
            scans: self.scans,
        }
    }

    /// Positions in `candidates` worth evaluating `term` on, ascending.
    pub(crate) fn predict(
        &mut self,
        term: &Term,
        candidates: &Candidates,
        params: &Params,
        tuning: &Tuning,
    ) -> Option<Vec<usize>> {
        let set = candidates.id()?;
        let mut guess = Guess {
            index: self,
            set,
            candidates,
            params,
            tuning,
        };
        let prediction = guess.root(term)?;
        trace!(
            op = term.op(),
            candidates = candidates.len(),
            predicted = prediction.positions.len(),
            exact = prediction.exact,
            "predicted"
        );
        Some(prediction.positions)
    }

    /// A fact changed in place: drop everything if it was folded anywhere.
    pub(crate) fn touch(&mut self, id: FactId) {
        if self.folded.contains(&id) {
            self.clear("a folded fact changed");
        }
    }

    pub(crate) fn clear(&mut self, reason: &str) {
        let stats = self.stats();
        if stats.slots > 0 {
            debug!(slots = stats.slots, reason, "index cleared");
        }
        self.presence.clear();
        self.equality.clear();
        self.range.clear();
        self.bitmask.clear();
        self.folded.clear();
    }
}

// ── Guessing ────────────────────────────────────────────────────────

/// One prediction in progress.
struct Guess<'a> {
    index: &'a mut Index,
    set: SetId,
    candidates: &'a Candidates,
    params: &'a Params,
    tuning: &'a Tuning,
}

impl Guess<'_> {
    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn all(&self) -> Prediction {
        Prediction::exact((0..self.len()).collect())
    }

    /// Drop positions a longer snapshot of the same set folded in.
    fn clip(&self, mut positions: Vec<usize>) -> Vec<usize> {
        let len = self.len();
        let keep = positions.partition_point(|p| *p < len);
        positions.truncate(keep);
        positions
    }

    /// Literal or bound-variable values; `None` for anything else.
    fn bound(&self, operand: &Operand) -> Option<Vec<Value>> {
        match operand {
            Operand::Literal(v) => Some(vec![v.clone()]),
            Operand::Var(name) => Some(self.params.get(name).cloned().unwrap_or_default()),
            _ => None,
        }
    }

    /// `(op prop bound)` or `(op bound prop)`; the flag is true when flipped.
    fn split<'t>(&self, term: &'t Term) -> Option<(&'t str, Vec<Value>, bool)> {
        match term.operands() {
            [Operand::Prop(p), other] => Some((p, self.bound(other)?, false)),
            [other, Operand::Prop(p)] => Some((p, self.bound(other)?, true)),
            _ => None,
        }
    }

    fn guess(&mut self, term: &Term) -> Option<Prediction> {
        match term.op() {
            "exists" | "absent" | "one" | "many" => self.presence(term),
            "eq" => self.equality(term),
            "gt" | "gte" | "lt" | "lte" => self.range(term),
            "not" => self.not(term),
            "and" => self.and(term.operands()),
            "or" => self.or(term),
            "always" if term.operands().is_empty() => Some(self.all()),
            "never" if term.operands().is_empty() => Some(Prediction::exact(Vec::new())),
            _ => None,
        }
    }

    fn presence(&mut self, term: &Term) -> Option<Prediction> {
        let [Operand::Prop(prop)] = term.operands() else {
            return None;
        };
        let Index {
            presence,
            folded,
            scans,
            ..
        } = &mut *self.index;
        let slot = feed(presence, folded, scans, self.set, self.candidates, prop);
        let positions = slot.select(term.op())?;
        Some(Prediction::exact(self.clip(positions)))
    }

    fn equality(&mut self, term: &Term) -> Option<Prediction> {
        let (prop, values, _) = self.split(term)?;
        let Index {
            equality,
            folded,
            scans,
            ..
        } = &mut *self.index;
        let slot = feed(equality, folded, scans, self.set, self.candidates, prop);
        let positions = slot.lookup(&values);
        Some(Prediction::exact(self.clip(positions)))
    }

    fn range(&mut self, term: &Term) -> Option<Prediction> {
        let (prop, values, flipped) = self.split(term)?;
        let op = match (term.op(), flipped) {
            (op, false) => op,
            ("gt", true) => "lt",
            ("gte", true) => "lte",
            ("lt", true) => "gt",
            ("lte", true) => "gte",
            _ => return None,
        };
        let Index {
            range,
            folded,
            scans,
            ..
        } = &mut *self.index;
        let slot = feed(range, folded, scans, self.set, self.candidates, prop);
        let mut positions = Vec::new();
        for v in &values {
            positions = compound::union(&positions, &slot.select(op, v));
        }
        Some(Prediction::exact(self.clip(positions)))
    }

    /// AND of equalities through bitmaps; `None` unless every
    /// conjunct is `eq` on its own property against a literal or variable.
    fn bitmask(&mut self, terms: &[&Term]) -> Option<Vec<usize>> {
        if terms.len() < 2 || u32::try_from(self.len()).is_err() {
            return None;
        }
        let mut conjuncts = Vec::with_capacity(terms.len());
        let mut props = HashSet::new();
        for &t in terms {
            if t.op() != "eq" {
                return None;
            }
            let (prop, values, _) = self.split(t)?;
            if !props.insert(prop) {
                return None;
            }
            conjuncts.push((prop, values));
        }
        let mut acc: Option<RoaringBitmap> = None;
        for (prop, values) in conjuncts {
            let Index {
                bitmask,
                folded,
                scans,
                ..
            } = &mut *self.index;
            let slot = feed(bitmask, folded, scans, self.set, self.candidates, prop);
            let mask = slot.mask(&values);
            let next = match acc {
                None => mask,
                Some(prev) => prev & mask,
            };
            if next.is_empty() {
                return Some(Vec::new());
            }
            acc = Some(next);
        }
        acc.map(|m| self.clip(bitmask::decode(&m)))
    }
}
