//! Fact collections and the client surface over them.
//!
//! Everything that holds facts implements `Backing`: the root collection of a
//! `Factbase` and the copy-on-write view of a transaction. `Fact`, `Query` and
//! the evaluator only ever talk to that seam, so the same handle types work
//! at any nesting depth.

mod factbase;
mod taped;
mod txn;


pub use factbase::Factbase;
pub use txn::{Churn, Txn};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::Tuning;
use crate::error::Result;
use crate::eval::{self, Params, Registry};
use crate::fact::{Entry, Fact, FactId, Props};
use crate::index::Index;
use crate::term::{Syntax, Term};
use crate::value::Value;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_owner() -> u64 {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

// ── Engine ──────────────────────────────────────────────────────────

/// Per-store machinery shared by a `Factbase` and all of its transactions.
pub(crate) struct Engine {
    pub(crate) tuning: Tuning,
    pub(crate) registry: Registry,
    pub(crate) syntax: Syntax,
}

impl Engine {
    pub(crate) fn new(tuning: Tuning) -> Arc<Self> {
        Arc::new(Self {
            syntax: Syntax::new(tuning.parse_cache_limit),
            registry: Registry::new(),
            tuning,
        })
    }
}

// ── Candidates ──────────────────────────────────────────────────────

/// Identity of one version of a collection. Deleting from a collection
/// shifts positions, so it starts a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SetId {
    pub(crate) owner: u64,
    pub(crate) generation: u64,
}

/// An immutable, ordered snapshot of facts to evaluate a term over.
///
/// Only identified sets are indexed; ephemeral ones (what `agg` and `sorted`
/// work on) are always scanned.
#[derive(Clone)]
pub(crate) struct Candidates {
    id: Option<SetId>,
    entries: Arc<Vec<Arc<Entry>>>,
}

impl Candidates {
    pub(crate) fn new(id: SetId, entries: Arc<Vec<Arc<Entry>>>) -> Self {
        Self {
            id: Some(id),
            entries,
        }
    }

    pub(crate) fn ephemeral(entries: Vec<Arc<Entry>>) -> Self {
        Self {
            id: None,
            entries: Arc::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn id(&self) -> Option<SetId> {
        self.id
    }

    pub(crate) fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }
}

// ── Backing ─────────────────────────────────────────────────────────

/// What a committing transaction hands to the store it was opened on.
#[derive(Default)]
pub(crate) struct Changes {
    /// Facts created in the transaction, in creation order
    pub(crate) inserted: Vec<Arc<Entry>>,
    /// Backing fact id → the transaction's final version of it
    pub(crate) replaced: Vec<(FactId, Arc<Entry>)>,
    pub(crate) deleted: Vec<FactId>,
}

impl Changes {
    pub(crate) fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.replaced.is_empty() && self.deleted.is_empty()
    }
}

/// A fact collection: the root of a `Factbase` or a transaction's view.
pub(crate) trait Backing: Send + Sync {
    fn engine(&self) -> &Arc<Engine>;

    /// Snapshot of the current facts.
    fn candidates(&self) -> Candidates;

    /// The entry that currently stands for `entry` in this collection.
    fn resolve(&self, entry: &Arc<Entry>) -> Arc<Entry>;

    fn insert(&self) -> Result<Arc<Entry>>;

    fn append(&self, entry: &Arc<Entry>, prop: &str, value: Value) -> Result<()>;

    /// Delete facts by id; returns how many were found.
    fn remove(&self, ids: &HashSet<FactId>) -> Result<usize>;

    /// Apply the changes of a transaction opened on this collection.
    fn reconcile(&self, changes: Changes) -> Result<()>;

    /// Index side-table to predict `candidates()` with.
    fn index(&self) -> Arc<Mutex<Index>>;
}

// ── Store ───────────────────────────────────────────────────────────

/// Operations common to a `Factbase` and a transaction.
pub trait Store {
    /// Append an empty fact and return a handle to fill it.
    fn insert(&self) -> Result<Fact>;

    /// Parse (or reuse) a query.
    fn query(&self, text: &str) -> Result<Query>;

    fn query_term(&self, term: Arc<Term>) -> Query;

    /// Run `body` in a nested transaction.
    ///
    /// The body commits by returning `Ok(())` and rolls back by returning
    /// `Err(FactbaseError::Rollback)`, which yields a zero churn; any other
    /// error is returned after rolling back.
    fn txn(&self, body: &mut dyn FnMut(&Txn) -> Result<()>) -> Result<Churn>;

    /// Number of facts.
    fn size(&self) -> usize;
}

pub(crate) fn insert(backing: &Arc<dyn Backing>) -> Result<Fact> {
    let entry = backing.insert()?;
    Ok(Fact::new(entry, backing.clone(), None))
}

pub(crate) fn query(backing: &Arc<dyn Backing>, text: &str) -> Result<Query> {
    let term = backing.engine().syntax.parse(text)?;
    Ok(Query::new(term, backing.clone()))
}

// ── Query ───────────────────────────────────────────────────────────

/// A parsed term bound to a store.
///
/// Every run takes a fresh snapshot of the store's facts, so a `Query` can be
/// kept and re-run as the store changes.
#[derive(Clone)]
pub struct Query {
    term: Arc<Term>,
    backing: Arc<dyn Backing>,
    over: Option<Candidates>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("term", &self.term)
            .finish_non_exhaustive()
    }
}

impl Query {
    pub(crate) fn new(term: Arc<Term>, backing: Arc<dyn Backing>) -> Self {
        Self {
            term,
            backing,
            over: None,
        }
    }

    pub fn term(&self) -> &Arc<Term> {
        &self.term
    }

    /// Restrict the query to an explicit list of facts, in the given order.
    pub fn over(mut self, facts: &[Fact]) -> Self {
        let entries = facts
            .iter()
            .map(|f| self.backing.resolve(f.entry()))
            .collect();
        self.over = Some(Candidates::ephemeral(entries));
        self
    }

    fn candidates(&self) -> Candidates {
        match &self.over {
            Some(c) => c.clone(),
            None => self.backing.candidates(),
        }
    }

    /// Call `f` on every matching fact, in collection order; returns the count.
    pub fn each<F>(&self, params: &Params, mut f: F) -> Result<usize>
    where
        F: FnMut(Fact) -> Result<()>,
    {
        let candidates = self.candidates();
        let backing = &self.backing;
        eval::select(&self.term, &candidates, params, backing, 0, &mut |hit| {
            f(Fact::new(hit.entry, backing.clone(), Some(hit.overlay)))
        })
    }

    pub fn facts(&self, params: &Params) -> Result<Vec<Fact>> {
        let mut out = Vec::new();
        self.each(params, |f| {
            out.push(f);
            Ok(())
        })?;
        Ok(out)
    }

    /// Evaluate a value-producing term once, with no fact in scope.
    ///
    /// `(agg (eq kind 'x') (count))` → `Some([Int(3)])`; nil → `None`.
    pub fn one(&self, params: &Params) -> Result<Option<Vec<Value>>> {
        let candidates = self.candidates();
        eval::evaluate(&self.term, &candidates, params, &self.backing)?.into_values()
    }

    /// Delete every matching fact; returns how many were deleted.
    pub fn delete(&self) -> Result<usize> {
        let mut ids = HashSet::new();
        let candidates = self.candidates();
        eval::select(
            &self.term,
            &candidates,
            &Params::new(),
            &self.backing,
            0,
            &mut |hit| {
                ids.insert(hit.entry.id());
                Ok(())
            },
        )?;
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.backing.remove(&ids)?;
        debug!(term = %self.term, deleted, "facts deleted");
        Ok(deleted)
    }
}

/// Props of every fact in a collection, in order.
pub(crate) fn dump(backing: &dyn Backing) -> Vec<Props> {
    backing
        .candidates()
        .entries()
        .iter()
        .map(|e| e.snapshot())
        .collect()
}
