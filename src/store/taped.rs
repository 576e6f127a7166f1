//! Copy-on-write view of a collection, as seen by one transaction.
//!
//! ```text
//!   Fresh ──first write──▶ Copied ──▶ Committed
//!     │                       │
//!     └───────────────────────┴─────▶ RolledBack
//! ```
//!
//! While `Fresh` every read is served by the parent. The first write copies
//! all entries of the parent; from then on the view is private until commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FactbaseError, Result};
use crate::fact::{Entry, FactId, Props};
use crate::index::Index;
use crate::value::Value;

use super::{next_owner, Backing, Candidates, Changes, Churn, Engine, SetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Fresh,
    Copied,
    Committed,
    RolledBack,
}

struct Tape {
    status: Status,
    entries: Arc<Vec<Arc<Entry>>>,
    generation: u64,
    /// Parent entry id → its copy
    forward: HashMap<FactId, Arc<Entry>>,
    /// Copy id → parent entry id
    backward: HashMap<FactId, FactId>,
    /// Ids of entries created here
    inserted: HashSet<FactId>,
    /// Ids of copies written to
    modified: HashSet<FactId>,
    /// Parent ids of deleted copies
    deleted: HashSet<FactId>,
    index: Option<Arc<Mutex<Index>>>,
}

impl Tape {
    fn open(&self) -> Result<()> {
        match self.status {
            Status::Fresh | Status::Copied => Ok(()),
            Status::Committed | Status::RolledBack => Err(FactbaseError::Closed),
        }
    }

    /// Parent-side id → id of the entry standing for it here.
    fn local(&self, id: FactId) -> FactId {
        self.forward.get(&id).map_or(id, |e| e.id())
    }

    /// Live entries of this view: copies not deleted since, and inserts.
    fn owns(&self, id: FactId) -> bool {
        self.inserted.contains(&id)
            || self
                .backward
                .get(&id)
                .is_some_and(|origin| !self.deleted.contains(origin))
    }

    fn churn(&self) -> Churn {
        Churn {
            inserted: self.inserted.len(),
            deleted: self.deleted.len(),
            modified: self.modified.len(),
        }
    }
}

/// Lock order: tape, then the parent, then the private index.
pub(crate) struct Taped {
    engine: Arc<Engine>,
    parent: Arc<dyn Backing>,
    owner: u64,
    tape: Mutex<Tape>,
}

impl Taped {
    pub(crate) fn new(parent: Arc<dyn Backing>) -> Self {
        Self {
            engine: parent.engine().clone(),
            parent,
            owner: next_owner(),
            tape: Mutex::new(Tape {
                status: Status::Fresh,
                entries: Arc::new(Vec::new()),
                generation: 0,
                forward: HashMap::new(),
                backward: HashMap::new(),
                inserted: HashSet::new(),
                modified: HashSet::new(),
                deleted: HashSet::new(),
                index: None,
            }),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.tape.lock().status
    }

    /// Duplicate every entry of the parent.
    fn copy(&self, tape: &mut Tape) {
        let origin = self.parent.candidates();
        let mut entries = Vec::with_capacity(origin.len());
        for e in origin.entries() {
            let copy = Entry::new(e.snapshot());
            tape.forward.insert(e.id(), copy.clone());
            tape.backward.insert(copy.id(), e.id());
            entries.push(copy);
        }
        tape.entries = Arc::new(entries);
        tape.generation += 1;
        tape.index = Some(Arc::new(Mutex::new(Index::new())));
        tape.status = Status::Copied;
    }

    fn writable<'t>(&self, tape: &'t mut Tape) -> Result<&'t mut Tape> {
        tape.open()?;
        if tape.status == Status::Fresh {
            self.copy(tape);
        }
        Ok(tape)
    }

    fn resolve_in(&self, tape: &Tape, entry: &Arc<Entry>) -> Arc<Entry> {
        let base = self.parent.resolve(entry);
        match tape.forward.get(&base.id()) {
            Some(copy) => copy.clone(),
            None => base,
        }
    }

    /// Hand the changes to the parent. A view that never copied has none.
    pub(crate) fn commit(&self) -> Result<Churn> {
        let mut tape = self.tape.lock();
        tape.open()?;
        let churn = tape.churn();
        let changes = Changes {
            inserted: tape
                .entries
                .iter()
                .filter(|e| tape.inserted.contains(&e.id()))
                .cloned()
                .collect(),
            replaced: tape
                .entries
                .iter()
                .filter(|e| tape.modified.contains(&e.id()))
                .filter_map(|e| tape.backward.get(&e.id()).map(|id| (*id, e.clone())))
                .collect(),
            deleted: tape.deleted.iter().copied().collect(),
        };
        if !changes.is_empty() {
            self.parent.reconcile(changes)?;
        }
        tape.status = Status::Committed;
        tape.index = None;
        Ok(churn)
    }

    pub(crate) fn rollback(&self) {
        let mut tape = self.tape.lock();
        if tape.open().is_ok() {
            tape.status = Status::RolledBack;
            tape.entries = Arc::new(Vec::new());
            tape.forward.clear();
            tape.backward.clear();
            tape.index = None;
        }
    }
}

impl Backing for Taped {
    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn candidates(&self) -> Candidates {
        let tape = self.tape.lock();
        match tape.status {
            Status::Copied => Candidates::new(
                SetId {
                    owner: self.owner,
                    generation: tape.generation,
                },
                tape.entries.clone(),
            ),
            _ => self.parent.candidates(),
        }
    }

    fn resolve(&self, entry: &Arc<Entry>) -> Arc<Entry> {
        let tape = self.tape.lock();
        match tape.status {
            Status::Copied => self.resolve_in(&tape, entry),
            _ => self.parent.resolve(entry),
        }
    }

    fn insert(&self) -> Result<Arc<Entry>> {
        let mut guard = self.tape.lock();
        let tape = self.writable(&mut guard)?;
        let entry = Entry::new(Props::new());
        Arc::make_mut(&mut tape.entries).push(entry.clone());
        tape.inserted.insert(entry.id());
        Ok(entry)
    }

    fn append(&self, entry: &Arc<Entry>, prop: &str, value: Value) -> Result<()> {
        let mut guard = self.tape.lock();
        guard.open()?;
        if guard.status == Status::Fresh && self.parent.resolve(entry).holds(prop, &value) {
            return Ok(());
        }
        let tape = self.writable(&mut guard)?;
        let target = self.resolve_in(tape, entry);
        let id = target.id();
        if !tape.owns(id) {
            return Err(FactbaseError::Invariant(format!(
                "fact {} is not part of this transaction",
                id
            )));
        }
        let index = tape.index.clone();
        let mut index = index.as_ref().map(|i| i.lock());
        if target.push(prop, value) {
            if let Some(index) = index.as_mut() {
                index.touch(id);
            }
            if !tape.inserted.contains(&id) {
                tape.modified.insert(id);
            }
        }
        Ok(())
    }

    fn remove(&self, ids: &HashSet<FactId>) -> Result<usize> {
        let mut guard = self.tape.lock();
        let tape = self.writable(&mut guard)?;
        let local: HashSet<FactId> = ids.iter().map(|id| tape.local(*id)).collect();
        let before = tape.entries.len();
        Arc::make_mut(&mut tape.entries).retain(|e| !local.contains(&e.id()));
        let removed = before - tape.entries.len();
        if removed == 0 {
            return Ok(0);
        }
        for id in &local {
            if tape.inserted.remove(id) {
                continue;
            }
            tape.modified.remove(id);
            if let Some(origin) = tape.backward.get(id) {
                tape.deleted.insert(*origin);
            }
        }
        tape.generation += 1;
        if let Some(index) = &tape.index {
            index.lock().clear("facts deleted");
        }
        Ok(removed)
    }

    fn reconcile(&self, changes: Changes) -> Result<()> {
        let mut guard = self.tape.lock();
        let tape = self.writable(&mut guard)?;
        let index = tape.index.clone();
        let mut index = index.as_ref().map(|i| i.lock());
        if !changes.replaced.is_empty() {
            let by_id: HashMap<FactId, Arc<Entry>> =
                tape.entries.iter().map(|e| (e.id(), e.clone())).collect();
            for (id, copy) in &changes.replaced {
                let local = tape.local(*id);
                if let Some(entry) = by_id.get(&local) {
                    entry.replace(copy.snapshot());
                    if let Some(index) = index.as_mut() {
                        index.touch(local);
                    }
                    if !tape.inserted.contains(&local) {
                        tape.modified.insert(local);
                    }
                }
            }
        }
        if !changes.deleted.is_empty() {
            let local: HashSet<FactId> = changes.deleted.iter().map(|id| tape.local(*id)).collect();
            let before = tape.entries.len();
            Arc::make_mut(&mut tape.entries).retain(|e| !local.contains(&e.id()));
            if tape.entries.len() < before {
                for id in &local {
                    if tape.inserted.remove(id) {
                        continue;
                    }
                    tape.modified.remove(id);
                    if let Some(origin) = tape.backward.get(id) {
                        tape.deleted.insert(*origin);
                    }
                }
                tape.generation += 1;
                if let Some(index) = index.as_mut() {
                    index.clear("nested transaction deleted facts");
                }
            }
        }
        for entry in changes.inserted {
            tape.inserted.insert(entry.id());
            Arc::make_mut(&mut tape.entries).push(entry);
        }
        Ok(())
    }

    fn index(&self) -> Arc<Mutex<Index>> {
        let tape = self.tape.lock();
        match (&tape.index, tape.status) {
            (Some(index), Status::Copied) => index.clone(),
            _ => self.parent.index(),
        }
    }
}
