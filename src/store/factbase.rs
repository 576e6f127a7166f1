//! The root collection and the `Factbase` that owns it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec;
use crate::config::Tuning;
use crate::error::Result;
use crate::eval::Registry;
use crate::fact::{Entry, Fact, FactId, Props};
use crate::index::{Index, IndexStats};
use crate::term::Term;
use crate::value::Value;

use super::{next_owner, txn, Backing, Candidates, Changes, Churn, Engine, Query, SetId, Store, Txn};

struct Shelf {
    entries: Arc<Vec<Arc<Entry>>>,
    generation: u64,
}

/// Append-only (from the outside) list of entries behind one lock.
///
/// Lock order: index, then shelf, then an entry's own lock.
pub(crate) struct Core {
    engine: Arc<Engine>,
    owner: u64,
    shelf: Mutex<Shelf>,
    index: Arc<Mutex<Index>>,
}

impl Core {
    fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            owner: next_owner(),
            shelf: Mutex::new(Shelf {
                entries: Arc::new(Vec::new()),
                generation: 0,
            }),
            index: Arc::new(Mutex::new(Index::new())),
        }
    }

    fn push(&self, entries: Vec<Arc<Entry>>) {
        let mut shelf = self.shelf.lock();
        Arc::make_mut(&mut shelf.entries).extend(entries);
    }

    fn len(&self) -> usize {
        self.shelf.lock().entries.len()
    }
}

/// Drop entries whose id is in `ids`; a new generation if anything went.
fn retain(shelf: &mut Shelf, index: &mut Index, ids: &HashSet<FactId>) -> usize {
    let before = shelf.entries.len();
    Arc::make_mut(&mut shelf.entries).retain(|e| !ids.contains(&e.id()));
    let removed = before - shelf.entries.len();
    if removed > 0 {
        shelf.generation += 1;
        index.clear("facts deleted");
    }
    removed
}

impl Backing for Core {
    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn candidates(&self) -> Candidates {
        let shelf = self.shelf.lock();
        let id = SetId {
            owner: self.owner,
            generation: shelf.generation,
        };
        Candidates::new(id, shelf.entries.clone())
    }

    fn resolve(&self, entry: &Arc<Entry>) -> Arc<Entry> {
        entry.clone()
    }

    fn insert(&self) -> Result<Arc<Entry>> {
        let entry = Entry::new(Props::new());
        self.push(vec![entry.clone()]);
        Ok(entry)
    }

    fn append(&self, entry: &Arc<Entry>, prop: &str, value: Value) -> Result<()> {
        let mut index = self.index.lock();
        if entry.push(prop, value) {
            index.touch(entry.id());
        }
        Ok(())
    }

    fn remove(&self, ids: &HashSet<FactId>) -> Result<usize> {
        let mut index = self.index.lock();
        let mut shelf = self.shelf.lock();
        Ok(retain(&mut shelf, &mut index, ids))
    }

    fn reconcile(&self, changes: Changes) -> Result<()> {
        let mut index = self.index.lock();
        let mut shelf = self.shelf.lock();
        if !changes.replaced.is_empty() {
            let by_id: HashMap<FactId, &Arc<Entry>> =
                shelf.entries.iter().map(|e| (e.id(), e)).collect();
            for (id, copy) in &changes.replaced {
                match by_id.get(id) {
                    Some(entry) => {
                        entry.replace(copy.snapshot());
                        index.touch(*id);
                    }
                    None => warn!(id, "replaced fact is gone from the store, skipped"),
                }
            }
        }
        if !changes.deleted.is_empty() {
            let ids: HashSet<FactId> = changes.deleted.iter().copied().collect();
            let removed = retain(&mut shelf, &mut index, &ids);
            if removed < ids.len() {
                warn!(
                    missing = ids.len() - removed,
                    "deleted facts are gone from the store, skipped"
                );
            }
        }
        Arc::make_mut(&mut shelf.entries).extend(changes.inserted);
        Ok(())
    }

    fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }
}

// ── Factbase ────────────────────────────────────────────────────────

/// An in-memory fact store.
///
/// Cheap to clone: clones share the same facts, operators and index.
///
/// ```ignore
/// let fb = Factbase::new();
/// let f = fb.insert()?;
/// f.append("foo", 42)?;
/// assert_eq!(fb.query("(eq foo 42)")?.each(&Params::new(), |_| Ok(()))?, 1);
/// ```
#[derive(Clone)]
pub struct Factbase {
    core: Arc<Core>,
    backing: Arc<dyn Backing>,
}

impl Default for Factbase {
    fn default() -> Self {
        Self::new()
    }
}

impl Factbase {
    pub fn new() -> Self {
        Self::with_tuning(Tuning::default())
    }

    pub fn with_tuning(tuning: Tuning) -> Self {
        let core = Arc::new(Core::new(Engine::new(tuning)));
        Self {
            backing: core.clone(),
            core,
        }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.core.engine.tuning
    }

    /// Operators defined on this store, by `defn` or programmatically.
    pub fn registry(&self) -> &Registry {
        &self.core.engine.registry
    }

    pub fn index_stats(&self) -> IndexStats {
        self.core.index.lock().stats()
    }

    /// Serialize every fact, in order.
    pub fn export(&self) -> Result<Vec<u8>> {
        let facts = super::dump(&*self.core);
        let bytes = codec::encode(facts)?;
        debug!(bytes = bytes.len(), "exported");
        Ok(bytes)
    }

    /// Append the facts of an exported blob; returns how many were added.
    pub fn import(&self, bytes: &[u8]) -> Result<usize> {
        let facts = codec::decode(bytes)?;
        let count = facts.len();
        self.core.push(facts.into_iter().map(Entry::new).collect());
        debug!(facts = count, "imported");
        Ok(count)
    }
}

impl Store for Factbase {
    fn insert(&self) -> Result<Fact> {
        super::insert(&self.backing)
    }

    fn query(&self, text: &str) -> Result<Query> {
        super::query(&self.backing, text)
    }

    fn query_term(&self, term: Arc<Term>) -> Query {
        Query::new(term, self.backing.clone())
    }

    fn txn(&self, body: &mut dyn FnMut(&Txn) -> Result<()>) -> Result<Churn> {
        txn::run(self.backing.clone(), body)
    }

    fn size(&self) -> usize {
        self.core.len()
    }
}
