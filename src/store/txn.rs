//! Transaction coordinator.

use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FactbaseError, Result};
use crate::fact::Fact;
use crate::term::Term;

use super::taped::{Status, Taped};
use super::{Backing, Query, Store};

/// What a transaction changed in the store it committed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Churn {
    pub inserted: usize,
    pub deleted: usize,
    pub modified: usize,
}

impl Churn {
    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.inserted + self.deleted + self.modified
    }
}

impl AddAssign for Churn {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.deleted += rhs.deleted;
        self.modified += rhs.modified;
    }
}

impl fmt::Display for Churn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}i/{}d/{}m", self.inserted, self.deleted, self.modified)
    }
}

/// Store handle passed to a transaction body.
///
/// Facts inserted or read through it belong to the transaction: after commit
/// or rollback, writing to them fails with `FactbaseError::Closed`.
pub struct Txn {
    taped: Arc<Taped>,
    backing: Arc<dyn Backing>,
}

impl Txn {
    fn open(parent: Arc<dyn Backing>) -> Self {
        let taped = Arc::new(Taped::new(parent));
        Self {
            backing: taped.clone(),
            taped,
        }
    }

    /// The signal a body returns to discard its changes:
    /// `return Txn::rollback();`
    pub fn rollback() -> Result<()> {
        Err(FactbaseError::Rollback)
    }

    /// True once the first write has copied the underlying facts.
    pub fn is_copied(&self) -> bool {
        self.taped.status() == Status::Copied
    }
}

impl Store for Txn {
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
        run(self.backing.clone(), body)
    }

    fn size(&self) -> usize {
        self.backing.candidates().len()
    }
}

/// Run `body` against a copy-on-write view of `parent`, then commit or roll back.
pub(crate) fn run(parent: Arc<dyn Backing>, body: &mut dyn FnMut(&Txn) -> Result<()>) -> Result<Churn> {
    let txn = Txn::open(parent);
    match body(&txn) {
        Ok(()) => {
            let churn = txn.taped.commit()?;
            debug!(%churn, "transaction committed");
            Ok(churn)
        }
        Err(e) if e.is_rollback() => {
            txn.taped.rollback();
            debug!("transaction rolled back");
            Ok(Churn::default())
        }
        Err(e) => {
            txn.taped.rollback();
            debug!(error = %e, "transaction failed, rolled back");
            Err(e)
        }
    }
}
