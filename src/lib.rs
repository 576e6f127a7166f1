//! Factbase
//!
//! An embeddable, in-memory, schema-less fact store. Facts are ordered maps
//! from property names to deduplicated lists of scalar values; they are
//! selected with a small Lisp-like query language, e.g.
//! `(and (eq kind 'file') (gt size 1024))`.
//!
//! - `term`: query AST and parser
//! - `eval`: the evaluator and its built-in operators
//! - `index`: predicate pushdown that narrows the facts a query evaluates
//! - `store`: the `Factbase`, queries, and copy-on-write transactions
//! - `codec`: export/import

pub mod config;
pub mod error;
pub mod eval;
pub mod fact;
pub mod term;
pub mod value;

mod codec;
mod index;
mod store;

pub use config::Tuning;
pub use error::{FactbaseError, Result};
pub use eval::{Operator, Outcome, Params, Registry, Scope};
pub use fact::{Fact, FactId, Props};
pub use index::IndexStats;
pub use store::{Churn, Factbase, Query, Store, Txn};
pub use term::{parse, Operand, Syntax, Term};
pub use value::Value;
