//! Facts: ordered, multi-valued property maps.
//!
//! - `Props` is the plain data (what gets exported, copied, compared)
//! - `Entry` is an identified, shared record living in a collection
//! - `Fact` is the handle clients hold: an entry plus the store it belongs to,
//!   so that writes go through copy-on-write and index invalidation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::error::{FactbaseError, Result};
use crate::store::Backing;
use crate::value::Value;

/// Process-unique fact identity. Copies made by a transaction get fresh ids.
pub type FactId = u64;

static NEXT_FACT_ID: AtomicU64 = AtomicU64::new(1);

/// Names that are keywords of the query language.
const RESERVED: [&str; 3] = ["true", "false", "nil"];

/// `[a-z_][a-zA-Z0-9_]*`
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if !is_identifier(name) {
        return Err(FactbaseError::Invariant(format!(
            "invalid property name '{}'",
            name
        )));
    }
    if RESERVED.contains(&name) {
        return Err(FactbaseError::Invariant(format!(
            "property name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

// ── Props ───────────────────────────────────────────────────────────

/// Property name → non-empty, deduplicated list of values, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Props {
    entries: Vec<(String, Vec<Value>)>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prop: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(name, _)| name == prop)
            .map(|(_, values)| values.as_slice())
    }

    pub fn contains(&self, prop: &str, value: &Value) -> bool {
        self.get(prop).is_some_and(|vv| vv.contains(value))
    }

    /// Append a value; returns false if it was already present.
    pub fn append(&mut self, prop: &str, value: Value) -> bool {
        match self.entries.iter_mut().find(|(name, _)| name == prop) {
            Some((_, values)) => {
                if values.contains(&value) {
                    return false;
                }
                values.push(value);
            }
            None => self.entries.push((prop.to_string(), vec![value])),
        }
        true
    }

    /// Append every value of `other`, keeping first-seen order.
    pub fn merge(&mut self, other: &Props) {
        for (prop, values) in other.iter() {
            for v in values {
                self.append(prop, v.clone());
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Times cut to whole seconds; values that then coincide are merged.
    pub(crate) fn normalized(self) -> Props {
        let mut out = Props::new();
        for (name, values) in self.entries {
            for v in values {
                out.append(&name, v.normalized());
            }
        }
        out
    }

    /// Check names and values, as done before anything is imported.
    pub(crate) fn validate(&self) -> Result<()> {
        for (name, values) in self.iter() {
            validate_name(name)?;
            if values.is_empty() {
                return Err(FactbaseError::Invariant(format!(
                    "property '{}' has no values",
                    name
                )));
            }
            for v in values {
                v.validate()?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (name, values)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let vv: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            write!(f, " {}: [{}]", name, vv.join(", "))?;
        }
        write!(f, " ]")
    }
}

// ── Entry ───────────────────────────────────────────────────────────

/// One record as held by a collection.
#[derive(Debug)]
pub struct Entry {
    id: FactId,
    props: RwLock<Props>,
}

impl Entry {
    pub(crate) fn new(props: Props) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_FACT_ID.fetch_add(1, Ordering::Relaxed),
            props: RwLock::new(props),
        })
    }

    pub fn id(&self) -> FactId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Props> {
        self.props.read()
    }

    pub fn snapshot(&self) -> Props {
        self.props.read().clone()
    }

    pub fn get(&self, prop: &str) -> Option<Vec<Value>> {
        self.props.read().get(prop).map(|vv| vv.to_vec())
    }

    pub(crate) fn holds(&self, prop: &str, value: &Value) -> bool {
        self.props.read().contains(prop, value)
    }

    pub(crate) fn push(&self, prop: &str, value: Value) -> bool {
        self.props.write().append(prop, value)
    }

    pub(crate) fn replace(&self, props: Props) {
        *self.props.write() = props;
    }
}

// ── Fact ────────────────────────────────────────────────────────────

/// Handle to a fact in a `Factbase` or a transaction.
///
/// Facts yielded by a query may carry an overlay of properties derived by
/// `as`/`join`; those are visible through `get` but never stored.
#[derive(Clone)]
pub struct Fact {
    entry: Arc<Entry>,
    backing: Arc<dyn Backing>,
    overlay: Option<Arc<Props>>,
}

impl Fact {
    pub(crate) fn new(entry: Arc<Entry>, backing: Arc<dyn Backing>, overlay: Option<Props>) -> Self {
        Self {
            entry,
            backing,
            overlay: overlay.filter(|o| !o.is_empty()).map(Arc::new),
        }
    }

    pub(crate) fn entry(&self) -> &Arc<Entry> {
        &self.entry
    }

    /// Identity of the record this handle was created for.
    pub fn id(&self) -> FactId {
        self.entry.id()
    }

    /// Current stored properties merged with the overlay.
    pub fn props(&self) -> Props {
        let mut props = self.backing.resolve(&self.entry).snapshot();
        if let Some(overlay) = &self.overlay {
            props.merge(overlay);
        }
        props
    }

    pub fn get(&self, prop: &str) -> Option<Vec<Value>> {
        let stored = self.backing.resolve(&self.entry).get(prop);
        match self.overlay.as_ref().and_then(|o| o.get(prop)) {
            None => stored,
            Some(extra) => {
                let mut values = stored.unwrap_or_default();
                for v in extra {
                    if !values.contains(v) {
                        values.push(v.clone());
                    }
                }
                Some(values)
            }
        }
    }

    pub fn first(&self, prop: &str) -> Option<Value> {
        self.get(prop).and_then(|vv| vv.into_iter().next())
    }

    pub fn properties(&self) -> Vec<String> {
        self.props().names().map(str::to_string).collect()
    }

    /// Append a value to a property; appending a value already present is a no-op.
    pub fn append(&self, prop: &str, value: impl Into<Value>) -> Result<()> {
        validate_name(prop)?;
        let value = value.into().normalized();
        value.validate()?;
        self.backing.append(&self.entry, prop, value)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.props())
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fact")
            .field("id", &self.entry.id())
            .field("props", &self.props())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_deduplicates_and_keeps_order() {
        let mut p = Props::new();
        assert!(p.append("foo", Value::Int(1)));
        assert!(p.append("foo", Value::Int(2)));
        assert!(!p.append("foo", Value::Int(1)));
        assert!(p.append("bar", Value::from("x")));
        assert_eq!(p.get("foo"), Some(&[Value::Int(1), Value::Int(2)][..]));
        assert_eq!(p.names().collect::<Vec<_>>(), vec!["foo", "bar"]);
    }

    #[test]
    fn test_display() {
        let mut p = Props::new();
        p.append("a", Value::Int(1));
        p.append("a", Value::Int(2));
        p.append("b", Value::from("x"));
        assert_eq!(p.to_string(), "[ a: [1, 2], b: ['x'] ]");
        assert_eq!(Props::new().to_string(), "[ ]");
    }

    #[test]
    fn test_names() {
        assert!(validate_name("foo_Bar9").is_ok());
        assert!(validate_name("_x").is_ok());
        assert!(validate_name("Foo").is_err());
        assert!(validate_name("9a").is_err());
        assert!(validate_name("a-b").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("nil").is_err());
    }

    #[test]
    fn test_entries_get_distinct_ids() {
        let a = Entry::new(Props::new());
        let b = Entry::new(a.snapshot());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_validate_rejects_empty_lists() {
        let p = Props {
            entries: vec![("foo".to_string(), vec![])],
        };
        assert!(p.validate().is_err());
    }
}
