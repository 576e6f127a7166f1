//! `eq`: value → positions of facts holding it.

use std::collections::HashMap;

use crate::value::{Value, ValueKey};

use super::compound::union;
use super::Strategy;

#[derive(Default)]
pub(super) struct Equality {
    map: HashMap<ValueKey, Vec<usize>>,
}

impl Strategy for Equality {
    fn fold(&mut self, pos: usize, values: Option<&[Value]>) {
        for v in values.unwrap_or_default() {
            let list = self.map.entry(v.key()).or_default();
            // 1 and 1.0 share a key; keep each position once
            if list.last() != Some(&pos) {
                list.push(pos);
            }
        }
    }
}

impl Equality {
    /// Facts holding any of `values`.
    pub(super) fn lookup(&self, values: &[Value]) -> Vec<usize> {
        let mut out: Vec<usize> = Vec::new();
        for v in values {
            if let Some(list) = self.map.get(&v.key()) {
                out = if out.is_empty() {
                    list.clone()
                } else {
                    union(&out, list)
                };
            }
        }
        out
    }
}
