//! `lt`, `lte`, `gt`, `gte`: (value, position) pairs sorted by value.
//!
//! Values of one comparable family (numbers, strings, times) are contiguous in
//! the total order, so a bound only needs a binary search inside its family.

use std::cmp::Ordering;

use crate::value::Value;

use super::Strategy;

#[derive(Default)]
pub(super) struct Range {
    pairs: Vec<(Value, usize)>,
}

impl Strategy for Range {
    fn fold(&mut self, pos: usize, values: Option<&[Value]>) {
        for v in values.unwrap_or_default() {
            self.pairs.push((v.clone(), pos));
        }
    }

    fn settle(&mut self) {
        // stable and adaptive: the already sorted prefix is a single run
        self.pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
}

impl Range {
    /// Positions of facts with some value standing in `op` relation to `bound`.
    pub(super) fn select(&self, op: &str, bound: &Value) -> Vec<usize> {
        if bound.compare(bound).is_none() {
            return Vec::new();
        }
        let family = {
            let lo = self.pairs.partition_point(|(x, _)| x.rank() < bound.rank());
            let hi = self.pairs.partition_point(|(x, _)| x.rank() <= bound.rank());
            &self.pairs[lo..hi]
        };
        let below = |x: &Value| x.compare(bound) == Some(Ordering::Less);
        let not_above = |x: &Value| x.compare(bound) != Some(Ordering::Greater);
        let slice = match op {
            "gt" => &family[family.partition_point(|(x, _)| not_above(x))..],
            "gte" => &family[family.partition_point(|(x, _)| below(x))..],
            "lt" => &family[..family.partition_point(|(x, _)| below(x))],
            "lte" => &family[..family.partition_point(|(x, _)| not_above(x))],
            _ => return Vec::new(),
        };
        let mut out: Vec<usize> = slice.iter().map(|(_, pos)| *pos).collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}
