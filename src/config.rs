//! Tunable engine parameters.
//!
//! The pushdown shortcuts below are cost heuristics: they decide when an
//! `and`/`or` prediction stops refining, never whether it is sound.

use serde::{Deserialize, Serialize};

// ── Defaults ────────────────────────────────────────────────────────

/// `and` stops intersecting once the running result is below `candidates / 32`.
const AND_SHORTCUT_RATIO: usize = 32;

/// ...or below this many facts, whichever is larger.
const AND_SHORTCUT_FLOOR: usize = 128;

/// `or` gives up and returns the whole candidate set once the union exceeds a quarter of it.
const OR_SHORTCUT_RATIO: usize = 4;

/// Distinct query texts remembered by the parse cache before it is flushed.
const PARSE_CACHE_LIMIT: usize = 4096;

/// Nesting limit for user-defined operator expansion.
const MAX_DEPTH: usize = 64;

// ── Tuning ──────────────────────────────────────────────────────────

/// Engine parameters, fixed at construction time of a `Factbase`.
///
/// Transactions inherit the tuning of the store they were opened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Use the predicate-pushdown index at all. With `false` every query
    /// evaluates every candidate.
    pub indexing: bool,
    pub and_shortcut_ratio: usize,
    pub and_shortcut_floor: usize,
    pub or_shortcut_ratio: usize,
    pub parse_cache_limit: usize,
    pub max_depth: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            indexing: true,
            and_shortcut_ratio: AND_SHORTCUT_RATIO,
            and_shortcut_floor: AND_SHORTCUT_FLOOR,
            or_shortcut_ratio: OR_SHORTCUT_RATIO,
            parse_cache_limit: PARSE_CACHE_LIMIT,
            max_depth: MAX_DEPTH,
        }
    }
}

impl Tuning {
    pub fn with_indexing(mut self, on: bool) -> Self {
        self.indexing = on;
        self
    }

    pub fn with_and_shortcut(mut self, ratio: usize, floor: usize) -> Self {
        self.and_shortcut_ratio = ratio.max(1);
        self.and_shortcut_floor = floor;
        self
    }

    pub fn with_or_shortcut(mut self, ratio: usize) -> Self {
        self.or_shortcut_ratio = ratio.max(1);
        self
    }

    pub fn with_parse_cache_limit(mut self, limit: usize) -> Self {
        self.parse_cache_limit = limit;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Size below which an `and` prediction is considered narrow enough.
    pub(crate) fn and_cutoff(&self, candidates: usize) -> usize {
        (candidates / self.and_shortcut_ratio.max(1)).max(self.and_shortcut_floor)
    }

    /// Size above which an `or` prediction is considered too wide to be useful.
    pub(crate) fn or_cutoff(&self, candidates: usize) -> usize {
        candidates / self.or_shortcut_ratio.max(1)
    }
}
