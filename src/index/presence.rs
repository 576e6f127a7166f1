//! `exists`, `absent`, `one`, `many`: facts by number of values of a property.

use crate::value::Value;

use super::compound::difference;
use super::Strategy;

#[derive(Default)]
pub(super) struct Presence {
    has: Vec<usize>,
    lacks: Vec<usize>,
    single: Vec<usize>,
}

impl Strategy for Presence {
    fn fold(&mut self, pos: usize, values: Option<&[Value]>) {
        match values {
            Some(vv) if !vv.is_empty() => {
                self.has.push(pos);
                if vv.len() == 1 {
                    self.single.push(pos);
                }
            }
            _ => self.lacks.push(pos),
        }
    }
}

impl Presence {
    pub(super) fn select(&self, op: &str) -> Option<Vec<usize>> {
        match op {
            "exists" => Some(self.has.clone()),
            "absent" => Some(self.lacks.clone()),
            "one" => Some(self.single.clone()),
            "many" => Some(difference(&self.has, &self.single)),
            _ => None,
        }
    }
}
