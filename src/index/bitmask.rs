//! Roaring bitmaps for conjunctions of equalities.
//!
//! Every (property, value) pair owns the set of positions holding it. A
//! conjunction intersects those sets and only decodes what survives.

use std::collections::HashMap;

use roaring::RoaringBitmap;

use crate::value::{Value, ValueKey};

use super::Strategy;

#[derive(Default)]
pub(super) struct Bitmask {
    masks: HashMap<ValueKey, RoaringBitmap>,
}

impl Strategy for Bitmask {
    fn fold(&mut self, pos: usize, values: Option<&[Value]>) {
        // positions past u32 never get here, see `Guess::bitmask`
        let Ok(pos) = u32::try_from(pos) else {
            return;
        };
        for v in values.unwrap_or_default() {
            self.masks
                .entry(v.key())
                .or_insert_with(RoaringBitmap::new)
                .insert(pos);
        }
    }
}

impl Bitmask {
    /// Facts holding any of `values`.
    pub(super) fn mask(&self, values: &[Value]) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for m in values.iter().filter_map(|v| self.masks.get(&v.key())) {
            out |= m;
        }
        out
    }
}

pub(super) fn decode(mask: &RoaringBitmap) -> Vec<usize> {
    mask.iter().map(|p| p as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fed(values: &[i64]) -> Bitmask {
        let mut b = Bitmask::default();
        for (pos, v) in values.iter().enumerate() {
            let v = Value::Int(*v);
            b.fold(pos, Some(std::slice::from_ref(&v)));
        }
        b
    }

    #[test]
    fn test_masks_cover_every_position() {
        let values: Vec<i64> = (0..200).map(|i| i % 3).collect();
        let b = fed(&values);
        let zeros = decode(&b.mask(&[Value::Int(0)]));
        assert_eq!(zeros, (0..200).filter(|i| i % 3 == 0).collect::<Vec<_>>());
    }

    #[test]
    fn test_any_of_several_values() {
        let b = fed(&[1, 2, 3, 1, 2]);
        let m = b.mask(&[Value::Int(1), Value::Float(3.0), Value::Int(9)]);
        assert_eq!(decode(&m), vec![0, 2, 3]);
        let both = &m & &b.mask(&[Value::Int(2), Value::Int(3)]);
        assert_eq!(decode(&both), vec![2]);
    }
}
