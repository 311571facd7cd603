// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Classification code sets.

use serde::{Deserialize, Serialize};

/// A set of point classification codes (0-255), stored as a 256-bit mask.
///
/// Membership tests are a shift and a mask, cheap enough to run once per
/// candidate footprint for every ingested point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct ClassCodes {
    bits: [u64; 4],
}

impl ClassCodes {
    /// Empty set.
    pub const fn empty() -> Self {
        Self { bits: [0; 4] }
    }

    /// Set containing every code.
    pub const fn all() -> Self {
        Self { bits: [u64::MAX; 4] }
    }

    /// Build a set from a slice of codes.
    pub fn from_codes(codes: &[u8]) -> Self {
        let mut set = Self::empty();
        for &c in codes {
            set.insert(c);
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, code: u8) {
        self.bits[(code >> 6) as usize] |= 1u64 << (code & 63);
    }

    #[inline]
    pub fn remove(&mut self, code: u8) {
        self.bits[(code >> 6) as usize] &= !(1u64 << (code & 63));
    }

    #[inline]
    pub fn contains(&self, code: u8) -> bool {
        self.bits[(code >> 6) as usize] & (1u64 << (code & 63)) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Union of two sets.
    pub fn union(&self, other: &ClassCodes) -> ClassCodes {
        let mut bits = self.bits;
        for (b, o) in bits.iter_mut().zip(other.bits.iter()) {
            *b |= o;
        }
        ClassCodes { bits }
    }

    /// Codes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..256).map(|c| c as u8).filter(move |&c| self.contains(c))
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl From<Vec<u8>> for ClassCodes {
    fn from(codes: Vec<u8>) -> Self {
        Self::from_codes(&codes)
    }
}

impl From<ClassCodes> for Vec<u8> {
    fn from(codes: ClassCodes) -> Self {
        codes.iter().collect()
    }
}

impl FromIterator<u8> for ClassCodes {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = Self::empty();
        for c in iter {
            set.insert(c);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_remove() {
        let mut codes = ClassCodes::from_codes(&[2, 6, 64, 255]);
        assert!(codes.contains(2));
        assert!(codes.contains(64));
        assert!(codes.contains(255));
        assert!(!codes.contains(3));
        assert_eq!(codes.len(), 4);

        codes.remove(64);
        assert!(!codes.contains(64));
        assert_eq!(codes.iter().collect::<Vec<_>>(), vec![2, 6, 255]);
    }

    #[test]
    fn serde_as_list() {
        let codes: ClassCodes = serde_json::from_str("[9, 2]").unwrap();
        assert!(codes.contains(9) && codes.contains(2));
        assert_eq!(serde_json::to_string(&codes).unwrap(), "[2,9]");
    }

    #[test]
    fn union_and_all() {
        let a = ClassCodes::from_codes(&[1]);
        let b = ClassCodes::from_codes(&[200]);
        let u = a.union(&b);
        assert!(u.contains(1) && u.contains(200));
        assert_eq!(ClassCodes::all().len(), 256);
        assert!(ClassCodes::empty().is_empty());
    }
}
