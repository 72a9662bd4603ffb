// archetype.rs - Archetype bitsets
//
// An archetype is the exact set of component types an entity has, stored as
// a fixed-length bitset over the registry. Bit i set means the component with
// archetype bit i is present. The all-zero archetype is the "bare" archetype.

use crate::db::ComponentId;
use std::fmt;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-length component bitset identifying one Entry.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Archetype {
    words: Vec<u64>,
    num_bits: usize,
}

impl Archetype {
    /// All-zero archetype over `num_bits` component types.
    pub fn bare(num_bits: usize) -> Self {
        Self {
            words: vec![0; num_bits.div_ceil(WORD_BITS)],
            num_bits,
        }
    }

    /// Bit length (number of registered component types).
    #[inline]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Set a component bit. Out-of-range bits are ignored.
    pub fn insert(&mut self, bit: ComponentId) {
        let bit = bit as usize;
        debug_assert!(bit < self.num_bits, "archetype bit {bit} out of range");
        if let Some(word) = self.words.get_mut(bit / WORD_BITS) {
            *word |= 1u64 << (bit % WORD_BITS);
        }
    }

    /// Clear a component bit.
    pub fn remove(&mut self, bit: ComponentId) {
        let bit = bit as usize;
        if let Some(word) = self.words.get_mut(bit / WORD_BITS) {
            *word &= !(1u64 << (bit % WORD_BITS));
        }
    }

    /// Builder-style `insert`.
    pub fn with(mut self, bit: ComponentId) -> Self {
        self.insert(bit);
        self
    }

    /// Check if a specific component bit is set.
    #[inline]
    pub fn has(&self, bit: ComponentId) -> bool {
        let bit = bit as usize;
        self.words
            .get(bit / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (bit % WORD_BITS)) != 0)
    }

    /// `(self & required) == required`: every bit of `required` is set here.
    pub fn contains_all(&self, required: &Archetype) -> bool {
        required.words.iter().enumerate().all(|(i, &want)| {
            let have = self.words.get(i).copied().unwrap_or(0);
            have & want == want
        })
    }

    /// True when no component bit is set.
    pub fn is_bare(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Number of component bits set.
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Set bits in ascending order.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| (i * WORD_BITS + b) as ComponentId)
        })
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Archetype(")?;
        for bit in 0..self.num_bits {
            let set = self.has(bit as ComponentId);
            write!(f, "{}", if set { '1' } else { '0' })?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_has_no_bits() {
        let bare = Archetype::bare(70);
        assert!(bare.is_bare());
        assert_eq!(bare.len(), 70);
        assert_eq!(bare.count(), 0);
        assert_eq!(bare.components().count(), 0);
    }

    #[test]
    fn insert_and_remove() {
        let mut archetype = Archetype::bare(70);
        archetype.insert(3);
        archetype.insert(65);
        assert!(archetype.has(3));
        assert!(archetype.has(65));
        assert!(!archetype.has(4));
        assert_eq!(archetype.components().collect::<Vec<_>>(), vec![3, 65]);

        archetype.remove(3);
        assert!(!archetype.has(3));
        assert_eq!(archetype.count(), 1);
    }

    #[test]
    fn equality_is_set_equality() {
        let a = Archetype::bare(8).with(1).with(5);
        let b = Archetype::bare(8).with(5).with(1);
        assert_eq!(a, b);
        assert_ne!(a, Archetype::bare(8).with(1));
    }

    #[test]
    fn superset_matches_query() {
        let query = Archetype::bare(8).with(2);
        let exact = Archetype::bare(8).with(2);
        let wider = Archetype::bare(8).with(2).with(7);
        let other = Archetype::bare(8).with(7);

        assert!(exact.contains_all(&query));
        assert!(wider.contains_all(&query));
        assert!(!other.contains_all(&query));
        assert!(!query.contains_all(&wider));
    }

    #[test]
    fn everything_contains_the_bare_mask() {
        let bare = Archetype::bare(8);
        assert!(bare.contains_all(&bare));
        assert!(Archetype::bare(8).with(4).contains_all(&bare));
    }

    #[test]
    fn debug_prints_bits() {
        let archetype = Archetype::bare(4).with(0).with(2);
        assert_eq!(format!("{archetype:?}"), "Archetype(1010)");
    }
}
