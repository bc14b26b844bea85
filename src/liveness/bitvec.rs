//! Fixed-width bit-vector
//!
//! Liveness sets are bit-vectors indexed by SSA index. The vector owns its
//! storage contiguously and iteration over set bits is index-based, so a
//! set is never mutated behind an outstanding iterator.

/// A fixed-capacity set of small integers backed by `u64` words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVector {
    words: Vec<u64>,
    nbits: usize,
}

impl BitVector {
    pub fn new(nbits: usize) -> Self {
        Self {
            words: vec![0; nbits.div_ceil(64)],
            nbits,
        }
    }

    pub fn capacity(&self) -> usize {
        self.nbits
    }

    pub fn set(&mut self, bit: usize) {
        debug_assert!(bit < self.nbits);
        self.words[bit / 64] |= 1u64 << (bit % 64);
    }

    pub fn clear(&mut self, bit: usize) {
        debug_assert!(bit < self.nbits);
        self.words[bit / 64] &= !(1u64 << (bit % 64));
    }

    pub fn get(&self, bit: usize) -> bool {
        debug_assert!(bit < self.nbits);
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Union `other` into `self`; reports whether any bit changed.
    pub fn union(&mut self, other: &BitVector) -> bool {
        debug_assert_eq!(self.nbits, other.nbits);
        let mut changed = false;
        for (dst, &src) in self.words.iter_mut().zip(other.words.iter()) {
            let merged = *dst | src;
            if merged != *dst {
                *dst = merged;
                changed = true;
            }
        }
        changed
    }

    /// Union the bits of `other` that are not in `filter` into `self`;
    /// reports whether any bit changed.
    pub fn union_if_not_in(&mut self, other: &BitVector, filter: &BitVector) -> bool {
        debug_assert_eq!(self.nbits, other.nbits);
        debug_assert_eq!(self.nbits, filter.nbits);
        let mut changed = false;
        for ((dst, &src), &mask) in self
            .words
            .iter_mut()
            .zip(other.words.iter())
            .zip(filter.words.iter())
        {
            let merged = *dst | (src & !mask);
            if merged != *dst {
                *dst = merged;
                changed = true;
            }
        }
        changed
    }

    /// Iterate the indices of set bits, ascending.
    pub fn iter(&self) -> SetBitIter<'_> {
        SetBitIter {
            vector: self,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Index-based iterator over set bits
pub struct SetBitIter<'a> {
    vector: &'a BitVector,
    word_index: usize,
    current: u64,
}

impl Iterator for SetBitIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_index += 1;
            if self.word_index >= self.vector.words.len() {
                return None;
            }
            self.current = self.vector.words[self.word_index];
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_index * 64 + bit)
    }
}
