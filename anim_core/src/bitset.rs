/// A fixed size set of bits with one bit per joint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointBitSet {
    words: Vec<u64>,
    len: usize,
}

impl JointBitSet {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `false` for indices out of range.
    pub fn is_set(&self, index: usize) -> bool {
        index < self.len && (self.words[index / 64] >> (index % 64)) & 1 != 0
    }

    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.words[index / 64] |= 1 << (index % 64);
        }
    }

    pub fn clear(&mut self, index: usize) {
        if index < self.len {
            self.words[index / 64] &= !(1 << (index % 64));
        }
    }

    pub fn set_all(&mut self) {
        self.words.fill(u64::MAX);
        // Keep bits past the end cleared so counts stay exact.
        let remainder = self.len % 64;
        if remainder != 0
            && let Some(last) = self.words.last_mut()
        {
            *last = (1 << remainder) - 1;
        }
    }

    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn first_clear(&self) -> Option<usize> {
        (0..self.len).find(|i| !self.is_set(*i))
    }
}
