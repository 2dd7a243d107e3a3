//! Bitmap-backed block allocator
//!
//! One bit per block, packed into 64-bit words. Fully occupied and fully
//! free words are skipped as a unit during the free-run search.

const WORD_BITS: u64 = 64;

/// In-memory occupancy map over block indices
#[derive(Debug, Default, Clone)]
pub struct BlockAllocator {
    /// Occupancy bits, block `n` lives at `words[n / 64]` bit `n % 64`
    words: Vec<u64>,
    /// Number of set bits
    used: u64,
}

impl BlockAllocator {
    /// Create an empty allocator (every block free)
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the lowest block index starting a free run of at least
    /// `blocks_needed` blocks.
    ///
    /// When no gap is wide enough the run starting right after the last
    /// occupied block is returned, so allocation degrades to append.
    /// A request for zero blocks is treated as a request for one.
    pub fn find_free_region(&self, blocks_needed: u32) -> u64 {
        let needed = u64::from(blocks_needed.max(1));

        // Start of the current free run, or the next candidate if run_len == 0
        let mut run_start = 0u64;
        let mut run_len = 0u64;

        for (word_idx, &word) in self.words.iter().enumerate() {
            let base = word_idx as u64 * WORD_BITS;

            if word == u64::MAX {
                run_start = base + WORD_BITS;
                run_len = 0;
                continue;
            }

            if word == 0 {
                if run_len == 0 {
                    run_start = base;
                }
                run_len += WORD_BITS;
                if run_len >= needed {
                    return run_start;
                }
                continue;
            }

            for bit in 0..WORD_BITS {
                if word & (1u64 << bit) != 0 {
                    run_start = base + bit + 1;
                    run_len = 0;
                } else {
                    if run_len == 0 {
                        run_start = base + bit;
                    }
                    run_len += 1;
                    if run_len >= needed {
                        return run_start;
                    }
                }
            }
        }

        // Past the last word everything is free
        run_start
    }

    /// Mark `count` blocks starting at `start` as occupied
    pub fn mark_used(&mut self, start: u32, count: u32) {
        let end = u64::from(start) + u64::from(count);
        if end == 0 {
            return;
        }

        let needed_words = end.div_ceil(WORD_BITS) as usize;
        if self.words.len() < needed_words {
            self.words.resize(needed_words, 0);
        }

        for block in u64::from(start)..end {
            let (word, mask) = Self::locate(block);
            if self.words[word] & mask == 0 {
                self.words[word] |= mask;
                self.used += 1;
            }
        }
    }

    /// Mark `count` blocks starting at `start` as free
    pub fn mark_free(&mut self, start: u32, count: u32) {
        let end = u64::from(start) + u64::from(count);

        for block in u64::from(start)..end {
            let (word, mask) = Self::locate(block);
            if word >= self.words.len() {
                break;
            }
            if self.words[word] & mask != 0 {
                self.words[word] &= !mask;
                self.used -= 1;
            }
        }

        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    /// Check whether a single block is occupied
    pub fn is_used(&self, block: u32) -> bool {
        let (word, mask) = Self::locate(u64::from(block));
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Check that no block in `[start, start + count)` is occupied
    pub fn is_range_free(&self, start: u32, count: u32) -> bool {
        let end = u64::from(start) + u64::from(count);
        (u64::from(start)..end).all(|block| {
            let (word, mask) = Self::locate(block);
            self.words.get(word).map_or(true, |w| w & mask == 0)
        })
    }

    /// Number of occupied blocks
    pub fn used_blocks(&self) -> u64 {
        self.used
    }

    /// One past the highest occupied block (0 when empty)
    pub fn end(&self) -> u64 {
        self.words
            .iter()
            .rposition(|&w| w != 0)
            .map(|idx| {
                let word = self.words[idx];
                idx as u64 * WORD_BITS + (WORD_BITS - u64::from(word.leading_zeros()))
            })
            .unwrap_or(0)
    }

    /// Forget every allocation
    pub fn reset(&mut self) {
        self.words.clear();
        self.used = 0;
    }

    fn locate(block: u64) -> (usize, u64) {
        ((block / WORD_BITS) as usize, 1u64 << (block % WORD_BITS))
    }
}
