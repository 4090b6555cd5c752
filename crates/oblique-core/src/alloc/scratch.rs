//! Frame-scoped scratch memory pool.
//!
//! All transient sort/cull buffers come from here. Buffers are handed out as
//! `Vec<u64>` words, returned after use, and recycled on later frames, so
//! steady-state frames perform no heap allocation. The pool enforces a word
//! budget: [`ScratchPool::try_take`] returns `None` once the budget is
//! exhausted, and callers must degrade to an in-place algorithm instead of
//! failing the frame.

/// Reusable pool of `u64` scratch buffers with a per-frame word budget.
pub struct ScratchPool {
    free: Vec<Vec<u64>>,
    budget_words: usize,
    outstanding_words: usize,
    high_water_words: usize,
}

impl ScratchPool {
    /// Default budget: 16 Mi words (128 MiB), enough for two radix passes
    /// over a million depth entries with room to spare.
    pub const DEFAULT_BUDGET_WORDS: usize = 16 << 20;

    pub fn new() -> Self {
        Self::with_budget(Self::DEFAULT_BUDGET_WORDS)
    }

    /// Create a pool with an explicit word budget.
    pub fn with_budget(budget_words: usize) -> Self {
        Self {
            free: Vec::new(),
            budget_words,
            outstanding_words: 0,
            high_water_words: 0,
        }
    }

    /// Reset per-frame accounting. Call once at the top of each frame.
    ///
    /// Buffers already returned via [`give_back`](Self::give_back) stay
    /// cached for reuse; any still-outstanding accounting is cleared so a
    /// frame that leaked a buffer cannot starve every following frame.
    pub fn begin_frame(&mut self) {
        if self.outstanding_words != 0 {
            tracing::warn!(
                words = self.outstanding_words,
                "scratch buffers not returned last frame"
            );
        }
        self.outstanding_words = 0;
    }

    /// Take a zeroed buffer of `len` words, or `None` if the budget is spent.
    pub fn try_take(&mut self, len: usize) -> Option<Vec<u64>> {
        if self.outstanding_words.checked_add(len)? > self.budget_words {
            return None;
        }

        // Reuse the first cached buffer with enough capacity.
        let mut buf = match self.free.iter().position(|b| b.capacity() >= len) {
            Some(i) => self.free.swap_remove(i),
            None => Vec::with_capacity(len),
        };
        buf.clear();
        buf.resize(len, 0);

        self.outstanding_words += len;
        self.high_water_words = self.high_water_words.max(self.outstanding_words);
        Some(buf)
    }

    /// Return a buffer to the pool for reuse.
    pub fn give_back(&mut self, buf: Vec<u64>) {
        self.outstanding_words = self.outstanding_words.saturating_sub(buf.len());
        self.free.push(buf);
    }

    /// Peak outstanding words since the pool was created.
    pub fn high_water_words(&self) -> usize {
        self.high_water_words
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new()
    }
}
