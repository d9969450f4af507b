//! Lazy iteration over the super-maximal exact matches of one query.

use crate::index::{Fmd, RefIndex, Smem};

/// Walks a query left to right, yielding one batch of SMEMs per stop of the
/// cursor. Single pass; `set_query` rearms it for the next read.
pub struct SmemIter<'a> {
    index: &'a RefIndex,
    fmd: Fmd<'a>,
    query: Vec<u8>,
    start: usize,
}

impl<'a> SmemIter<'a> {
    pub fn new(index: &'a RefIndex) -> SmemIter<'a> {
        SmemIter {
            index,
            fmd: index.fmd(),
            query: Vec::new(),
            start: 0,
        }
    }

    /// Reset the iterator onto `query` (codes 0-4).
    pub fn set_query(&mut self, query: &[u8]) {
        self.query.clear();
        self.query.extend_from_slice(query);
        self.start = 0;
    }

    /// The next batch of matches, or `None` once the query is exhausted.
    /// Ambiguous bases are skipped; the cursor then advances past the
    /// longest match found.
    pub fn next(&mut self, max_len: i32, min_occ: usize) -> Option<Vec<Smem>> {
        while self.start < self.query.len() && self.query[self.start] > 3 {
            self.start += 1;
        }
        if self.start >= self.query.len() {
            return None;
        }
        let (next, batch) =
            self.index.smem1(&self.fmd, &self.query, self.start, max_len, min_occ);
        debug_assert!(next > self.start);
        self.start = next;
        Some(batch)
    }
}
