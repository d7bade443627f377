//! Lazily memoized iteration over arbitrary sequences.
//!
//! [`CachedIter`] wraps a producer and remembers every item it has pulled so
//! far. Iterating a second time replays the memo before resuming the source,
//! and indexed access only pulls as far as it has to. Once the producer
//! reports exhaustion it is dropped and never polled again.
//!
//! `len`, negative indices and open-ended slices consume the whole source, so
//! they must only be used with finite producers.

use std::ops::{Bound, RangeBounds};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IterationError {
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("negative index {index} out of range for sequence of length {len}")]
    NegativeIndexOutOfRange { index: isize, len: usize },
    #[error("slice {start}..{end} out of range for sequence of length {len}")]
    SliceOutOfRange { start: usize, end: usize, len: usize },
}

/// Memoizing wrapper around an iterator. Single owner, not thread-safe.
pub struct CachedIter<I: Iterator> {
    source: Option<I>,
    memo: Vec<I::Item>,
}

/// Wrap `source` in a [`CachedIter`].
pub fn cache<S: IntoIterator>(source: S) -> CachedIter<S::IntoIter>
where
    S::Item: Clone,
{
    CachedIter::new(source)
}

impl<I> CachedIter<I>
where
    I: Iterator,
    I::Item: Clone,
{
    pub fn new<S>(source: S) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self {
            source: Some(source.into_iter()),
            memo: Vec::new(),
        }
    }

    /// Whether the underlying producer has been fully consumed.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_none()
    }

    /// Items produced so far, in order.
    pub fn cached(&self) -> &[I::Item] {
        &self.memo
    }

    /// Restartable iteration: replays the memo, then resumes the source.
    pub fn iter(&mut self) -> Iter<'_, I> {
        Iter {
            cache: self,
            position: 0,
        }
    }

    pub fn get(&mut self, index: usize) -> Result<&I::Item, IterationError> {
        if !self.fill_to(index.saturating_add(1)) {
            return Err(IterationError::IndexOutOfRange {
                index,
                len: self.memo.len(),
            });
        }
        Ok(&self.memo[index])
    }

    /// Indexed access where negative values count back from the end.
    ///
    /// Negative indices consume the entire source.
    pub fn get_signed(&mut self, index: isize) -> Result<&I::Item, IterationError> {
        if index >= 0 {
            return self.get(index.unsigned_abs());
        }

        let len = self.len();
        let back = index.unsigned_abs();
        if back > len {
            return Err(IterationError::NegativeIndexOutOfRange { index, len });
        }
        Ok(&self.memo[len - back])
    }

    /// Borrow a contiguous run of items, pulling from the source as needed.
    ///
    /// A range reaching past the end of a finite source is an error rather
    /// than a truncated slice.
    pub fn slice<R>(&mut self, range: R) -> Result<&[I::Item], IterationError>
    where
        R: RangeBounds<usize>,
    {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => self.len(),
        };

        if start > end || !self.fill_to(end) {
            return Err(IterationError::SliceOutOfRange {
                start,
                end,
                len: self.memo.len(),
            });
        }

        Ok(&self.memo[start..end])
    }

    /// Total number of items. Consumes the entire source.
    pub fn len(&mut self) -> usize {
        while self.pull() {}
        self.memo.len()
    }

    /// Pulls at most one item.
    pub fn is_empty(&mut self) -> bool {
        !self.fill_to(1)
    }

    fn fill_to(&mut self, len: usize) -> bool {
        while self.memo.len() < len {
            if !self.pull() {
                return false;
            }
        }
        true
    }

    fn pull(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.next() {
            Some(item) => {
                self.memo.push(item);
                true
            }
            None => {
                self.source = None;
                false
            }
        }
    }
}

pub struct Iter<'a, I: Iterator> {
    cache: &'a mut CachedIter<I>,
    position: usize,
}

impl<I> Iterator for Iter<'_, I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.cache.memo.len() && !self.cache.pull() {
            return None;
        }
        let item = self.cache.memo[self.position].clone();
        self.position += 1;
        Some(item)
    }
}

impl<'a, I> IntoIterator for &'a mut CachedIter<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;
    type IntoIter = Iter<'a, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
