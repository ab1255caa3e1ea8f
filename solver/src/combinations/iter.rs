use crate::combinations::{binomial, unrank_into};
use crate::errors::{CoverError, CoverResult};
use crate::Elem;
use streaming_iterator::StreamingIterator;

/// Lazy enumeration of the `r`-combinations of a sequence, in lexicographic order of positions.
///
/// The combination handed out is written into a buffer owned by the iterator and reused on
/// every advance, so that enumerating does not allocate.
#[derive(Clone, Debug)]
pub struct CombinationIter {
    elements: Vec<Elem>,
    r: usize,
    /// Positions (in `elements`) of the next combination to emit, strictly increasing.
    indices: Vec<usize>,
    buffer: Vec<Elem>,
    has_next: bool,
    /// True when `buffer` holds the last emitted combination.
    current: bool,
    emitted: u64,
    total: u64,
}

impl CombinationIter {
    pub fn new(elements: impl Into<Vec<Elem>>, r: usize) -> Self {
        let elements = elements.into();
        let n = elements.len();
        let total = if r == 0 || r > n { 0 } else { binomial(n as u64, r as u64) };
        let mut it = CombinationIter {
            elements,
            r,
            indices: Vec::with_capacity(r),
            buffer: Vec::with_capacity(r),
            has_next: false,
            current: false,
            emitted: 0,
            total,
        };
        it.reset();
        it
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Emits the next combination.
    ///
    /// Fails with [`CoverError::Exhausted`] once every combination was emitted.
    pub fn next_combination(&mut self) -> CoverResult<&[Elem]> {
        if !self.has_next {
            return Err(CoverError::Exhausted);
        }
        self.emit()?;
        Ok(&self.buffer)
    }

    /// Rewinds to the first combination.
    pub fn reset(&mut self) {
        let n = self.elements.len();
        self.indices.clear();
        self.indices.extend(0..self.r);
        self.has_next = self.r > 0 && self.r <= n;
        self.current = false;
        self.emitted = 0;
    }

    /// Fraction of the combinations already emitted, 1.0 for an empty enumeration.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.emitted as f64 / self.total as f64
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Positions the iterator so that the next emitted combination is the one of lexicographic rank `rank`.
    pub fn skip_to(&mut self, rank: u64) -> CoverResult<()> {
        if rank >= self.total {
            return Err(CoverError::Internal(format!(
                "combination rank {rank} out of range (total {})",
                self.total
            )));
        }
        unrank_into(rank, self.elements.len(), self.r, &mut self.indices);
        self.has_next = true;
        self.current = false;
        self.emitted = rank;
        Ok(())
    }

    /// Copies the combination at `indices` into the buffer and steps `indices` forward.
    fn emit(&mut self) -> CoverResult<()> {
        let n = self.elements.len();
        let r = self.r;
        self.buffer.clear();
        for &i in &self.indices {
            match self.elements.get(i) {
                Some(&e) => self.buffer.push(e),
                None => return Err(CoverError::Internal(format!("position {i} out of bounds ({n} elements)"))),
            }
        }
        self.current = true;
        self.emitted += 1;

        // rightmost position that can still move right
        match (0..r).rev().find(|&i| self.indices[i] < n - r + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in (i + 1)..r {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.has_next = false,
        }
        Ok(())
    }

    /// Materializes all remaining combinations.
    pub fn collect_remaining(mut self) -> Vec<Vec<Elem>> {
        let remaining = (self.total - self.emitted.min(self.total)) as usize;
        let mut out = Vec::with_capacity(remaining);
        while let Some(c) = self.next() {
            out.push(c.to_vec());
        }
        out
    }
}

impl StreamingIterator for CombinationIter {
    type Item = [Elem];

    fn advance(&mut self) {
        if self.has_next {
            // positions are always in bounds for an iterator built by `new` or `skip_to`
            if self.emit().is_err() {
                self.has_next = false;
                self.current = false;
            }
        } else {
            self.current = false;
        }
    }

    fn get(&self) -> Option<&[Elem]> {
        if self.current {
            Some(&self.buffer)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.emitted.min(self.total)) as usize;
        (left, Some(left))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enumerates_in_lexicographic_order() {
        let it = CombinationIter::new(vec![1, 2, 3, 4], 2);
        assert_eq!(it.total(), 6);
        let all = it.collect_remaining();
        assert_eq!(all, vec![vec![1, 2], vec![1, 3], vec![1, 4], vec![2, 3], vec![2, 4], vec![3, 4]]);
    }

    #[test]
    fn keeps_element_order() {
        let all = CombinationIter::new(vec![9, 3, 5], 2).collect_remaining();
        assert_eq!(all, vec![vec![9, 3], vec![9, 5], vec![3, 5]]);
    }

    #[test]
    fn degenerate_arities() {
        assert!(!CombinationIter::new(vec![1, 2], 0).has_next());
        assert!(!CombinationIter::new(vec![1, 2], 3).has_next());
        assert_eq!(CombinationIter::new(vec![1, 2], 2).collect_remaining(), vec![vec![1, 2]]);
        assert_eq!(CombinationIter::new(vec![1, 2], 0).progress(), 1.0);
    }

    #[test]
    fn next_fails_when_exhausted() {
        let mut it = CombinationIter::new(vec![1, 2, 3], 3);
        assert_eq!(it.next_combination().unwrap(), &[1, 2, 3]);
        assert!(!it.has_next());
        assert_eq!(it.next_combination(), Err(CoverError::Exhausted));
    }

    #[test]
    fn progress_and_reset() {
        let mut it = CombinationIter::new(vec![1, 2, 3, 4], 2);
        assert_eq!(it.progress(), 0.0);
        it.next_combination().unwrap();
        it.next_combination().unwrap();
        it.next_combination().unwrap();
        assert_eq!(it.progress(), 0.5);
        it.reset();
        assert_eq!(it.progress(), 0.0);
        assert_eq!(it.next_combination().unwrap(), &[1, 2]);
    }

    #[test]
    fn skip_matches_stepping() {
        let elements: Vec<Elem> = (10..17).collect();
        let reference = CombinationIter::new(elements.clone(), 3).collect_remaining();
        for rank in 0..reference.len() {
            let mut it = CombinationIter::new(elements.clone(), 3);
            it.skip_to(rank as u64).unwrap();
            assert_eq!(it.next_combination().unwrap(), reference[rank].as_slice());
        }
        let mut it = CombinationIter::new(elements, 3);
        assert!(matches!(it.skip_to(35), Err(CoverError::Internal(_))));
    }

    #[test]
    fn streaming_interface() {
        let mut it = CombinationIter::new(vec![1, 2, 3], 2);
        assert_eq!(it.size_hint(), (3, Some(3)));
        assert_eq!(it.next(), Some(&[1, 2][..]));
        assert_eq!(it.get(), Some(&[1, 2][..]));
        assert_eq!(it.next(), Some(&[1, 3][..]));
        assert_eq!(it.next(), Some(&[2, 3][..]));
        assert_eq!(it.next(), None);
        assert_eq!(it.count(), 0);
    }
}
