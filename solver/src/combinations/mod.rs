//! Enumeration of combinations.
//!
//! All enumerations follow the lexicographic order of *positions* in the input sequence: the
//! relative order of the elements is preserved and elements are never re-sorted by value.
//! Enumerations are computed once per (length, arity) as tables of positions, which are cached
//! and then mapped onto the concrete elements.

mod iter;
mod table;

pub use iter::CombinationIter;
pub use table::SubsetIndex;

use crate::config::{max_combinations, PAR_MIN_COMBINATIONS};
use crate::errors::{CoverError, CoverResult};
use crate::par::{partition, worker_count};
use crate::{Config, Elem};
use itertools::Itertools;
use lru::LruCache;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use streaming_iterator::StreamingIterator;

/// Binomial coefficient C(n, r), saturating at `u64::MAX`.
///
/// Works on the smaller of `r` and `n - r` and divides after each multiplication, so that
/// intermediate values stay close to the result.
pub fn binomial(n: u64, r: u64) -> u64 {
    checked_binomial(n, r).unwrap_or(u64::MAX)
}

/// Binomial coefficient C(n, r), or `None` if it does not fit in a `u64`.
pub fn checked_binomial(n: u64, r: u64) -> Option<u64> {
    if r > n {
        return Some(0);
    }
    let r = r.min(n - r);
    let mut acc: u128 = 1;
    for i in 0..r {
        // acc == C(n, i): the product is divisible by (i + 1)
        acc = acc.checked_mul((n - i) as u128)? / (i + 1) as u128;
        if acc > u64::MAX as u128 {
            // C(n, i) grows with i up to n / 2
            return None;
        }
    }
    u64::try_from(acc).ok()
}

/// Lexicographic rank of the combination of positions `positions` (strictly increasing)
/// among all `positions.len()`-combinations of `0..n`.
pub fn rank(positions: &[usize], n: usize) -> u64 {
    let r = positions.len();
    let mut rank = 0u64;
    let mut next_free = 0usize;
    for (i, &c) in positions.iter().enumerate() {
        let rest = (r - i) as u64;
        // combinations whose i-th position lies in next_free..c
        rank += binomial((n - next_free) as u64, rest) - binomial((n - c) as u64, rest);
        next_free = c + 1;
    }
    rank
}

/// Writes into `out` the positions of the combination of lexicographic rank `rank`.
pub(crate) fn unrank_into(mut rank: u64, n: usize, r: usize, out: &mut Vec<usize>) {
    out.clear();
    let mut c = 0usize;
    for i in 0..r {
        loop {
            let with_c = binomial((n - c - 1) as u64, (r - i - 1) as u64);
            if rank < with_c {
                break;
            }
            rank -= with_c;
            c += 1;
        }
        out.push(c);
        c += 1;
    }
}

/// Flat table of the position tuples of all `arity`-combinations of `0..len`.
#[derive(Debug, PartialEq, Eq)]
pub struct PositionTable {
    len: usize,
    arity: usize,
    data: Vec<u16>,
}

impl PositionTable {
    fn empty(len: usize, arity: usize) -> Self {
        PositionTable {
            len,
            arity,
            data: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of elements the combinations are drawn from.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn num_rows(&self) -> usize {
        if self.arity == 0 {
            0
        } else {
            self.data.len() / self.arity
        }
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[u16]> + '_ {
        // arity 0 tables are always empty, the chunk size only has to be non-zero
        self.data.chunks_exact(self.arity.max(1))
    }

    pub fn row(&self, i: usize) -> &[u16] {
        &self.data[i * self.arity..(i + 1) * self.arity]
    }

    fn map_onto(&self, elements: &[Elem]) -> Vec<Vec<Elem>> {
        debug_assert_eq!(elements.len(), self.len);
        self.rows()
            .map(|row| row.iter().map(|&p| elements[p as usize]).collect())
            .collect()
    }
}

/// Reserves room for `additional` more items, failing instead of aborting when memory is short.
fn reserve<T>(buf: &mut Vec<T>, additional: usize) -> CoverResult<()> {
    buf.try_reserve(additional)
        .map_err(|err| CoverError::InvalidArgument(format!("cannot allocate {additional} combination slots: {err}")))
}

/// Enumerates positions `range` of the lexicographic enumeration of the `r`-combinations of `0..n`.
fn enumerate_range(n: usize, r: usize, range: std::ops::Range<usize>) -> CoverResult<Vec<u16>> {
    let positions: Vec<Elem> = (0..n as Elem).collect();
    let mut it = CombinationIter::new(positions, r);
    let mut out = Vec::new();
    reserve(&mut out, range.len() * r)?;
    if range.is_empty() {
        return Ok(out);
    }
    it.skip_to(range.start as u64)?;
    for _ in range {
        let comb = it.next_combination()?;
        out.extend(comb.iter().map(|&p| p as u16));
    }
    Ok(out)
}

/// Produces combinations of element sequences, eagerly or lazily, sequentially or on several threads.
pub struct CombinationGenerator {
    parallel: bool,
    workers: usize,
    cache: Option<Mutex<LruCache<(usize, usize), Arc<PositionTable>>>>,
}

impl Default for CombinationGenerator {
    fn default() -> Self {
        CombinationGenerator::new(&Config::default())
    }
}

impl CombinationGenerator {
    pub fn new(config: &Config) -> Self {
        CombinationGenerator {
            parallel: config.parallel,
            workers: config.worker_budget(),
            cache: config.cache_capacity().map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Number of `r`-combinations of `n` elements.
    pub fn count(&self, n: usize, r: usize) -> u64 {
        binomial(n as u64, r as u64)
    }

    /// All `r`-combinations of `elements`, in lexicographic order of positions.
    ///
    /// Empty when `r == 0` or `r > elements.len()`.
    pub fn generate(&self, elements: &[Elem], r: usize) -> CoverResult<Vec<Vec<Elem>>> {
        let table = self.positions(elements.len(), r, 1)?;
        Ok(table.map_onto(elements))
    }

    /// Same result as [`generate`](Self::generate), computed by up to `threads` workers, each
    /// emitting a contiguous range of the enumeration.
    pub fn generate_parallel(&self, elements: &[Elem], r: usize, threads: usize) -> CoverResult<Vec<Vec<Elem>>> {
        let threads = if self.parallel { threads.min(self.workers) } else { 1 };
        let table = self.positions(elements.len(), r, threads)?;
        Ok(table.map_onto(elements))
    }

    /// Lazy iterator over the `r`-combinations of `elements`.
    pub fn iter(&self, elements: &[Elem], r: usize) -> CombinationIter {
        CombinationIter::new(elements.to_vec(), r)
    }

    /// Table of positions of all `r`-combinations of `0..len`, from the cache when possible.
    pub fn positions(&self, len: usize, r: usize, threads: usize) -> CoverResult<Arc<PositionTable>> {
        if r == 0 || r > len {
            return Ok(Arc::new(PositionTable::empty(len, r)));
        }
        if len > u16::MAX as usize {
            return Err(CoverError::InvalidArgument(format!("cannot enumerate combinations of {len} elements")));
        }
        let key = (len, r);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().ok().and_then(|mut c| c.get(&key).cloned()) {
                tracing::trace!(len, r, "combination cache hit");
                return Ok(hit);
            }
        }
        let budget = max_combinations();
        let total = checked_binomial(len as u64, r as u64)
            .filter(|&t| t <= budget)
            .and_then(|t| usize::try_from(t).ok())
            .ok_or_else(|| {
                CoverError::InvalidArgument(format!("C({len}, {r}) exceeds the enumeration limit of {budget}"))
            })?;
        let workers = worker_count(total, threads.max(1), PAR_MIN_COMBINATIONS.get());
        let data = if workers <= 1 {
            enumerate_range(len, r, 0..total)?
        } else {
            self.enumerate_parallel(len, r, total, workers)?
        };
        let table = Arc::new(PositionTable { len, arity: r, data });
        if let Some(cache) = &self.cache {
            if let Ok(mut c) = cache.lock() {
                c.put(key, table.clone());
            }
        }
        Ok(table)
    }

    fn enumerate_parallel(&self, len: usize, r: usize, total: usize, workers: usize) -> CoverResult<Vec<u16>> {
        let ranges = partition(total, workers);
        tracing::debug!(len, r, total, workers = ranges.len(), "parallel enumeration");
        let (snd, rcv) = crossbeam_channel::bounded(ranges.len());
        std::thread::scope(|scope| {
            for (worker, range) in ranges.iter().cloned().enumerate() {
                let snd = snd.clone();
                scope.spawn(move || {
                    let _ = snd.send((worker, enumerate_range(len, r, range)));
                });
            }
        });
        drop(snd);
        let mut parts: Vec<Option<Vec<u16>>> = vec![None; ranges.len()];
        for (worker, part) in rcv.iter() {
            parts[worker] = Some(part?);
        }
        let mut data = Vec::new();
        reserve(&mut data, total * r)?;
        for (worker, part) in parts.into_iter().enumerate() {
            match part {
                Some(part) => data.extend(part),
                None => return Err(CoverError::Internal(format!("enumeration worker {worker} produced no output"))),
            }
        }
        Ok(data)
    }

    /// Number of enumerations currently held in the cache.
    pub fn cached_entries(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }
}

/// Draws `n` distinct values uniformly from `1..=m`, returned sorted.
pub fn generate_random_samples(m: usize, n: usize, seed: Option<u64>) -> CoverResult<Vec<Elem>> {
    if n > m {
        return Err(CoverError::InvalidArgument(format!(
            "cannot draw {n} distinct samples out of {m}"
        )));
    }
    if m > Elem::MAX as usize {
        return Err(CoverError::InvalidArgument(format!("sample domain {m} is too large")));
    }
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::seed_from_u64(rand::rng().random()),
    };
    let mut domain: Vec<Elem> = (1..=m as Elem).collect();
    domain.shuffle(&mut rng);
    domain.truncate(n);
    domain.sort_unstable();
    Ok(domain)
}

/// Convenience: every combination of `elements` of size `r`, computed without cache nor threads.
pub fn combinations_of(elements: &[Elem], r: usize) -> Vec<Vec<Elem>> {
    let mut it = CombinationIter::new(elements.to_vec(), r);
    let mut out = Vec::with_capacity(it.total() as usize);
    while let Some(c) = it.next() {
        out.push(c.to_vec());
    }
    out
}

/// Checks that a sequence of combinations is strictly increasing by position tuple, with respect
/// to the positions of the elements in `elements`.
pub fn is_lexicographic(elements: &[Elem], combinations: &[Vec<Elem>]) -> bool {
    let position = |e: &Elem| elements.iter().position(|x| x == e);
    let keys: Option<Vec<Vec<usize>>> = combinations
        .iter()
        .map(|c| c.iter().map(position).collect::<Option<Vec<_>>>())
        .collect();
    match keys {
        Some(keys) => keys.iter().tuple_windows().all(|(a, b)| a < b),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binomials() {
        assert_eq!(binomial(4, 2), 6);
        assert_eq!(binomial(5, 0), 1);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(45, 6), 8_145_060);
        assert_eq!(binomial(200, 3), 1_313_400);
        assert_eq!(binomial(300, 297), 4_455_100);
        assert_eq!(checked_binomial(64, 32), Some(1_832_624_140_942_590_534));
        assert_eq!(checked_binomial(100, 50), None);
        assert_eq!(binomial(100, 50), u64::MAX);
    }

    #[test]
    fn rank_roundtrip_on_small_universe() {
        let n = 7;
        let all = combinations_of(&(0..n as Elem).collect_vec(), 3);
        let mut buf = Vec::new();
        for (i, c) in all.iter().enumerate() {
            let positions = c.iter().map(|&p| p as usize).collect_vec();
            assert_eq!(rank(&positions, n), i as u64);
            unrank_into(i as u64, n, 3, &mut buf);
            assert_eq!(buf, positions);
        }
    }

    #[test]
    fn generate_scenario() {
        let gen = CombinationGenerator::default();
        let all = gen.generate(&[1, 2, 3, 4], 2).unwrap();
        assert_eq!(all, vec![vec![1, 2], vec![1, 3], vec![1, 4], vec![2, 3], vec![2, 4], vec![3, 4]]);
    }

    #[test]
    fn sizes_match_binomials() {
        let gen = CombinationGenerator::new(&Config::sequential());
        let elements: Vec<Elem> = (1..=8).collect();
        for r in 0..=10 {
            let all = gen.generate(&elements, r).unwrap();
            let expected = if r == 0 { 0 } else { binomial(8, r as u64) as usize };
            assert_eq!(all.len(), expected, "r = {r}");
            assert!(is_lexicographic(&elements, &all));
        }
    }

    #[test]
    fn cache_is_keyed_by_shape_not_content() {
        let gen = CombinationGenerator::new(&Config::default().with_cache(true, 4));
        let a = gen.generate(&[1, 2, 3], 2).unwrap();
        let b = gen.generate(&[7, 8, 9], 2).unwrap();
        assert_eq!(gen.cached_entries(), 1);
        assert_eq!(a, vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
        assert_eq!(b, vec![vec![7, 8], vec![7, 9], vec![8, 9]]);
        assert_eq!(gen.generate(&[1, 2, 3], 2).unwrap(), a);
    }

    #[test]
    fn oversized_enumerations_are_refused() {
        let gen = CombinationGenerator::new(&Config::sequential());
        let elements: Vec<Elem> = (1..=60).collect();
        let err = gen.generate(&elements, 30).unwrap_err();
        assert!(matches!(err, CoverError::InvalidArgument(_)), "{err}");
        assert!(err.to_string().contains("enumeration limit"));
        assert!(gen.positions(128, 64, 1).is_err());
        // within the limit, the same shape family still enumerates
        assert_eq!(gen.generate(&elements, 2).unwrap().len(), 1770);
    }

    #[test]
    fn cache_can_be_disabled() {
        let gen = CombinationGenerator::new(&Config::default().with_cache(false, 4));
        gen.generate(&[1, 2, 3], 2).unwrap();
        assert_eq!(gen.cached_entries(), 0);
    }

    #[test]
    fn parallel_matches_sequential() {
        let seq = CombinationGenerator::new(&Config::sequential());
        let par = CombinationGenerator::new(&Config::default().with_cache(false, 0));
        let elements: Vec<Elem> = (1..=14).rev().collect();
        let expected = seq.generate(&elements, 5).unwrap();
        let actual = par.generate_parallel(&elements, 5, 8).unwrap();
        assert_eq!(expected.len(), 2002);
        assert_eq!(actual, expected);
    }

    #[test]
    fn iterator_matches_eager() {
        let gen = CombinationGenerator::default();
        let elements = [4, 8, 15, 16, 23, 42];
        let eager = gen.generate(&elements, 4).unwrap();
        let lazy = gen.iter(&elements, 4).collect_remaining();
        assert_eq!(eager, lazy);
    }

    #[test]
    fn random_samples() {
        let samples = generate_random_samples(45, 7, Some(3)).unwrap();
        assert_eq!(samples.len(), 7);
        assert!(samples.iter().tuple_windows().all(|(a, b)| a < b));
        assert!(samples.iter().all(|&s| (1..=45).contains(&s)));
        assert_eq!(samples, generate_random_samples(45, 7, Some(3)).unwrap());
        assert_eq!(generate_random_samples(5, 5, None).unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(matches!(generate_random_samples(5, 10, None), Err(CoverError::InvalidArgument(_))));
    }
}
