//! Operations over finite sets of elements.
//!
//! Inputs are slices that need not be sorted. Every set returned is sorted and duplicate-free.
//! [`Bits`] is the compact representation used inside a solve, where elements are replaced by
//! their position in the universe.

use crate::par::join_all;
use crate::Elem;
use hashbrown::{DefaultHashBuilder, HashSet};
use itertools::Itertools;
use lru::LruCache;
use std::hash::{BuildHasher, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Families with more elements than this (in total) are merged by several threads.
const LARGE_FAMILY: usize = 5000;

/// Set operations with optional memoization of unions and intersections of families.
///
/// The cache is keyed by the operation and a hash of the family contents, and holds at most
/// `capacity` results, least recently used first out. Concurrent misses on the same key simply
/// compute the same value twice.
pub struct SetOps {
    workers: usize,
    hasher: DefaultHashBuilder,
    cache: Option<Mutex<LruCache<(Op, u64), Vec<Elem>>>>,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
enum Op {
    Union,
    Intersection,
}

impl Default for SetOps {
    fn default() -> Self {
        SetOps::new(NonZeroUsize::new(64), 1)
    }
}

impl SetOps {
    /// Set operations memoizing up to `capacity` results, or none when `capacity` is `None`.
    pub fn new(capacity: Option<NonZeroUsize>, workers: usize) -> Self {
        SetOps {
            workers: workers.max(1),
            hasher: DefaultHashBuilder::default(),
            cache: capacity.map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        SetOps::new(config.cache_capacity(), config.worker_budget())
    }

    fn family_hash<S: AsRef<[Elem]>>(&self, sets: &[S]) -> u64 {
        let mut h = self.hasher.build_hasher();
        for set in sets {
            let set = set.as_ref();
            for &e in set {
                h.write_u32(e);
            }
            h.write_usize(set.len());
        }
        h.finish()
    }

    fn cached(&self, key: (Op, u64)) -> Option<Vec<Elem>> {
        let cache = self.cache.as_ref()?;
        cache.lock().ok().and_then(|mut c| c.get(&key).cloned())
    }

    fn store(&self, key: (Op, u64), value: &[Elem]) {
        if let Some(cache) = &self.cache {
            if let Ok(mut c) = cache.lock() {
                c.put(key, value.to_vec());
            }
        }
    }

    /// Sorted union of all sets of the family.
    pub fn union<S: AsRef<[Elem]> + Sync>(&self, sets: &[S]) -> Vec<Elem> {
        match sets {
            [] => return Vec::new(),
            [single] => return normalize(single.as_ref()),
            _ => {}
        }
        let key = (Op::Union, self.family_hash(sets));
        if let Some(hit) = self.cached(key) {
            return hit;
        }
        let result = if self.is_large(sets) {
            self.parallel_fold(sets, true)
        } else {
            sets.iter().flat_map(|s| s.as_ref().iter().copied()).sorted_unstable().dedup().collect()
        };
        self.store(key, &result);
        result
    }

    /// Sorted intersection of all sets of the family. The intersection of an empty family is empty.
    pub fn intersection<S: AsRef<[Elem]> + Sync>(&self, sets: &[S]) -> Vec<Elem> {
        match sets {
            [] => return Vec::new(),
            [single] => return normalize(single.as_ref()),
            _ => {}
        }
        let key = (Op::Intersection, self.family_hash(sets));
        if let Some(hit) = self.cached(key) {
            return hit;
        }
        let result = if self.is_large(sets) {
            self.parallel_fold(sets, false)
        } else {
            intersect_all(sets.iter().map(|s| s.as_ref()))
        };
        self.store(key, &result);
        result
    }

    fn is_large<S: AsRef<[Elem]>>(&self, sets: &[S]) -> bool {
        self.workers > 1
            && sets.len() > self.workers
            && sets.iter().map(|s| s.as_ref().len()).sum::<usize>() > LARGE_FAMILY
    }

    fn parallel_fold<S: AsRef<[Elem]> + Sync>(&self, sets: &[S], union: bool) -> Vec<Elem> {
        let chunk = sets.len().div_ceil(self.workers);
        let partials: Vec<Vec<Elem>> = std::thread::scope(|scope| {
            let handles = sets
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        if union {
                            batch.iter().flat_map(|s| s.as_ref().iter().copied()).sorted_unstable().dedup().collect()
                        } else {
                            intersect_all(batch.iter().map(|s| s.as_ref()))
                        }
                    })
                })
                .collect_vec();
            join_all(handles)
        });
        if union {
            partials.into_iter().kmerge().dedup().collect()
        } else {
            intersect_all(partials.iter().map(|p| p.as_slice()))
        }
    }

    /// Elements of `a` that are not in `b`.
    pub fn difference(&self, a: &[Elem], b: &[Elem]) -> Vec<Elem> {
        let b: HashSet<Elem> = b.iter().copied().collect();
        a.iter().copied().filter(|e| !b.contains(e)).sorted_unstable().dedup().collect()
    }

    pub fn symmetric_difference(&self, a: &[Elem], b: &[Elem]) -> Vec<Elem> {
        let sa: HashSet<Elem> = a.iter().copied().collect();
        let sb: HashSet<Elem> = b.iter().copied().collect();
        sa.symmetric_difference(&sb).copied().sorted_unstable().collect()
    }

    /// `|A ∩ B| / |A ∪ B|`, with two empty sets being identical.
    pub fn jaccard(&self, a: &[Elem], b: &[Elem]) -> f64 {
        jaccard(a, b)
    }

    pub fn contains(&self, container: &[Elem], subset: &[Elem]) -> bool {
        contains(container, subset)
    }

    /// Sorted set of every element appearing in the family.
    pub fn all_elements<S: AsRef<[Elem]>>(&self, sets: &[S]) -> Vec<Elem> {
        sets.iter().flat_map(|s| s.as_ref().iter().copied()).sorted_unstable().dedup().collect()
    }

    pub fn is_valid(&self, set: &[Elem]) -> bool {
        is_valid(set)
    }

    pub fn normalize(&self, set: &[Elem]) -> Vec<Elem> {
        normalize(set)
    }

    pub fn clear_cache(&self) {
        if let Some(Ok(mut c)) = self.cache.as_ref().map(|c| c.lock()) {
            c.clear();
        }
    }

    /// Number of memoized unions and intersections.
    pub fn cache_len(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }
}

fn intersect_all<'a>(mut sets: impl Iterator<Item = &'a [Elem]>) -> Vec<Elem> {
    let Some(first) = sets.next() else {
        return Vec::new();
    };
    let mut acc: HashSet<Elem> = first.iter().copied().collect();
    for set in sets {
        if acc.is_empty() {
            break;
        }
        let current: HashSet<Elem> = set.iter().copied().collect();
        acc.retain(|e| current.contains(e));
    }
    acc.into_iter().sorted_unstable().collect()
}

/// True iff every element of `subset` appears in `container`.
pub fn contains(container: &[Elem], subset: &[Elem]) -> bool {
    if subset.is_empty() {
        return true;
    }
    if container.is_empty() {
        return false;
    }
    subset.iter().all(|e| container.contains(e))
}

/// Jaccard similarity of two sets given as slices (duplicates are ignored).
pub fn jaccard(a: &[Elem], b: &[Elem]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    let sa: HashSet<Elem> = a.iter().copied().collect();
    let sb: HashSet<Elem> = b.iter().copied().collect();
    let inter = sa.intersection(&sb).count();
    let union = sa.len() + sb.len() - inter;
    inter as f64 / union as f64
}

/// A set is valid when it is non-empty and duplicate-free. Elements are unsigned, hence never negative.
pub fn is_valid(set: &[Elem]) -> bool {
    !set.is_empty() && set.iter().all_unique()
}

/// Deduplicated and sorted copy of `set`.
pub fn normalize(set: &[Elem]) -> Vec<Elem> {
    set.iter().copied().sorted_unstable().dedup().collect()
}

/// A set of universe positions (at most 128) packed in a single word.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct Bits(pub u128);

impl Bits {
    pub const MAX_POSITIONS: usize = 128;

    pub fn from_positions(positions: impl IntoIterator<Item = usize>) -> Bits {
        Bits(positions.into_iter().fold(0u128, |acc, p| acc | (1u128 << p)))
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True iff every position of `other` is in `self`.
    pub fn contains(self, other: Bits) -> bool {
        other.0 & !self.0 == 0
    }

    pub fn union(self, other: Bits) -> Bits {
        Bits(self.0 | other.0)
    }

    pub fn intersection(self, other: Bits) -> Bits {
        Bits(self.0 & other.0)
    }

    pub fn jaccard(self, other: Bits) -> f64 {
        let union = (self.0 | other.0).count_ones();
        if union == 0 {
            return 1.0;
        }
        (self.0 & other.0).count_ones() as f64 / union as f64
    }

    /// `1 - jaccard`
    pub fn distance(self, other: Bits) -> f64 {
        1.0 - self.jaccard(other)
    }

    pub fn positions(self) -> impl Iterator<Item = usize> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                None
            } else {
                let p = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(p)
            }
        })
    }
}
