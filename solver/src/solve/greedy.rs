//! Greedy selection by marginal gain, for the at-least-N and all predicates.

use crate::errors::CoverResult;
use crate::ids::{GroupId, SId};
use crate::preprocess::Preselection;
use crate::solve::{Problem, SearchResult};
use fixedbitset::FixedBitSet;
use tracing::{debug, trace};

/// Candidate groups with the s-subsets they contain.
struct Pool {
    ids: Vec<GroupId>,
    subsets: Vec<Vec<SId>>,
}

impl Pool {
    fn new(problem: &Problem) -> CoverResult<Pool> {
        let index = problem.index;
        let local = problem.gen.positions(problem.k, index.s(), 1)?;
        let mut subsets = Vec::with_capacity(problem.order.len());
        for &g in &problem.order {
            subsets.push(index.subsets_within(problem.groups[g], &local)?);
        }
        Ok(Pool {
            ids: problem.order.clone(),
            subsets,
        })
    }
}

/// Repeatedly selects the group maximizing `Σ_j min(need[j], new[j])` where `need[j]` is the
/// number of s-subsets j-combination `j` still lacks and `new[j]` the number of its uncovered
/// s-subsets inside the group. Ties go to the group holding the most preselected s-subsets.
pub(crate) fn search_at_least_n(problem: &Problem, pre: &Preselection) -> CoverResult<SearchResult> {
    let index = problem.index;
    let mut preferred = FixedBitSet::with_capacity(index.num_s());
    for s in &pre.selected {
        preferred.insert(s.index());
    }
    let pool = Pool::new(problem)?;
    let num_j = index.num_j();
    let target = problem.cover as u32;

    let mut covered_s = FixedBitSet::with_capacity(index.num_s());
    let mut satisfied = vec![0u32; num_j];
    let mut num_done = 0;
    let mut used = FixedBitSet::with_capacity(pool.ids.len());
    let mut selected = Vec::new();
    // per j-combination counts of newly covered s-subsets, reset after each evaluation
    let mut fresh = vec![0u32; num_j];
    let mut touched = Vec::new();

    loop {
        if num_done == num_j {
            debug!(groups = selected.len(), "every j-combination reached its quota");
            return Ok(SearchResult::Covered(selected));
        }
        if problem.timed_out() {
            return Ok(SearchResult::Timeout(selected));
        }
        let mut best: Option<(usize, u32, usize)> = None;
        for c in 0..pool.ids.len() {
            if used.contains(c) {
                continue;
            }
            for s in &pool.subsets[c] {
                if covered_s.contains(s.index()) {
                    continue;
                }
                for &j in index.containing(*s) {
                    if fresh[j.index()] == 0 {
                        touched.push(j);
                    }
                    fresh[j.index()] += 1;
                }
            }
            let mut gain = 0;
            for j in touched.drain(..) {
                let need = target.saturating_sub(satisfied[j.index()]);
                gain += need.min(fresh[j.index()]);
                fresh[j.index()] = 0;
            }
            if gain == 0 {
                continue;
            }
            let bonus = pool.subsets[c].iter().filter(|s| preferred.contains(s.index())).count();
            let better = match best {
                None => true,
                Some((_, bg, bb)) => gain > bg || (gain == bg && bonus > bb),
            };
            if better {
                best = Some((c, gain, bonus));
            }
        }
        let Some((c, gain, _)) = best else {
            return Ok(SearchResult::Incomplete(
                selected,
                format!("no group adds coverage, {num_done}/{num_j} j-combinations reach {target} s-subsets"),
            ));
        };
        used.insert(c);
        selected.push(pool.ids[c]);
        for s in &pool.subsets[c] {
            if covered_s.put(s.index()) {
                continue;
            }
            for &j in index.containing(*s) {
                satisfied[j.index()] += 1;
                if satisfied[j.index()] == target {
                    num_done += 1;
                }
            }
        }
        trace!(group = %pool.ids[c], gain, num_done, "select");
    }
}

/// Repeatedly selects the group containing the most uncovered s-subsets, until every s-subset
/// is covered. Works on the full s-subset universe, there is nothing to preselect.
pub(crate) fn search_all(problem: &Problem) -> CoverResult<SearchResult> {
    let index = problem.index;
    let pool = Pool::new(problem)?;
    let num_s = index.num_s();

    let mut covered_s = FixedBitSet::with_capacity(num_s);
    let mut num_covered = 0;
    let mut used = FixedBitSet::with_capacity(pool.ids.len());
    let mut selected = Vec::new();

    loop {
        if num_covered == num_s {
            debug!(groups = selected.len(), "every s-subset is covered");
            return Ok(SearchResult::Covered(selected));
        }
        if problem.timed_out() {
            return Ok(SearchResult::Timeout(selected));
        }
        let mut best: Option<(usize, usize)> = None;
        for c in 0..pool.ids.len() {
            if used.contains(c) {
                continue;
            }
            let gain = pool.subsets[c].iter().filter(|s| !covered_s.contains(s.index())).count();
            if gain > best.map_or(0, |(_, g)| g) {
                best = Some((c, gain));
            }
        }
        let Some((c, gain)) = best else {
            return Ok(SearchResult::Incomplete(
                selected,
                format!("no group adds coverage, {num_covered}/{num_s} s-subsets covered"),
            ));
        };
        used.insert(c);
        selected.push(pool.ids[c]);
        for s in &pool.subsets[c] {
            if !covered_s.put(s.index()) {
                num_covered += 1;
            }
        }
        trace!(group = %pool.ids[c], gain, num_covered, "select");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::preprocess::{Preprocessor, Strategy};
    use crate::solve::with_problem;
    use itertools::Itertools;
    use std::time::Instant;

    fn preselect(problem: &Problem) -> Preselection {
        Preprocessor::new(problem.index).select(Strategy::ModeB)
    }

    /// Number of distinct s-subsets of each j-combination inside some group.
    fn satisfied(problem: &Problem, groups: &[GroupId]) -> Vec<usize> {
        let index = problem.index;
        index
            .j_ids()
            .map(|j| {
                index
                    .subsets_of(j)
                    .iter()
                    .filter(|&&s| groups.iter().any(|&g| problem.groups[g].contains(index.s_bits(s))))
                    .count()
            })
            .collect()
    }

    #[test]
    fn at_least_n_reaches_quota() {
        for shape in [(7, 5, 2, 4, 2), (7, 4, 2, 3, 2), (8, 5, 3, 5, 4)] {
            with_problem(shape, None, |problem| match search_at_least_n(problem, &preselect(problem)).unwrap() {
                SearchResult::Covered(groups) => {
                    assert!(satisfied(problem, &groups).iter().all(|&c| c >= shape.4), "{shape:?}");
                    assert!(groups.iter().all_unique());
                }
                other => panic!("{shape:?}: {other:?}"),
            });
        }
    }

    #[test]
    fn all_covers_every_subset() {
        for shape in [(7, 5, 2, 4, 6), (6, 4, 3, 3, 1)] {
            with_problem(shape, None, |problem| match search_all(problem).unwrap() {
                SearchResult::Covered(groups) => {
                    let expected = problem.index.subsets_per_j();
                    assert!(satisfied(problem, &groups).iter().all(|&c| c == expected), "{shape:?}");
                }
                other => panic!("{shape:?}: {other:?}"),
            });
        }
    }

    #[test]
    fn each_selected_group_adds_coverage() {
        with_problem((7, 4, 2, 4, 6), None, |problem| {
            let SearchResult::Covered(groups) = search_all(problem).unwrap() else {
                panic!("expected a covering");
            };
            let mut covered = FixedBitSet::with_capacity(problem.index.num_s());
            for &g in &groups {
                let before = covered.count_ones(..);
                for s in problem.index.subsets_in(problem.groups[g]) {
                    covered.insert(s.index());
                }
                assert!(covered.count_ones(..) > before);
            }
        });
    }

    #[test]
    fn expired_deadline() {
        with_problem((7, 5, 2, 4, 2), Some(Instant::now()), |problem| {
            assert!(matches!(search_at_least_n(problem, &preselect(problem)).unwrap(), SearchResult::Timeout(_)));
            assert!(matches!(search_all(problem).unwrap(), SearchResult::Timeout(_)));
        });
    }
}
