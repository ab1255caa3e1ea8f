//! Evaluation of a family of groups against the j-combinations to cover.

use crate::config::PAR_MIN_J;
use crate::errors::{CoverError, CoverResult};
use crate::par::{partition, worker_count};
use crate::sets::contains;
use crate::{Config, Elem};
use derive_more::Display;
use std::ops::Range;
use std::sync::Mutex;

/// Predicate a j-combination must satisfy to count as covered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum CoverageMode {
    /// At least one of its s-subsets lies inside some group.
    #[display("at-least-one")]
    AtLeastOne,
    /// At least `N` distinct s-subsets lie inside some group (not necessarily the same one).
    #[display("at-least-{_0}")]
    AtLeastN(usize),
    /// Every s-subset lies inside some group.
    #[display("all")]
    All,
}

/// Snapshot of the coverage of a family of groups.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageResult {
    pub coverage_ratio: f64,
    pub covered_j_count: usize,
    pub total_j_count: usize,
    /// Number of groups evaluated.
    pub total_groups: usize,
    /// Per j-combination: whether it satisfies the predicate.
    pub j_covered: Vec<bool>,
    /// Per j-combination: number of its s-subsets found inside a group. Evaluation of a
    /// j-combination may stop early, so this is a lower bound for `AtLeastOne` and `All`.
    pub j_covered_s_counts: Vec<usize>,
}

impl CoverageResult {
    fn empty(total_j: usize, total_groups: usize) -> Self {
        CoverageResult {
            coverage_ratio: 0.0,
            covered_j_count: 0,
            total_j_count: total_j,
            total_groups,
            j_covered: vec![false; total_j],
            j_covered_s_counts: vec![0; total_j],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_j_count > 0 && self.covered_j_count == self.total_j_count
    }

    fn finalize(&mut self) {
        self.covered_j_count = self.j_covered.iter().filter(|&&c| c).count();
        self.coverage_ratio = if self.total_j_count == 0 {
            0.0
        } else {
            self.covered_j_count as f64 / self.total_j_count as f64
        };
    }
}

/// Evaluates one j-combination given the list of its s-subsets.
/// Returns whether it is covered and the number of covered s-subsets seen.
type Rule = fn(&dyn Fn(&[Elem]) -> bool, &[Vec<Elem>], usize) -> (bool, usize);

fn at_least_one(covered: &dyn Fn(&[Elem]) -> bool, subsets: &[Vec<Elem>], _: usize) -> (bool, usize) {
    let hit = subsets.iter().any(|s| covered(s.as_slice()));
    (hit, usize::from(hit))
}

fn at_least_n(covered: &dyn Fn(&[Elem]) -> bool, subsets: &[Vec<Elem>], n: usize) -> (bool, usize) {
    // subsets of a j-combination are distinct, so each one counts at most once
    let count = subsets.iter().filter(|s| covered(s.as_slice())).count();
    (count >= n, count)
}

fn all(covered: &dyn Fn(&[Elem]) -> bool, subsets: &[Vec<Elem>], _: usize) -> (bool, usize) {
    let count = subsets.iter().take_while(|s| covered(s.as_slice())).count();
    (count > 0 && count == subsets.len(), count)
}

impl CoverageMode {
    fn rule(self) -> (Rule, usize) {
        match self {
            CoverageMode::AtLeastOne => (at_least_one as Rule, 1),
            CoverageMode::AtLeastN(n) => (at_least_n, n),
            CoverageMode::All => (all, 0),
        }
    }
}

/// Computes [`CoverageResult`]s, splitting the j-combinations over several workers.
#[derive(Clone, Debug)]
pub struct CoverageCalculator {
    workers: usize,
}

impl Default for CoverageCalculator {
    fn default() -> Self {
        CoverageCalculator::new(&Config::default())
    }
}

impl CoverageCalculator {
    pub fn new(config: &Config) -> Self {
        CoverageCalculator {
            workers: config.worker_budget(),
        }
    }

    /// Coverage of `groups` over `j_combinations`, where `s_subsets[i]` lists the s-subsets of
    /// `j_combinations[i]`.
    pub fn calculate<G: AsRef<[Elem]> + Sync>(
        &self,
        groups: &[G],
        j_combinations: &[Vec<Elem>],
        s_subsets: &[Vec<Vec<Elem>>],
        mode: CoverageMode,
    ) -> CoverResult<CoverageResult> {
        if j_combinations.len() != s_subsets.len() {
            return Err(CoverError::InvalidArgument(format!(
                "{} j-combinations but {} s-subset lists",
                j_combinations.len(),
                s_subsets.len()
            )));
        }
        let total = j_combinations.len();
        let mut result = CoverageResult::empty(total, groups.len());
        if total == 0 || groups.is_empty() {
            return Ok(result);
        }
        let _span = tracing::span!(tracing::Level::TRACE, "coverage", %mode, groups = groups.len(), total).entered();

        let (rule, threshold) = mode.rule();
        let covered = |s: &[Elem]| groups.iter().any(|g| contains(g.as_ref(), s));
        let evaluate = |range: Range<usize>| -> Vec<(bool, usize)> {
            s_subsets[range].iter().map(|subsets| rule(&covered, subsets, threshold)).collect()
        };

        let workers = worker_count(total, self.workers, PAR_MIN_J.get());
        let merged = Mutex::new(&mut result);
        let write_back = |range: Range<usize>, local: Vec<(bool, usize)>| {
            if let Ok(mut res) = merged.lock() {
                for (i, (hit, count)) in range.zip(local) {
                    res.j_covered[i] = hit;
                    res.j_covered_s_counts[i] = count;
                }
            }
        };
        if workers <= 1 {
            write_back(0..total, evaluate(0..total));
        } else {
            std::thread::scope(|scope| {
                for range in partition(total, workers) {
                    let evaluate = &evaluate;
                    let write_back = &write_back;
                    scope.spawn(move || write_back(range.clone(), evaluate(range)));
                }
            });
        }
        drop(merged);
        result.finalize();
        tracing::trace!(covered = result.covered_j_count, ratio = result.coverage_ratio);
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scenario() -> (Vec<Vec<Elem>>, Vec<Vec<Vec<Elem>>>) {
        let js = vec![vec![1, 2, 3], vec![2, 3, 4]];
        let ss = vec![
            vec![vec![1, 2], vec![1, 3], vec![2, 3]],
            vec![vec![2, 3], vec![2, 4], vec![3, 4]],
        ];
        (js, ss)
    }

    #[test]
    fn modes_on_single_group() {
        let calc = CoverageCalculator::default();
        let (js, ss) = scenario();
        let groups = [vec![1, 2, 3]];

        let one = calc.calculate(&groups, &js, &ss, CoverageMode::AtLeastOne).unwrap();
        assert_eq!(one.covered_j_count, 2);
        assert_eq!(one.coverage_ratio, 1.0);

        let all = calc.calculate(&groups, &js, &ss, CoverageMode::All).unwrap();
        assert_eq!(all.covered_j_count, 1);
        assert_eq!(all.coverage_ratio, 0.5);
        assert_eq!(all.j_covered, vec![true, false]);

        let two = calc.calculate(&groups, &js, &ss, CoverageMode::AtLeastN(2)).unwrap();
        assert_eq!(two.covered_j_count, 1);
        assert_eq!(two.j_covered_s_counts, vec![3, 1]);
    }

    #[test]
    fn distinct_subsets_are_counted_once() {
        let calc = CoverageCalculator::default();
        let (js, ss) = scenario();
        // both groups contain [2, 3]
        let groups = [vec![2, 3, 5], vec![2, 3, 6]];
        let two = calc.calculate(&groups, &js, &ss, CoverageMode::AtLeastN(2)).unwrap();
        assert_eq!(two.covered_j_count, 0);
        assert_eq!(two.j_covered_s_counts, vec![1, 1]);
    }

    #[test]
    fn empty_inputs() {
        let calc = CoverageCalculator::default();
        let none: [Vec<Elem>; 0] = [];
        let res = calc.calculate(&none, &[], &[], CoverageMode::All).unwrap();
        assert_eq!(res.coverage_ratio, 0.0);
        assert_eq!(res.covered_j_count, 0);
        let (js, ss) = scenario();
        let res = calc.calculate(&none, &js, &ss, CoverageMode::AtLeastOne).unwrap();
        assert_eq!(res.covered_j_count, 0);
        assert_eq!(res.total_j_count, 2);
        assert!(!res.is_complete());
    }

    #[test]
    fn misaligned_inputs_are_rejected() {
        let calc = CoverageCalculator::default();
        let (js, _) = scenario();
        let res = calc.calculate(&[vec![1, 2]], &js, &[], CoverageMode::All);
        assert!(matches!(res, Err(CoverError::InvalidArgument(_))));
    }

    #[test]
    fn parallel_matches_sequential() {
        let elements: Vec<Elem> = (1..=12).collect();
        let js = crate::combinations::combinations_of(&elements, 4);
        let ss: Vec<_> = js.iter().map(|j| crate::combinations::combinations_of(j, 2)).collect();
        let groups = vec![vec![1, 2, 3, 4, 5], vec![5, 6, 7, 8, 9], vec![3, 6, 9, 10, 12]];
        let seq = CoverageCalculator::new(&Config::sequential());
        let par = CoverageCalculator::new(&Config::default());
        for mode in [CoverageMode::AtLeastOne, CoverageMode::AtLeastN(3), CoverageMode::All] {
            assert_eq!(
                seq.calculate(&groups, &js, &ss, mode).unwrap(),
                par.calculate(&groups, &js, &ss, mode).unwrap(),
                "{mode}"
            );
        }
    }

    #[test]
    fn display() {
        assert_eq!(CoverageMode::AtLeastN(3).to_string(), "at-least-3");
        assert_eq!(CoverageMode::All.to_string(), "all");
    }
}
