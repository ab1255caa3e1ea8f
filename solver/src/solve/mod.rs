//! Selection of a family of groups covering every j-combination of a universe.
//!
//! [`Solver::solve`] runs the whole pipeline: parameter validation, enumeration of the
//! j-combinations, s-subsets and candidate groups, mode specific selection and a final audit of
//! the selected family by the [`CoverageCalculator`].

mod beam;
mod greedy;

use crate::combinations::{binomial, checked_binomial, generate_random_samples, CombinationGenerator, SubsetIndex};
use crate::coverage::{CoverageCalculator, CoverageMode, CoverageResult};
use crate::errors::{CoverError, CoverResult};
use crate::ids::{ids, GroupId};
use crate::preprocess::{Preprocessor, Strategy};
use crate::sets::{Bits, SetOps};
use crate::universe::Universe;
use crate::config::max_combinations;
use crate::{Config, Elem};
use derive_more::Display;
use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, span, Level};

/// Coverage predicate to satisfy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Mode {
    /// Each j-combination has at least one s-subset inside a selected group.
    #[display("a")]
    A,
    /// Each j-combination has at least N distinct s-subsets inside selected groups.
    #[display("b")]
    B,
    /// Each s-subset of each j-combination is inside a selected group.
    #[display("c")]
    C,
}

impl Mode {
    /// Preprocessing strategy used before the selection in this mode.
    pub fn strategy(self) -> Strategy {
        match self {
            Mode::A => Strategy::ModeA,
            Mode::B => Strategy::ModeB,
            Mode::C => Strategy::ModeC,
        }
    }
}

impl FromStr for Mode {
    type Err = CoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" | "A" => Ok(Mode::A),
            "b" | "B" => Ok(Mode::B),
            "c" | "C" => Ok(Mode::C),
            _ => Err(CoverError::InvalidArgument(format!("unknown mode `{s}`, expected a, b or c"))),
        }
    }
}

/// Numeric parameters of a covering problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    /// Size of the domain the samples are drawn from (`1..=m`).
    pub m: usize,
    /// Number of samples.
    pub n: usize,
    /// Size of a group.
    pub k: usize,
    pub s: usize,
    pub j: usize,
    /// Number of distinct s-subsets each j-combination needs (N).
    pub cover: usize,
    /// Explicit samples. When absent, `n` samples are drawn at random.
    pub samples: Option<Vec<Elem>>,
    /// Forced mode. When absent, it is derived from `cover`.
    pub mode: Option<Mode>,
}

impl Params {
    pub fn new(m: usize, n: usize, k: usize, s: usize, j: usize, cover: usize) -> Self {
        Params {
            m,
            n,
            k,
            s,
            j,
            cover,
            samples: None,
            mode: None,
        }
    }

    pub fn with_samples(mut self, samples: Vec<Elem>) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Number of s-subsets of a j-combination.
    pub fn subsets_per_j(&self) -> u64 {
        binomial(self.j as u64, self.s as u64)
    }

    /// The forced mode, or: A when N = 1, C when N is the number of s-subsets of a
    /// j-combination, B otherwise.
    pub fn mode(&self) -> Mode {
        match self.mode {
            Some(mode) => mode,
            None if self.cover <= 1 => Mode::A,
            None if self.cover as u64 == self.subsets_per_j() => Mode::C,
            None => Mode::B,
        }
    }

    /// Predicate checked by the audit of a solution in the selected mode.
    pub fn coverage_mode(&self) -> CoverageMode {
        match self.mode() {
            Mode::A => CoverageMode::AtLeastOne,
            Mode::B => CoverageMode::AtLeastN(self.cover),
            Mode::C => CoverageMode::All,
        }
    }

    /// Checks `0 < s <= j <= n`, `s <= k <= n <= m`, `1 <= N <= C(j, s)` and that the groups,
    /// j-combinations and s-subsets each fit the enumeration limit.
    pub fn validate(&self) -> CoverResult<()> {
        let fail = |msg: String| Err(CoverError::InvalidParameters(msg));
        let named = [("m", self.m), ("n", self.n), ("k", self.k), ("s", self.s), ("j", self.j)];
        if let Some((name, _)) = named.iter().find(|(_, v)| *v == 0) {
            return fail(format!("{name} must be positive"));
        }
        if self.k < self.s {
            return fail(format!("k ({}) must be at least s ({})", self.k, self.s));
        }
        if self.j < self.s {
            return fail(format!("j ({}) must be at least s ({})", self.j, self.s));
        }
        if self.k > self.n {
            return fail(format!("k ({}) must not exceed n ({})", self.k, self.n));
        }
        if self.s > self.n {
            return fail(format!("s ({}) must not exceed n ({})", self.s, self.n));
        }
        if self.j > self.n {
            return fail(format!("j ({}) must not exceed n ({})", self.j, self.n));
        }
        if self.n > self.m {
            return fail(format!("n ({}) must not exceed m ({})", self.n, self.m));
        }
        if self.cover == 0 || self.cover as u64 > self.subsets_per_j() {
            return fail(format!(
                "N ({}) must be between 1 and the {} s-subsets of a j-combination",
                self.cover,
                self.subsets_per_j()
            ));
        }
        if self.n > Bits::MAX_POSITIONS {
            return fail(format!("at most {} samples are supported", Bits::MAX_POSITIONS));
        }
        let budget = max_combinations();
        for (name, r) in [("k", self.k), ("j", self.j), ("s", self.s)] {
            match checked_binomial(self.n as u64, r as u64) {
                Some(count) if count <= budget => {}
                _ => {
                    return fail(format!(
                        "C(n, {name}) = C({}, {r}) exceeds the enumeration limit of {budget}",
                        self.n
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a solve.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Status {
    #[display("success")]
    Success,
    /// The sample list is unusable.
    #[display("invalid-parameters")]
    InvalidParameters,
    /// Parameters are inconsistent, or the search ended without satisfying the predicate.
    #[display("no-solution")]
    NoSolution,
    #[display("timeout")]
    Timeout,
    /// An internal invariant was broken.
    #[display("error")]
    Error,
}

/// Quality indicators of a family of groups.
#[derive(Clone, Debug, PartialEq)]
pub struct Metrics {
    pub avg_group_size: f64,
    /// Mean Jaccard similarity over all pairs of groups, 0 with less than two groups.
    pub inter_group_similarity: f64,
    /// Number of candidate groups enumerated.
    pub total_combinations: u64,
}

/// Result of [`Solver::solve`]. Failures are reported through `status` and `message`.
#[derive(Clone, Debug)]
pub struct Solution {
    /// The universe the groups are drawn from, sorted.
    pub samples: Vec<Elem>,
    pub groups: Vec<Vec<Elem>>,
    pub total_groups: usize,
    /// Ratio of j-combinations satisfying the predicate of the solved mode.
    pub coverage_ratio: f64,
    pub elapsed: Duration,
    pub status: Status,
    pub message: String,
    pub mode: Option<Mode>,
    pub metrics: Option<Metrics>,
}

impl Solution {
    fn failed(status: Status, message: String, elapsed: Duration) -> Self {
        Solution {
            samples: Vec::new(),
            groups: Vec::new(),
            total_groups: 0,
            coverage_ratio: 0.0,
            elapsed,
            status,
            message,
            mode: None,
            metrics: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

fn status_of(err: &CoverError) -> Status {
    match err {
        CoverError::InvalidParameters(_) => Status::NoSolution,
        CoverError::InvalidArgument(_) => Status::InvalidParameters,
        CoverError::Exhausted | CoverError::Internal(_) => Status::Error,
    }
}

/// Outcome of a selection procedure.
#[derive(Debug)]
pub(crate) enum SearchResult {
    /// The selected groups satisfy the predicate.
    Covered(Vec<GroupId>),
    /// The search ended with the given partial family, for the given reason.
    Incomplete(Vec<GroupId>, String),
    /// The time limit was reached. Holds the best family found so far.
    Timeout(Vec<GroupId>),
}

/// Everything a selection procedure works on, built once per solve.
pub(crate) struct Problem<'a> {
    pub gen: &'a CombinationGenerator,
    pub index: &'a SubsetIndex,
    /// Positions of each candidate group, by id.
    pub groups: Vec<Bits>,
    /// Order in which candidate groups are considered, which decides ties.
    pub order: Vec<GroupId>,
    pub k: usize,
    pub cover: usize,
    pub deadline: Option<Instant>,
}

impl<'a> Problem<'a> {
    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Id of the group made of the given universe positions.
    pub fn group_id(&self, group: Bits) -> CoverResult<GroupId> {
        let positions = group.positions().collect_vec();
        if positions.len() != self.k {
            return Err(CoverError::Internal(format!(
                "group of {} elements where {} were expected",
                positions.len(),
                self.k
            )));
        }
        let r = crate::combinations::rank(&positions, self.index.universe_len()) as usize;
        if r >= self.groups.len() {
            return Err(CoverError::Internal(format!("group rank {r} out of range")));
        }
        Ok(GroupId::from(r))
    }
}

/// Runs `f` on the problem of covering the `j`-combinations of `0..n` with `k`-groups.
#[cfg(test)]
pub(crate) fn with_problem<T>(
    (n, k, s, j, cover): (usize, usize, usize, usize, usize),
    deadline: Option<Instant>,
    f: impl FnOnce(&Problem) -> T,
) -> T {
    let gen = CombinationGenerator::new(&Config::sequential());
    let index = SubsetIndex::build(&gen, n, j, s, 1).unwrap();
    let groups = gen
        .positions(n, k, 1)
        .unwrap()
        .rows()
        .map(|row| Bits::from_positions(row.iter().map(|&p| p as usize)))
        .collect_vec();
    let problem = Problem {
        gen: &gen,
        index: &index,
        order: ids(groups.len()).collect(),
        groups,
        k,
        cover,
        deadline,
    };
    f(&problem)
}

/// Solves covering problems. Holds the enumeration cache, reused across solves.
pub struct Solver {
    config: Config,
    gen: CombinationGenerator,
    calc: CoverageCalculator,
    sets: SetOps,
}

impl Default for Solver {
    fn default() -> Self {
        Solver::new(Config::default())
    }
}

impl Solver {
    pub fn new(config: Config) -> Self {
        Solver {
            gen: CombinationGenerator::new(&config),
            calc: CoverageCalculator::new(&config),
            sets: SetOps::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generator(&self) -> &CombinationGenerator {
        &self.gen
    }

    /// Solves the problem. Never fails: errors are reported in the status of the solution.
    pub fn solve(&self, params: &Params) -> Solution {
        let start = Instant::now();
        match self.try_solve(params, start) {
            Ok(solution) => solution,
            Err(err) => {
                let status = status_of(&err);
                info!(%status, %err, "solve failed");
                Solution::failed(status, err.to_string(), start.elapsed())
            }
        }
    }

    fn try_solve(&self, params: &Params, start: Instant) -> CoverResult<Solution> {
        params.validate()?;
        let mode = params.mode();
        let samples = match &params.samples {
            Some(samples) => samples.clone(),
            None => generate_random_samples(params.m, params.n, self.config.seed)?,
        };
        let universe = Universe::new(params.m, params.n, &samples)?;
        let workers = self.config.worker_budget();
        info!(%mode, m = params.m, n = params.n, k = params.k, s = params.s, j = params.j, cover = params.cover);

        let (index, groups) = {
            let _span = span!(Level::DEBUG, "ENUMERATE").entered();
            let index = SubsetIndex::build(&self.gen, params.n, params.j, params.s, workers)?;
            let table = self.gen.positions(params.n, params.k, workers)?;
            let groups = table
                .rows()
                .map(|row| Bits::from_positions(row.iter().map(|&p| p as usize)))
                .collect_vec();
            debug!(num_j = index.num_j(), num_s = index.num_s(), num_groups = groups.len());
            (index, groups)
        };

        let mut order = ids::<GroupId>(groups.len()).collect_vec();
        if self.config.randomize {
            let mut rng = match self.config.seed {
                Some(seed) => SmallRng::seed_from_u64(seed),
                None => SmallRng::seed_from_u64(rand::rng().random()),
            };
            order.shuffle(&mut rng);
        }
        let total_combinations = groups.len() as u64;
        let problem = Problem {
            gen: &self.gen,
            index: &index,
            groups,
            order,
            k: params.k,
            cover: params.cover,
            deadline: self.config.deadline(start),
        };

        let pre = Preprocessor::new(&index).select(mode.strategy());
        let result = {
            let _span = span!(Level::DEBUG, "SELECT", %mode).entered();
            match mode {
                Mode::A => beam::search(&problem, pre)?,
                Mode::B => greedy::search_at_least_n(&problem, &pre)?,
                Mode::C => greedy::search_all(&problem)?,
            }
        };
        let (selected, mut status, mut message) = match result {
            SearchResult::Covered(g) => (g, Status::Success, String::new()),
            SearchResult::Incomplete(g, reason) => (g, Status::NoSolution, reason),
            SearchResult::Timeout(g) => (
                g,
                Status::Timeout,
                format!("time limit of {:?} exceeded", self.config.time_limit),
            ),
        };
        let groups = selected
            .iter()
            .map(|&g| universe.elements_of(problem.groups[g]))
            .collect_vec();

        let coverage = {
            let _span = span!(Level::DEBUG, "AUDIT").entered();
            let (js, ss) = index.concrete(universe.elements());
            self.calc.calculate(&groups, &js, &ss, params.coverage_mode())?
        };
        if status == Status::Success && !coverage.is_complete() {
            status = Status::Error;
            message = format!(
                "selected groups cover only {}/{} j-combinations",
                coverage.covered_j_count, coverage.total_j_count
            );
        }
        if status == Status::NoSolution {
            message = format!("{message} (coverage {:.2}%)", coverage.coverage_ratio * 100.0);
        }
        info!(%status, groups = groups.len(), ratio = coverage.coverage_ratio, "solve done");

        let metrics = self.metrics(&groups, total_combinations);
        Ok(Solution {
            samples: universe.elements().to_vec(),
            total_groups: groups.len(),
            groups,
            coverage_ratio: coverage.coverage_ratio,
            elapsed: start.elapsed(),
            status,
            message,
            mode: Some(mode),
            metrics: Some(metrics),
        })
    }

    fn metrics(&self, groups: &[Vec<Elem>], total_combinations: u64) -> Metrics {
        let avg_group_size = if groups.is_empty() {
            0.0
        } else {
            groups.iter().map(|g| g.len()).sum::<usize>() as f64 / groups.len() as f64
        };
        let pairs = groups.len() * groups.len().saturating_sub(1) / 2;
        let inter_group_similarity = if pairs == 0 {
            0.0
        } else {
            groups
                .iter()
                .tuple_combinations()
                .map(|(a, b)| self.sets.jaccard(a, b))
                .sum::<f64>()
                / pairs as f64
        };
        Metrics {
            avg_group_size,
            inter_group_similarity,
            total_combinations,
        }
    }

    /// Coverage of `groups` over the universe `samples`, under the predicate of the mode of `params`.
    pub fn audit(&self, params: &Params, samples: &[Elem], groups: &[Vec<Elem>]) -> CoverResult<CoverageResult> {
        params.validate()?;
        let universe = Universe::new(params.m, params.n, samples)?;
        for group in groups {
            if !self.sets.is_valid(group) {
                return Err(CoverError::InvalidArgument(format!("{group:?} is not a valid group")));
            }
            universe.bits_of(group)?;
        }
        let _span = span!(Level::DEBUG, "AUDIT").entered();
        let index = SubsetIndex::build(&self.gen, params.n, params.j, params.s, self.config.worker_budget())?;
        let (js, ss) = index.concrete(universe.elements());
        self.calc.calculate(groups, &js, &ss, params.coverage_mode())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(m: usize, n: usize, k: usize, s: usize, j: usize, cover: usize) -> Params {
        Params::new(m, n, k, s, j, cover).with_samples((1..=n as Elem).collect())
    }

    #[test]
    fn mode_convention() {
        assert_eq!(params(45, 7, 5, 3, 4, 1).mode(), Mode::A);
        assert_eq!(params(45, 7, 5, 3, 4, 4).mode(), Mode::C);
        assert_eq!(params(45, 7, 5, 3, 4, 2).mode(), Mode::B);
        assert_eq!(params(45, 7, 5, 3, 4, 2).with_mode(Mode::C).mode(), Mode::C);
        assert_eq!(params(45, 7, 5, 3, 4, 2).coverage_mode(), CoverageMode::AtLeastN(2));
    }

    #[test]
    fn validation_messages() {
        let err = params(45, 7, 8, 3, 4, 1).validate().unwrap_err();
        assert!(err.to_string().contains("k (8) must not exceed n (7)"));
        assert!(params(45, 7, 2, 3, 4, 1).validate().is_err());
        assert!(params(45, 7, 5, 3, 8, 1).validate().is_err());
        assert!(params(45, 7, 5, 0, 4, 1).validate().is_err());
        assert!(params(45, 7, 5, 3, 4, 0).validate().is_err());
        assert!(params(45, 7, 5, 3, 4, 5).validate().is_err());
        assert!(params(5, 7, 5, 3, 4, 1).validate().is_err());
        assert!(params(45, 7, 5, 3, 4, 2).validate().is_ok());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("b".parse::<Mode>(), Ok(Mode::B));
        assert_eq!("C".parse::<Mode>(), Ok(Mode::C));
        assert!("d".parse::<Mode>().is_err());
        assert_eq!(Mode::A.to_string(), "a");
    }

    #[test]
    fn invalid_parameters_are_reported() {
        let solver = Solver::new(Config::sequential());
        let sol = solver.solve(&params(45, 7, 8, 3, 3, 1));
        assert_eq!(sol.status, Status::NoSolution);
        assert!(sol.groups.is_empty());
        assert!(!sol.message.is_empty());
    }

    #[test]
    fn oversized_problems_are_reported() {
        let p = params(60, 60, 30, 1, 1, 1);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("C(n, k) = C(60, 30)"), "{err}");
        let sol = Solver::new(Config::sequential()).solve(&p);
        assert_eq!(sol.status, Status::NoSolution);
        assert!(sol.groups.is_empty());
        assert!(sol.message.contains("enumeration limit"));
        // j-combinations are checked as well as groups
        assert!(params(128, 128, 2, 2, 64, 1).validate().is_err());
    }

    #[test]
    fn bad_samples_are_reported() {
        let solver = Solver::new(Config::sequential());
        let sol = solver.solve(&Params::new(45, 4, 3, 2, 3, 1).with_samples(vec![1, 2, 2, 3]));
        assert_eq!(sol.status, Status::InvalidParameters);
        let sol = solver.solve(&Params::new(45, 4, 3, 2, 3, 1).with_samples(vec![1, 2, 3]));
        assert_eq!(sol.status, Status::InvalidParameters);
    }

    #[test]
    fn random_samples_when_none_given() {
        let solver = Solver::new(Config::sequential().with_randomization(Some(11)));
        let sol = solver.solve(&Params::new(45, 6, 4, 2, 3, 1));
        assert_eq!(sol.samples.len(), 6);
        assert!(sol.samples.iter().all(|&e| (1..=45).contains(&e)));
        assert_eq!(sol.status, Status::Success);
    }

    #[test]
    fn metrics_of_solution() {
        let solver = Solver::new(Config::sequential());
        let sol = solver.solve(&params(45, 7, 4, 3, 3, 1));
        let metrics = sol.metrics.unwrap();
        assert_eq!(metrics.avg_group_size, 4.0);
        assert_eq!(metrics.total_combinations, 35);
        assert!((0.0..1.0).contains(&metrics.inter_group_similarity));
    }

    #[test]
    fn audit_of_explicit_groups() {
        let solver = Solver::new(Config::sequential());
        let p = params(10, 4, 3, 2, 3, 1);
        let res = solver.audit(&p, &[1, 2, 3, 4], &[vec![1, 2, 3]]).unwrap();
        // [1,2,4], [1,3,4] and [2,3,4] all share a pair with [1,2,3]
        assert_eq!(res.covered_j_count, 4);
        assert!(solver.audit(&p, &[1, 2, 3, 4], &[vec![1, 9, 3]]).is_err());
    }
}
