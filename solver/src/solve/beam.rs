//! Beam search for the at-least-one predicate.
//!
//! The s-subsets to cover are those preselected by the [`Preprocessor`]. A state is a set of
//! selected groups together with the preselected s-subsets and the j-combinations it covers.
//! Each iteration extends every state of the beam with every candidate group, and keeps the
//! best scoring successors.

use crate::combinations::{binomial, PositionTable};
use crate::config::{BEAM_ITERATIONS, BEAM_WIDTH};
use crate::errors::CoverResult;
use crate::ids::{GroupId, JId, SId};
use crate::preprocess::Preselection;
use crate::sets::Bits;
use crate::solve::{Problem, SearchResult};
use fixedbitset::FixedBitSet;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

type Groups = SmallVec<[GroupId; 8]>;

/// What a candidate group brings, precomputed once.
struct Candidate {
    id: GroupId,
    /// Local indices of the preselected s-subsets inside the group.
    s_covered: Vec<u32>,
    /// J-combinations having an s-subset inside the group.
    j_covered: Vec<JId>,
}

#[derive(Clone)]
struct State {
    groups: Groups,
    covered_s: FixedBitSet,
    num_covered_s: usize,
    covered_j: FixedBitSet,
    num_covered_j: usize,
    /// Sum of the Jaccard similarities over all pairs of covered s-subsets.
    jaccard_sum: f64,
    score: f64,
}

/// A successor of a beam state, not yet materialized.
#[derive(Clone, Copy)]
struct Move {
    state: usize,
    candidate: usize,
    new_s: usize,
    new_j: usize,
    jaccard_sum: f64,
    score: f64,
}

struct Beam<'p, 'a> {
    problem: &'p Problem<'a>,
    /// Preselected s-subsets, by local index.
    selected: Vec<SId>,
    local_of: HashMap<SId, u32>,
    targets: Vec<Bits>,
    /// Positions of the s-subsets inside a group.
    local: Arc<PositionTable>,
    candidates: Vec<Candidate>,
    num_j: usize,
    target_groups: usize,
}

pub(crate) fn search(problem: &Problem, pre: Preselection) -> CoverResult<SearchResult> {
    let beam = Beam::new(problem, pre.selected)?;
    debug!(
        targets = beam.targets.len(),
        candidates = beam.candidates.len(),
        target_groups = beam.target_groups,
        "beam setup"
    );
    beam.run()
}

impl<'p, 'a> Beam<'p, 'a> {
    fn new(problem: &'p Problem<'a>, selected: Vec<SId>) -> CoverResult<Self> {
        let index = problem.index;
        let local_of: HashMap<SId, u32> = selected.iter().enumerate().map(|(i, &s)| (s, i as u32)).collect();
        let targets = selected.iter().map(|&s| index.s_bits(s)).collect_vec();
        let num_j = index.num_j();
        let per_group = binomial(problem.k as u64, index.s() as u64).max(1) as usize;

        let target_groups = selected.len().div_ceil(per_group).max(1);
        let mut beam = Beam {
            problem,
            selected,
            local_of,
            targets,
            local: problem.gen.positions(problem.k, index.s(), 1)?,
            candidates: Vec::new(),
            num_j,
            target_groups,
        };

        // drop groups covering no target and groups covering the same targets as a previous one
        let mut seen: HashSet<Vec<u32>> = HashSet::new();
        for &g in &problem.order {
            let c = beam.candidate(g)?;
            if c.s_covered.is_empty() || !seen.insert(c.s_covered.clone()) {
                continue;
            }
            beam.candidates.push(c);
        }
        Ok(beam)
    }

    fn candidate(&self, id: GroupId) -> CoverResult<Candidate> {
        let index = self.problem.index;
        let group = self.problem.groups[id];
        let within = index.subsets_within(group, &self.local)?;
        let s_covered = within.iter().filter_map(|s| self.local_of.get(s).copied()).sorted_unstable().collect_vec();
        let j_covered = within
            .iter()
            .flat_map(|&s| index.containing(s).iter().copied())
            .sorted_unstable()
            .dedup()
            .collect_vec();
        Ok(Candidate { id, s_covered, j_covered })
    }

    fn empty_state(&self) -> State {
        State {
            groups: Groups::new(),
            covered_s: FixedBitSet::with_capacity(self.targets.len()),
            num_covered_s: 0,
            covered_j: FixedBitSet::with_capacity(self.num_j),
            num_covered_j: 0,
            jaccard_sum: 0.0,
            score: 0.0,
        }
    }

    /// Evaluates the addition of `candidate` to `state`.
    fn evaluate(&self, state: &State, candidate: &Candidate) -> (usize, usize, f64) {
        let new_s = candidate
            .s_covered
            .iter()
            .copied()
            .filter(|&t| !state.covered_s.contains(t as usize))
            .collect::<SmallVec<[u32; 16]>>();
        let new_j = candidate
            .j_covered
            .iter()
            .filter(|j| !state.covered_j.contains(j.index()))
            .count();
        let mut jaccard_sum = state.jaccard_sum;
        for (i, &a) in new_s.iter().enumerate() {
            let a = self.targets[a as usize];
            jaccard_sum += state.covered_s.ones().map(|b| a.jaccard(self.targets[b])).sum::<f64>();
            jaccard_sum += new_s[i + 1..].iter().map(|&b| a.jaccard(self.targets[b as usize])).sum::<f64>();
        }
        (new_s.len(), new_j, jaccard_sum)
    }

    fn score(
        &self,
        num_groups: usize,
        num_s: usize,
        num_j: usize,
        new_s: usize,
        new_j: usize,
        jaccard_sum: f64,
    ) -> f64 {
        let s_ratio = if self.targets.is_empty() {
            1.0
        } else {
            num_s as f64 / self.targets.len() as f64
        };
        let j_ratio = num_j as f64 / self.num_j as f64;
        let pairs = num_s * num_s.saturating_sub(1) / 2;
        let diversity = if pairs == 0 { 1.0 } else { 1.0 - jaccard_sum / pairs as f64 };
        let mut score = 100.0 * s_ratio + 200.0 * j_ratio + 50.0 * new_j as f64 + 30.0 * new_s as f64
            + 20.0 * diversity
            - 30.0 * (self.target_groups as f64 - num_groups as f64).abs();
        let uncovered = self.num_j - num_j;
        if num_groups >= 3 && uncovered > 0 {
            score -= 100.0 * uncovered as f64;
        }
        score
    }

    /// Builds the state obtained by adding `candidate` to `state`.
    fn apply(&self, state: &State, candidate: &Candidate, jaccard_sum: f64, score: f64) -> State {
        let mut next = state.clone();
        next.groups.push(candidate.id);
        for &t in &candidate.s_covered {
            if !next.covered_s.put(t as usize) {
                next.num_covered_s += 1;
            }
        }
        for j in &candidate.j_covered {
            if !next.covered_j.put(j.index()) {
                next.num_covered_j += 1;
            }
        }
        next.jaccard_sum = jaccard_sum;
        next.score = score;
        next
    }

    fn seed(&self, candidate: &Candidate) -> State {
        let empty = self.empty_state();
        let (new_s, new_j, jaccard_sum) = self.evaluate(&empty, candidate);
        let score = self.score(1, new_s, new_j, new_s, new_j, jaccard_sum);
        self.apply(&empty, candidate, jaccard_sum, score)
    }

    /// Initial beam: the first group containing the target shared by most j-combinations, and a
    /// group made of the elements appearing in more than a third of the targets.
    fn warm_start(&self) -> CoverResult<Vec<State>> {
        let index = self.problem.index;
        let mut beam = Vec::new();

        let hub = self
            .selected
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                index.containing(**a).len().cmp(&index.containing(**b).len()).then(ib.cmp(ia))
            })
            .map(|(i, _)| i as u32);
        if let Some(hub) = hub {
            if let Some(c) = self.candidates.iter().find(|c| c.s_covered.contains(&hub)) {
                beam.push(self.seed(c));
            }
        }

        let n = index.universe_len();
        let mut frequency = vec![0usize; n];
        for t in &self.targets {
            for p in t.positions() {
                frequency[p] += 1;
            }
        }
        let threshold = self.targets.len() / 3;
        let mut central = (0..n).filter(|&p| frequency[p] > threshold).take(self.problem.k).collect_vec();
        if !central.is_empty() {
            // complete with the most frequent remaining elements
            let rest = (0..n)
                .filter(|p| !central.contains(p))
                .sorted_by(|&a, &b| frequency[b].cmp(&frequency[a]).then(a.cmp(&b)))
                .take(self.problem.k - central.len())
                .collect_vec();
            central.extend(rest);
            let id = self.problem.group_id(Bits::from_positions(central))?;
            let c = self.candidate(id)?;
            beam.push(self.seed(&c));
        } else {
            beam.push(self.empty_state());
        }
        Ok(beam)
    }

    /// Every successor of every state of `beam`, or `None` if the time limit is reached first.
    fn expand(&self, beam: &[State]) -> Option<Vec<Move>> {
        let mut moves = Vec::new();
        for (si, state) in beam.iter().enumerate() {
            if self.problem.timed_out() {
                return None;
            }
            for (ci, c) in self.candidates.iter().enumerate() {
                if state.groups.contains(&c.id) {
                    continue;
                }
                let (new_s, new_j, jaccard_sum) = self.evaluate(state, c);
                let num_groups = state.groups.len() + 1;
                let num_s = state.num_covered_s + new_s;
                let num_j = state.num_covered_j + new_j;
                moves.push(Move {
                    state: si,
                    candidate: ci,
                    new_s,
                    new_j,
                    jaccard_sum,
                    score: self.score(num_groups, num_s, num_j, new_s, new_j, jaccard_sum),
                });
            }
        }
        Some(moves)
    }

    fn is_complete(&self, state: &State) -> bool {
        state.num_covered_s == self.targets.len() && state.num_covered_j == self.num_j
    }

    fn run(&self) -> CoverResult<SearchResult> {
        let mut beam = self.warm_start()?;
        let mut best = match beam.iter().max_by(|a, b| compare_states(a, b)) {
            Some(state) => state.clone(),
            None => self.empty_state(),
        };
        let width = BEAM_WIDTH.get().max(1);

        for iteration in 0..BEAM_ITERATIONS.get() {
            if let Some(done) = beam.iter().find(|s| self.is_complete(s)) {
                debug!(iteration, groups = done.groups.len(), "full coverage");
                return Ok(SearchResult::Covered(done.groups.to_vec()));
            }
            if self.problem.timed_out() {
                debug!(iteration, "time limit reached");
                return Ok(SearchResult::Timeout(best.groups.to_vec()));
            }

            let Some(mut moves) = self.expand(&beam) else {
                debug!(iteration, "time limit reached while expanding");
                return Ok(SearchResult::Timeout(best.groups.to_vec()));
            };
            let max_gain = moves.iter().map(|m| m.new_s + m.new_j).max().unwrap_or(0);
            if moves.is_empty() || max_gain == 0 {
                debug!(iteration, moves = moves.len(), "no group improves the beam");
                break;
            }

            // stable: among equal scores, earlier states and candidates come first
            moves.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            let mut next_beam = Vec::with_capacity(width);
            let mut seen: HashSet<Groups> = HashSet::new();
            for m in &moves {
                if next_beam.len() == width {
                    break;
                }
                let state = &beam[m.state];
                let mut key = state.groups.clone();
                key.push(self.candidates[m.candidate].id);
                key.sort_unstable();
                if !seen.insert(key) {
                    continue;
                }
                next_beam.push(self.apply(state, &self.candidates[m.candidate], m.jaccard_sum, m.score));
            }
            if let Some(top) = next_beam.iter().max_by(|a, b| compare_states(a, b)) {
                if compare_states(top, &best) == Ordering::Greater {
                    best = top.clone();
                }
            }
            trace!(
                iteration,
                beam = next_beam.len(),
                best_s = best.num_covered_s,
                best_j = best.num_covered_j,
                best_score = best.score,
                top_new_s = moves[0].new_s,
                top_new_j = moves[0].new_j
            );
            beam = next_beam;
        }

        if let Some(done) = beam.iter().find(|s| self.is_complete(s)) {
            return Ok(SearchResult::Covered(done.groups.to_vec()));
        }
        if best.num_covered_j == self.num_j {
            Ok(SearchResult::Covered(best.groups.to_vec()))
        } else {
            Ok(SearchResult::Incomplete(
                best.groups.to_vec(),
                format!(
                    "beam search ended with {}/{} j-combinations covered",
                    best.num_covered_j, self.num_j
                ),
            ))
        }
    }
}

/// Orders states by number of covered targets, then by score.
fn compare_states(a: &State, b: &State) -> Ordering {
    a.num_covered_s
        .cmp(&b.num_covered_s)
        .then(a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::preprocess::{Preprocessor, Strategy};
    use crate::solve::with_problem;
    use std::time::Instant;

    fn run(problem: &Problem) -> SearchResult {
        search(problem, Preprocessor::new(problem.index).select(Strategy::ModeA)).unwrap()
    }

    fn covers_every_j(problem: &Problem, groups: &[GroupId]) -> bool {
        let index = problem.index;
        index.j_ids().all(|j| {
            groups
                .iter()
                .any(|&g| index.j_bits(j).intersection(problem.groups[g]).len() as usize >= index.s())
        })
    }

    #[test]
    fn finds_a_covering() {
        for shape in [(7, 4, 3, 3, 1), (7, 5, 2, 4, 1), (8, 6, 3, 5, 1), (6, 6, 2, 3, 1)] {
            with_problem(shape, None, |problem| match run(problem) {
                SearchResult::Covered(groups) => {
                    assert!(covers_every_j(problem, &groups), "{shape:?}");
                    assert!(groups.iter().all_unique());
                }
                other => panic!("{shape:?}: {other:?}"),
            });
        }
    }

    #[test]
    fn whole_universe_is_one_group() {
        with_problem((5, 5, 2, 3, 1), None, |problem| match run(problem) {
            SearchResult::Covered(groups) => assert_eq!(groups.len(), 1),
            other => panic!("{other:?}"),
        });
    }

    #[test]
    fn candidates_are_filtered() {
        with_problem((7, 4, 3, 3, 1), None, |problem| {
            let pre = Preprocessor::new(problem.index).select(Strategy::ModeA);
            let beam = Beam::new(problem, pre.selected).unwrap();
            assert!(!beam.candidates.is_empty());
            assert!(beam.candidates.len() <= problem.groups.len());
            assert!(beam.candidates.iter().all(|c| !c.s_covered.is_empty()));
            assert!(beam.candidates.iter().map(|c| &c.s_covered).all_unique());
            // 35 triples, 4 per group
            assert_eq!(beam.target_groups, 9);
        });
    }

    #[test]
    fn expansion_stops_at_the_deadline() {
        with_problem((7, 4, 3, 3, 1), None, |problem| {
            let pre = Preprocessor::new(problem.index).select(Strategy::ModeA);
            let beam = Beam::new(problem, pre.selected.clone()).unwrap();
            let states = beam.warm_start().unwrap();
            let moves = beam.expand(&states).unwrap();
            assert!(!moves.is_empty());
            assert!(moves.iter().all(|m| m.state < states.len()));
        });
        with_problem((7, 4, 3, 3, 1), Some(Instant::now()), |problem| {
            let pre = Preprocessor::new(problem.index).select(Strategy::ModeA);
            let beam = Beam::new(problem, pre.selected).unwrap();
            let states = beam.warm_start().unwrap();
            assert!(beam.expand(&states).is_none());
        });
    }

    #[test]
    fn expired_deadline() {
        with_problem((7, 4, 3, 3, 1), Some(Instant::now()), |problem| {
            assert!(matches!(run(problem), SearchResult::Timeout(_)));
        });
    }
}
