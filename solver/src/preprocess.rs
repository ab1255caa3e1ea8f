//! Reduction of the s-subset universe to a smaller pool of s-subsets worth covering.

use crate::combinations::SubsetIndex;
use crate::config::{PHASE1_GAIN, PHASE2_DISTANCE, PHASE2_GAIN};
use crate::ids::SId;
use derive_more::Display;
use fixedbitset::FixedBitSet;
use tracing::{debug, trace, Level};

/// Selection strategy, one per solving mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Strategy {
    /// Every j-combination should have one selected s-subset.
    #[display("mode-a")]
    ModeA,
    /// Every j-combination should have two selected s-subsets, spread apart.
    #[display("mode-b")]
    ModeB,
    /// No selection: the solver works on the full s-subset universe.
    #[display("mode-c")]
    ModeC,
}

/// Result of a preprocessing pass.
#[derive(Clone, Debug, Default)]
pub struct Preselection {
    /// Selected s-subsets, in selection order.
    pub selected: Vec<SId>,
    /// Number of j-combinations having at least one selected s-subset.
    pub covered_j: usize,
}

impl Preselection {
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Greedy selection of s-subsets over a prebuilt [`SubsetIndex`].
pub struct Preprocessor<'a> {
    index: &'a SubsetIndex,
}

/// Bookkeeping shared by the greedy phases.
struct Selection<'a> {
    index: &'a SubsetIndex,
    selected: Vec<SId>,
    is_selected: FixedBitSet,
    /// Minimum Jaccard distance of each s-subset to the selected ones (1.0 when none is selected).
    min_distance: Vec<f64>,
}

impl<'a> Selection<'a> {
    fn new(index: &'a SubsetIndex) -> Self {
        Selection {
            index,
            selected: Vec::new(),
            is_selected: FixedBitSet::with_capacity(index.num_s()),
            min_distance: vec![1.0; index.num_s()],
        }
    }

    fn select(&mut self, s: SId) {
        debug_assert!(!self.is_selected.contains(s.index()));
        self.selected.push(s);
        self.is_selected.insert(s.index());
        let bits = self.index.s_bits(s);
        for other in self.index.s_ids() {
            let d = bits.distance(self.index.s_bits(other));
            let slot = &mut self.min_distance[other.index()];
            if d < *slot {
                *slot = d;
            }
        }
    }

    fn candidates(&self) -> impl Iterator<Item = SId> + '_ {
        self.index.s_ids().filter(|s| !self.is_selected.contains(s.index()))
    }
}

impl<'a> Preprocessor<'a> {
    pub fn new(index: &'a SubsetIndex) -> Self {
        Preprocessor { index }
    }

    pub fn select(&self, strategy: Strategy) -> Preselection {
        let _span = tracing::span!(Level::DEBUG, "PREPROCESS", %strategy).entered();
        let res = match strategy {
            Strategy::ModeA => self.mode_a(),
            Strategy::ModeB => self.mode_b(),
            Strategy::ModeC => Preselection::default(),
        };
        debug!(
            selected = res.len(),
            covered_j = res.covered_j,
            total_j = self.index.num_j(),
            "preselection done"
        );
        res
    }

    /// Three greedy phases maximizing the number of newly covered j-combinations: big steps,
    /// then low-overlap refinement, then unconstrained small steps.
    fn mode_a(&self) -> Preselection {
        let idx = self.index;
        let total_j = idx.num_j();
        let mut sel = Selection::new(idx);
        let mut covered = FixedBitSet::with_capacity(total_j);
        let mut num_covered = 0;
        // number of uncovered j-combinations containing each s-subset
        let mut gain: Vec<usize> = idx.s_ids().map(|s| idx.containing(s).len()).collect();

        let phases = [
            (PHASE1_GAIN.get(), 0.0, true),
            (PHASE2_GAIN.get(), PHASE2_DISTANCE.get(), true),
            (0.0, 0.0, false),
        ];
        for (phase, &(min_gain, min_distance, tie_break)) in phases.iter().enumerate() {
            while num_covered < total_j {
                let mut best: Option<(SId, usize, f64)> = None;
                for s in sel.candidates() {
                    let g = gain[s.index()];
                    let d = sel.min_distance[s.index()];
                    if g == 0 || (g as f64) / (total_j as f64) < min_gain || d < min_distance {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((_, bg, bd)) => g > bg || (tie_break && g == bg && d > bd),
                    };
                    if better {
                        best = Some((s, g, d));
                    }
                }
                let Some((s, g, d)) = best else {
                    break;
                };
                sel.select(s);
                for &j in idx.containing(s) {
                    if !covered.put(j.index()) {
                        num_covered += 1;
                        for &other in idx.subsets_of(j) {
                            gain[other.index()] -= 1;
                        }
                    }
                }
                trace!(phase = phase + 1, %s, gain = g, distance = d, num_covered, "select");
            }
            debug!(phase = phase + 1, selected = sel.selected.len(), num_covered);
        }
        Preselection {
            selected: sel.selected,
            covered_j: num_covered,
        }
    }

    /// Picks s-subsets by `Σ_j max(0, 2 - coverage[j])` weighted by their distance to previous
    /// picks, until every j-combination holds two picks.
    fn mode_b(&self) -> Preselection {
        let idx = self.index;
        let total_j = idx.num_j();
        let mut sel = Selection::new(idx);
        let mut coverage = vec![0u32; total_j];
        let max_iterations = 2 * total_j;

        for _ in 0..max_iterations {
            if coverage.iter().all(|&c| c >= 2) {
                break;
            }
            let mut best: Option<(SId, f64)> = None;
            for s in sel.candidates() {
                let need: u32 = idx
                    .containing(s)
                    .iter()
                    .map(|&j| 2u32.saturating_sub(coverage[j.index()]))
                    .sum();
                let score = need as f64 * sel.min_distance[s.index()];
                if score > best.map_or(0.0, |(_, b)| b) {
                    best = Some((s, score));
                }
            }
            let Some((s, score)) = best else {
                break;
            };
            sel.select(s);
            for &j in idx.containing(s) {
                coverage[j.index()] += 1;
            }
            trace!(%s, score, "select");
        }
        Preselection {
            covered_j: coverage.iter().filter(|&&c| c > 0).count(),
            selected: sel.selected,
        }
    }
}
