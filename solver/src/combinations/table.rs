use crate::combinations::{binomial, rank, CombinationGenerator, PositionTable};
use crate::errors::{CoverError, CoverResult};
use crate::ids::{ids, JId, SId};
use crate::sets::Bits;
use crate::Elem;
use std::sync::Arc;

/// Bidirectional index between the j-combinations of a universe and their s-subsets.
///
/// J-combinations and s-subsets are identified by their rank in the lexicographic enumeration of
/// the universe positions, so an s-subset shared by several j-combinations has a single id.
/// Built once per solve and read-only afterwards.
#[derive(Debug)]
pub struct SubsetIndex {
    n: usize,
    j: usize,
    s: usize,
    j_bits: Vec<Bits>,
    s_bits: Vec<Bits>,
    j_to_s: Vec<Vec<SId>>,
    s_to_j: Vec<Vec<JId>>,
}

impl SubsetIndex {
    /// Builds the index for the `j`-combinations and `s`-subsets of a universe of `n` elements,
    /// in a single pass over the j-combinations.
    pub fn build(gen: &CombinationGenerator, n: usize, j: usize, s: usize, threads: usize) -> CoverResult<Self> {
        if n > Bits::MAX_POSITIONS {
            return Err(CoverError::InvalidParameters(format!(
                "universe of {n} elements exceeds the supported maximum of {}",
                Bits::MAX_POSITIONS
            )));
        }
        if s == 0 || s > j || j > n {
            return Err(CoverError::InvalidParameters(format!(
                "cannot index {s}-subsets of {j}-combinations over {n} elements"
            )));
        }
        let j_table = gen.positions(n, j, threads)?;
        let s_table = gen.positions(n, s, threads)?;
        // positions of the s-subsets inside a single j-combination
        let local = gen.positions(j, s, 1)?;

        let s_bits = bits_of_table(&s_table);
        let j_bits = bits_of_table(&j_table);
        let num_s = s_bits.len();

        let mut j_to_s = Vec::with_capacity(j_bits.len());
        let mut s_to_j = vec![Vec::new(); num_s];
        let mut positions = Vec::with_capacity(s);
        for (jid, row) in ids::<JId>(j_table.num_rows()).zip(j_table.rows()) {
            let mut subsets = Vec::with_capacity(local.num_rows());
            for sub in local.rows() {
                positions.clear();
                positions.extend(sub.iter().map(|&p| row[p as usize] as usize));
                let r = rank(&positions, n) as usize;
                if r >= num_s {
                    return Err(CoverError::Internal(format!("s-subset rank {r} out of range ({num_s} subsets)")));
                }
                let sid = SId::from(r);
                subsets.push(sid);
                s_to_j[sid].push(jid);
            }
            j_to_s.push(subsets);
        }
        tracing::debug!(
            num_j = j_bits.len(),
            num_s,
            per_j = local.num_rows(),
            "built subset index"
        );
        Ok(SubsetIndex {
            n,
            j,
            s,
            j_bits,
            s_bits,
            j_to_s,
            s_to_j,
        })
    }

    pub fn universe_len(&self) -> usize {
        self.n
    }

    pub fn j(&self) -> usize {
        self.j
    }

    pub fn s(&self) -> usize {
        self.s
    }

    pub fn num_j(&self) -> usize {
        self.j_bits.len()
    }

    pub fn num_s(&self) -> usize {
        self.s_bits.len()
    }

    /// Number of s-subsets of every j-combination, C(j, s).
    pub fn subsets_per_j(&self) -> usize {
        binomial(self.j as u64, self.s as u64) as usize
    }

    pub fn j_ids(&self) -> impl Iterator<Item = JId> + Clone {
        ids(self.num_j())
    }

    pub fn s_ids(&self) -> impl Iterator<Item = SId> + Clone {
        ids(self.num_s())
    }

    pub fn j_bits(&self, j: JId) -> Bits {
        self.j_bits[j]
    }

    pub fn s_bits(&self, s: SId) -> Bits {
        self.s_bits[s]
    }

    /// The s-subsets of a j-combination, in lexicographic order.
    pub fn subsets_of(&self, j: JId) -> &[SId] {
        &self.j_to_s[j]
    }

    /// The j-combinations containing an s-subset, in lexicographic order.
    pub fn containing(&self, s: SId) -> &[JId] {
        &self.s_to_j[s]
    }

    /// The s-subsets lying inside the universe positions of `group`.
    pub fn subsets_in(&self, group: Bits) -> impl Iterator<Item = SId> + '_ {
        self.s_ids().filter(move |&s| group.contains(self.s_bits[s]))
    }

    /// The s-subsets lying inside `group`, enumerated through `local`, the position table of the
    /// `s`-combinations of `group.len()` elements.
    pub fn subsets_within(&self, group: Bits, local: &PositionTable) -> CoverResult<Vec<SId>> {
        if local.arity() != self.s || local.len() != group.len() as usize {
            return Err(CoverError::Internal(format!(
                "position table of shape ({}, {}) used for a group of {} elements",
                local.len(),
                local.arity(),
                group.len()
            )));
        }
        let members: Vec<usize> = group.positions().collect();
        let mut positions = Vec::with_capacity(self.s);
        local
            .rows()
            .map(|sub| {
                positions.clear();
                positions.extend(sub.iter().map(|&p| members[p as usize]));
                let r = rank(&positions, self.n) as usize;
                if r < self.num_s() {
                    Ok(SId::from(r))
                } else {
                    Err(CoverError::Internal(format!("s-subset rank {r} out of range")))
                }
            })
            .collect()
    }

    /// Concrete j-combinations and their s-subset lists over `universe`, index-aligned, in the
    /// shape expected by the coverage calculator.
    pub fn concrete(&self, universe: &[Elem]) -> (Vec<Vec<Elem>>, Vec<Vec<Vec<Elem>>>) {
        let to_elems = |b: Bits| b.positions().map(|p| universe[p]).collect::<Vec<_>>();
        let js = self.j_bits.iter().map(|&b| to_elems(b)).collect();
        let ss = self
            .j_to_s
            .iter()
            .map(|subsets| subsets.iter().map(|&s| to_elems(self.s_bits[s])).collect())
            .collect();
        (js, ss)
    }
}

fn bits_of_table(table: &Arc<PositionTable>) -> Vec<Bits> {
    table
        .rows()
        .map(|row| Bits::from_positions(row.iter().map(|&p| p as usize)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Config;

    fn index(n: usize, j: usize, s: usize) -> SubsetIndex {
        SubsetIndex::build(&CombinationGenerator::new(&Config::sequential()), n, j, s, 1).unwrap()
    }

    #[test]
    fn sizes() {
        let idx = index(7, 3, 2);
        assert_eq!(idx.num_j(), 35);
        assert_eq!(idx.num_s(), 21);
        assert_eq!(idx.subsets_per_j(), 3);
        assert!(idx.j_ids().all(|j| idx.subsets_of(j).len() == 3));
        // every pair lies in n - 2 triples
        assert!(idx.s_ids().all(|s| idx.containing(s).len() == 5));
    }

    #[test]
    fn maps_are_inverse() {
        let idx = index(6, 4, 2);
        for j in idx.j_ids() {
            for &s in idx.subsets_of(j) {
                assert!(idx.j_bits(j).contains(idx.s_bits(s)));
                assert!(idx.containing(s).contains(&j));
            }
        }
        for s in idx.s_ids() {
            for &j in idx.containing(s) {
                assert!(idx.subsets_of(j).contains(&s));
            }
        }
    }

    #[test]
    fn concrete_lists_follow_universe() {
        let idx = index(4, 3, 2);
        let (js, ss) = idx.concrete(&[10, 20, 30, 40]);
        assert_eq!(js[0], vec![10, 20, 30]);
        assert_eq!(ss[0], vec![vec![10, 20], vec![10, 30], vec![20, 30]]);
        assert_eq!(js[3], vec![20, 30, 40]);
        assert_eq!(ss[3], vec![vec![20, 30], vec![20, 40], vec![30, 40]]);
    }

    #[test]
    fn subsets_in_group() {
        let idx = index(5, 3, 2);
        let group = Bits::from_positions([0, 1, 2]);
        assert_eq!(idx.subsets_in(group).count(), 3);
    }

    #[test]
    fn subsets_within_group() {
        let gen = CombinationGenerator::new(&Config::sequential());
        let idx = SubsetIndex::build(&gen, 6, 3, 2, 1).unwrap();
        let group = Bits::from_positions([1, 3, 4, 5]);
        let local = gen.positions(4, 2, 1).unwrap();
        let within = idx.subsets_within(group, &local).unwrap();
        assert_eq!(within.len(), 6);
        let expected: Vec<SId> = idx.subsets_in(group).collect();
        assert_eq!(within, expected);
        let wrong = gen.positions(4, 3, 1).unwrap();
        assert!(idx.subsets_within(group, &wrong).is_err());
    }

    #[test]
    fn rejects_bad_shapes() {
        let gen = CombinationGenerator::default();
        assert!(SubsetIndex::build(&gen, 5, 2, 3, 1).is_err());
        assert!(SubsetIndex::build(&gen, 200, 3, 2, 1).is_err());
    }
}
