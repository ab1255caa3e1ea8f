use crate::errors::{CoverError, CoverResult};
use crate::sets::Bits;
use crate::Elem;
use itertools::Itertools;

/// The elements a solve operates over: `n` distinct values of `1..=m`, sorted ascending.
///
/// Inside a solve, elements are referred to by their position in this sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Universe {
    elements: Vec<Elem>,
}

impl Universe {
    /// Validates `samples` as `n` distinct values of `1..=m`.
    ///
    /// Sample lists that do not match are an [`CoverError::InvalidArgument`], a universe too large
    /// to be handled is an [`CoverError::InvalidParameters`].
    pub fn new(m: usize, n: usize, samples: &[Elem]) -> CoverResult<Universe> {
        if samples.len() != n {
            return Err(CoverError::InvalidArgument(format!(
                "expected {n} samples but got {}",
                samples.len()
            )));
        }
        if n > Bits::MAX_POSITIONS {
            return Err(CoverError::InvalidParameters(format!(
                "at most {} samples are supported, got {n}",
                Bits::MAX_POSITIONS
            )));
        }
        if let Some(&e) = samples.iter().find(|&&e| e == 0 || e as usize > m) {
            return Err(CoverError::InvalidArgument(format!("sample {e} is not in [1, {m}]")));
        }
        let elements = samples.iter().copied().sorted_unstable().collect_vec();
        if let Some((a, _)) = elements.iter().tuple_windows().find(|(a, b)| a == b) {
            return Err(CoverError::InvalidArgument(format!("sample {a} appears more than once")));
        }
        Ok(Universe { elements })
    }

    pub fn elements(&self) -> &[Elem] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn position(&self, e: Elem) -> Option<usize> {
        self.elements.binary_search(&e).ok()
    }

    /// Positions of the elements of `group`, failing on any element outside the universe.
    pub fn bits_of(&self, group: &[Elem]) -> CoverResult<Bits> {
        let positions = group
            .iter()
            .map(|&e| {
                self.position(e)
                    .ok_or_else(|| CoverError::InvalidArgument(format!("{e} is not part of the universe")))
            })
            .collect::<CoverResult<Vec<_>>>()?;
        Ok(Bits::from_positions(positions))
    }

    /// Elements at the positions of `bits`, in ascending order.
    pub fn elements_of(&self, bits: Bits) -> Vec<Elem> {
        bits.positions().map(|p| self.elements[p]).collect()
    }

    /// Display name of an element: its value, or a letter code derived from its position when
    /// `letters` is set.
    pub fn label(&self, e: Elem, letters: bool) -> String {
        match self.position(e) {
            Some(p) if letters => letter_code(p),
            _ => e.to_string(),
        }
    }

    pub fn format_group(&self, group: &[Elem], letters: bool) -> String {
        let sep = if letters { "" } else { "," };
        format!("[{}]", group.iter().map(|&e| self.label(e, letters)).join(sep))
    }
}

/// Bijective base-26 code of a position: `A`..`Z`, `AA`, `AB`, ...
pub fn letter_code(position: usize) -> String {
    let mut n = position + 1;
    let mut code = Vec::new();
    while n > 0 {
        n -= 1;
        code.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    code.reverse();
    String::from_utf8_lossy(&code).into_owned()
}
