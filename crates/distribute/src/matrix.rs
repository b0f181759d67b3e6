use std::collections::BTreeSet;

/// Cosine similarity between two need-sets: `|a ∩ b| / sqrt(|a| * |b|)`,
/// or `0.0` when either set is empty.
pub fn similarity(a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    shared / ((a.len() * b.len()) as f64).sqrt()
}

/// Symmetric pairwise similarity, stored as its strictly lower triangle.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimilarityMatrix {
    size: usize,
    cells: Vec<f64>,
}

impl SimilarityMatrix {
    pub(crate) fn new(needs: &[BTreeSet<usize>]) -> Self {
        let size = needs.len();
        let mut cells = Vec::with_capacity(size * size.saturating_sub(1) / 2);
        for i in 1..size {
            for j in 0..i {
                cells.push(similarity(&needs[i], &needs[j]));
            }
        }
        Self { size, cells }
    }

    fn index(i: usize, j: usize) -> usize {
        i * (i - 1) / 2 + j
    }

    /// Similarity of `i` and `j`. A recipient is fully similar to itself.
    pub(crate) fn get(&self, i: usize, j: usize) -> f64 {
        debug_assert!(i < self.size && j < self.size);
        match i.cmp(&j) {
            std::cmp::Ordering::Equal => 1.0,
            std::cmp::Ordering::Greater => self.cells[Self::index(i, j)],
            std::cmp::Ordering::Less => self.cells[Self::index(j, i)],
        }
    }

    /// Greedy nearest-neighbour chain starting at index 0. Each step picks the
    /// unplaced index most similar to the last placed one; ties go to the
    /// smallest index.
    pub(crate) fn chain(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.size);
        if self.size == 0 {
            return order;
        }
        let mut placed = vec![false; self.size];
        let mut last = 0;
        placed[last] = true;
        order.push(last);
        while order.len() < self.size {
            let mut best: Option<(usize, f64)> = None;
            for candidate in (0..self.size).filter(|&c| !placed[c]) {
                let score = self.get(last, candidate);
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((candidate, score));
                }
            }
            let Some((next, _)) = best else { break };
            placed[next] = true;
            order.push(next);
            last = next;
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[rstest]
    #[case(&[0], &[0], 1.0)]
    #[case(&[0], &[1], 0.0)]
    #[case(&[0], &[0, 2], std::f64::consts::FRAC_1_SQRT_2)]
    #[case(&[0, 1], &[1, 2], 0.5)]
    #[case(&[], &[1], 0.0)]
    #[case(&[], &[], 0.0)]
    fn test_similarity(#[case] a: &[usize], #[case] b: &[usize], #[case] expected: f64) {
        assert!((similarity(&set(a), &set(b)) - expected).abs() < 1e-12);
        assert_eq!(similarity(&set(a), &set(b)), similarity(&set(b), &set(a)));
    }

    #[test]
    fn test_lower_triangle_layout() {
        let needs = vec![set(&[0]), set(&[0, 1]), set(&[1]), set(&[2])];
        let matrix = SimilarityMatrix::new(&needs);
        assert_eq!(matrix.cells.len(), 6);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
            }
        }
        assert_eq!(matrix.get(3, 2), 0.0);
        assert_eq!(matrix.get(2, 1), matrix.cells[SimilarityMatrix::index(2, 1)]);
    }

    #[test]
    fn test_chain() {
        let needs = vec![set(&[1]), set(&[0]), set(&[0, 2]), set(&[1]), set(&[2])];
        assert_eq!(SimilarityMatrix::new(&needs).chain(), vec![0, 3, 1, 2, 4]);
    }

    #[test]
    fn test_chain_ties_pick_smallest_index() {
        let needs = vec![set(&[0]), set(&[1]), set(&[2]), set(&[3])];
        assert_eq!(SimilarityMatrix::new(&needs).chain(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_chain_degenerate() {
        assert!(SimilarityMatrix::new(&[]).chain().is_empty());
        assert_eq!(SimilarityMatrix::new(&[set(&[])]).chain(), vec![0]);
    }
}
