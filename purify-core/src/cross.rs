use crate::choice::ChoiceGenerator;

/// How a cross-construct quad is split between its two clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadShape {
    /// Three from the earlier cluster, then one from the later one.
    ThreeOne,
    /// Three from the later cluster, then one from the earlier one.
    OneThree,
    /// Two from each; only the cross pairing is tested.
    TwoTwo,
}

impl QuadShape {
    /// Whether the quad is scored under all three pairings.
    pub fn uses_three_pairings(self) -> bool {
        !matches!(self, QuadShape::TwoTwo)
    }
}

/// Four variable positions spanning exactly two clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossQuad {
    pub nodes: [usize; 4],
    pub shape: QuadShape,
    pub clusters: (usize, usize),
}

/// Lazily enumerate every cross-construct quad of `clustering`.
///
/// Cluster pairs are visited as `p1 < p2` in clustering order; for each pair
/// the 3+1 quads come first, then 1+3, then 2+2, each in lexicographic
/// combination order. Consumers stop pulling as soon as they have a result.
pub fn cross_construct_quads(clustering: &[Vec<usize>]) -> impl Iterator<Item = CrossQuad> + '_ {
    let n = clustering.len();
    (0..n)
        .flat_map(move |p1| (p1 + 1..n).map(move |p2| (p1, p2)))
        .flat_map(move |(p1, p2)| {
            let a = clustering[p1].as_slice();
            let b = clustering[p2].as_slice();
            split_quads(a, b, 3, QuadShape::ThreeOne, (p1, p2))
                .chain(split_quads(b, a, 3, QuadShape::OneThree, (p1, p2)))
                .chain(split_quads(a, b, 2, QuadShape::TwoTwo, (p1, p2)))
        })
}

/// Quads taking `take` members of `first` followed by `4 - take` of `second`.
/// Empty when either cluster is too small for the split.
fn split_quads<'a>(
    first: &'a [usize],
    second: &'a [usize],
    take: usize,
    shape: QuadShape,
    clusters: (usize, usize),
) -> impl Iterator<Item = CrossQuad> + 'a {
    let rest = 4 - take;
    ChoiceGenerator::new(first.len(), take).flat_map(move |c1| {
        ChoiceGenerator::new(second.len(), rest).map(move |c2| {
            let mut nodes = [0usize; 4];
            for (slot, &i) in c1.iter().enumerate() {
                nodes[slot] = first[i];
            }
            for (slot, &i) in c2.iter().enumerate() {
                nodes[take + slot] = second[i];
            }
            CrossQuad {
                nodes,
                shape,
                clusters,
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice::choose;

    fn count(quads: &[CrossQuad], shape: QuadShape) -> usize {
        quads.iter().filter(|q| q.shape == shape).count()
    }

    #[test]
    fn counts_per_shape() {
        let clustering = vec![vec![0, 1, 2, 3], vec![4, 5, 6]];
        let quads: Vec<_> = cross_construct_quads(&clustering).collect();
        assert_eq!(count(&quads, QuadShape::ThreeOne) as u64, choose(4, 3) * 3);
        assert_eq!(count(&quads, QuadShape::OneThree) as u64, choose(3, 3) * 4);
        assert_eq!(count(&quads, QuadShape::TwoTwo) as u64, choose(4, 2) * choose(3, 2));
    }

    #[test]
    fn order_within_a_pair() {
        let clustering = vec![vec![0, 1, 2], vec![3, 4, 5]];
        let quads: Vec<_> = cross_construct_quads(&clustering).collect();
        assert_eq!(quads[0].nodes, [0, 1, 2, 3]);
        assert_eq!(quads[0].shape, QuadShape::ThreeOne);
        assert_eq!(quads[2].nodes, [0, 1, 2, 5]);
        // The 1+3 split lists the later cluster's three members first.
        assert_eq!(quads[3].nodes, [3, 4, 5, 0]);
        assert_eq!(quads[3].shape, QuadShape::OneThree);
        assert_eq!(quads[6].nodes, [0, 1, 3, 4]);
        assert_eq!(quads[6].shape, QuadShape::TwoTwo);
        assert_eq!(quads.len(), 3 + 3 + 9);
    }

    #[test]
    fn small_clusters_skip_shapes() {
        let clustering = vec![vec![0], vec![1, 2], vec![3, 4, 5]];
        let quads: Vec<_> = cross_construct_quads(&clustering).collect();
        // (0,1): nothing; (0,2): 1+3 only; (1,2): 1+3 and 2+2.
        assert!(quads.iter().all(|q| q.clusters != (0, 1)));
        assert_eq!(quads.iter().filter(|q| q.clusters == (0, 2)).count(), 1);
        assert_eq!(count(&quads, QuadShape::ThreeOne), 0);
        assert_eq!(count(&quads, QuadShape::TwoTwo), 3);
        assert_eq!(count(&quads, QuadShape::OneThree), 1 + 2);
    }

    #[test]
    fn pairs_follow_cluster_order() {
        let clustering = vec![vec![0, 1], vec![2, 3], vec![4, 5]];
        let pairs: Vec<_> = cross_construct_quads(&clustering).map(|q| q.clusters).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
    }
}
