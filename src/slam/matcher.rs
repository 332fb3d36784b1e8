use bitarray::BitArray;
use space::{Knn, KnnFromBatch, LinearKnn, Metric};

use crate::{
    config::MatcherConfig,
    slam::features::{Feature, FeatureSet},
};

/// A one-to-one match between a feature of the previous frame and one of the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Correspondence {
    /// Index into the previous frame's [`FeatureSet`].
    pub prev: usize,
    /// Index into the current frame's [`FeatureSet`].
    pub cur: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Brute force descriptor matcher with a mutual nearest neighbour check.
#[derive(Clone, Debug, Default)]
pub struct FeatureMatcher {
    config: MatcherConfig,
}

impl FeatureMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Pairs `i` in `prev` with `j` in `cur` only when each is the other's nearest
    /// neighbour. Every index appears in at most one correspondence, and the result
    /// is sorted by ascending distance.
    pub fn match_features(&self, prev: &FeatureSet, cur: &FeatureSet) -> Vec<Correspondence> {
        if prev.is_empty() || cur.is_empty() {
            return Vec::new();
        }

        let forward = nearest_neighbors(prev, cur);
        let backward = nearest_neighbors(cur, prev);

        let mut matches: Vec<Correspondence> = forward
            .iter()
            .enumerate()
            .filter_map(|(i, &(j, distance))| {
                // cross check: the match has to be mutual
                let &(back, _) = backward.get(j)?;
                (back == i).then_some(Correspondence {
                    prev: i,
                    cur: j,
                    distance,
                })
            })
            .filter(|m| self.config.max_distance.map_or(true, |max| m.distance <= max))
            .collect();

        matches.sort_by_key(|m| (m.distance, m.prev));

        tracing::trace!(
            prev = prev.len(),
            cur = cur.len(),
            matches = matches.len(),
            "matched features"
        );

        matches
    }
}

/// For every query feature, the index of and distance to its nearest `target` feature.
/// `target` must not be empty.
fn nearest_neighbors(queries: &FeatureSet, target: &FeatureSet) -> Vec<(usize, u32)> {
    // LinearKnn wants (point, value) pairs; the value is unused
    let data = target.iter().map(|f| (f, ())).collect::<Vec<_>>();
    let search: LinearKnn<FeatureHamming, _> = KnnFromBatch::from_batch(data.iter());

    queries
        .iter()
        .map(|feature| {
            search
                .knn(&feature, 1)
                .first()
                .map_or((usize::MAX, u32::MAX), |nearest| {
                    (nearest.0.index, nearest.0.distance)
                })
        })
        .collect()
}

/// Hamming distance between binary descriptors
#[derive(Default)]
struct FeatureHamming;

impl<'f> Metric<&'f Feature> for FeatureHamming {
    type Unit = u32;
    fn distance(&self, a: &&Feature, b: &&Feature) -> Self::Unit {
        BitArray::new(a.descriptor).distance(&BitArray::new(b.descriptor))
    }
}
