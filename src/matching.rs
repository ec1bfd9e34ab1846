//! Descriptor matching between image pairs.
//!
//! A [`Matcher`] backend produces raw k-nearest-neighbour candidates;
//! [`PairMatcher`] turns them into a "good match" list with the ratio test and
//! drops pairs that keep too few matches. [`MatchTable`] holds the directed
//! match lists of a whole collection.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::MatcherError;
use crate::features::FeatureCatalog;
use crate::settings::{GraphSettings, MatchingMode};
use crate::types::{Descriptors, ImageIndex};

/// Directed match from keypoint `query_idx` of image A to keypoint
/// `train_idx` of image B.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Match {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }

    /// The same match seen from image B.
    pub fn reversed(&self) -> Self {
        Self::new(self.train_idx, self.query_idx, self.distance)
    }
}

/// Nearest-neighbour backend.
pub trait Matcher: Sync {
    /// Up to `k` neighbours in `train` for every row of `query`, ordered by
    /// ascending distance. The outer vector is aligned with `query` rows.
    fn knn(
        &self,
        query: &Descriptors,
        train: &Descriptors,
        k: usize,
    ) -> Result<Vec<Vec<Match>>, MatcherError>;
}

fn check_dimensions(query: &Descriptors, train: &Descriptors) -> Result<(), MatcherError> {
    if query.ncols() != train.ncols() {
        return Err(MatcherError::DimensionMismatch(query.ncols(), train.ncols()));
    }
    Ok(())
}

fn by_distance_then_index(a: &Match, b: &Match) -> std::cmp::Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.train_idx.cmp(&b.train_idx))
}

/// Exhaustive Euclidean search.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl Matcher for BruteForceMatcher {
    fn knn(
        &self,
        query: &Descriptors,
        train: &Descriptors,
        k: usize,
    ) -> Result<Vec<Vec<Match>>, MatcherError> {
        check_dimensions(query, train)?;
        let dims = query.ncols();

        let mut out = Vec::with_capacity(query.nrows());
        for q in 0..query.nrows() {
            let mut candidates: Vec<Match> = (0..train.nrows())
                .map(|t| {
                    let mut sq = 0.0f32;
                    for d in 0..dims {
                        let diff = query[(q, d)] - train[(t, d)];
                        sq += diff * diff;
                    }
                    Match::new(q, t, sq.sqrt())
                })
                .collect();
            candidates.sort_by(by_distance_then_index);
            candidates.truncate(k);
            out.push(candidates);
        }
        Ok(out)
    }
}

/// Approximate search over a `usearch` HNSW index built on the train set.
///
/// Distances are Euclidean, matching [`BruteForceMatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateMatcher;

impl Matcher for ApproximateMatcher {
    fn knn(
        &self,
        query: &Descriptors,
        train: &Descriptors,
        k: usize,
    ) -> Result<Vec<Vec<Match>>, MatcherError> {
        check_dimensions(query, train)?;
        let dims = train.ncols();
        let n = train.nrows();
        if n == 0 || dims == 0 || k == 0 {
            return Ok(vec![Vec::new(); query.nrows()]);
        }

        let options = IndexOptions {
            dimensions: dims,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            ..Default::default()
        };
        let index = Index::new(&options).map_err(|e| MatcherError::Index(e.to_string()))?;
        index
            .reserve(n)
            .map_err(|e| MatcherError::Index(e.to_string()))?;

        let mut vector = Vec::<f32>::with_capacity(dims);
        for t in 0..n {
            vector.clear();
            vector.extend(train.row(t).iter().copied());
            index
                .add(t as u64, &vector)
                .map_err(|e| MatcherError::Index(e.to_string()))?;
        }

        let k = k.min(n);
        let mut out = Vec::with_capacity(query.nrows());
        for q in 0..query.nrows() {
            vector.clear();
            vector.extend(query.row(q).iter().copied());
            let results = index
                .search(&vector, k)
                .map_err(|e| MatcherError::Search(e.to_string()))?;
            let mut neighbours: Vec<Match> = results
                .keys
                .iter()
                .zip(results.distances.iter())
                .map(|(&key, &d)| Match::new(q, key as usize, d.max(0.0).sqrt()))
                .collect();
            neighbours.sort_by(by_distance_then_index);
            out.push(neighbours);
        }
        Ok(out)
    }
}

/// Ratio-test filtering of raw k-NN candidates for one directed pair.
pub struct PairMatcher {
    matcher: Box<dyn Matcher>,
    k: usize,
    ratio: f32,
    match_threshold: usize,
}

impl PairMatcher {
    pub fn new(mode: MatchingMode, k: usize, ratio: f32, match_threshold: usize) -> Self {
        let matcher: Box<dyn Matcher> = match mode {
            MatchingMode::Exhaustive => Box::new(BruteForceMatcher),
            MatchingMode::Approximate => Box::new(ApproximateMatcher),
        };
        Self::with_matcher(matcher, k, ratio, match_threshold)
    }

    pub fn with_matcher(
        matcher: Box<dyn Matcher>,
        k: usize,
        ratio: f32,
        match_threshold: usize,
    ) -> Self {
        Self {
            matcher,
            k,
            ratio,
            match_threshold,
        }
    }

    pub fn from_settings(settings: &GraphSettings) -> Self {
        Self::new(
            settings.matching_mode,
            settings.k,
            settings.ratio,
            settings.match_threshold,
        )
    }

    /// Keep a candidate only if its best neighbour is closer than `ratio`
    /// times the second best. Queries with fewer than two neighbours yield
    /// nothing.
    pub fn ratio_test(&self, candidates: &[Vec<Match>]) -> Vec<Match> {
        candidates
            .iter()
            .filter_map(|neighbours| match neighbours.as_slice() {
                [best, second, ..] if best.distance < self.ratio * second.distance => Some(*best),
                _ => None,
            })
            .collect()
    }

    /// Good matches from `d1` into `d2`; empty if no more than
    /// `match_threshold` survive the ratio test.
    pub fn match_pair(
        &self,
        d1: &Descriptors,
        d2: &Descriptors,
    ) -> Result<Vec<Match>, MatcherError> {
        let candidates = self.matcher.knn(d1, d2, self.k)?;
        let good = self.ratio_test(&candidates);
        if good.len() <= self.match_threshold {
            return Ok(Vec::new());
        }
        Ok(good)
    }

    /// Match every ordered pair `(i, j)`, `i != j`, of the catalog.
    ///
    /// Backend failures are logged and leave the pair without matches.
    pub fn match_catalog(&self, catalog: &FeatureCatalog, parallel: bool) -> MatchTable {
        let n = catalog.len();
        info!("Matching features across {} ordered image pairs", n * n.saturating_sub(1));

        let pairs: Vec<(ImageIndex, ImageIndex)> = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .collect();

        let run = |&(i, j): &(ImageIndex, ImageIndex)| {
            let (Some(a), Some(b)) = (catalog.get(i), catalog.get(j)) else {
                return (i, j, Vec::new());
            };
            match self.match_pair(&a.descriptors, &b.descriptors) {
                Ok(matches) => {
                    debug!("Pair ({i}, {j}): {} good matches", matches.len());
                    (i, j, matches)
                }
                Err(e) => {
                    warn!("Matching pair ({i}, {j}) failed: {e}");
                    (i, j, Vec::new())
                }
            }
        };

        let results: Vec<_> = if parallel {
            pairs.par_iter().map(run).collect()
        } else {
            pairs.iter().map(run).collect()
        };

        let mut table = MatchTable::new(n);
        for (i, j, matches) in results {
            table.set(i, j, Some(matches));
        }
        table
    }
}

/// Directed match lists `MatchList(i, j)` for `N` images.
///
/// `None` means pruned, never computed or invalidated; `Some(vec![])` means
/// computed with no relation. The diagonal is always `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTable {
    n: usize,
    lists: Vec<Option<Vec<Match>>>,
}

impl MatchTable {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            lists: vec![None; n * n],
        }
    }

    pub fn image_count(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: ImageIndex, j: ImageIndex) -> Option<&[Match]> {
        if i >= self.n || j >= self.n {
            return None;
        }
        self.lists[i * self.n + j].as_deref()
    }

    /// Store a list; writes to the diagonal or out of range are ignored.
    pub fn set(&mut self, i: ImageIndex, j: ImageIndex, list: Option<Vec<Match>>) {
        if i == j || i >= self.n || j >= self.n {
            return;
        }
        self.lists[i * self.n + j] = list;
    }

    pub fn take(&mut self, i: ImageIndex, j: ImageIndex) -> Option<Vec<Match>> {
        if i >= self.n || j >= self.n {
            return None;
        }
        self.lists[i * self.n + j].take()
    }

    /// Number of matches in `MatchList(i, j)`, 0 when null.
    pub fn count(&self, i: ImageIndex, j: ImageIndex) -> usize {
        self.get(i, j).map_or(0, <[Match]>::len)
    }

    /// Non-null and non-empty.
    pub fn is_present(&self, i: ImageIndex, j: ImageIndex) -> bool {
        self.count(i, j) > 0
    }

    /// Images `j` with a non-null list `(i, j)`.
    pub fn non_null(&self, i: ImageIndex) -> impl Iterator<Item = ImageIndex> + '_ {
        (0..self.n).filter(move |&j| self.get(i, j).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors(rows: &[[f32; 2]]) -> Descriptors {
        Descriptors::from_fn(rows.len(), 2, |r, c| rows[r][c])
    }

    #[test]
    fn brute_force_orders_neighbours() {
        let query = descriptors(&[[0.0, 0.0]]);
        let train = descriptors(&[[3.0, 4.0], [1.0, 0.0], [0.0, 2.0], [1.0, 0.0]]);
        let knn = BruteForceMatcher.knn(&query, &train, 3).unwrap();
        let order: Vec<usize> = knn[0].iter().map(|m| m.train_idx).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(knn[0][0].distance, 1.0);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let query = Descriptors::zeros(2, 3);
        let train = Descriptors::zeros(2, 4);
        assert_eq!(
            BruteForceMatcher.knn(&query, &train, 2),
            Err(MatcherError::DimensionMismatch(3, 4))
        );
    }

    #[test]
    fn ratio_test_keeps_distinctive_matches() {
        let pm = PairMatcher::new(MatchingMode::Exhaustive, 2, 0.7, 0);
        let candidates = vec![
            vec![Match::new(0, 4, 1.0), Match::new(0, 2, 2.0)],
            vec![Match::new(1, 3, 1.0), Match::new(1, 5, 1.2)],
            vec![Match::new(2, 1, 0.1)],
            vec![],
            vec![Match::new(4, 0, 0.0), Match::new(4, 1, 0.0)],
        ];
        let good = pm.ratio_test(&candidates);
        assert_eq!(good, vec![Match::new(0, 4, 1.0)]);
    }

    #[test]
    fn single_train_descriptor_yields_no_candidates() {
        let pm = PairMatcher::new(MatchingMode::Exhaustive, 2, 0.7, 0);
        let d1 = descriptors(&[[0.0, 0.0], [5.0, 5.0]]);
        let d2 = descriptors(&[[0.0, 0.0]]);
        assert!(pm.match_pair(&d1, &d2).unwrap().is_empty());
    }

    #[test]
    fn pairs_at_the_threshold_are_dropped() {
        let rows: Vec<[f32; 2]> = (0..5).map(|i| [10.0 * i as f32, 0.0]).collect();
        let d = descriptors(&rows);
        let keep = PairMatcher::new(MatchingMode::Exhaustive, 2, 0.7, 4);
        assert_eq!(keep.match_pair(&d, &d).unwrap().len(), 5);
        let drop = PairMatcher::new(MatchingMode::Exhaustive, 2, 0.7, 5);
        assert!(drop.match_pair(&d, &d).unwrap().is_empty());
    }

    #[test]
    fn approximate_matcher_finds_exact_copies() {
        let rows: Vec<[f32; 2]> = (0..20).map(|i| [i as f32 * 3.0, (i % 4) as f32]).collect();
        let d = descriptors(&rows);
        let knn = ApproximateMatcher.knn(&d, &d, 2).unwrap();
        for (q, neighbours) in knn.iter().enumerate() {
            assert_eq!(neighbours[0].train_idx, q);
            assert!(neighbours[0].distance.abs() < 1e-4);
        }
    }

    #[test]
    fn match_table_keeps_diagonal_null() {
        let mut table = MatchTable::new(3);
        table.set(1, 1, Some(vec![Match::new(0, 0, 0.0)]));
        table.set(0, 2, Some(vec![Match::new(0, 1, 0.5)]));
        table.set(2, 0, Some(Vec::new()));
        assert!(table.get(1, 1).is_none());
        assert!(table.is_present(0, 2));
        assert!(!table.is_present(2, 0));
        assert_eq!(table.non_null(2).collect::<Vec<_>>(), vec![0]);
        assert_eq!(table.count(0, 2), 1);
        assert_eq!(table.take(0, 2).map(|l| l.len()), Some(1));
        assert!(table.get(0, 2).is_none());
    }
}
