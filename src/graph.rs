//! Correspondence graph over an image collection.
//!
//! Every unordered pair `{i, j}` owns one [`PairState`] slot in an arena keyed
//! by [`PairKey`]. [`GraphBuilder`] resolves each slot exactly once, from
//! `Unvisited` to either a validated [`PairRecord`] or a [`Rejection`]. The
//! homography, inlier and adjacency matrices are views derived from the arena,
//! so the two directions of a pair can never disagree.

use log::{debug, info};
use nalgebra::{DMatrix, Matrix3};
use petgraph::graph::{NodeIndex, UnGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::estimation::HomographyEstimator;
use crate::features::FeatureCatalog;
use crate::fitter::GeometricFitter;
use crate::matching::{Match, MatchTable};
use crate::models::Homography;
use crate::types::ImageIndex;
use crate::utils::pair_seed;
use crate::validation::HomographyValidator;

/// Why a pair ended up without an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rejection {
    /// The ratio test left too few good matches in both directions.
    InsufficientMatches,
    /// Both directions were removed by top-K pruning.
    Pruned,
    /// Fewer correspondences than a fit needs.
    InsufficientCorrespondences,
    /// The fitter produced no usable model within its budget.
    FitterNonConvergence,
    /// A fitted homography failed the overlap-consistency test.
    ValidationRejected,
}

/// Unordered pair `{i, j}`, `i != j`, stored as `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub lo: ImageIndex,
    pub hi: ImageIndex,
}

impl PairKey {
    /// `None` on the diagonal.
    pub fn new(i: ImageIndex, j: ImageIndex) -> Option<Self> {
        match i.cmp(&j) {
            std::cmp::Ordering::Less => Some(Self { lo: i, hi: j }),
            std::cmp::Ordering::Greater => Some(Self { lo: j, hi: i }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// A validated relation, oriented from `lo` to `hi`.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRecord {
    /// Maps image `lo` into image `hi`.
    pub homography: Homography,
    /// Maps image `hi` into image `lo`; the exact inverse of `homography`.
    pub inverse: Homography,
    pub inlier_count: usize,
    /// Inlier matches with queries in `lo`.
    pub matches: Vec<Match>,
    /// The same matches with queries in `hi`.
    pub reverse_matches: Vec<Match>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PairState {
    #[default]
    Unvisited,
    NoRelation(Rejection),
    Relation(PairRecord),
}

impl PairState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, PairState::Unvisited)
    }

    pub fn record(&self) -> Option<&PairRecord> {
        match self {
            PairState::Relation(record) => Some(record),
            _ => None,
        }
    }
}

/// Pairwise relations of `N` images.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceGraph {
    n: usize,
    pairs: Vec<PairState>,
}

impl CorrespondenceGraph {
    /// All pairs `Unvisited`.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            pairs: vec![PairState::Unvisited; n * n.saturating_sub(1) / 2],
        }
    }

    pub fn image_count(&self) -> usize {
        self.n
    }

    fn slot(&self, key: PairKey) -> Option<usize> {
        if key.hi >= self.n {
            return None;
        }
        // row-major upper triangle without the diagonal
        Some(key.lo * (2 * self.n - key.lo - 1) / 2 + (key.hi - key.lo - 1))
    }

    /// Every pair key, ordered by `(lo, hi)`.
    pub fn keys(&self) -> impl Iterator<Item = PairKey> + '_ {
        (0..self.n).flat_map(move |lo| ((lo + 1)..self.n).map(move |hi| PairKey { lo, hi }))
    }

    /// State of `{i, j}`; `None` on the diagonal or out of range.
    pub fn state(&self, i: ImageIndex, j: ImageIndex) -> Option<&PairState> {
        let slot = self.slot(PairKey::new(i, j)?)?;
        self.pairs.get(slot)
    }

    /// Resolve a pair. The whole record is written in one assignment.
    pub fn set_state(&mut self, key: PairKey, state: PairState) {
        if let Some(slot) = self.slot(key) {
            self.pairs[slot] = state;
        }
    }

    /// `H(i, j)`: identity on the diagonal, `None` without a relation.
    pub fn homography(&self, i: ImageIndex, j: ImageIndex) -> Option<Matrix3<f64>> {
        if i == j {
            return (i < self.n).then(Matrix3::identity);
        }
        let record = self.state(i, j)?.record()?;
        Some(if i < j {
            record.homography.h
        } else {
            record.inverse.h
        })
    }

    /// `InlierCount(i, j)`, symmetric and 0 without a relation.
    pub fn inliers(&self, i: ImageIndex, j: ImageIndex) -> usize {
        self.state(i, j)
            .and_then(PairState::record)
            .map_or(0, |r| r.inlier_count)
    }

    /// Retained `MatchList(i, j)`; `None` unless the pair has a relation.
    pub fn matches(&self, i: ImageIndex, j: ImageIndex) -> Option<&[Match]> {
        let record = self.state(i, j)?.record()?;
        Some(if i < j {
            &record.matches
        } else {
            &record.reverse_matches
        })
    }

    /// `1` iff `MatchList(i, j)` is non-null and non-empty; zero diagonal.
    pub fn adjacency_matrix(&self) -> DMatrix<u8> {
        DMatrix::from_fn(self.n, self.n, |i, j| {
            u8::from(self.matches(i, j).is_some_and(|m| !m.is_empty()))
        })
    }

    pub fn inlier_matrix(&self) -> DMatrix<usize> {
        DMatrix::from_fn(self.n, self.n, |i, j| self.inliers(i, j))
    }

    /// Row-major `N x N` homographies with `None` for unrelated pairs.
    pub fn homography_matrix(&self) -> Vec<Vec<Option<Matrix3<f64>>>> {
        (0..self.n)
            .map(|i| (0..self.n).map(|j| self.homography(i, j)).collect())
            .collect()
    }

    /// Related pairs as `(lo, hi, record)`.
    pub fn edges(&self) -> impl Iterator<Item = (ImageIndex, ImageIndex, &PairRecord)> + '_ {
        self.keys()
            .zip(self.pairs.iter())
            .filter_map(|(key, state)| state.record().map(|r| (key.lo, key.hi, r)))
    }

    pub fn neighbors(&self, i: ImageIndex) -> Vec<ImageIndex> {
        (0..self.n)
            .filter(|&j| self.state(i, j).and_then(PairState::record).is_some())
            .collect()
    }

    /// Undirected graph with image indices as node weights and inlier counts
    /// as edge weights. Node `k` is image `k`.
    pub fn to_petgraph(&self) -> UnGraph<usize, usize> {
        let mut graph = UnGraph::with_capacity(self.n, self.pairs.len());
        for i in 0..self.n {
            graph.add_node(i);
        }
        for (lo, hi, record) in self.edges() {
            graph.add_edge(NodeIndex::new(lo), NodeIndex::new(hi), record.inlier_count);
        }
        graph
    }

    pub fn relation_count(&self) -> usize {
        self.pairs.iter().filter(|s| s.record().is_some()).count()
    }

    pub fn rejection_count(&self, reason: Rejection) -> usize {
        self.pairs
            .iter()
            .filter(|s| **s == PairState::NoRelation(reason))
            .count()
    }
}

/// Runs estimation and validation over every unresolved pair.
pub struct GraphBuilder<F> {
    estimator: HomographyEstimator<F>,
    validator: HomographyValidator,
    seed: u64,
    parallel: bool,
}

impl<F: GeometricFitter> GraphBuilder<F> {
    pub fn new(
        estimator: HomographyEstimator<F>,
        validator: HomographyValidator,
        seed: u64,
        parallel: bool,
    ) -> Self {
        Self {
            estimator,
            validator,
            seed,
            parallel,
        }
    }

    pub fn build(&self, catalog: &FeatureCatalog, table: &MatchTable) -> CorrespondenceGraph {
        let mut graph = CorrespondenceGraph::new(catalog.len());
        self.build_into(&mut graph, catalog, table);
        graph
    }

    /// Resolve every `Unvisited` pair of `graph`; resolved pairs are skipped.
    pub fn build_into(
        &self,
        graph: &mut CorrespondenceGraph,
        catalog: &FeatureCatalog,
        table: &MatchTable,
    ) {
        let pending: Vec<PairKey> = graph
            .keys()
            .filter(|key| graph.state(key.lo, key.hi).is_some_and(|s| !s.is_resolved()))
            .collect();
        info!("Computing homographies for {} image pairs", pending.len());

        let resolved: Vec<(PairKey, PairState)> = if self.parallel {
            pending
                .par_iter()
                .map(|&key| (key, self.resolve(catalog, table, key)))
                .collect()
        } else {
            pending
                .iter()
                .map(|&key| (key, self.resolve(catalog, table, key)))
                .collect()
        };

        for (key, state) in resolved {
            graph.set_state(key, state);
        }
    }

    /// Outcome of one pair; reads only that pair's inputs.
    pub fn resolve(&self, catalog: &FeatureCatalog, table: &MatchTable, key: PairKey) -> PairState {
        let PairKey { lo, hi } = key;
        let forward = table.count(lo, hi);
        let backward = table.count(hi, lo);

        if forward == 0 && backward == 0 {
            let both_pruned = table.get(lo, hi).is_none() && table.get(hi, lo).is_none();
            let reason = if both_pruned {
                Rejection::Pruned
            } else {
                Rejection::InsufficientMatches
            };
            return PairState::NoRelation(reason);
        }

        let (from, to) = if forward >= backward { (lo, hi) } else { (hi, lo) };
        let (Some(matches), Some(from_features), Some(to_features)) =
            (table.get(from, to), catalog.get(from), catalog.get(to))
        else {
            return PairState::NoRelation(Rejection::InsufficientCorrespondences);
        };

        let estimate = match self.estimator.estimate(
            from_features,
            to_features,
            matches,
            pair_seed(self.seed, lo, hi),
        ) {
            Ok(estimate) => estimate,
            Err(reason) => {
                debug!("Pair ({from}, {to}) rejected: {reason:?}");
                return PairState::NoRelation(reason);
            }
        };

        let report = self.validator.evaluate(
            &estimate.homography,
            from_features.size,
            to_features.size,
            &estimate.correspondences.src,
            &estimate.inlier_mask,
        );
        if !report.accepted {
            debug!(
                "Pair ({from}, {to}) failed validation: {} inliers <= {:.2} ({} overlapping)",
                report.area, report.threshold, report.overlapping_matches
            );
            return PairState::NoRelation(Rejection::ValidationRejected);
        }

        let Some(inverse) = estimate.homography.inverse() else {
            return PairState::NoRelation(Rejection::FitterNonConvergence);
        };

        let inliers = estimate.inlier_matches(matches);
        let reversed: Vec<Match> = inliers.iter().map(Match::reversed).collect();
        debug!("Pair ({from}, {to}) accepted with {} inliers", inliers.len());

        let record = if from == lo {
            PairRecord {
                homography: estimate.homography,
                inverse,
                inlier_count: inliers.len(),
                matches: inliers,
                reverse_matches: reversed,
            }
        } else {
            PairRecord {
                homography: inverse,
                inverse: estimate.homography,
                inlier_count: inliers.len(),
                matches: reversed,
                reverse_matches: inliers,
            }
        };
        PairState::Relation(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ImageFeatures, ImageSize};
    use crate::fitter::FitResult;
    use crate::types::{Descriptors, Keypoint};
    use nalgebra::Point2;

    /// Returns `H` for every pair and rejects the first correspondence.
    struct FixedFitter(Matrix3<f64>);

    impl GeometricFitter for FixedFitter {
        fn fit(&self, src: &[Keypoint], _dst: &[Keypoint], _tol: f64, _seed: u64) -> FitResult {
            FitResult {
                homography: Some(Homography::new(self.0)),
                inlier_mask: (0..src.len()).map(|k| k != 0).collect(),
                iterations: 1,
            }
        }
    }

    fn shift() -> Matrix3<f64> {
        Matrix3::new(1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0)
    }

    fn catalog(n: usize) -> FeatureCatalog {
        let points: Vec<Keypoint> = (0..10).map(|k| Point2::new(k as f64, k as f64)).collect();
        let image = || {
            ImageFeatures::new(ImageSize::new(50, 50), points.clone(), Descriptors::zeros(10, 4))
        };
        FeatureCatalog::new((0..n).map(|_| image()).collect())
    }

    fn builder_with(h: Matrix3<f64>) -> GraphBuilder<FixedFitter> {
        GraphBuilder::new(
            HomographyEstimator::new(FixedFitter(h), 1.0, 4),
            HomographyValidator::default(),
            0,
            false,
        )
    }

    fn builder() -> GraphBuilder<FixedFitter> {
        builder_with(shift())
    }

    fn list(len: usize) -> Vec<Match> {
        (0..len).map(|k| Match::new(k, k, k as f32)).collect()
    }

    #[test]
    fn pair_keys_are_ordered_and_slots_dense() {
        assert_eq!(PairKey::new(3, 1), Some(PairKey { lo: 1, hi: 3 }));
        assert_eq!(PairKey::new(2, 2), None);

        let graph = CorrespondenceGraph::new(5);
        let slots: Vec<usize> = graph.keys().filter_map(|k| graph.slot(k)).collect();
        assert_eq!(slots, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn accepted_pair_is_written_in_both_directions() {
        let cat = catalog(2);
        let mut table = MatchTable::new(2);
        table.set(1, 0, Some(list(8)));
        table.set(0, 1, Some(list(5)));

        let graph = builder().build(&cat, &table);
        let h10 = graph.homography(1, 0).unwrap();
        let h01 = graph.homography(0, 1).unwrap();
        assert!(((h01 * h10) - Matrix3::identity()).abs().max() < 1e-12);
        assert!((h10[(0, 2)] - 2.0).abs() < 1e-12);

        assert_eq!(graph.inliers(0, 1), 7);
        assert_eq!(graph.inliers(1, 0), 7);
        assert_eq!(graph.matches(1, 0).map(<[Match]>::len), Some(7));
        assert_eq!(
            graph.matches(0, 1).unwrap()[0],
            graph.matches(1, 0).unwrap()[0].reversed()
        );
        assert_eq!(
            graph.adjacency_matrix(),
            DMatrix::from_row_slice(2, 2, &[0, 1, 1, 0])
        );
        assert_eq!(graph.neighbors(0), vec![1]);
    }

    #[test]
    fn projective_pair_directions_are_exact_inverses() {
        let h = Matrix3::new(
            1.0, 0.02, 3.0, //
            -0.01, 1.0, 2.0, //
            2e-3, 1e-3, 1.0,
        );
        let cat = catalog(2);
        for (from, to) in [(0, 1), (1, 0)] {
            let mut table = MatchTable::new(2);
            table.set(from, to, Some(list(10)));
            let graph = builder_with(h).build(&cat, &table);

            assert_eq!(graph.homography(from, to), Some(h));
            let forward = graph.homography(0, 1).unwrap();
            let backward = graph.homography(1, 0).unwrap();
            assert!((forward * backward - Matrix3::identity()).abs().max() < 1e-12);
            assert!((backward * forward - Matrix3::identity()).abs().max() < 1e-12);
        }
    }

    #[test]
    fn unmatched_and_pruned_pairs_get_reasons() {
        let cat = catalog(3);
        let mut table = MatchTable::new(3);
        table.set(0, 1, Some(Vec::new()));
        table.set(1, 0, None);

        let graph = builder().build(&cat, &table);
        assert_eq!(
            graph.state(0, 1),
            Some(&PairState::NoRelation(Rejection::InsufficientMatches))
        );
        assert_eq!(graph.state(2, 0), Some(&PairState::NoRelation(Rejection::Pruned)));
        assert_eq!(graph.homography(0, 1), None);
        assert_eq!(graph.homography(2, 2), Some(Matrix3::identity()));
        assert_eq!(graph.inlier_matrix(), DMatrix::zeros(3, 3));
    }

    #[test]
    fn resolved_pairs_are_skipped() {
        let cat = catalog(2);
        let mut table = MatchTable::new(2);
        table.set(0, 1, Some(list(8)));

        let mut graph = CorrespondenceGraph::new(2);
        let key = PairKey::new(0, 1).unwrap();
        graph.set_state(key, PairState::NoRelation(Rejection::ValidationRejected));
        builder().build_into(&mut graph, &cat, &table);
        assert_eq!(graph.rejection_count(Rejection::ValidationRejected), 1);
        assert_eq!(graph.relation_count(), 0);
    }

    #[test]
    fn petgraph_export_carries_inlier_weights() {
        let cat = catalog(3);
        let mut table = MatchTable::new(3);
        table.set(0, 2, Some(list(6)));
        let graph = builder().build(&cat, &table);
        let pg = graph.to_petgraph();
        assert_eq!(pg.node_count(), 3);
        assert_eq!(pg.edge_count(), 1);
        let edge = pg.find_edge(NodeIndex::new(2), NodeIndex::new(0)).unwrap();
        assert_eq!(pg[edge], 5);
    }
}
