//! End-to-end construction of the correspondence graph.
//!
//! Stages run strictly in order: matching over every ordered pair, per-image
//! pruning, then estimation and validation over every unordered pair. Input
//! is checked up front; after that no stage can fail.

use log::info;

use crate::error::PipelineError;
use crate::estimation::HomographyEstimator;
use crate::features::{FeatureCatalog, FeatureExtractor};
use crate::fitter::{GeometricFitter, RansacHomographyFitter};
use crate::graph::{CorrespondenceGraph, GraphBuilder, Rejection};
use crate::matching::{MatchTable, PairMatcher};
use crate::pruning::MatchPruner;
use crate::settings::GraphSettings;
use crate::validation::HomographyValidator;

/// Configured correspondence-graph pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    settings: GraphSettings,
}

impl Pipeline {
    pub fn new(settings: GraphSettings) -> Result<Self, PipelineError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Extract features with `extractor`, then [`run`](Self::run).
    pub fn run_on_images<E>(
        &self,
        images: &[E::Image],
        extractor: &E,
    ) -> Result<CorrespondenceGraph, PipelineError>
    where
        E: FeatureExtractor + Sync,
        E::Image: Sync,
    {
        let catalog = FeatureCatalog::from_images(images, extractor)?;
        catalog.validate(images.len())?;
        self.run(&catalog)
    }

    /// Build the graph with the stock RANSAC fitter.
    pub fn run(&self, catalog: &FeatureCatalog) -> Result<CorrespondenceGraph, PipelineError> {
        let fitter = RansacHomographyFitter::new(self.settings.ransac_settings());
        self.run_with_fitter(catalog, fitter)
    }

    pub fn run_with_fitter<F: GeometricFitter>(
        &self,
        catalog: &FeatureCatalog,
        fitter: F,
    ) -> Result<CorrespondenceGraph, PipelineError> {
        catalog.validate(catalog.len())?;

        let mut table = self.match_features(catalog);
        self.prune(&mut table);
        let graph = self.build_graph(catalog, &table, fitter);

        info!(
            "Adjacency: {} of {} pairs related ({} pruned, {} weak, {} unfit, {} invalid)",
            graph.relation_count(),
            graph.image_count() * graph.image_count().saturating_sub(1) / 2,
            graph.rejection_count(Rejection::Pruned),
            graph.rejection_count(Rejection::InsufficientMatches),
            graph.rejection_count(Rejection::InsufficientCorrespondences)
                + graph.rejection_count(Rejection::FitterNonConvergence),
            graph.rejection_count(Rejection::ValidationRejected),
        );
        Ok(graph)
    }

    /// Good matches for every ordered pair.
    pub fn match_features(&self, catalog: &FeatureCatalog) -> MatchTable {
        PairMatcher::from_settings(&self.settings).match_catalog(catalog, self.settings.parallel)
    }

    /// Top-K pruning of every image's candidate neighbours.
    pub fn prune(&self, table: &mut MatchTable) {
        info!(
            "Pruning to at most {} neighbours per image",
            self.settings.maximum_matches
        );
        let nulled = MatchPruner::new(self.settings.maximum_matches).prune(table);
        info!("Pruned {nulled} match lists");
    }

    pub fn build_graph<F: GeometricFitter>(
        &self,
        catalog: &FeatureCatalog,
        table: &MatchTable,
        fitter: F,
    ) -> CorrespondenceGraph {
        let s = &self.settings;
        let builder = GraphBuilder::new(
            HomographyEstimator::new(fitter, s.reprojection_tolerance, s.feature_correspondences),
            HomographyValidator::new(s.alpha, s.beta),
            s.seed,
            s.parallel,
        );
        builder.build(catalog, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ImageFeatures, ImageSize};
    use crate::types::Descriptors;
    use nalgebra::{DMatrix, Point2};

    #[test]
    fn invalid_settings_are_rejected_at_construction() {
        let settings = GraphSettings {
            maximum_matches: 0,
            ..GraphSettings::default()
        };
        assert!(matches!(
            Pipeline::new(settings),
            Err(PipelineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn catalogs_without_pairs_give_trivial_graphs() {
        let pipeline = Pipeline::new(GraphSettings::default()).unwrap();

        let empty = pipeline.run(&FeatureCatalog::default()).unwrap();
        assert_eq!(empty.image_count(), 0);
        assert_eq!(empty.adjacency_matrix().shape(), (0, 0));

        let single = FeatureCatalog::new(vec![ImageFeatures::new(
            ImageSize::new(64, 48),
            vec![Point2::new(3.0, 4.0)],
            Descriptors::from_element(1, 8, 0.5),
        )]);
        let graph = pipeline.run(&single).unwrap();
        assert_eq!(graph.image_count(), 1);
        assert_eq!(graph.adjacency_matrix(), DMatrix::<u8>::zeros(1, 1));
        assert_eq!(graph.inlier_matrix()[(0, 0)], 0);
        assert_eq!(graph.relation_count(), 0);
    }
}
