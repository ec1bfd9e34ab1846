//! Per-image keypoints and descriptors.
//!
//! Detection itself is delegated to a [`FeatureExtractor`]; this module owns
//! the resulting [`FeatureCatalog`] and the input checks that make a catalog
//! safe to feed into the pairwise stages.

use std::fmt::Display;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{Descriptors, ImageIndex, Keypoint};

/// Raster footprint of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// True if `(x, y)` lies on a pixel of the image, `[0, w) x [0, h)`.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Keypoints and descriptors of one image. Descriptor row `k` describes
/// keypoint `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFeatures {
    pub size: ImageSize,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl ImageFeatures {
    pub fn new(size: ImageSize, keypoints: Vec<Keypoint>, descriptors: Descriptors) -> Self {
        Self {
            size,
            keypoints,
            descriptors,
        }
    }

    pub fn descriptor_len(&self) -> usize {
        self.descriptors.ncols()
    }
}

/// Keypoint detector and descriptor backend.
///
/// Must be deterministic for a given image and configuration.
pub trait FeatureExtractor {
    type Image;
    type Error: Display;

    fn extract(&self, image: &Self::Image) -> Result<ImageFeatures, Self::Error>;
}

/// Features of every image in a collection, indexed `0..N`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCatalog {
    images: Vec<ImageFeatures>,
}

impl FeatureCatalog {
    /// Wrap precomputed features. Run [`validate`](Self::validate) before use.
    pub fn new(images: Vec<ImageFeatures>) -> Self {
        Self { images }
    }

    /// Assemble a catalog from parallel per-image lists.
    pub fn from_parts(
        sizes: Vec<ImageSize>,
        keypoints: Vec<Vec<Keypoint>>,
        descriptors: Vec<Descriptors>,
    ) -> Result<Self, PipelineError> {
        let images = sizes.len();
        for features in [keypoints.len(), descriptors.len()] {
            if features != images {
                return Err(PipelineError::ImageCountMismatch { images, features });
            }
        }
        let images = sizes
            .into_iter()
            .zip(keypoints)
            .zip(descriptors)
            .map(|((size, kps), desc)| ImageFeatures::new(size, kps, desc))
            .collect();
        Ok(Self { images })
    }

    /// Run `extractor` over every image.
    pub fn from_images<E>(images: &[E::Image], extractor: &E) -> Result<Self, PipelineError>
    where
        E: FeatureExtractor + Sync,
        E::Image: Sync,
    {
        info!("Computing features for {} images", images.len());
        let images = images
            .par_iter()
            .enumerate()
            .map(|(image, raster)| {
                extractor
                    .extract(raster)
                    .map_err(|e| PipelineError::Extraction {
                        image,
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { images })
    }

    /// Fatal input checks: image count, non-empty footprints and keypoint
    /// lists, and aligned descriptors of one common length. Catalogs with
    /// fewer than two images are well formed; they just have no pairs.
    pub fn validate(&self, expected_images: usize) -> Result<(), PipelineError> {
        if self.images.len() != expected_images {
            return Err(PipelineError::ImageCountMismatch {
                images: expected_images,
                features: self.images.len(),
            });
        }
        let Some(expected_len) = self.images.first().map(ImageFeatures::descriptor_len) else {
            return Ok(());
        };
        for (image, features) in self.images.iter().enumerate() {
            if features.size.is_empty() {
                return Err(PipelineError::EmptyImage {
                    image,
                    width: features.size.width,
                    height: features.size.height,
                });
            }
            if features.keypoints.is_empty() {
                return Err(PipelineError::NoKeypoints { image });
            }
            if features.descriptors.nrows() != features.keypoints.len() {
                return Err(PipelineError::DescriptorCountMismatch {
                    image,
                    keypoints: features.keypoints.len(),
                    descriptors: features.descriptors.nrows(),
                });
            }
            if features.descriptor_len() != expected_len {
                return Err(PipelineError::DescriptorLengthMismatch {
                    image,
                    expected: expected_len,
                    found: features.descriptor_len(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, image: ImageIndex) -> Option<&ImageFeatures> {
        self.images.get(image)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageFeatures> {
        self.images.iter()
    }
}
