//! Minimal-sample strategies for the homography fitter.
//!
//! Both samplers are seeded explicitly so that a pair's fit depends only on
//! its own correspondences and seed.

pub mod prosac;
pub mod uniform;

pub use prosac::ProsacSampler;
pub use uniform::UniformRandomSampler;
