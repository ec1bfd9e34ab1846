//! PROSAC sampler: progressively grows the subset of high-priority points.
//!
//! Rows of the data matrix are expected best-first (ascending descriptor
//! distance); early samples come from the head of the list and the subset
//! widens until sampling degenerates into uniform RANSAC.

use crate::core::Sampler;
use crate::types::DataMatrix;
use crate::utils::UniformRandomGenerator;

/// Draws after which sampling falls back to uniform over all rows.
const DEFAULT_CONVERGENCE_ITERATIONS: usize = 100_000;

pub struct ProsacSampler {
    rng: UniformRandomGenerator<usize>,
    growth_function: Vec<usize>,
    sample_size: Option<usize>,
    point_number: usize,
    ransac_convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl ProsacSampler {
    pub fn from_seed(seed: u64) -> Self {
        Self::with_convergence_iterations(seed, DEFAULT_CONVERGENCE_ITERATIONS)
    }

    pub fn with_convergence_iterations(seed: u64, ransac_convergence_iterations: usize) -> Self {
        Self {
            rng: UniformRandomGenerator::from_seed(seed),
            growth_function: Vec::new(),
            sample_size: None,
            point_number: 0,
            ransac_convergence_iterations,
            kth_sample_number: 1,
            subset_size: 0,
        }
    }

    /// Precompute the growth function `T'_n` for `point_number` rows.
    fn initialize(&mut self, point_number: usize, sample_size: usize) {
        self.point_number = point_number;
        self.sample_size = Some(sample_size);
        self.kth_sample_number = 1;
        self.growth_function.clear();
        self.growth_function.resize(point_number, 0);

        let mut t_n = self.ransac_convergence_iterations as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (point_number - i) as f64;
        }

        let mut t_n_prime: usize = 1;
        for i in 0..point_number {
            if i < sample_size {
                self.growth_function[i] = t_n_prime;
                continue;
            }
            let t_n_plus1 = (i + 1) as f64 * t_n / (i + 1 - sample_size) as f64;
            self.growth_function[i] = t_n_prime + ((t_n_plus1 - t_n).ceil() as usize);
            t_n = t_n_plus1;
            t_n_prime = self.growth_function[i];
        }

        self.subset_size = sample_size;
    }

    fn increment_iteration_number(&mut self) {
        self.kth_sample_number += 1;
        if self.kth_sample_number > self.ransac_convergence_iterations {
            return;
        }
        if self.subset_size < self.point_number
            && self.kth_sample_number > self.growth_function[self.subset_size - 1]
        {
            self.subset_size += 1;
        }
    }

    /// Current size of the prioritised subset.
    pub fn subset_size(&self) -> usize {
        self.subset_size
    }
}

impl Sampler for ProsacSampler {
    fn sample(&mut self, data: &DataMatrix, sample_size: usize, out_indices: &mut [usize]) -> bool {
        let n = data.nrows();
        if sample_size == 0 || n == 0 || sample_size > n || out_indices.len() < sample_size {
            return false;
        }

        if self.sample_size != Some(sample_size) || self.point_number != n {
            self.initialize(n, sample_size);
        }

        if self.kth_sample_number > self.ransac_convergence_iterations {
            self.rng
                .gen_unique(&mut out_indices[..sample_size], 0, n - 1);
        } else if sample_size == 1 {
            self.rng
                .gen_unique(&mut out_indices[..1], 0, self.subset_size - 1);
        } else {
            // The newest point of the subset is always part of the sample.
            let last = self.subset_size - 1;
            self.rng
                .gen_unique(&mut out_indices[..sample_size - 1], 0, last - 1);
            out_indices[sample_size - 1] = last;
        }

        self.increment_iteration_number();
        true
    }

    fn update(
        &mut self,
        _sample: &[usize],
        _sample_size: usize,
        _iteration: usize,
        _score_hint: f64,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_samples_come_from_the_head() {
        let data = DataMatrix::zeros(200, 4);
        let mut sampler = ProsacSampler::from_seed(3);
        let mut sample = [0usize; 4];
        assert!(sampler.sample(&data, 4, &mut sample));
        let mut sorted = sample;
        sorted.sort_unstable();
        assert_eq!(sorted, [0, 1, 2, 3]);
    }

    #[test]
    fn subset_grows_and_stays_bounded() {
        let data = DataMatrix::zeros(30, 4);
        let mut sampler = ProsacSampler::with_convergence_iterations(5, 200);
        let mut sample = [0usize; 4];
        for _ in 0..500 {
            assert!(sampler.sample(&data, 4, &mut sample));
            assert!(sample.iter().all(|&i| i < 30));
            for a in 0..4 {
                for b in (a + 1)..4 {
                    assert_ne!(sample[a], sample[b]);
                }
            }
        }
        assert!(sampler.subset_size() > 4);
        assert!(sampler.subset_size() <= 30);
    }
}
