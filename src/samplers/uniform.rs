//! Uniform random sampler drawing minimal samples without replacement.

use crate::core::Sampler;
use crate::types::DataMatrix;
use crate::utils::UniformRandomGenerator;

/// Uniform random sampler drawing minimal samples without replacement.
pub struct UniformRandomSampler {
    rng: UniformRandomGenerator<usize>,
}

impl UniformRandomSampler {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: UniformRandomGenerator::from_seed(seed),
        }
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(&mut self, data: &DataMatrix, sample_size: usize, out_indices: &mut [usize]) -> bool {
        let n = data.nrows();
        if sample_size == 0 || n == 0 || sample_size > n || out_indices.len() < sample_size {
            return false;
        }

        self.rng
            .gen_unique(&mut out_indices[..sample_size], 0, n - 1);
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
    fn samples_are_unique_and_in_range() {
        let data = DataMatrix::zeros(12, 4);
        let mut sampler = UniformRandomSampler::from_seed(9);
        let mut sample = [0usize; 4];
        for _ in 0..50 {
            assert!(sampler.sample(&data, 4, &mut sample));
            assert!(sample.iter().all(|&i| i < 12));
            for a in 0..4 {
                for b in (a + 1)..4 {
                    assert_ne!(sample[a], sample[b]);
                }
            }
        }
    }

    #[test]
    fn refuses_oversized_samples() {
        let data = DataMatrix::zeros(3, 4);
        let mut sampler = UniformRandomSampler::from_seed(0);
        let mut sample = [0usize; 4];
        assert!(!sampler.sample(&data, 4, &mut sample));
    }

    #[test]
    fn same_seed_same_samples() {
        let data = DataMatrix::zeros(40, 4);
        let mut a = UniformRandomSampler::from_seed(77);
        let mut b = UniformRandomSampler::from_seed(77);
        let (mut sa, mut sb) = ([0usize; 4], [0usize; 4]);
        for _ in 0..10 {
            a.sample(&data, 4, &mut sa);
            b.sample(&data, 4, &mut sb);
            assert_eq!(sa, sb);
        }
    }
}
