//! Miscellaneous numeric and random-number utilities.

use rand::distributions::uniform::SampleUniform;
use rand::distributions::Uniform;
use rand::prelude::*;

/// Seeded uniform integer generator used by the samplers.
///
/// Always constructed from an explicit seed so fits are reproducible.
pub struct UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    rng: StdRng,
    dist: Option<Uniform<T>>,
}

impl<T> UniformRandomGenerator<T>
where
    T: Copy + SampleUniform + PartialOrd,
{
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            dist: None,
        }
    }

    /// Reset the distribution range to `[min, max]`.
    pub fn reset(&mut self, min: T, max: T) {
        self.dist = Some(Uniform::new_inclusive(min, max));
    }

    /// Draw a single value from the current range, or `None` before the first
    /// [`reset`](Self::reset).
    pub fn next(&mut self) -> Option<T> {
        let dist = self.dist.as_ref()?;
        Some(self.rng.sample(dist))
    }

    /// Fill `out` with unique values from `[min, max]`.
    ///
    /// The range must hold at least `out.len()` values.
    pub fn gen_unique(&mut self, out: &mut [T], min: T, max: T)
    where
        T: Eq,
    {
        self.reset(min, max);
        self.gen_unique_current(out);
    }

    /// Fill `out` with unique values from the current range.
    pub fn gen_unique_current(&mut self, out: &mut [T])
    where
        T: Eq,
    {
        let Some(dist) = self.dist.as_ref() else {
            return;
        };
        for i in 0..out.len() {
            loop {
                let candidate = self.rng.sample(dist);
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

/// Seed for the fit of pair `(i, j)` derived from a base seed.
///
/// Symmetric in `i` and `j` and independent of processing order.
pub fn pair_seed(base: u64, i: usize, j: usize) -> u64 {
    let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
    // splitmix64 finaliser over the packed pair
    let mut z = base
        ^ (lo as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (hi as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Gaussian elimination with partial pivoting to solve A * x = b.
/// The matrix `augmented` should be [A | b] where A is n x n and b is n x 1.
/// The result is stored in `result`; returns `false` for singular systems.
pub fn gauss_elimination(
    augmented: &mut nalgebra::DMatrix<f64>,
    result: &mut nalgebra::DVector<f64>,
) -> bool {
    let n = augmented.nrows();
    if n + 1 != augmented.ncols() || n != result.len() {
        return false;
    }

    for i in 0..n {
        let mut max_row = i;
        let mut max_val = augmented[(i, i)].abs();

        for k in (i + 1)..n {
            let val = augmented[(k, i)].abs();
            if val > max_val {
                max_val = val;
                max_row = k;
            }
        }

        if max_row != i {
            augmented.swap_rows(i, max_row);
        }

        if augmented[(i, i)].abs() < 1e-10 {
            return false;
        }

        for k in (i + 1)..n {
            let factor = augmented[(k, i)] / augmented[(i, i)];
            for j in i..augmented.ncols() {
                augmented[(k, j)] -= factor * augmented[(i, j)];
            }
        }
    }

    for i in (0..n).rev() {
        result[i] = augmented[(i, n)];
        for j in (i + 1)..n {
            result[i] -= augmented[(i, j)] * result[j];
        }
        result[i] /= augmented[(i, i)];
    }

    true
}
