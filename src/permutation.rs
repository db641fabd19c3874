// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The random permutation oracle.

use rand::{seq::SliceRandom, CryptoRng, Rng};

use crate::OrpError;

/// A bijection over `{0, .., n-1}` held with its inverse for constant-time
/// lookups in both directions.
#[derive(Clone, Debug)]
pub struct Permutation {
    forward: Vec<u32>,
    inverse: Vec<u32>,
}

impl Permutation {
    /// Returns a uniformly random permutation of `0..size`.
    pub fn random<R: Rng + CryptoRng>(size: u32, rng: &mut R) -> Self {
        let mut forward: Vec<u32> = (0..size).collect();
        forward.shuffle(rng);
        let inverse = Self::invert(&forward);
        Self { forward, inverse }
    }

    /// Builds a prescribed permutation from its forward mapping.
    ///
    /// Returns [`OrpError::InvalidPermutationError`] unless `forward` is a
    /// bijection over `0..forward.len()`.
    pub fn from_forward(forward: Vec<u32>) -> Result<Self, OrpError> {
        let size = forward.len() as u32;
        let mut inverse = vec![u32::MAX; forward.len()];
        for (index, &target) in forward.iter().enumerate() {
            if target >= size || inverse[target as usize] != u32::MAX {
                return Err(OrpError::InvalidPermutationError);
            }
            inverse[target as usize] = index as u32;
        }
        Ok(Self { forward, inverse })
    }

    fn invert(forward: &[u32]) -> Vec<u32> {
        let mut inverse = vec![0u32; forward.len()];
        for (index, &target) in forward.iter().enumerate() {
            inverse[target as usize] = index as u32;
        }
        inverse
    }

    /// Returns `π(key)`. `key` must be below [`Permutation::size`].
    pub fn eval(&self, key: u32) -> u32 {
        self.forward[key as usize]
    }

    /// Returns `π⁻¹(index)`. `index` must be below [`Permutation::size`].
    pub fn eval_inv(&self, index: u32) -> u32 {
        self.inverse[index as usize]
    }

    /// Returns the size `n` of the permuted domain.
    pub fn size(&self) -> u32 {
        self.forward.len() as u32
    }

    /// Replaces the held bijection with a fresh uniformly random one.
    pub fn reseed<R: Rng + CryptoRng>(&mut self, rng: &mut R) {
        self.forward.shuffle(rng);
        self.inverse = Self::invert(&self.forward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn inverse_round_trip() {
        let mut rng = StdRng::seed_from_u64(0);
        let pi = Permutation::random(64, &mut rng);
        for k in 0..64 {
            assert_eq!(pi.eval_inv(pi.eval(k)), k);
            assert_eq!(pi.eval(pi.eval_inv(k)), k);
        }
    }

    #[test]
    fn from_forward_accepts_bijections() {
        let pi = Permutation::from_forward(vec![2, 0, 1, 3]).unwrap();
        assert_eq!(pi.eval(0), 2);
        assert_eq!(pi.eval_inv(2), 0);
        assert_eq!(pi.size(), 4);
    }

    #[test]
    fn from_forward_rejects_out_of_range_and_repeats() {
        assert!(matches!(
            Permutation::from_forward(vec![0, 4, 1, 2]),
            Err(OrpError::InvalidPermutationError)
        ));
        assert!(matches!(
            Permutation::from_forward(vec![0, 1, 1, 2]),
            Err(OrpError::InvalidPermutationError)
        ));
    }

    #[test]
    fn reseed_yields_a_fresh_bijection() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pi = Permutation::random(128, &mut rng);
        let before: Vec<u32> = (0..128).map(|k| pi.eval(k)).collect();
        pi.reseed(&mut rng);
        for k in 0..128 {
            assert_eq!(pi.eval_inv(pi.eval(k)), k);
        }
        let after: Vec<u32> = (0..128).map(|k| pi.eval(k)).collect();
        assert_ne!(before, after);
    }
}
