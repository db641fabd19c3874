// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The bitonic-network oblivious permutation.

use rand::{CryptoRng, Rng};

use crate::{
    permutation::Permutation, server::ArrayServer, ArrayName, BlockSize, Orp, OrpError,
};

/// Comparator-network ORP operating in place on the input array.
///
/// Every comparator of the standard bitonic network retrieves its two
/// elements, orders them by `π(key)`, and writes both back, so the access
/// trace is a fixed function of `n` alone. π is itself the uniformly random
/// linear order the network sorts on, which places the element with key `k`
/// exactly at index `π(k)`. Requires `n` to be a power of two; callers must
/// pad otherwise. I/O is `O(n log² n)`.
#[derive(Debug)]
pub struct Bitonic {
    size: u32,
    pi: Permutation,
}

impl Bitonic {
    /// Creates an instance over a fresh uniformly random permutation of
    /// `0..size`.
    pub fn new<R: Rng + CryptoRng>(size: u32, rng: &mut R) -> Result<Self, OrpError> {
        Self::with_permutation(Permutation::random(size, rng))
    }

    /// Creates an instance realizing the prescribed permutation.
    pub fn with_permutation(pi: Permutation) -> Result<Self, OrpError> {
        let size = pi.size();
        if !size.is_power_of_two() || size <= 1 {
            return Err(OrpError::InvalidConfigurationError(
                "the bitonic network requires a power-of-two array length",
            ));
        }
        Ok(Self { size, pi })
    }
}

impl Orp for Bitonic {
    fn permute<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &mut self,
        server: &mut S,
        input: ArrayName,
        _rng: &mut R,
    ) -> Result<ArrayName, OrpError> {
        log::debug!("Bitonic::permute -- n = {}", self.size);

        let mut i = 2;
        while i <= self.size {
            let mut j = i / 2;
            while j > 0 {
                for k in 0..self.size {
                    let l = k ^ j;
                    if l > k {
                        let ek = server.get(input, k)?;
                        let el = server.get(input, l)?;
                        let rank_k = self.pi.eval(ek.key);
                        let rank_l = self.pi.eval(el.key);
                        // route according to the order of the ranks and the
                        // direction bit of the comparator
                        let ascending = (i & k) == 0;
                        if (ascending && rank_k > rank_l) || (!ascending && rank_k < rank_l) {
                            server.put(input, k, el)?;
                            server.put(input, l, ek)?;
                        } else {
                            server.put(input, k, ek)?;
                            server.put(input, l, el)?;
                        }
                    }
                }
                j /= 2;
            }
            i *= 2;
        }
        Ok(input)
    }

    fn permutation(&self) -> &Permutation {
        &self.pi
    }
}
