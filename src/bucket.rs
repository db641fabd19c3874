// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The bucket oblivious permutation.

use rand::{seq::SliceRandom, CryptoRng, Rng};

use crate::{
    element::Element, hash::murmur3_32, permutation::Permutation, server::ArrayServer, ArrayName,
    BlockSize, Orp, OrpError,
};

/// Butterfly-network ORP over buckets of capacity `Z`.
///
/// Elements are assigned pseudorandom tags and routed through a butterfly of
/// `log₂ B` levels, where `B` is the smallest power of two at least
/// `⌈2n/Z⌉`; each output bucket is padded to exactly `Z` slots with dummies
/// so bucket loads stay hidden. After the last level the dummies are
/// discarded, every bucket is shuffled client-side, and a final
/// non-oblivious pass scatters each element to `π(key)` — which leaks
/// nothing beyond π itself since the butterfly already randomized the
/// incoming order. I/O is `O(n log n)`.
///
/// `Z` trades I/O against the probability of a routing overflow; values of
/// 256 and above make overflow negligible at practical sizes. Overflow is
/// reported as [`OrpError::BucketOverflowError`] so callers can retry with a
/// larger `Z`.
#[derive(Debug)]
pub struct Bucket {
    size: u32,
    capacity: u32,
    num_buckets: u32,
    seed: u32,
    pi: Permutation,
}

impl Bucket {
    /// Creates an instance over a fresh uniformly random permutation of
    /// `0..size`, with bucket capacity `capacity` (the parameter `Z`).
    pub fn new<R: Rng + CryptoRng>(
        size: u32,
        capacity: u32,
        rng: &mut R,
    ) -> Result<Self, OrpError> {
        let pi = Permutation::random(size, rng);
        Self::with_permutation(pi, capacity, rng)
    }

    /// Creates an instance realizing the prescribed permutation.
    pub fn with_permutation<R: Rng + CryptoRng>(
        pi: Permutation,
        capacity: u32,
        rng: &mut R,
    ) -> Result<Self, OrpError> {
        let size = pi.size();
        if capacity < 2 || capacity % 2 != 0 {
            return Err(OrpError::InvalidConfigurationError(
                "bucket capacity must be even and at least two",
            ));
        }
        if 2 * size <= capacity {
            return Err(OrpError::InvalidConfigurationError(
                "bucket capacity must be below twice the array length",
            ));
        }
        let num_buckets = (2 * size).div_ceil(capacity).next_power_of_two();
        Ok(Self {
            size,
            capacity,
            num_buckets,
            seed: rng.gen(),
            pi,
        })
    }

    /// Routes the elements of `arr` through the butterfly network.
    ///
    /// Consumes `arr` and each intermediate level's array, returning the name
    /// of the shuffled, dummy-free result.
    fn butterfly<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &self,
        server: &mut S,
        mut arr: ArrayName,
        rng: &mut R,
    ) -> Result<ArrayName, OrpError> {
        let levels = self.num_buckets.ilog2();
        let mut count = 0;
        for level in 0..levels {
            server.create_array(arr + 1, self.num_buckets * self.capacity)?;
            match self.butterfly_level(server, arr, level, levels, count, rng) {
                Ok(new_count) => count = new_count,
                Err(error) => {
                    let _ = server.delete_array(arr + 1);
                    let _ = server.delete_array(arr);
                    return Err(error);
                }
            }
            server.delete_array(arr)?;
            arr += 1;
        }
        Ok(arr)
    }

    fn butterfly_level<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &self,
        server: &mut S,
        arr: ArrayName,
        level: u32,
        levels: u32,
        mut count: u32,
        rng: &mut R,
    ) -> Result<u32, OrpError> {
        let mut in_left = Vec::new();
        let mut in_right = Vec::new();
        let mut out_left = Vec::new();
        let mut out_right = Vec::new();

        for j in 0..self.num_buckets / 2 {
            // the input array carries no dummies, so the first level reads
            // half-width buckets
            let width = if level == 0 {
                self.capacity / 2
            } else {
                self.capacity
            };
            let jprime = j / (1 << level) * (1 << level);
            self.get_bucket(server, arr, width, (j + jprime) * width, &mut in_left)?;
            self.get_bucket(
                server,
                arr,
                width,
                (j + jprime + (1 << level)) * width,
                &mut in_right,
            )?;

            self.split_bucket(&mut in_left, &mut out_left, &mut out_right, level);
            self.split_bucket(&mut in_right, &mut out_left, &mut out_right, level);

            if level == levels - 1 {
                count = Self::final_round(server, &mut out_left, &mut out_right, arr + 1, count, rng)?;
            } else {
                self.put_bucket(server, arr + 1, 2 * j * self.capacity, &mut out_left)?;
                self.put_bucket(server, arr + 1, (2 * j + 1) * self.capacity, &mut out_right)?;
            }
        }
        Ok(count)
    }

    /// Retrieves the real elements of a bucket, discarding dummies.
    ///
    /// Reads past the declared end of the array are skipped silently; only
    /// the first butterfly level, whose input is the raw caller array, can
    /// encounter them.
    fn get_bucket<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        arr: ArrayName,
        width: u32,
        offset: u32,
        bucket: &mut Vec<Element<B>>,
    ) -> Result<(), OrpError> {
        bucket.clear();
        for index in offset..offset + width {
            if server.check(arr, index) {
                let element = server.get(arr, index)?;
                if !element.is_dummy() {
                    bucket.push(element);
                }
            }
        }
        Ok(())
    }

    /// Splits a bucket into its two children by the `level`-th tag bit.
    fn split_bucket<const B: BlockSize>(
        &self,
        input: &mut Vec<Element<B>>,
        out_left: &mut Vec<Element<B>>,
        out_right: &mut Vec<Element<B>>,
        level: u32,
    ) {
        for element in input.drain(..) {
            let tag = murmur3_32(element.key, self.seed) % self.num_buckets;
            if tag & (1 << level) != 0 {
                out_right.push(element);
            } else {
                out_left.push(element);
            }
        }
    }

    /// Uploads a bucket padded to exactly `Z` slots with dummies.
    fn put_bucket<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        arr: ArrayName,
        offset: u32,
        bucket: &mut Vec<Element<B>>,
    ) -> Result<(), OrpError> {
        let load = bucket.len() as u32;
        if load > self.capacity {
            return Err(OrpError::BucketOverflowError {
                load,
                capacity: self.capacity,
            });
        }
        for (i, element) in bucket.drain(..).enumerate() {
            server.put(arr, offset + i as u32, element)?;
        }
        for i in load..self.capacity {
            server.put(arr, offset + i, Element::dummy())?;
        }
        Ok(())
    }

    /// Shuffles the two final buckets client-side and uploads only their real
    /// elements, contiguously.
    fn final_round<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        server: &mut S,
        left: &mut Vec<Element<B>>,
        right: &mut Vec<Element<B>>,
        arr: ArrayName,
        mut count: u32,
        rng: &mut R,
    ) -> Result<u32, OrpError> {
        left.shuffle(rng);
        right.shuffle(rng);
        for element in left.drain(..) {
            server.put(arr, count, element)?;
            count += 1;
        }
        for element in right.drain(..) {
            server.put(arr, count, element)?;
            count += 1;
        }
        Ok(count)
    }

    /// Non-oblivious scatter of the shuffled array to its final positions.
    fn rearrange<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        arr: ArrayName,
    ) -> Result<ArrayName, OrpError> {
        server.create_array(arr + 1, self.size)?;
        for i in 0..self.size {
            let element = server.get(arr, i)?;
            let index = self.pi.eval(element.key);
            server.put(arr + 1, index, element)?;
        }
        server.delete_array(arr)?;
        Ok(arr + 1)
    }
}

impl Orp for Bucket {
    fn permute<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &mut self,
        server: &mut S,
        input: ArrayName,
        rng: &mut R,
    ) -> Result<ArrayName, OrpError> {
        log::debug!(
            "Bucket::permute -- n = {}, Z = {}, B = {}",
            self.size,
            self.capacity,
            self.num_buckets
        );

        // a fresh tag seed per invocation keeps calls independent
        self.seed = self.seed.wrapping_add(2);
        let arr = self.butterfly(server, input, rng)?;
        self.rearrange(server, arr)
    }

    fn permutation(&self) -> &Permutation {
        &self.pi
    }
}
