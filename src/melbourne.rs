// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The Melbourne shuffle.

use rand::{CryptoRng, Rng};

use crate::{
    element::Element, permutation::Permutation, server::ArrayServer, ArrayName, BlockSize, Orp,
    OrpError,
};

// Reserved names for the temporary arrays; callers must not use these while
// a permute is in flight.
const TEMP_A: ArrayName = 0x1000_0000;
const TEMP_B: ArrayName = 0x1000_0001;
const TEMP_C: ArrayName = 0x1000_0002;
const TEMP_D: ArrayName = 0x1000_0003;

/// Two-pass distribute-and-clean ORP with linear I/O.
///
/// The array is viewed as `⌈√n⌉` buckets grouped into `⌈n¼⌉` chunks. A
/// shuffle pass streams the input bucket by bucket into per-chunk bins
/// (distribution 1), then splits every chunk into its destination buckets
/// (distribution 2), then sorts each bucket by `π(key)` and writes it home
/// (cleanup). Bins are padded to a fixed load so the storage tier sees only
/// their position, never their fill.
///
/// A single pass cannot realize every permutation — a π that concentrates
/// one input bucket into one chunk overloads a bin — so `permute` always
/// runs two passes: the first over a throwaway random permutation, the
/// second over the oracle's π. `p1` and `p2` scale the padded bin loads of
/// the two distribution phases; 5 is ample in practice, and an overload is
/// reported as [`OrpError::BinOverloadError`] rather than tolerated.
#[derive(Debug)]
pub struct MelbourneShuffle {
    size: u32,
    p1: u32,
    p2: u32,
    num_buckets: u32,
    bucket_width: u32,
    num_chunks: u32,
    buckets_per_chunk: u32,
    chunk_width: u32,
    pi: Permutation,
}

impl MelbourneShuffle {
    /// Creates an instance over a fresh uniformly random permutation of
    /// `0..size`, with dummy-padding multipliers `p1` and `p2`.
    pub fn new<R: Rng + CryptoRng>(
        size: u32,
        p1: u32,
        p2: u32,
        rng: &mut R,
    ) -> Result<Self, OrpError> {
        Self::with_permutation(Permutation::random(size, rng), p1, p2)
    }

    /// Creates an instance realizing the prescribed permutation.
    pub fn with_permutation(pi: Permutation, p1: u32, p2: u32) -> Result<Self, OrpError> {
        let size = pi.size();
        if size < 4 {
            return Err(OrpError::InvalidConfigurationError(
                "the melbourne shuffle requires at least four elements",
            ));
        }
        if p1 == 0 || p2 == 0 {
            return Err(OrpError::InvalidConfigurationError(
                "padding multipliers must be positive",
            ));
        }

        let num_buckets = (size as f64).sqrt().ceil() as u32;
        let mut bucket_width = num_buckets;
        // the last bucket must start before the end of the array
        if bucket_width * num_buckets - bucket_width >= size {
            bucket_width -= 1;
        }
        let num_chunks = (size as f64).powf(0.25).ceil() as u32;
        let buckets_per_chunk = num_buckets.div_ceil(num_chunks);
        let chunk_width = buckets_per_chunk * bucket_width;

        Ok(Self {
            size,
            p1,
            p2,
            num_buckets,
            bucket_width,
            num_chunks,
            buckets_per_chunk,
            chunk_width,
            pi,
        })
    }

    fn max_load_1(&self) -> u32 {
        self.p1 * self.num_chunks
    }

    fn max_load_2(&self) -> u32 {
        self.p2 * self.num_chunks
    }

    // Exact write extents of the two temporary arrays: distribution 1 tiles
    // chunks × buckets × max_load, distribution 2 tiles chunks × (buckets
    // per chunk)² × max_load.
    fn temp_1_length(&self) -> u32 {
        self.num_chunks * self.num_buckets * self.max_load_1()
    }

    fn temp_2_length(&self) -> u32 {
        self.num_chunks * self.buckets_per_chunk * self.buckets_per_chunk * self.max_load_2()
    }

    /// Performs a single shuffle of `input` into `output` under `pi`.
    ///
    /// One pass does not realize the full symmetric group, which is why
    /// `permute` runs two back to back on independent permutations.
    fn shuffle_pass<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        pi: &Permutation,
        input: ArrayName,
        temp1: ArrayName,
        temp2: ArrayName,
        output: ArrayName,
    ) -> Result<(), OrpError> {
        self.distribution_phase_1(server, pi, input, temp1)?;
        self.distribution_phase_2(server, pi, temp1, temp2)?;
        self.cleanup_phase(server, pi, temp2, output)
    }

    /// Streams the input a bucket at a time, binning elements by destination
    /// chunk and uploading every bin padded to `max_load`.
    fn distribution_phase_1<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        pi: &Permutation,
        input: ArrayName,
        temp: ArrayName,
    ) -> Result<(), OrpError> {
        let max_load = self.max_load_1();
        let stride = self.num_buckets * max_load;
        let mut bins: Vec<Vec<Element<B>>> = (0..self.num_chunks).map(|_| Vec::new()).collect();

        let mut index = 0;
        for bucket_id in 0..self.num_buckets {
            // only the last bucket can run short
            let range = if index + self.bucket_width < self.size {
                self.bucket_width
            } else {
                self.size - index
            };
            for element in Self::get_range(server, input, index, range)? {
                let chunk = pi.eval(element.key) / self.chunk_width;
                bins[chunk as usize].push(element);
            }

            // each chunk region holds one bin from every input bucket
            let mut offset = bucket_id * max_load;
            for bin in bins.iter_mut() {
                Self::put_bin(server, temp, offset, bin, max_load)?;
                offset += stride;
            }
            index += self.bucket_width;
        }
        Ok(())
    }

    /// Splits each chunk into its destination buckets, dropping the dummies
    /// introduced by the first distribution.
    fn distribution_phase_2<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        pi: &Permutation,
        temp1: ArrayName,
        temp2: ArrayName,
    ) -> Result<(), OrpError> {
        let max_load_1 = self.max_load_1();
        let max_load_2 = self.max_load_2();
        let chunk_card = self.num_buckets * max_load_1;
        let num_bins = self.num_buckets.div_ceil(self.buckets_per_chunk);
        let mut bins: Vec<Vec<Element<B>>> =
            (0..self.buckets_per_chunk).map(|_| Vec::new()).collect();

        for chunk_id in 0..self.num_chunks {
            let mut offset_bins = 0;
            for segment in 0..self.buckets_per_chunk {
                // the final segment of a chunk can cover fewer bins
                let range_bins = num_bins.min(self.num_buckets.saturating_sub(offset_bins));
                let range = range_bins * max_load_1;
                let segment_offset = chunk_id * chunk_card + offset_bins * max_load_1;
                for element in Self::get_range(server, temp1, segment_offset, range)? {
                    if element.is_dummy() {
                        continue;
                    }
                    let bucket =
                        (pi.eval(element.key) / self.bucket_width) % self.buckets_per_chunk;
                    bins[bucket as usize].push(element);
                }

                // every bin is uploaded even when the segment ran short, so
                // the cleanup phase never reads an unwritten slot
                let mut offset = chunk_id * max_load_2 * self.buckets_per_chunk * self.buckets_per_chunk
                    + segment * max_load_2;
                for bin in bins.iter_mut() {
                    Self::put_bin(server, temp2, offset, bin, max_load_2)?;
                    offset += max_load_2 * self.buckets_per_chunk;
                }
                offset_bins += num_bins;
            }
        }
        Ok(())
    }

    /// Reads each bucket, drops dummies, sorts by destination, and writes the
    /// bucket to its final position with cleared scratch.
    fn cleanup_phase<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        pi: &Permutation,
        temp: ArrayName,
        output: ArrayName,
    ) -> Result<(), OrpError> {
        let bucket_span = self.buckets_per_chunk * self.max_load_2();
        let mut catchment: Vec<Element<B>> = Vec::new();

        for bucket_id in 0..self.num_buckets {
            for mut element in Self::get_range(server, temp, bucket_id * bucket_span, bucket_span)? {
                if element.is_dummy() {
                    continue;
                }
                element.aux = pi.eval(element.key);
                catchment.push(element);
            }
            catchment.sort_unstable_by_key(|element| element.aux);
            self.put_bucket(server, output, bucket_id * self.bucket_width, &mut catchment)?;
        }
        Ok(())
    }

    /// Uploads a bin padded with dummies to exactly `max_load` slots.
    fn put_bin<const B: BlockSize, S: ArrayServer<B>>(
        server: &mut S,
        temp: ArrayName,
        index: u32,
        bin: &mut Vec<Element<B>>,
        max_load: u32,
    ) -> Result<(), OrpError> {
        let load = bin.len() as u32;
        if load > max_load {
            return Err(OrpError::BinOverloadError { load, max_load });
        }
        for (i, element) in bin.drain(..).enumerate() {
            server.put(temp, index + i as u32, element)?;
        }
        for i in load..max_load {
            server.put(temp, index + i, Element::dummy())?;
        }
        Ok(())
    }

    /// Writes an ordered bucket to the output array, clearing scratch.
    fn put_bucket<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        output: ArrayName,
        offset: u32,
        bucket: &mut Vec<Element<B>>,
    ) -> Result<(), OrpError> {
        debug_assert!(offset + bucket.len() as u32 <= self.size);
        for (i, mut element) in bucket.drain(..).enumerate() {
            element.aux = 0;
            server.put(output, offset + i as u32, element)?;
        }
        Ok(())
    }

    /// Retrieves a contiguous segment of elements.
    fn get_range<const B: BlockSize, S: ArrayServer<B>>(
        server: &mut S,
        name: ArrayName,
        offset: u32,
        range: u32,
    ) -> Result<Vec<Element<B>>, OrpError> {
        let mut segment = Vec::with_capacity(range as usize);
        for i in 0..range {
            segment.push(server.get(name, offset + i)?);
        }
        Ok(segment)
    }
}

impl Orp for MelbourneShuffle {
    fn permute<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &mut self,
        server: &mut S,
        input: ArrayName,
        rng: &mut R,
    ) -> Result<ArrayName, OrpError> {
        log::debug!(
            "MelbourneShuffle::permute -- n = {}, p1 = {}, p2 = {}, buckets = {} x {}",
            self.size,
            self.p1,
            self.p2,
            self.num_buckets,
            self.bucket_width
        );

        // The first pass scatters under a throwaway permutation; the second
        // realizes the oracle's π on the randomized array, so the output is
        // consistent with get_pi even for prescribed permutations.
        let scratch = Permutation::random(self.size, rng);

        let output = input + 1;
        server.create_array(TEMP_A, self.temp_1_length())?;
        server.create_array(TEMP_B, self.temp_2_length())?;
        server.create_array(output, self.size)?;
        if let Err(error) = self.shuffle_pass(server, &scratch, input, TEMP_A, TEMP_B, output) {
            for name in [TEMP_A, TEMP_B, output] {
                let _ = server.delete_array(name);
            }
            return Err(error);
        }
        server.delete_array(TEMP_A)?;
        server.delete_array(TEMP_B)?;
        server.delete_array(input)?;

        let final_output = output + 1;
        server.create_array(TEMP_C, self.temp_1_length())?;
        server.create_array(TEMP_D, self.temp_2_length())?;
        server.create_array(final_output, self.size)?;
        if let Err(error) = self.shuffle_pass(server, &self.pi, output, TEMP_C, TEMP_D, final_output)
        {
            for name in [TEMP_C, TEMP_D, final_output, output] {
                let _ = server.delete_array(name);
            }
            return Err(error);
        }
        server.delete_array(TEMP_C)?;
        server.delete_array(TEMP_D)?;
        server.delete_array(output)?;

        Ok(final_output)
    }

    fn permutation(&self) -> &Permutation {
        &self.pi
    }
}
