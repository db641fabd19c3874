// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Seeded 32-bit MurmurHash3 (the x86_32 variant) over a single word.
//!
//! Non-cryptographic; the seed only needs to be unknown to the storage tier
//! for tags to look unrelated to keys.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Hashes the four little-endian bytes of `key` with `seed`.
pub(crate) fn murmur3_32(key: u32, seed: u32) -> u32 {
    let mut k1 = key;
    k1 = k1.wrapping_mul(C1);
    k1 = k1.rotate_left(15);
    k1 = k1.wrapping_mul(C2);

    let mut h = seed;
    h ^= k1;
    h = h.rotate_left(13);
    h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);

    // single-block input: fold in the length and avalanche
    fmix32(h ^ 4)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
