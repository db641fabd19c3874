// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The opaque payload carried by a stored element.

use aligned::{Aligned, A64};
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};

use crate::BlockSize;

/// The fixed-size block of payload bytes attached to each element.
///
/// The client never inspects the payload; the storage tier serializes and
/// reconstructs it. `B` is the block size in bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockValue<const B: BlockSize>(Aligned<A64, [u8; B]>);

impl<const B: BlockSize> BlockValue<B> {
    /// Returns the length in bytes of this `BlockValue`.
    pub fn byte_length(&self) -> BlockSize {
        B
    }

    /// Instantiates a `BlockValue` from an array of `B` bytes.
    pub fn from_byte_array(data: [u8; B]) -> Self {
        Self(Aligned(data))
    }
}

impl<const B: BlockSize> From<BlockValue<B>> for [u8; B] {
    fn from(value: BlockValue<B>) -> Self {
        *value.0
    }
}

impl<const B: BlockSize> Default for BlockValue<B> {
    fn default() -> Self {
        BlockValue::<B>(Aligned([0u8; B]))
    }
}

impl<const B: BlockSize> Distribution<BlockValue<B>> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BlockValue<B> {
        let mut result = BlockValue::default();
        for i in 0..result.byte_length() {
            result.0[i] = rng.gen();
        }
        result
    }
}
