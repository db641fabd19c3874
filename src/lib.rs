// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An implementation of Oblivious Random Permutation (ORP).
//!
//! An ORP reorders an externally stored array of fixed-size blocks according
//! to a uniformly random permutation while revealing nothing about the
//! permutation to a storage tier that observes only the sequence of array
//! accesses. Four algorithms are provided behind the common [`Orp`] trait:
//!
//! - [`Bitonic`]: comparator-network routing, `O(n log² n)` accesses.
//! - [`Bucket`]: a butterfly network over dummy-padded buckets, `O(n log n)`.
//! - [`MelbourneShuffle`]: two-pass bucket/chunk distribution, `O(n)`.
//! - [`Waksman`]: recursive switch-network routing with low client memory,
//!   `O(n log n)`.
//!
//! The storage tier is modelled by the [`ArrayServer`] trait; the bundled
//! [`SimpleServer`] simulates a remote store holding serialized elements, and
//! [`CountAccessesServer`] instruments it for benchmarking.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

pub mod bitonic;
pub mod block_value;
pub mod bucket;
pub mod element;
pub mod melbourne;
pub mod permutation;
pub mod server;
pub mod waksman;

mod hash;
#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::bitonic::Bitonic;
pub use crate::block_value::BlockValue;
pub use crate::bucket::Bucket;
pub use crate::element::Element;
pub use crate::melbourne::MelbourneShuffle;
pub use crate::permutation::Permutation;
pub use crate::server::{ArrayServer, CountAccessesServer, SimpleServer};
pub use crate::waksman::Waksman;

use rand::{CryptoRng, Rng};
use thiserror::Error;

/// The numeric type naming an array held by an array server.
pub type ArrayName = u32;
/// The numeric type used to index into an array held by an array server.
pub type ArrayIndex = u32;
/// The numeric type used to specify the payload size of an element in bytes.
pub type BlockSize = usize;

/// The key value reserved for dummy elements.
///
/// Dummies pad buckets and bins so that the storage tier cannot distinguish
/// real loads from padding. Caller keys must be smaller than this value.
pub const DUMMY_KEY: u32 = u32::MAX;

/// The error type returned by ORP and array-server operations.
#[derive(Debug, Error)]
pub enum OrpError {
    /// An array was created under a name that is already live at the server.
    #[error("array {0} already exists at the server")]
    ArrayAlreadyExistsError(ArrayName),
    /// An operation referenced an array the server does not hold.
    #[error("array {0} does not exist at the server")]
    ArrayNotFoundError(ArrayName),
    /// An access fell outside the declared length of an array.
    #[error("index {index} is out of bounds for array {name} of length {length}")]
    AddressOutOfBoundsError {
        /// The array that was accessed.
        name: ArrayName,
        /// The offending index.
        index: ArrayIndex,
        /// The declared length of the array.
        length: u32,
    },
    /// An algorithm was constructed with parameters it cannot support.
    #[error("invalid ORP configuration: {0}")]
    InvalidConfigurationError(&'static str),
    /// A prescribed mapping was not a bijection over `0..n`.
    #[error("the supplied mapping is not a permutation of 0..n")]
    InvalidPermutationError,
    /// A butterfly output bucket would hold more real elements than its
    /// capacity `Z`. Retry with a larger `Z`.
    #[error("butterfly bucket holds {load} real elements but has capacity {capacity}")]
    BucketOverflowError {
        /// The number of real elements routed to the bucket.
        load: u32,
        /// The bucket capacity `Z`.
        capacity: u32,
    },
    /// A Melbourne distribution bin exceeded its padded capacity. Retry with
    /// larger `p1`/`p2` multipliers.
    #[error("distribution bin holds {load} elements but the maximum load is {max_load}")]
    BinOverloadError {
        /// The number of elements routed to the bin.
        load: u32,
        /// The padded bin capacity.
        max_load: u32,
    },
}

/// The common capability of every ORP algorithm.
///
/// An implementation is constructed for a fixed element count `n` and holds a
/// permutation π over `{0, .., n-1}`. [`Orp::permute`] consumes an input
/// array of `n` distinct real elements (keys `0..n`) and produces an output
/// array in which the element with key `k` sits at index `π(k)`.
pub trait Orp {
    /// Permutes the contents of `input` according to π, returning the name of
    /// the output array.
    ///
    /// The input array is consumed: it is either returned as the output or
    /// deleted from the server. Every temporary array the algorithm creates
    /// is deleted before returning, on success and on error alike.
    fn permute<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &mut self,
        server: &mut S,
        input: ArrayName,
        rng: &mut R,
    ) -> Result<ArrayName, OrpError>;

    /// Returns the permutation this instance realizes.
    fn permutation(&self) -> &Permutation;

    /// Returns `π(key)`, the output index of the element with `key`.
    fn get_pi(&self, key: u32) -> u32 {
        self.permutation().eval(key)
    }

    /// Returns `π⁻¹(index)`, the key of the element at output `index`.
    fn get_inv_pi(&self, index: u32) -> u32 {
        self.permutation().eval_inv(index)
    }
}
