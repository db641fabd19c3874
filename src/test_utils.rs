// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common test utilities for the ORP algorithms.

use duplicate::duplicate_item;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    bitonic::Bitonic,
    bucket::Bucket,
    element::Element,
    melbourne::MelbourneShuffle,
    permutation::Permutation,
    server::{ArrayServer, CountAccessesServer},
    waksman::Waksman,
    ArrayName, BlockSize, Orp,
};

/// Payload size used throughout the test suite.
pub(crate) const TEST_BLOCK_SIZE: BlockSize = 16;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates an array at `name` holding the keys `0..n` in order.
pub(crate) fn write_input_array<const B: BlockSize, S: ArrayServer<B>>(
    server: &mut S,
    name: ArrayName,
    n: u32,
) {
    server.create_array(name, n).unwrap();
    for key in 0..n {
        server.put(name, key, Element::new(key)).unwrap();
    }
}

/// Asserts the universal output properties: the element with key `k` sits at
/// `π(k)`, no key is lost or duplicated, no dummies remain, and every
/// scratch field is clear.
pub(crate) fn assert_permutation_output<const B: BlockSize, S: ArrayServer<B>, O: Orp>(
    server: &mut S,
    orp: &O,
    output: ArrayName,
    n: u32,
) {
    let mut seen = vec![false; n as usize];
    for index in 0..n {
        let element = server.get(output, index).unwrap();
        assert!(!element.is_dummy(), "dummy at output index {index}");
        assert_eq!(element.aux, 0, "dirty aux at output index {index}");
        assert!(element.key < n, "foreign key {} in the output", element.key);
        assert!(!seen[element.key as usize], "key {} duplicated", element.key);
        seen[element.key as usize] = true;
        assert_eq!(orp.get_pi(element.key), index, "key {} misplaced", element.key);
        assert_eq!(orp.get_inv_pi(index), element.key);
    }
}

/// Uniform construction over the four algorithms, so the same scenarios can
/// be stamped out per type.
pub(crate) trait TestOrp: Orp + Sized {
    fn build(pi: Permutation, rng: &mut StdRng) -> Self;
}

#[duplicate_item(
    orp_type             build_expr;
    [Bitonic]            [Bitonic::with_permutation(pi)];
    [Bucket]             [Bucket::with_permutation(pi, 8, rng)];
    [MelbourneShuffle]   [MelbourneShuffle::with_permutation(pi, 5, 5)];
    [Waksman]            [Waksman::with_permutation(pi)];
)]
impl TestOrp for orp_type {
    #[allow(unused_variables)]
    fn build(pi: Permutation, rng: &mut StdRng) -> Self {
        build_expr.unwrap()
    }
}

/// Runs one permute over the prescribed forward mapping and checks every
/// universal property, including array hygiene.
pub(crate) fn run_orp_scenario<T: TestOrp>(forward: Vec<u32>) {
    init_logger();

    let n = forward.len() as u32;
    let mut rng = StdRng::seed_from_u64(7);
    let mut server = CountAccessesServer::<TEST_BLOCK_SIZE>::new();
    write_input_array(&mut server, 0, n);

    let pi = Permutation::from_forward(forward).unwrap();
    let mut orp = T::build(pi, &mut rng);
    let output = orp.permute(&mut server, 0, &mut rng).unwrap();

    assert_eq!(server.array_count(), 1, "temporary arrays left behind");
    assert_permutation_output(&mut server, &orp, output, n);
}

/// Runs one permute over a seeded random permutation and checks every
/// universal property.
pub(crate) fn run_random_scenario<T: TestOrp>(n: u32, seed: u64) {
    init_logger();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut server = CountAccessesServer::<TEST_BLOCK_SIZE>::new();
    write_input_array(&mut server, 0, n);

    let mut orp = T::build(Permutation::random(n, &mut rng), &mut rng);
    let output = orp.permute(&mut server, 0, &mut rng).unwrap();

    assert_eq!(server.array_count(), 1, "temporary arrays left behind");
    assert_permutation_output(&mut server, &orp, output, n);
}

pub(crate) fn identity(n: u32) -> Vec<u32> {
    (0..n).collect()
}

pub(crate) fn reverse(n: u32) -> Vec<u32> {
    (0..n).rev().collect()
}

pub(crate) fn cyclic_shift(n: u32) -> Vec<u32> {
    (0..n).map(|key| (key + 1) % n).collect()
}

/// Stamps out the fixed-permutation and random scenarios for one algorithm
/// at one size.
macro_rules! create_orp_scenario_tests {
    ($orp_type: ident, $n: expr) => {
        paste::paste! {
            #[test]
            fn [<permutes_identity_ $n>]() {
                $crate::test_utils::run_orp_scenario::<$orp_type>($crate::test_utils::identity($n));
            }

            #[test]
            fn [<permutes_reverse_ $n>]() {
                $crate::test_utils::run_orp_scenario::<$orp_type>($crate::test_utils::reverse($n));
            }

            #[test]
            fn [<permutes_cyclic_shift_ $n>]() {
                $crate::test_utils::run_orp_scenario::<$orp_type>(
                    $crate::test_utils::cyclic_shift($n),
                );
            }

            #[test]
            fn [<permutes_random_ $n>]() {
                $crate::test_utils::run_random_scenario::<$orp_type>($n, $n as u64);
            }
        }
    };
}

pub(crate) use create_orp_scenario_tests;
