// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Configuration of a subnetwork's exterior switches.
//!
//! The `⌈s/2⌉` entry switches, `⌈s/2⌉` exit switches, and the constraints of
//! the node's subpermutation form a 2-regular bipartite graph. A valid
//! assignment is a 2-coloring of that graph, found by walking its cycles:
//! alternate between exit→entry edges (via `π⁻¹_node`) and entry→exit edges
//! (via `π_node`), copying the current setting subject to wire parity. When
//! a cycle closes, restart from the reserve switch — the lowest-indexed one
//! not yet set.

use super::node::{PermNode, Switch};
use super::Waksman;

/// Cursor state for the cycle traversal.
struct ExtData {
    cur: u32,
    tar: u32,
    cur_setting: Switch,
}

impl ExtData {
    fn new(cur: u32, cur_setting: Switch) -> Self {
        Self {
            cur,
            tar: 0,
            cur_setting,
        }
    }

    /// The target switch copies the current setting when the two wires have
    /// equal parity and flips it otherwise.
    fn configure(&mut self) {
        if (self.cur & 1) != (self.tar & 1) {
            self.cur_setting = self.cur_setting.flipped();
        }
    }

    /// Moves to the sibling wire of the target switch.
    fn update_index(&mut self) {
        self.cur = if self.tar & 1 == 0 {
            self.tar + 1
        } else {
            self.tar - 1
        };
    }
}

impl Waksman {
    /// Computes the node's entry and exit switch settings.
    ///
    /// For an odd node the bottom wires pass straight into the larger right
    /// subnetwork, which forces the bottom entry and exit switches to SWAP;
    /// for an even node the bottom exit switch is seeded arbitrarily with
    /// PERSIST. Every other setting is derived by the cycle traversal.
    pub(crate) fn set_exterior(&self, ancestors: &[PermNode], node: &mut PermNode) {
        let num_switches = node.num_switches() as usize;
        let mut entry = vec![Switch::Persist; num_switches];
        let mut exit = vec![Switch::Persist; num_switches];
        let mut entry_set = vec![false; num_switches];
        let mut exit_set = vec![false; num_switches];

        let mut reserve_entry = 0;
        let mut reserve_exit = 0;
        let mut count = 0;
        let mut inverse = true;

        let mut data;
        if node.is_odd() {
            data = ExtData::new(node.size - 1, Switch::Swap);
            entry[num_switches - 1] = Switch::Swap;
            exit[num_switches - 1] = Switch::Swap;
            entry_set[num_switches - 1] = true;
            count += 1;
        } else {
            data = ExtData::new(node.size - 1, Switch::Persist);
            exit[num_switches - 1] = Switch::Persist;
        }
        exit_set[num_switches - 1] = true;
        count += 1;

        while count < 2 * num_switches {
            if inverse {
                // follow the constraint from an output wire to its input wire
                data.tar = self.eval_inv_pi(ancestors, node, data.cur);
                Self::set_switch(&mut data, &mut reserve_entry, &mut entry, &mut entry_set);
            } else {
                data.tar = self.eval_pi(ancestors, node, data.cur);
                Self::set_switch(&mut data, &mut reserve_exit, &mut exit, &mut exit_set);
            }
            inverse = !inverse;
            count += 1;
        }

        node.entry = entry;
        node.exit = exit;
    }

    /// Sets the switch holding the target wire, or — if the cycle just
    /// closed — opens a new cycle at the reserve switch.
    fn set_switch(
        data: &mut ExtData,
        reserve: &mut usize,
        settings: &mut [Switch],
        is_set: &mut [bool],
    ) {
        let target = (data.tar / 2) as usize;
        if !is_set[target] {
            data.configure();
            settings[target] = data.cur_setting;
            is_set[target] = true;
            data.update_index();
            if *reserve == target {
                *reserve = Self::next_null(is_set, *reserve);
            }
        } else {
            data.cur = 2 * *reserve as u32;
            data.cur_setting = Switch::Persist;
            settings[*reserve] = Switch::Persist;
            is_set[*reserve] = true;
            *reserve = Self::next_null(is_set, *reserve);
        }
    }

    /// Returns the lowest index of an unset switch above `index`.
    fn next_null(is_set: &[bool], index: usize) -> usize {
        let length = is_set.len();
        if index == length {
            return length;
        }
        let mut index = index + 1;
        while index < length && is_set[index] {
            index += 1;
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::init_logger, Permutation};
    use rand::{rngs::StdRng, SeedableRng};

    fn configured_root(n: u32, seed: u64) -> (Waksman, PermNode) {
        init_logger();
        let mut rng = StdRng::seed_from_u64(seed);
        let orp = Waksman::with_permutation(Permutation::random(n, &mut rng)).unwrap();
        let mut root = PermNode::root(n);
        orp.set_exterior(&[], &mut root);
        (orp, root)
    }

    // A wire enters the left subnetwork iff its parity matches its entry
    // switch setting, and must leave the same subnetwork at its image.
    #[test]
    fn switch_settings_are_consistent_with_the_permutation() {
        for (n, seed) in [(8u32, 0u64), (11, 1), (12, 2), (13, 3), (42, 4)] {
            let (orp, root) = configured_root(n, seed);
            for wire in 0..n {
                let image = orp.pi.eval(wire);
                let enters_left =
                    (wire % 2 == 0) == root.entry[(wire / 2) as usize].is_persist();
                let leaves_left =
                    (image % 2 == 0) == root.exit[(image / 2) as usize].is_persist();
                assert_eq!(enters_left, leaves_left, "wire {wire} of size {n}");
            }
        }
    }

    #[test]
    fn odd_nodes_force_the_bottom_switches_to_swap() {
        let (_, root) = configured_root(13, 7);
        assert_eq!(*root.entry.last().unwrap(), Switch::Swap);
        assert_eq!(*root.exit.last().unwrap(), Switch::Swap);
    }

    #[test]
    fn local_subpermutations_round_trip() {
        for (n, seed) in [(12u32, 0u64), (13, 1), (20, 2)] {
            let (orp, root) = configured_root(n, seed);
            let ancestors = vec![root];
            for left in [true, false] {
                let child = ancestors[0].child(left);
                for wire in 0..child.size {
                    let value = orp.eval_pi(&ancestors, &child, wire);
                    assert!(value < child.size);
                    assert_eq!(orp.eval_inv_pi(&ancestors, &child, value), wire);
                }
            }
        }
    }
}
