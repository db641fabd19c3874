// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Low-client-memory oblivious permutation via the Waksman network.
//!
//! A Waksman network of size `n` decomposes into `⌈n/2⌉` entry switches,
//! two subnetworks of sizes `⌈n/2⌉` and `⌊n/2⌋`, and `⌈n/2⌉` exit switches.
//! The permutation is realized in two phases over four server arrays. The
//! **configuration phase** walks the tree of subnetworks in preorder,
//! 2-coloring each node's exterior switches and routing elements through the
//! entry half of the network; the settings of each element's upcoming exit
//! switches are pushed onto its `aux` bit stack as it descends. The
//! **empty-road phase** then walks the tree bottom-up, popping one `aux` bit
//! per exit switch to route elements back out. Wires that bypass levels
//! because of odd-sized subnetworks are parked in a dedicated skip array
//! instead of requiring a temporary array per level.

mod empty_road;
mod exterior;
mod node;

use rand::{CryptoRng, Rng};

use node::{PermNode, Switch};

use crate::{
    element::Element, permutation::Permutation, server::ArrayServer, ArrayName, BlockSize, Orp,
    OrpError,
};

/// Waksman-network ORP with `O(n log n)` I/O and `O(log n)` client memory.
///
/// Uses the three reserved array names following the input (`input + 1` to
/// `input + 3`) for its temporaries; callers must not reuse them while a
/// permute is in flight.
#[derive(Debug)]
pub struct Waksman {
    length: u32,
    // leaves hold 2 to 4 wires; the threshold is chosen so that every leaf
    // sits at the same depth
    leaf_size: u32,
    temp1: ArrayName,
    temp2: ArrayName,
    temp3: ArrayName,
    skip_array: ArrayName,
    // per-level counters of elements parked in the skip array
    skip_indices: Vec<u32>,
    pi: Permutation,
}

impl Waksman {
    /// Creates an instance over a fresh uniformly random permutation of
    /// `0..size`.
    pub fn new<R: Rng + CryptoRng>(size: u32, rng: &mut R) -> Result<Self, OrpError> {
        Self::with_permutation(Permutation::random(size, rng))
    }

    /// Creates an instance realizing the prescribed permutation.
    pub fn with_permutation(pi: Permutation) -> Result<Self, OrpError> {
        let length = pi.size();
        if length < 4 {
            return Err(OrpError::InvalidConfigurationError(
                "the waksman network requires at least four elements",
            ));
        }

        let msb = 32 - (length | 1).leading_zeros();
        let mask = (1 << (msb - 1)) | (1 << (msb - 2));
        let leaf_size = if length > mask { 4 } else { 3 };

        Ok(Self {
            length,
            leaf_size,
            temp1: 0,
            temp2: 0,
            temp3: 0,
            skip_array: 0,
            skip_indices: Vec::new(),
            pi,
        })
    }

    fn run<const B: BlockSize, S: ArrayServer<B>>(
        &mut self,
        server: &mut S,
    ) -> Result<ArrayName, OrpError> {
        let mut ancestors = Vec::new();
        let root = PermNode::root(self.length);
        self.configuration_phase(server, &mut ancestors, root, self.temp1)?;
        self.empty_road_phase(server)
    }

    /// Configures a subnetwork and routes its elements one level down,
    /// recursing in preorder. Source and destination arrays alternate per
    /// level; leaves emit into `temp3`.
    fn configuration_phase<const B: BlockSize, S: ArrayServer<B>>(
        &mut self,
        server: &mut S,
        ancestors: &mut Vec<PermNode>,
        mut node: PermNode,
        source: ArrayName,
    ) -> Result<(), OrpError> {
        let target = if source == self.temp1 {
            self.temp2
        } else {
            self.temp1
        };

        if node.size <= self.leaf_size {
            return self.route_leaf(server, ancestors, &node, source);
        }

        self.set_exterior(ancestors, &mut node);
        self.route_internal_node(server, ancestors, &node, source, target)?;

        let left = node.child(true);
        let right = node.child(false);
        ancestors.push(node);
        self.configuration_phase(server, ancestors, left, target)?;
        self.configuration_phase(server, ancestors, right, target)?;
        ancestors.pop();
        Ok(())
    }

    /// Evaluates the node's local subpermutation `π_node(wire)`.
    ///
    /// The wire index is lifted to the root through the ancestors' entry
    /// switches, mapped by π, and projected back down by halving once per
    /// level.
    pub(crate) fn eval_pi(&self, ancestors: &[PermNode], node: &PermNode, wire: u32) -> u32 {
        let mut wire = wire;
        let mut child = node;
        for parent in ancestors.iter().rev() {
            let setting = parent.entry[wire as usize];
            let takes_even = child.is_left_child == setting.is_persist();
            wire = if takes_even { 2 * wire } else { 2 * wire + 1 };
            child = parent;
        }
        self.pi.eval(wire) >> ancestors.len() as u32
    }

    /// Evaluates the inverse subpermutation `π⁻¹_node(wire)` through the
    /// ancestors' exit switches.
    pub(crate) fn eval_inv_pi(&self, ancestors: &[PermNode], node: &PermNode, wire: u32) -> u32 {
        let mut wire = wire;
        let mut child = node;
        for parent in ancestors.iter().rev() {
            let setting = parent.exit[wire as usize];
            let takes_even = child.is_left_child == setting.is_persist();
            wire = if takes_even { 2 * wire } else { 2 * wire + 1 };
            child = parent;
        }
        self.pi.eval_inv(wire) >> ancestors.len() as u32
    }

    /// Routes every element of a leaf into `temp3` (or the skip array).
    fn route_leaf<const B: BlockSize, S: ArrayServer<B>>(
        &mut self,
        server: &mut S,
        ancestors: &[PermNode],
        node: &PermNode,
        source: ArrayName,
    ) -> Result<(), OrpError> {
        // a right child lands on the odd interleave of the parent's region
        let parent = &ancestors[ancestors.len() - 1];
        let mut offset = parent.offset;
        if !node.is_left_child {
            offset += 1;
        }
        for i in 0..node.size {
            let element = server.get(source, node.offset + i)?;
            let value = self.eval_pi(ancestors, node, i);
            self.route_element(server, ancestors, node, element, offset, value)?;
        }
        Ok(())
    }

    /// Places a leaf element at `parent_offset + 2·value`, unless it sits on
    /// the bottom wire of a skip configuration, in which case it parks in
    /// the skip array.
    fn route_element<const B: BlockSize, S: ArrayServer<B>>(
        &mut self,
        server: &mut S,
        ancestors: &[PermNode],
        node: &PermNode,
        element: Element<B>,
        offset: u32,
        value: u32,
    ) -> Result<(), OrpError> {
        let parent = &ancestors[ancestors.len() - 1];
        let even_parent = !parent.is_odd();
        let skips = value == node.size - 1 && (even_parent || !node.is_left_child);
        if skips {
            self.skip_fn(server, ancestors, node, element, self.length / 2, 0)
        } else {
            server.put(self.temp3, offset + 2 * value, element)
        }
    }

    /// Walks up the tree to find the level at which a skip wire re-enters
    /// routing, then parks the element in the skip array segment for that
    /// level.
    ///
    /// `index` counts the levels skipped so far; the segment base halves at
    /// each step.
    fn skip_fn<const B: BlockSize, S: ArrayServer<B>>(
        &mut self,
        server: &mut S,
        ancestors: &[PermNode],
        node: &PermNode,
        element: Element<B>,
        offset: u32,
        index: u32,
    ) -> Result<(), OrpError> {
        if ancestors.len() >= 2 {
            let (upper, rest) = ancestors.split_at(ancestors.len() - 1);
            let parent = &rest[0];
            let grandparent = &upper[upper.len() - 1];
            let stop = if !grandparent.is_odd() {
                // odd siblings chain the skip one level further; even
                // siblings stop at the left child
                !parent.is_odd() && node.is_left_child
            } else {
                parent.is_left_child || node.is_left_child
            };
            if !stop {
                return self.skip_fn(server, upper, parent, element, offset / 2, index + 1);
            }
        }
        self.park_skip_element(server, element, offset, index)
    }

    fn park_skip_element<const B: BlockSize, S: ArrayServer<B>>(
        &mut self,
        server: &mut S,
        mut element: Element<B>,
        offset: u32,
        index: u32,
    ) -> Result<(), OrpError> {
        // discard the switch settings of the skipped levels
        element.aux >>= index + 1;
        server.put(self.skip_array, offset + self.skip_indices[index as usize], element)?;
        self.skip_indices[index as usize] += 1;
        Ok(())
    }

    /// Routes an internal node's elements through its entry switches.
    ///
    /// The last one or two switches depend on the parities of the node and
    /// its children; wires entering odd subnetworks bypass levels via
    /// `route_wire`.
    fn route_internal_node<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        ancestors: &[PermNode],
        node: &PermNode,
        source: ArrayName,
        dest: ArrayName,
    ) -> Result<(), OrpError> {
        let num_switches = node.num_switches();
        let size = node.size;
        let left_child_odd = (size / 2) & 1 == 1;

        for i in 0..num_switches - 2 {
            self.route_switch(server, ancestors, node, source, dest, i)?;
        }

        if !node.is_odd() {
            self.route_switch(server, ancestors, node, source, dest, num_switches - 2)?;
            if left_child_odd {
                // both children odd: the bottom two wires skip a level each
                let e1 = self.get_update_elem(server, ancestors, node, source, size - 2)?;
                let e2 = self.get_update_elem(server, ancestors, node, source, size - 1)?;
                let v1 = self.eval_pi(ancestors, node, size - 2) / 2;
                let v2 = self.eval_pi(ancestors, node, size - 1) / 2;
                if node.entry[(num_switches - 1) as usize].is_persist() {
                    self.route_wire(server, e1, size / 2, v1, node.offset + num_switches - 1, dest)?;
                    self.route_wire(server, e2, size / 2, v2, node.offset + size - 1, dest)?;
                } else {
                    self.route_wire(server, e2, size / 2, v2, node.offset + num_switches - 1, dest)?;
                    self.route_wire(server, e1, size / 2, v1, node.offset + size - 1, dest)?;
                }
            } else {
                self.route_switch(server, ancestors, node, source, dest, num_switches - 1)?;
            }
        } else {
            if left_child_odd {
                // the bottom entry switch feeds an odd left subnetwork and
                // the straight-through bottom wire of the right one
                let e1 = self.get_update_elem(server, ancestors, node, source, size - 3)?;
                let e2 = self.get_update_elem(server, ancestors, node, source, size - 2)?;
                let v1 = self.eval_pi(ancestors, node, size - 3) / 2;
                let v2 = self.eval_pi(ancestors, node, size - 2) / 2;
                if node.entry[(num_switches - 2) as usize].is_persist() {
                    self.route_wire(server, e1, size / 2, v1, node.offset + num_switches - 2, dest)?;
                    server.put(dest, node.offset + size - 2, e2)?;
                } else {
                    server.put(dest, node.offset + size - 2, e1)?;
                    self.route_wire(server, e2, size / 2, v2, node.offset + num_switches - 2, dest)?;
                }
            } else {
                // odd right child: the bottom wire was routed by an ancestor
                self.route_switch(server, ancestors, node, source, dest, num_switches - 2)?;
            }

            if ancestors.is_empty() {
                // nobody above the root routes its bottom wire
                let e1 = self.get_update_elem(server, ancestors, node, source, size - 1)?;
                let v = self.eval_pi(ancestors, node, size - 1) / 2;
                self.route_wire(server, e1, (size + 1) / 2, v, node.offset + size - 1, dest)?;
            }
        }
        Ok(())
    }

    /// Applies one entry switch, writing its two elements into the left and
    /// right subnetwork input regions.
    fn route_switch<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        ancestors: &[PermNode],
        node: &PermNode,
        source: ArrayName,
        dest: ArrayName,
        index: u32,
    ) -> Result<(), OrpError> {
        let even = self.get_update_elem(server, ancestors, node, source, 2 * index)?;
        let odd = self.get_update_elem(server, ancestors, node, source, 2 * index + 1)?;
        if node.entry[index as usize].is_persist() {
            server.put(dest, node.offset + index, even)?;
            server.put(dest, node.offset + node.size / 2 + index, odd)?;
        } else {
            server.put(dest, node.offset + index, odd)?;
            server.put(dest, node.offset + node.size / 2 + index, even)?;
        }
        Ok(())
    }

    /// Routes an element along a wire that bypasses odd subnetwork levels,
    /// appending the exit-switch bit for each level it crosses.
    ///
    /// The array position stays fixed; only the array the level reads from
    /// alternates, so the element reappears as the bottom wire of the
    /// subnetwork it lands in.
    fn route_wire<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        mut element: Element<B>,
        size: u32,
        perm_value: u32,
        index: u32,
        dest: ArrayName,
    ) -> Result<(), OrpError> {
        if size & 1 == 0 || size == 3 {
            return server.put(dest, index, element);
        }
        let exit_switch = if perm_value & 1 == 1 {
            Switch::Persist
        } else {
            Switch::Swap
        };
        element.aux = (element.aux << 1) | exit_switch.bit();
        let next_dest = if dest == self.temp1 {
            self.temp2
        } else {
            self.temp1
        };
        self.route_wire(server, element, (size + 1) / 2, perm_value / 2, index, next_dest)
    }

    /// Retrieves a wire's element and pushes the setting of the node's exit
    /// switch it will eventually traverse onto its `aux` stack.
    fn get_update_elem<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        ancestors: &[PermNode],
        node: &PermNode,
        source: ArrayName,
        index: u32,
    ) -> Result<Element<B>, OrpError> {
        let mut element = server.get(source, node.offset + index)?;
        let setting = node.exit[(self.eval_pi(ancestors, node, index) / 2) as usize];
        element.aux = (element.aux << 1) | setting.bit();
        Ok(element)
    }
}

impl Orp for Waksman {
    fn permute<const B: BlockSize, S: ArrayServer<B>, R: Rng + CryptoRng>(
        &mut self,
        server: &mut S,
        input: ArrayName,
        _rng: &mut R,
    ) -> Result<ArrayName, OrpError> {
        log::debug!(
            "Waksman::permute -- n = {}, leaf size = {}",
            self.length,
            self.leaf_size
        );

        self.temp1 = input;
        self.temp2 = input + 1;
        self.temp3 = input + 2;
        self.skip_array = input + 3;
        server.create_array(self.temp2, self.length)?;
        server.create_array(self.temp3, self.length)?;
        server.create_array(self.skip_array, self.length)?;

        let num_levels = 2 * (31 - (self.length / 2).leading_zeros());
        self.skip_indices = vec![0; (num_levels / 2) as usize];

        match self.run(server) {
            Ok(output) => {
                server.delete_array(self.skip_array)?;
                server.delete_array(self.temp2)?;
                if output == self.temp1 {
                    server.delete_array(self.temp3)?;
                } else {
                    server.delete_array(self.temp1)?;
                }
                Ok(output)
            }
            Err(error) => {
                for name in [self.temp2, self.temp3, self.skip_array, self.temp1] {
                    let _ = server.delete_array(name);
                }
                Err(error)
            }
        }
    }

    fn permutation(&self) -> &Permutation {
        &self.pi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use rand::{rngs::StdRng, SeedableRng};

    create_orp_scenario_tests!(Waksman, 8);
    create_orp_scenario_tests!(Waksman, 16);

    #[test]
    fn rejects_tiny_networks() {
        assert!(matches!(
            Waksman::with_permutation(Permutation::from_forward(vec![0, 2, 1]).unwrap()),
            Err(OrpError::InvalidConfigurationError(_))
        ));
    }

    // Odd sizes exercise every parity branch of the configuration routing:
    // 11 has an odd left child at the root, 13 an odd right child, 5 the
    // smallest odd root, and 97 a deep mixture.
    #[test]
    fn permutes_odd_lengths() {
        for (n, seed) in [(5u32, 1u64), (7, 2), (11, 3), (13, 4), (97, 5), (100, 6)] {
            run_random_scenario::<Waksman>(n, seed);
        }
    }

    #[test]
    fn permutes_a_power_of_two_within_io_budget() {
        init_logger();

        let n = 1024u32;
        let mut rng = StdRng::seed_from_u64(0);
        let mut server = crate::CountAccessesServer::<TEST_BLOCK_SIZE>::new();
        write_input_array(&mut server, 0, n);
        server.reset_io();

        let mut orp = Waksman::new(n, &mut rng).unwrap();
        let output = orp.permute(&mut server, 0, &mut rng).unwrap();

        assert!(server.io_count() <= 8 * n as u64 * n.ilog2() as u64);
        assert_eq!(server.array_count(), 1);
        assert_permutation_output(&mut server, &orp, output, n);
    }

    #[test]
    fn permutes_a_large_odd_length() {
        run_random_scenario::<Waksman>(999, 9);
        run_random_scenario::<Waksman>(1000, 10);
    }
}
