// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The empty-road phase.
//!
//! After configuration, every element carries the settings of its upcoming
//! exit switches as a bit stack in `aux`. This phase walks the tree in
//! reverse level order — realized as one preorder traversal per height that
//! only acts at that depth — applying each node's exit switches and popping
//! one bit per switch. Elements that bypassed levels during configuration
//! are pulled back in from the skip array at the bottom switches of their
//! destination node.

use super::node::PermNode;
use super::Waksman;
use crate::{element::Element, server::ArrayServer, ArrayName, BlockSize, OrpError};

impl Waksman {
    /// Routes every element out through the exit half of the network,
    /// returning the array holding the final output.
    pub(crate) fn empty_road_phase<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
    ) -> Result<ArrayName, OrpError> {
        let mut source = self.temp3;
        let mut dest = self.temp1;
        let mut skip_index = self.length;

        let mut tree_height = 0;
        let mut size = self.length;
        while size > self.leaf_size {
            tree_height += 1;
            size /= 2;
        }

        for depth in (1..=tree_height).rev() {
            let root = PermNode::root(self.length);
            self.preorder_traversal(server, &root, None, depth, source, dest, skip_index)?;
            // the destination becomes the next level's source
            dest = source;
            source = if source == self.temp1 {
                self.temp3
            } else {
                self.temp1
            };
            skip_index /= 2;
        }
        Ok(source)
    }

    /// Preorder traversal that routes exactly the nodes at `depth`.
    fn preorder_traversal<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        node: &PermNode,
        parent: Option<&PermNode>,
        depth: u32,
        source: ArrayName,
        dest: ArrayName,
        skip_index: u32,
    ) -> Result<u32, OrpError> {
        if node.depth == depth {
            return self.route_exit_switches(server, node, parent, source, dest, skip_index);
        }
        let left = node.child(true);
        let skip_index =
            self.preorder_traversal(server, &left, Some(node), depth, source, dest, skip_index)?;
        let right = node.child(false);
        self.preorder_traversal(server, &right, Some(node), depth, source, dest, skip_index)
    }

    /// Applies one node's exit switches, reading the bottom one or two from
    /// the skip array as the parity case demands.
    fn route_exit_switches<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        node: &PermNode,
        parent: Option<&PermNode>,
        source: ArrayName,
        dest: ArrayName,
        mut skip_index: u32,
    ) -> Result<u32, OrpError> {
        let num_switches = node.num_switches();
        let left_child_odd = (node.size / 2) & 1 == 1;

        if parent.is_none() {
            self.complete_bottom_wires(server, dest, skip_index / 2)?;
        }

        let mut source_index = node.offset;
        if node.size <= self.leaf_size * 2 {
            // parents of leaves hold no skip elements
            for i in 0..num_switches - 1 {
                self.route_switch_pair(server, source, dest, source_index, node, parent, i)?;
                source_index += 2;
            }
        } else {
            for i in 0..num_switches - 3 {
                self.route_switch_pair(server, source, dest, source_index, node, parent, i)?;
                source_index += 2;
            }
            if !node.is_odd() {
                self.route_switch_pair(
                    server,
                    source,
                    dest,
                    source_index,
                    node,
                    parent,
                    num_switches - 3,
                )?;
                source_index += 2;
                if left_child_odd {
                    self.route_switch_pair(
                        server,
                        source,
                        dest,
                        source_index,
                        node,
                        parent,
                        num_switches - 2,
                    )?;
                } else {
                    // both children even: the bottom switch reads two parked
                    // elements
                    self.route_switch_pair(
                        server,
                        self.skip_array,
                        dest,
                        skip_index,
                        node,
                        parent,
                        num_switches - 2,
                    )?;
                    skip_index += 2;
                }
            } else if left_child_odd {
                self.route_switch_pair(
                    server,
                    source,
                    dest,
                    source_index,
                    node,
                    parent,
                    num_switches - 3,
                )?;
                self.route_switch_pair(
                    server,
                    self.skip_array,
                    dest,
                    skip_index,
                    node,
                    parent,
                    num_switches - 2,
                )?;
                skip_index += 2;
            } else {
                // odd node, even left child: each bottom switch pairs one
                // parked element with one routed element
                self.route_switch_split(
                    server,
                    source,
                    dest,
                    source_index + 1,
                    skip_index,
                    node,
                    parent,
                    num_switches - 3,
                )?;
                self.route_switch_split(
                    server,
                    source,
                    dest,
                    source_index + 3,
                    skip_index + 1,
                    node,
                    parent,
                    num_switches - 2,
                )?;
                skip_index += 2;
            }
        }
        Ok(skip_index)
    }

    /// Routes one exit switch whose elements sit adjacently in `source`.
    fn route_switch_pair<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        source: ArrayName,
        dest: ArrayName,
        index: u32,
        node: &PermNode,
        parent: Option<&PermNode>,
        switch_num: u32,
    ) -> Result<(), OrpError> {
        let top = server.get(source, index)?;
        let bottom = server.get(source, index + 1)?;
        self.apply_switch(server, top, bottom, dest, node, parent, switch_num)
    }

    /// Routes one exit switch whose top element is parked in the skip array.
    #[allow(clippy::too_many_arguments)]
    fn route_switch_split<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        source: ArrayName,
        dest: ArrayName,
        source_index: u32,
        skip_index: u32,
        node: &PermNode,
        parent: Option<&PermNode>,
        switch_num: u32,
    ) -> Result<(), OrpError> {
        let top = server.get(self.skip_array, skip_index)?;
        let bottom = server.get(source, source_index)?;
        self.apply_switch(server, top, bottom, dest, node, parent, switch_num)
    }

    /// Pops the switch setting from the top element's `aux` stack and writes
    /// both elements to the next level, following the network wires.
    fn apply_switch<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        mut top: Element<B>,
        mut bottom: Element<B>,
        dest: ArrayName,
        node: &PermNode,
        parent: Option<&PermNode>,
        switch_num: u32,
    ) -> Result<(), OrpError> {
        let persist = top.aux & 1 == 1;
        top.aux >>= 1;
        bottom.aux >>= 1;

        let top_index = match parent {
            // at the root the outputs are final positions
            None => 2 * switch_num,
            // otherwise output wire w of this node feeds the parent's
            // pre-exit region at offset + 2w, interleaved with the sibling
            Some(parent) => {
                let mut index = parent.offset + 4 * switch_num;
                if !node.is_left_child {
                    index += 1;
                }
                index
            }
        };
        let bottom_index = match parent {
            None => top_index + 1,
            Some(_) => top_index + 2,
        };

        if persist {
            server.put(dest, top_index, top)?;
            server.put(dest, bottom_index, bottom)?;
        } else {
            server.put(dest, top_index, bottom)?;
            server.put(dest, bottom_index, top)?;
        }
        Ok(())
    }

    /// Places the root's one or two bottom wires, pulled from the skip
    /// array, into the output.
    fn complete_bottom_wires<const B: BlockSize, S: ArrayServer<B>>(
        &self,
        server: &mut S,
        dest: ArrayName,
        skip_index: u32,
    ) -> Result<(), OrpError> {
        let top_wire = server.get(self.skip_array, skip_index)?;
        if self.length & 1 == 1 {
            server.put(dest, self.length - 1, top_wire)?;
        } else {
            let bottom_wire = server.get(self.skip_array, skip_index + 1)?;
            server.put(dest, self.length - 2, top_wire)?;
            server.put(dest, self.length - 1, bottom_wire)?;
        }
        Ok(())
    }
}
