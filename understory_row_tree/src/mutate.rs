// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row insertion, removal, resizing, and reordering.

use alloc::vec;
use alloc::vec::Vec;

use crate::node::{NIL, ParentLink};
use crate::tree::{RowTree, signed};
use crate::types::{NodeId, TreeId, Validity};

impl RowTree {
    /// Insert a row of `height` directly after `current` in `tree`.
    ///
    /// With `current == None` the row becomes the first row of `tree`.
    /// Every ancestor, within `tree` and across enclosing levels, grows by
    /// the new row.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, `current` is not in `tree`, or `height` is
    /// negative.
    pub fn insert_after(
        &mut self,
        tree: TreeId,
        current: Option<NodeId>,
        height: i64,
    ) -> NodeId {
        let t = self.tree_ix(tree);
        assert!(height >= 0, "row heights must be non-negative; got {height}");

        // Attach as the right child of `current`, or as the left child of
        // its successor when `current` already has a right subtree.
        let (parent, as_left) = match current {
            Some(c) => {
                let c = self.member_ix(t, c);
                let right = self.n(c).right;
                if right == NIL {
                    (c, false)
                } else {
                    (self.leftmost(right), true)
                }
            }
            None => {
                let root = self.lv(t).root;
                if root == NIL {
                    (NIL, true)
                } else {
                    (self.leftmost(root), true)
                }
            }
        };

        let ix = self.link_new(t, parent, as_left, height);
        log::trace!("insert_after {current:?}: {:?} height {height}", self.node_id(ix));
        self.debug_check("insert_after");
        self.node_id(ix)
    }

    /// Insert a row of `height` directly before `current` in `tree`.
    ///
    /// With `current == None` the row becomes the last row of `tree`.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, `current` is not in `tree`, or `height` is
    /// negative.
    pub fn insert_before(
        &mut self,
        tree: TreeId,
        current: Option<NodeId>,
        height: i64,
    ) -> NodeId {
        let t = self.tree_ix(tree);
        assert!(height >= 0, "row heights must be non-negative; got {height}");

        let (parent, as_left) = match current {
            Some(c) => {
                let c = self.member_ix(t, c);
                let left = self.n(c).left;
                if left == NIL {
                    (c, true)
                } else {
                    (self.rightmost(left), false)
                }
            }
            None => {
                let root = self.lv(t).root;
                if root == NIL {
                    (NIL, false)
                } else {
                    (self.rightmost(root), false)
                }
            }
        };

        let ix = self.link_new(t, parent, as_left, height);
        log::trace!("insert_before {current:?}: {:?} height {height}", self.node_id(ix));
        self.debug_check("insert_before");
        self.node_id(ix)
    }

    /// Link a new red leaf under `parent`, propagate it, and rebalance.
    fn link_new(&mut self, t: usize, parent: usize, as_left: bool, height: i64) -> usize {
        let ix = self.alloc_node(t, height);
        if parent == NIL {
            debug_assert!(
                self.lv(t).root == NIL,
                "only an empty level has no insertion parent"
            );
            self.lv_mut(t).root = ix;
            if let Some(link) = self.lv(t).parent {
                self.adjust(link.node, 0, 1, height);
            }
        } else {
            self.n_mut(ix).parent = parent;
            if as_left {
                self.n_mut(parent).left = ix;
            } else {
                self.n_mut(parent).right = ix;
            }
            self.adjust(parent, 1, 1, height);
        }
        self.insert_fixup(t, ix);
        ix
    }

    /// Remove a row from `tree` and free it.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, `node` is not in `tree`, or `node` still
    /// owns a nested level (remove or detach it first).
    pub fn remove_node(&mut self, tree: TreeId, node: NodeId) {
        let t = self.tree_ix(tree);
        let ix = self.member_ix(t, node);
        assert!(
            self.n(ix).children.is_none(),
            "removing a row that still has children; remove or detach them first"
        );
        log::trace!("remove_node {node:?}");

        // `y` is the row physically unlinked: `ix` itself, or its successor.
        let y = if self.n(ix).left == NIL || self.n(ix).right == NIL {
            ix
        } else {
            self.leftmost(self.n(ix).right)
        };
        let y_height = self.n(y).height + self.n(self.children_root(y)).offset;
        let y_total = 1 + self.n(self.children_root(y)).total_count;

        let x = if self.n(y).left != NIL {
            self.n(y).left
        } else {
            self.n(y).right
        };
        let y_parent = self.n(y).parent;
        if x != NIL {
            self.n_mut(x).parent = y_parent;
        }
        self.replace_child(t, y_parent, y, x);

        // `y` still points at its old parent, so this walks the right path.
        self.adjust(y, -1, -signed(y_total), -y_height);

        if !self.n(y).is_red() {
            self.delete_fixup(t, x, y_parent);
        }

        if y != ix {
            // Move `y` into the structural position of `ix`.
            let node_height = self.n(ix).height;
            let node_total = 1;
            let n = self.n(ix).clone();

            let yn = self.n_mut(y);
            yn.color = n.color;
            yn.left = n.left;
            yn.right = n.right;
            yn.parent = n.parent;
            yn.count = n.count;
            yn.total_count = n.total_count;
            yn.offset = n.offset;
            yn.parity = n.parity;
            yn.validity.set(
                Validity::DESCENDANTS_INVALID,
                n.validity.contains(Validity::DESCENDANTS_INVALID),
            );
            if n.left != NIL {
                self.n_mut(n.left).parent = y;
            }
            if n.right != NIL {
                self.n_mut(n.right).parent = y;
            }
            self.replace_child(t, n.parent, ix, y);

            // The position now carries `y` instead of `ix`.
            self.adjust(y, 0, signed(y_total) - node_total, y_height - node_height);
        }

        self.free_node(ix);
        self.debug_check("remove_node");
    }

    /// Remove `tree` and free it with every row and nested level in it.
    ///
    /// If `tree` is nested, it is first detached from its row, and every
    /// ancestor shrinks by the tree's total offset and row count.
    pub fn remove_tree(&mut self, tree: TreeId) {
        let t = self.tree_ix(tree);
        assert!(t != self.root_tree().idx(), "the root tree cannot be removed");
        let root = self.lv(t).root;
        let (total, offset) = (self.n(root).total_count, self.n(root).offset);
        log::debug!("remove_tree {tree:?}: {total} rows, offset {offset}");

        if let Some(link) = self.lv(t).parent {
            self.n_mut(link.node).children = None;
            self.lv_mut(t).parent = None;
            self.adjust(link.node, 0, -signed(total), -offset);
        }
        self.free_level(t);
        self.debug_check("remove_tree");
    }

    /// Change the own height of `node`, propagating the difference to every
    /// ancestor across levels. Counts, parity and colors are untouched.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, `node` is not in `tree`, or `height` is
    /// negative.
    pub fn set_own_height(&mut self, tree: TreeId, node: NodeId, height: i64) {
        let t = self.tree_ix(tree);
        let ix = self.member_ix(t, node);
        assert!(height >= 0, "row heights must be non-negative; got {height}");
        let diff = height - self.n(ix).height;
        if diff == 0 {
            return;
        }
        log::trace!("set_own_height {node:?}: {height} ({diff:+})");
        self.n_mut(ix).height = height;
        self.adjust(ix, 0, 0, diff);
        self.debug_check("set_own_height");
    }

    /// Permute the rows of `tree`.
    ///
    /// After the call, position `i` holds the payload (height, caller flags,
    /// own validity bits, nested level) that was at position `new_order[i]`.
    /// Row handles stay at their positions, and the shape and colors of the
    /// tree are untouched; only augmented fields are recomputed, once.
    ///
    /// # Panics
    ///
    /// Panics if `tree` is stale or `new_order` is not a permutation of
    /// `0..len(tree)`.
    pub fn reorder(&mut self, tree: TreeId, new_order: &[usize]) {
        let t = self.tree_ix(tree);
        let len = self.n(self.lv(t).root).count;
        assert!(
            new_order.len() == len,
            "reorder needs {len} positions, got {}",
            new_order.len()
        );
        let mut seen = vec![false; len];
        for &from in new_order {
            assert!(from < len && !seen[from], "reorder needs a permutation of 0..{len}");
            seen[from] = true;
        }
        log::debug!("reorder {tree:?}: {len} rows");

        let positions: Vec<usize> = self.in_order(t);
        let payloads: Vec<_> = positions
            .iter()
            .map(|&ix| {
                let n = self.n(ix);
                (n.height, n.flags, n.validity & Validity::OWN, n.children)
            })
            .collect();

        for (&ix, &from) in positions.iter().zip(new_order) {
            let (height, flags, own, children) = payloads[from];
            let n = self.n_mut(ix);
            n.height = height;
            n.flags = flags;
            n.validity = (n.validity - Validity::OWN) | own;
            n.children = children;
            if let Some(c) = children {
                self.lv_mut(c).parent = Some(ParentLink { tree: t, node: ix });
            }
        }

        for ix in self.post_order(self.lv(t).root) {
            self.recompute(ix);
        }
        self.debug_check("reorder");
    }

    /// Apply a difference to `ix` and every ancestor, continuing through the
    /// owning rows of enclosing levels.
    ///
    /// `count_diff` only applies within the level of `ix`: `count` never
    /// includes nested rows.
    pub(crate) fn adjust(
        &mut self,
        mut ix: usize,
        mut count_diff: isize,
        total_diff: isize,
        offset_diff: i64,
    ) {
        let flip = total_diff & 1 != 0;
        while ix != NIL {
            let n = self.n_mut(ix);
            n.offset += offset_diff;
            n.count = n.count.wrapping_add_signed(count_diff);
            n.total_count = n.total_count.wrapping_add_signed(total_diff);
            n.parity ^= flip;
            let (parent, t) = (n.parent, n.tree);
            self.fixup_validation(ix);

            if parent != NIL {
                ix = parent;
            } else if let Some(link) = self.lv(t).parent {
                ix = link.node;
                count_diff = 0;
            } else {
                break;
            }
        }
    }

    /// Slots of level `t` in order.
    pub(crate) fn in_order(&self, t: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.n(self.lv(t).root).count);
        let mut ix = self.leftmost(self.lv(t).root);
        while ix != NIL {
            out.push(ix);
            ix = self.successor(ix);
        }
        out
    }
}
