// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental measurement state.
//!
//! A host measures rows lazily. Rows it has to (re)measure carry
//! [`Validity::INVALID`] or [`Validity::COLUMN_INVALID`], and every row whose
//! subtree (nested rows included) holds such a row carries
//! [`Validity::DESCENDANTS_INVALID`]. That lets [`RowTree::first_invalid`]
//! walk straight to the next row to measure.

use alloc::vec::Vec;
use smallvec::SmallVec;

use crate::node::NIL;
use crate::tree::RowTree;
use crate::types::{NodeId, TreeId, Validity};

impl RowTree {
    /// Mark `node` as needing to be measured again.
    pub fn mark_invalid(&mut self, tree: TreeId, node: NodeId) {
        let ix = self.member_ix(self.tree_ix(tree), node);
        if self.n(ix).validity.contains(Validity::INVALID) {
            return;
        }
        self.n_mut(ix).validity.insert(Validity::INVALID);
        self.propagate_invalid(ix);
    }

    /// Clear both own invalid bits of `node`.
    ///
    /// Ancestors stay marked while anything else below them is still invalid.
    pub fn mark_valid(&mut self, tree: TreeId, node: NodeId) {
        let ix = self.member_ix(self.tree_ix(tree), node);
        self.clear_own_validity(ix);
    }

    /// Mark every row of `tree`, nested rows included, as invalid.
    pub fn mark_all_invalid(&mut self, tree: TreeId) {
        let t = self.tree_ix(tree);
        let levels = self.nested_levels(t);
        log::debug!("mark_all_invalid {tree:?}: {} levels", levels.len());
        for &l in &levels {
            for ix in self.in_order(l) {
                self.n_mut(ix)
                    .validity
                    .insert(Validity::INVALID | Validity::DESCENDANTS_INVALID);
            }
        }
        self.propagate_from_owner(t);
    }

    /// Mark every row of `tree`, nested rows included, as having an invalid
    /// column. Rows that are already fully invalid are left as they are.
    pub fn mark_column_invalid(&mut self, tree: TreeId) {
        let t = self.tree_ix(tree);
        let levels = self.nested_levels(t);
        log::debug!("mark_column_invalid {tree:?}: {} levels", levels.len());
        for &l in &levels {
            for ix in self.in_order(l) {
                let v = &mut self.n_mut(ix).validity;
                if !v.contains(Validity::INVALID) {
                    v.insert(Validity::COLUMN_INVALID);
                }
                v.insert(Validity::DESCENDANTS_INVALID);
            }
        }
        self.propagate_from_owner(t);
    }

    /// Give every fully invalid row of `tree` (recursively) the same height,
    /// and optionally mark those rows valid.
    ///
    /// Used by hosts whose rows all have one known height, to skip per-row
    /// measurement.
    pub fn set_fixed_height(&mut self, tree: TreeId, height: i64, mark_valid: bool) {
        let t = self.tree_ix(tree);
        assert!(height >= 0, "row heights must be non-negative; got {height}");
        log::debug!("set_fixed_height {tree:?}: {height}, mark_valid {mark_valid}");
        for l in self.nested_levels(t) {
            for ix in self.in_order(l) {
                if !self.n(ix).validity.contains(Validity::INVALID) {
                    continue;
                }
                let diff = height - self.n(ix).height;
                if diff != 0 {
                    self.n_mut(ix).height = height;
                    self.adjust(ix, 0, 0, diff);
                }
                if mark_valid {
                    self.clear_own_validity(ix);
                }
            }
        }
        self.debug_check("set_fixed_height");
    }

    /// The first row of `tree` in flattened order that must be measured.
    ///
    /// Runs in O(log n) per level by following
    /// [`Validity::DESCENDANTS_INVALID`].
    pub fn first_invalid(&self, tree: TreeId) -> Option<(TreeId, NodeId)> {
        let mut t = self.tree_ix(tree);
        let mut ix = self.lv(t).root;
        while ix != NIL && self.dirty(ix) {
            let n = self.n(ix);
            if self.dirty(n.left) {
                ix = n.left;
            } else if n.validity.intersects(Validity::OWN) {
                return Some((self.tree_id(t), self.node_id(ix)));
            } else if let Some(c) = n.children.filter(|&c| self.dirty(self.lv(c).root)) {
                t = c;
                ix = self.lv(c).root;
            } else {
                ix = n.right;
            }
        }
        None
    }

    // --- internals ---

    fn dirty(&self, ix: usize) -> bool {
        self.n(ix).validity.contains(Validity::DESCENDANTS_INVALID)
    }

    /// Set [`Validity::DESCENDANTS_INVALID`] on `ix` and upward, stopping at
    /// the first row that already has it.
    fn propagate_invalid(&mut self, mut ix: usize) {
        loop {
            if self.dirty(ix) {
                return;
            }
            self.n_mut(ix).validity.insert(Validity::DESCENDANTS_INVALID);
            match self.up(ix) {
                Some(next) => ix = next,
                None => return,
            }
        }
    }

    fn propagate_from_owner(&mut self, t: usize) {
        if let Some(link) = self.lv(t).parent
            && self.dirty(self.lv(t).root)
        {
            self.propagate_invalid(link.node);
        }
    }

    /// Clear the own bits of `ix`, then clear the derived bit upward until a
    /// row is still dirty for another reason.
    fn clear_own_validity(&mut self, mut ix: usize) {
        if !self.n(ix).validity.intersects(Validity::OWN) {
            return;
        }
        self.n_mut(ix).validity.remove(Validity::OWN);
        loop {
            let n = self.n(ix);
            let still_dirty = n.validity.intersects(Validity::OWN)
                || self.dirty(n.left)
                || self.dirty(n.right)
                || self.dirty(self.children_root(ix));
            if still_dirty {
                return;
            }
            self.n_mut(ix).validity.remove(Validity::DESCENDANTS_INVALID);
            match self.up(ix) {
                Some(next) => ix = next,
                None => return,
            }
        }
    }

    /// The in-level parent of `ix`, or the owning row of its level.
    fn up(&self, ix: usize) -> Option<usize> {
        let n = self.n(ix);
        if n.parent != NIL {
            Some(n.parent)
        } else {
            self.lv(n.tree).parent.map(|link| link.node)
        }
    }

    /// Level `t` and every level nested below it.
    fn nested_levels(&self, t: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut pending: SmallVec<[usize; 8]> = SmallVec::new();
        pending.push(t);
        while let Some(t) = pending.pop() {
            out.push(t);
            for ix in self.post_order(self.lv(t).root) {
                if let Some(c) = self.n(ix).children {
                    pending.push(c);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::{NodeId, RowTree, TreeId, Validity};

    fn rows_with_nested() -> (RowTree, TreeId, Vec<NodeId>, TreeId, Vec<NodeId>) {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let mut ids = Vec::new();
        let mut last = None;
        for h in [10, 20, 5, 15, 8] {
            let id = rows.insert_after(top, last, h);
            ids.push(id);
            last = Some(id);
        }
        let nested = rows.new_tree();
        let a = rows.insert_after(nested, None, 3);
        let b = rows.insert_after(nested, Some(a), 4);
        rows.attach_children(top, ids[2], nested);
        (rows, top, ids, nested, alloc::vec![a, b])
    }

    #[test]
    fn new_rows_start_valid() {
        let (rows, top, ids, _, _) = rows_with_nested();
        assert_eq!(rows.validity(ids[0]), Some(Validity::empty()));
        assert_eq!(rows.first_invalid(top), None);
    }

    #[test]
    fn invalid_nested_row_marks_every_ancestor() {
        let (mut rows, top, ids, nested, kids) = rows_with_nested();
        rows.mark_invalid(nested, kids[1]);

        assert!(rows.validity(kids[1]).unwrap().contains(Validity::INVALID));
        assert!(rows.validity(ids[2]).unwrap().contains(Validity::DESCENDANTS_INVALID));
        let root = rows.root_node(top).unwrap();
        assert!(rows.validity(root).unwrap().contains(Validity::DESCENDANTS_INVALID));
        assert!(!rows.validity(ids[4]).unwrap().contains(Validity::DESCENDANTS_INVALID));
        assert_eq!(rows.first_invalid(top), Some((nested, kids[1])));
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn mark_valid_clears_up_to_the_next_dirty_row() {
        let (mut rows, top, ids, nested, kids) = rows_with_nested();
        rows.mark_invalid(nested, kids[0]);
        rows.mark_invalid(top, ids[4]);
        assert_eq!(rows.first_invalid(top), Some((nested, kids[0])));

        rows.mark_valid(nested, kids[0]);
        assert_eq!(rows.validity(ids[2]), Some(Validity::empty()));
        assert_eq!(rows.first_invalid(top), Some((top, ids[4])));
        assert_eq!(rows.check_invariants(), Ok(()));

        rows.mark_valid(top, ids[4]);
        assert_eq!(rows.first_invalid(top), None);
        let root = rows.root_node(top).unwrap();
        assert_eq!(rows.validity(root), Some(Validity::empty()));
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn first_invalid_follows_flattened_order() {
        let (mut rows, top, ids, nested, kids) = rows_with_nested();
        rows.mark_all_invalid(top);
        let mut order = Vec::new();
        while let Some((tree, node)) = rows.first_invalid(top) {
            order.push(node);
            rows.mark_valid(tree, node);
        }
        assert_eq!(order, [ids[0], ids[1], ids[2], kids[0], kids[1], ids[3], ids[4]]);
        assert_eq!(rows.first_invalid(nested), None);
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn column_invalid_keeps_fully_invalid_rows() {
        let (mut rows, top, ids, nested, kids) = rows_with_nested();
        rows.mark_invalid(top, ids[0]);
        rows.mark_column_invalid(nested);

        assert_eq!(
            rows.validity(ids[0]).unwrap() - Validity::DESCENDANTS_INVALID,
            Validity::INVALID
        );
        assert!(rows.validity(kids[0]).unwrap().contains(Validity::COLUMN_INVALID));
        assert!(!rows.validity(ids[1]).unwrap().contains(Validity::COLUMN_INVALID));
        // Marking a nested level dirties its owner chain.
        assert!(rows.validity(ids[2]).unwrap().contains(Validity::DESCENDANTS_INVALID));
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn fixed_height_applies_to_invalid_rows_only() {
        let (mut rows, top, ids, nested, kids) = rows_with_nested();
        rows.mark_invalid(top, ids[0]);
        rows.mark_invalid(nested, kids[1]);

        rows.set_fixed_height(top, 1, true);
        assert_eq!(rows.height(ids[0]), Some(1));
        assert_eq!(rows.height(kids[1]), Some(1));
        assert_eq!(rows.height(ids[1]), Some(20));
        assert_eq!(rows.total_offset(top), 65 - 9 - 3);
        assert_eq!(rows.first_invalid(top), None);
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn fixed_height_without_marking_valid() {
        let (mut rows, top, _, _, _) = rows_with_nested();
        rows.mark_all_invalid(top);
        rows.set_fixed_height(top, 2, false);
        assert_eq!(rows.total_offset(top), 14);
        assert!(rows.first_invalid(top).is_some());
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn rebalancing_keeps_validity_derived() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let first = rows.insert_after(top, None, 1);
        rows.mark_invalid(top, first);
        let mut last = first;
        for h in 0..32 {
            last = rows.insert_after(top, Some(last), h);
            assert_eq!(rows.check_invariants(), Ok(()));
        }
        assert_eq!(rows.first_invalid(top), Some((top, first)));
        rows.remove_node(top, first);
        assert_eq!(rows.first_invalid(top), None);
        assert_eq!(rows.check_invariants(), Ok(()));
    }
}
