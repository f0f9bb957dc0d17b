// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Positional queries and traversal.
//!
//! "Flattened" order is the order in which rows are shown: each row is
//! followed by its nested rows (recursively), then by its in-level successor.

use smallvec::SmallVec;

use crate::node::NIL;
use crate::tree::RowTree;
use crate::types::{NodeId, OffsetHit, TraverseOrder, TreeId};

impl RowTree {
    /// The first row of `tree`, if any.
    pub fn first(&self, tree: TreeId) -> Option<NodeId> {
        let t = self.tree_ix(tree);
        self.opt_id(self.leftmost(self.lv(t).root))
    }

    /// The last row of `tree`, if any.
    pub fn last(&self, tree: TreeId) -> Option<NodeId> {
        let t = self.tree_ix(tree);
        self.opt_id(self.rightmost(self.lv(t).root))
    }

    /// The in-level successor of `node`, or `None` at the end of `tree`.
    ///
    /// Nested rows are not visited; see [`RowTree::next_full`].
    pub fn next(&self, tree: TreeId, node: NodeId) -> Option<NodeId> {
        let ix = self.member_ix(self.tree_ix(tree), node);
        self.opt_id(self.successor(ix))
    }

    /// The in-level predecessor of `node`, or `None` at the start of `tree`.
    pub fn previous(&self, tree: TreeId, node: NodeId) -> Option<NodeId> {
        let ix = self.member_ix(self.tree_ix(tree), node);
        self.opt_id(self.predecessor(ix))
    }

    /// The row after `node` in flattened order, across all levels.
    ///
    /// Descends into the nested rows of `node` first, and climbs out of
    /// finished levels into their owning rows' successors.
    pub fn next_full(&self, tree: TreeId, node: NodeId) -> Option<(TreeId, NodeId)> {
        let t = self.tree_ix(tree);
        let ix = self.member_ix(t, node);
        let (t, ix) = self.next_full_slot(t, ix, None)?;
        Some((self.tree_id(t), self.node_id(ix)))
    }

    /// The row before `node` in flattened order, across all levels.
    ///
    /// The previous row is the deepest last nested row of the in-level
    /// predecessor, or the owning row when `node` is first in its level.
    pub fn previous_full(&self, tree: TreeId, node: NodeId) -> Option<(TreeId, NodeId)> {
        let t = self.tree_ix(tree);
        let ix = self.member_ix(t, node);

        let prev = self.predecessor(ix);
        if prev == NIL {
            let link = self.lv(t).parent?;
            return Some((self.tree_id(link.tree), self.node_id(link.node)));
        }
        let (mut t, mut ix) = (t, prev);
        while let Some(c) = self.n(ix).children {
            let last = self.rightmost(self.lv(c).root);
            if last == NIL {
                break;
            }
            (t, ix) = (c, last);
        }
        Some((self.tree_id(t), self.node_id(ix)))
    }

    /// Iterate every row of `tree` and its nested levels in flattened order.
    pub fn iter_full(&self, tree: TreeId) -> FullIter<'_> {
        let t = self.tree_ix(tree);
        let first = self.leftmost(self.lv(t).root);
        FullIter {
            rows: self,
            scope: t,
            next: (first != NIL).then_some((t, first)),
        }
    }

    /// Visit every row of `tree` in the structural `order` of its red-black
    /// tree.
    ///
    /// This is not display order, and nested levels are not entered. It is
    /// for bulk passes over one level where order does not matter; use
    /// [`RowTree::iter_full`] for display order.
    pub fn traverse(&self, tree: TreeId, order: TraverseOrder, mut f: impl FnMut(NodeId)) {
        let root = self.lv(self.tree_ix(tree)).root;
        match order {
            TraverseOrder::PreOrder => {
                if root == NIL {
                    return;
                }
                let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
                stack.push(root);
                while let Some(ix) = stack.pop() {
                    f(self.node_id(ix));
                    let n = self.n(ix);
                    if n.right != NIL {
                        stack.push(n.right);
                    }
                    if n.left != NIL {
                        stack.push(n.left);
                    }
                }
            }
            TraverseOrder::PostOrder => {
                for ix in self.post_order(root) {
                    f(self.node_id(ix));
                }
            }
        }
    }

    /// Find the row covering `offset`, measured from the top of `tree` with
    /// nested rows laid out under their owners.
    ///
    /// Each row covers `[start, start + height)`, so zero-height rows are
    /// never hit. Returns `None` when `offset` is negative or not below
    /// [`RowTree::total_offset`].
    pub fn find_node_by_offset(&self, tree: TreeId, offset: i64) -> Option<OffsetHit> {
        let mut t = self.tree_ix(tree);
        if offset < 0 || offset >= self.n(self.lv(t).root).offset {
            return None;
        }

        let mut remaining = offset;
        let mut ix = self.lv(t).root;
        loop {
            if ix == NIL {
                return None;
            }
            let n = self.n(ix);
            let start = self.n(n.left).offset;
            let end = n.offset - self.n(n.right).offset;
            if remaining < start {
                ix = n.left;
            } else if remaining >= end {
                remaining -= end;
                ix = n.right;
            } else if remaining < start + n.height {
                return Some(OffsetHit {
                    tree: self.tree_id(t),
                    node: self.node_id(ix),
                    offset_in_node: remaining - start,
                });
            } else {
                // Inside the nested rows shown under this row.
                let c = n.children?;
                remaining -= start + n.height;
                t = c;
                ix = self.lv(c).root;
            }
        }
    }

    /// The row at 0-based position `index` within `tree` itself.
    ///
    /// Nested rows are not counted; see [`RowTree::find_index`].
    pub fn find_node_by_count(&self, tree: TreeId, index: usize) -> Option<NodeId> {
        let t = self.tree_ix(tree);
        let mut index = index;
        let mut ix = self.lv(t).root;
        while ix != NIL {
            let n = self.n(ix);
            let left = self.n(n.left).count;
            if index < left {
                ix = n.left;
            } else if index == left {
                return Some(self.node_id(ix));
            } else {
                index -= left + 1;
                ix = n.right;
            }
        }
        None
    }

    /// The row at 0-based flattened position `index`, nested rows included.
    pub fn find_index(&self, tree: TreeId, index: usize) -> Option<(TreeId, NodeId)> {
        let mut t = self.tree_ix(tree);
        let mut index = index;
        let mut ix = self.lv(t).root;
        loop {
            if ix == NIL {
                return None;
            }
            let n = self.n(ix);
            let start = self.n(n.left).total_count;
            let end = n.total_count - self.n(n.right).total_count;
            if index < start {
                ix = n.left;
            } else if index >= end {
                index -= end;
                ix = n.right;
            } else if index == start {
                return Some((self.tree_id(t), self.node_id(ix)));
            } else {
                let c = n.children?;
                index -= start + 1;
                t = c;
                ix = self.lv(c).root;
            }
        }
    }

    /// Absolute offset of the top edge of `node`, as if every level above it
    /// were flattened into one sequence.
    pub fn node_offset_within_ancestor(&self, tree: TreeId, node: NodeId) -> i64 {
        let mut ix = self.member_ix(self.tree_ix(tree), node);
        let mut offset = self.n(self.n(ix).left).offset;
        loop {
            let parent = self.n(ix).parent;
            if parent != NIL {
                let p = self.n(parent);
                // Coming from the right: add the left branch, the row and its nested rows.
                if p.right == ix {
                    offset += p.offset - self.n(p.right).offset;
                }
                ix = parent;
            } else if let Some(link) = self.lv(self.n(ix).tree).parent {
                let owner = self.n(link.node);
                offset += self.n(owner.left).offset + owner.height;
                ix = link.node;
            } else {
                return offset;
            }
        }
    }

    /// Absolute flattened index of `node`; the inverse of [`RowTree::find_index`]
    /// on the outermost tree.
    pub fn node_index_within_ancestor(&self, tree: TreeId, node: NodeId) -> usize {
        let mut ix = self.member_ix(self.tree_ix(tree), node);
        let mut index = self.n(self.n(ix).left).total_count;
        loop {
            let parent = self.n(ix).parent;
            if parent != NIL {
                let p = self.n(parent);
                if p.right == ix {
                    index += p.total_count - self.n(p.right).total_count;
                }
                ix = parent;
            } else if let Some(link) = self.lv(self.n(ix).tree).parent {
                index += self.n(self.n(link.node).left).total_count + 1;
                ix = link.node;
            } else {
                return index;
            }
        }
    }

    /// Parity of the absolute flattened index of `node`: `false` for even
    /// rows, `true` for odd rows.
    ///
    /// Computed from the cached parity bits alone, for zebra striping.
    pub fn node_parity_within_ancestor(&self, tree: TreeId, node: NodeId) -> bool {
        let mut ix = self.member_ix(self.tree_ix(tree), node);
        let mut parity = self.n(self.n(ix).left).parity;
        loop {
            let parent = self.n(ix).parent;
            if parent != NIL {
                let p = self.n(parent);
                if p.right == ix {
                    parity ^= p.parity ^ self.n(p.right).parity;
                }
                ix = parent;
            } else if let Some(link) = self.lv(self.n(ix).tree).parent {
                parity ^= !self.n(self.n(link.node).left).parity;
                ix = link.node;
            } else {
                return parity;
            }
        }
    }

    /// Number of levels enclosing `tree`; 0 for a top-level tree.
    pub fn depth(&self, tree: TreeId) -> usize {
        let mut t = self.tree_ix(tree);
        let mut depth = 0;
        while let Some(link) = self.lv(t).parent {
            depth += 1;
            t = link.tree;
        }
        depth
    }

    /// Whether `potential_child` is nested, directly or transitively, below
    /// `tree`.
    pub fn contains(&self, tree: TreeId, potential_child: TreeId) -> bool {
        let t = self.tree_ix(tree);
        let child = self.tree_ix(potential_child);
        self.level_contains(t, child)
    }

    // --- internals ---

    pub(crate) fn leftmost(&self, mut ix: usize) -> usize {
        if ix == NIL {
            return NIL;
        }
        while self.n(ix).left != NIL {
            ix = self.n(ix).left;
        }
        ix
    }

    pub(crate) fn rightmost(&self, mut ix: usize) -> usize {
        if ix == NIL {
            return NIL;
        }
        while self.n(ix).right != NIL {
            ix = self.n(ix).right;
        }
        ix
    }

    pub(crate) fn successor(&self, mut ix: usize) -> usize {
        let right = self.n(ix).right;
        if right != NIL {
            return self.leftmost(right);
        }
        loop {
            let parent = self.n(ix).parent;
            if parent == NIL || self.n(parent).left == ix {
                return parent;
            }
            ix = parent;
        }
    }

    pub(crate) fn predecessor(&self, mut ix: usize) -> usize {
        let left = self.n(ix).left;
        if left != NIL {
            return self.rightmost(left);
        }
        loop {
            let parent = self.n(ix).parent;
            if parent == NIL || self.n(parent).right == ix {
                return parent;
            }
            ix = parent;
        }
    }

    /// Flattened successor of `(t, ix)`. With `scope`, never climbs out of
    /// that level.
    fn next_full_slot(&self, t: usize, ix: usize, scope: Option<usize>) -> Option<(usize, usize)> {
        if let Some(c) = self.n(ix).children {
            let first = self.leftmost(self.lv(c).root);
            if first != NIL {
                return Some((c, first));
            }
        }
        let (mut t, mut ix) = (t, ix);
        loop {
            let next = self.successor(ix);
            if next != NIL {
                return Some((t, next));
            }
            if scope == Some(t) {
                return None;
            }
            let link = self.lv(t).parent?;
            (t, ix) = (link.tree, link.node);
        }
    }
}

/// Iterator over a tree's rows in flattened order, created by
/// [`RowTree::iter_full`].
///
/// Yields `(level, row)` pairs and never leaves the starting tree.
#[derive(Clone, Debug)]
pub struct FullIter<'a> {
    rows: &'a RowTree,
    scope: usize,
    next: Option<(usize, usize)>,
}

impl Iterator for FullIter<'_> {
    type Item = (TreeId, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let (t, ix) = self.next?;
        self.next = self.rows.next_full_slot(t, ix, Some(self.scope));
        Some((self.rows.tree_id(t), self.rows.node_id(ix)))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::{NodeId, OffsetHit, RowTree, TraverseOrder, TreeId};

    /// Scenario tree: `[10, 20, 5, 15, 8]` with `[3, 4]` nested under the
    /// third row.
    fn nested_rows() -> (RowTree, TreeId, Vec<NodeId>, TreeId, Vec<NodeId>) {
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
    fn find_by_offset_in_flat_tree() {
        let (mut rows, top, ids, nested, _) = nested_rows();
        rows.remove_tree(nested);

        // Cumulative offsets 0, 10, 30, 35, 50, 58.
        let hit = rows.find_node_by_offset(top, 33).unwrap();
        assert_eq!(
            hit,
            OffsetHit {
                tree: top,
                node: ids[2],
                offset_in_node: 3
            }
        );
        assert_eq!(rows.find_node_by_offset(top, 0).unwrap().node, ids[0]);
        assert_eq!(rows.find_node_by_offset(top, 9).unwrap().node, ids[0]);
        assert_eq!(rows.find_node_by_offset(top, 10).unwrap().node, ids[1]);
        assert_eq!(rows.find_node_by_offset(top, 57).unwrap().node, ids[4]);
        assert_eq!(rows.find_node_by_offset(top, 58), None);
        assert_eq!(rows.find_node_by_offset(top, -1), None);
    }

    #[test]
    fn find_by_offset_descends_into_nested_rows() {
        let (rows, top, ids, nested, kids) = nested_rows();
        // Flattened: 10, 20, 5, [3, 4], 15, 8.
        let hit = rows.find_node_by_offset(top, 36).unwrap();
        assert_eq!((hit.tree, hit.node, hit.offset_in_node), (nested, kids[0], 1));
        let hit = rows.find_node_by_offset(top, 41).unwrap();
        assert_eq!((hit.tree, hit.node, hit.offset_in_node), (nested, kids[1], 3));
        let hit = rows.find_node_by_offset(top, 42).unwrap();
        assert_eq!((hit.tree, hit.node, hit.offset_in_node), (top, ids[3], 0));
        let hit = rows.find_node_by_offset(top, 34).unwrap();
        assert_eq!((hit.tree, hit.node, hit.offset_in_node), (top, ids[2], 4));
    }

    #[test]
    fn find_by_count_stays_in_level() {
        let (rows, top, ids, nested, kids) = nested_rows();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(rows.find_node_by_count(top, i), Some(*id));
        }
        assert_eq!(rows.find_node_by_count(top, 5), None);
        assert_eq!(rows.find_node_by_count(nested, 1), Some(kids[1]));
    }

    #[test]
    fn find_index_and_node_index_agree() {
        let (rows, top, _, _, _) = nested_rows();
        let flat: Vec<_> = rows.iter_full(top).collect();
        assert_eq!(flat.len(), 7);
        for (i, &(tree, node)) in flat.iter().enumerate() {
            assert_eq!(rows.find_index(top, i), Some((tree, node)));
            assert_eq!(rows.node_index_within_ancestor(tree, node), i);
            assert_eq!(rows.node_parity_within_ancestor(tree, node), i % 2 == 1);
        }
        assert_eq!(rows.find_index(top, 7), None);
    }

    #[test]
    fn offsets_flatten_across_levels() {
        let (rows, top, _, nested, kids) = nested_rows();
        assert_eq!(rows.node_offset_within_ancestor(nested, kids[1]), 38);

        let mut expected = 0;
        for (tree, node) in rows.iter_full(top) {
            assert_eq!(rows.node_offset_within_ancestor(tree, node), expected);
            expected += rows.height(node).unwrap();
        }
        assert_eq!(expected, rows.total_offset(top));
    }

    #[test]
    fn full_walk_forward_and_backward() {
        let (rows, top, ids, nested, kids) = nested_rows();
        let mut forward = Vec::new();
        let mut cur = Some((top, ids[0]));
        while let Some((t, n)) = cur {
            forward.push(n);
            cur = rows.next_full(t, n);
        }
        assert_eq!(forward, [ids[0], ids[1], ids[2], kids[0], kids[1], ids[3], ids[4]]);

        let mut backward = Vec::new();
        let mut cur = Some((top, ids[4]));
        while let Some((t, n)) = cur {
            backward.push(n);
            cur = rows.previous_full(t, n);
        }
        backward.reverse();
        assert_eq!(backward, forward);

        assert_eq!(rows.previous_full(nested, kids[0]), Some((top, ids[2])));
        assert_eq!(rows.next_full(nested, kids[1]), Some((top, ids[3])));
        assert_eq!(rows.next(top, ids[4]), None);
        assert_eq!(rows.previous(top, ids[0]), None);
    }

    #[test]
    fn iter_full_is_scoped_to_its_tree() {
        let (rows, _, _, nested, kids) = nested_rows();
        let inner: Vec<_> = rows.iter_full(nested).map(|(_, n)| n).collect();
        assert_eq!(inner, kids);
    }

    #[test]
    fn depth_and_containment() {
        let (mut rows, top, _, nested, kids) = nested_rows();
        let deeper = rows.new_tree();
        rows.insert_after(deeper, None, 1);
        rows.attach_children(nested, kids[0], deeper);

        assert_eq!(rows.depth(top), 0);
        assert_eq!(rows.depth(nested), 1);
        assert_eq!(rows.depth(deeper), 2);
        assert!(rows.contains(top, deeper));
        assert!(rows.contains(nested, deeper));
        assert!(!rows.contains(deeper, top));
        assert!(!rows.contains(top, top));
    }

    #[test]
    fn empty_nested_tree_is_skipped() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let a = rows.insert_after(top, None, 1);
        let b = rows.insert_after(top, Some(a), 1);
        let empty = rows.new_tree();
        rows.attach_children(top, a, empty);

        assert_eq!(rows.next_full(top, a), Some((top, b)));
        assert_eq!(rows.previous_full(top, b), Some((top, a)));
        assert_eq!(rows.find_node_by_offset(top, 1).unwrap().node, b);
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn traverse_visits_one_level_structurally() {
        let (mut rows, top, ids, nested, kids) = nested_rows();
        // Five sequential appends: ids[1] at the root, ids[0] on the left,
        // ids[3] on the right with ids[2] and ids[4] below it.
        assert_eq!(rows.root_node(top), Some(ids[1]));

        let mut pre = Vec::new();
        rows.traverse(top, TraverseOrder::PreOrder, |n| pre.push(n));
        assert_eq!(pre, [ids[1], ids[0], ids[3], ids[2], ids[4]]);

        let mut post = Vec::new();
        rows.traverse(top, TraverseOrder::PostOrder, |n| post.push(n));
        assert_eq!(post, [ids[0], ids[2], ids[4], ids[3], ids[1]]);

        let mut inner = Vec::new();
        rows.traverse(nested, TraverseOrder::PreOrder, |n| inner.push(n));
        assert_eq!(inner, [kids[0], kids[1]]);

        let empty = rows.new_tree();
        rows.traverse(empty, TraverseOrder::PreOrder, |_| panic!("empty level"));
    }
}
