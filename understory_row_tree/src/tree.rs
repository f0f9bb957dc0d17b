// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The row tree container: arenas, levels, and nesting.

use alloc::vec::Vec;
use smallvec::SmallVec;

use crate::node::{Level, NIL, NIL_NODE, Node, ParentLink};
use crate::types::{NodeId, RowFlags, TreeId, Validity};

/// A forest of augmented red-black trees backing a virtualized, hierarchical
/// list of rows.
///
/// Every level of the hierarchy (the top-level list, and the rows shown under
/// each expanded row) is its own red-black tree, addressed by a [`TreeId`].
/// Rows are addressed by [`NodeId`]. Each row carries its own height, and
/// every subtree caches its total height, row counts, and parity, so
/// position queries in both directions (offset to row, row to offset) run in
/// O(log n) per level.
///
/// An expanded row owns a nested level. Detaching that level
/// ([`RowTree::detach_children`]) collapses the row in O(log n) without losing
/// the nested rows; attaching it again restores them.
///
/// Mutations are contract APIs: passing a stale handle, or a row together
/// with a level it does not belong to, panics.
///
/// ## Example
///
/// ```rust
/// use understory_row_tree::RowTree;
///
/// let mut rows = RowTree::new();
/// let top = rows.root_tree();
/// let a = rows.insert_after(top, None, 10);
/// let b = rows.insert_after(top, Some(a), 20);
///
/// // Expand `a` with two nested rows.
/// let nested = rows.new_tree();
/// let a0 = rows.insert_after(nested, None, 3);
/// rows.insert_after(nested, Some(a0), 4);
/// rows.attach_children(top, a, nested);
///
/// assert_eq!(rows.total_offset(top), 37);
/// assert_eq!(rows.node_offset_within_ancestor(top, b), 17);
/// ```
pub struct RowTree {
    /// row slots
    nodes: Vec<Option<Node>>,
    /// last generation per row slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    /// level slots
    levels: Vec<Option<Level>>,
    level_generations: Vec<u32>,
    level_free_list: Vec<usize>,
    root: usize,
}

impl core::fmt::Debug for RowTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let levels = self.levels.iter().filter(|l| l.is_some()).count();
        f.debug_struct("RowTree")
            .field("nodes_total", &self.nodes.len())
            .field("nodes_alive", &alive)
            .field("free_list", &self.free_list.len())
            .field("levels_alive", &levels)
            .field("root", &self.root_tree())
            .finish_non_exhaustive()
    }
}

impl Default for RowTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RowTree {
    /// Create a container holding one empty top-level tree.
    pub fn new() -> Self {
        let mut rows = Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            levels: Vec::new(),
            level_generations: Vec::new(),
            level_free_list: Vec::new(),
            root: NIL,
        };
        rows.root = rows.alloc_level();
        rows
    }

    /// The top-level tree created by [`RowTree::new`].
    pub fn root_tree(&self) -> TreeId {
        self.tree_id(self.root)
    }

    /// Create a new, empty, detached tree.
    ///
    /// Fill it with [`RowTree::insert_after`]/[`RowTree::insert_before`] and
    /// hang it under a row with [`RowTree::attach_children`], or keep it as an
    /// independent top-level tree.
    pub fn new_tree(&mut self) -> TreeId {
        let t = self.alloc_level();
        self.tree_id(t)
    }

    /// Free a detached tree and every row in it, nested levels included.
    ///
    /// To free a tree that is currently attached, use [`RowTree::remove_tree`].
    ///
    /// # Panics
    ///
    /// Panics if `tree` is stale, still attached under a row, or is the
    /// container's [root tree](RowTree::root_tree).
    pub fn free_tree(&mut self, tree: TreeId) {
        let t = self.tree_ix(tree);
        assert!(
            self.lv(t).parent.is_none(),
            "free_tree on an attached tree; use remove_tree"
        );
        assert!(t != self.root, "the root tree cannot be freed");
        self.free_level(t);
    }

    /// Make `tree` the nested level of `node`, expanding the row.
    ///
    /// The ancestors of `node`, across every enclosing level, grow by the
    /// tree's total offset and row count.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, `node` is not in `parent`, `node` already
    /// has children, `tree` is already attached, or `tree` encloses `parent`.
    pub fn attach_children(&mut self, parent: TreeId, node: NodeId, tree: TreeId) {
        let p = self.tree_ix(parent);
        let ix = self.member_ix(p, node);
        let t = self.tree_ix(tree);
        assert!(self.n(ix).children.is_none(), "row already has children");
        assert!(self.lv(t).parent.is_none(), "tree is already attached");
        assert!(
            t != p && !self.level_contains(t, p),
            "attaching a tree below itself"
        );
        assert!(t != self.root, "the root tree cannot be nested");

        let root = self.lv(t).root;
        let (total, offset) = (self.n(root).total_count, self.n(root).offset);
        self.n_mut(ix).children = Some(t);
        self.lv_mut(t).parent = Some(ParentLink { tree: p, node: ix });
        log::debug!("attach {tree:?} under {node:?}: {total} rows, offset {offset}");
        self.adjust(ix, 0, signed(total), offset);
        self.debug_check("attach_children");
    }

    /// Detach the nested level of `node`, collapsing the row.
    ///
    /// The nested tree keeps all of its rows and becomes a detached tree that
    /// can be attached again, or freed with [`RowTree::free_tree`]. Returns
    /// `None` if the row had no children.
    pub fn detach_children(&mut self, tree: TreeId, node: NodeId) -> Option<TreeId> {
        let p = self.tree_ix(tree);
        let ix = self.member_ix(p, node);
        let t = self.n(ix).children?;

        let root = self.lv(t).root;
        let (total, offset) = (self.n(root).total_count, self.n(root).offset);
        self.n_mut(ix).children = None;
        self.lv_mut(t).parent = None;
        log::debug!("detach children of {node:?}: {total} rows, offset {offset}");
        self.adjust(ix, 0, -signed(total), -offset);
        self.debug_check("detach_children");
        Some(self.tree_id(t))
    }

    /// Returns true if `id` refers to a live row.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Returns true if `id` refers to a live tree.
    pub fn is_tree_alive(&self, id: TreeId) -> bool {
        self.levels
            .get(id.idx())
            .and_then(|l| l.as_ref())
            .map(|l| l.generation == id.1)
            .unwrap_or(false)
    }

    /// The level a live row belongs to.
    pub fn tree_of(&self, node: NodeId) -> Option<TreeId> {
        if !self.is_alive(node) {
            return None;
        }
        Some(self.tree_id(self.n(node.idx()).tree))
    }

    /// The nested level of a row, if it is expanded.
    pub fn children(&self, node: NodeId) -> Option<TreeId> {
        if !self.is_alive(node) {
            return None;
        }
        self.n(node.idx()).children.map(|t| self.tree_id(t))
    }

    /// The row owning `tree` and that row's level, or `None` for a top-level
    /// or stale tree.
    pub fn parent_of_tree(&self, tree: TreeId) -> Option<(TreeId, NodeId)> {
        if !self.is_tree_alive(tree) {
            return None;
        }
        let link = self.lv(tree.idx()).parent?;
        Some((self.tree_id(link.tree), self.node_id(link.node)))
    }

    /// The row's own height.
    pub fn height(&self, node: NodeId) -> Option<i64> {
        self.is_alive(node).then(|| self.n(node.idx()).height)
    }

    /// Total height of the subtree rooted at `node`: its own height, both
    /// in-level subtrees, and its nested rows.
    pub fn subtree_offset(&self, node: NodeId) -> Option<i64> {
        self.is_alive(node).then(|| self.n(node.idx()).offset)
    }

    /// Number of rows in the subtree rooted at `node`, within its level only.
    pub fn subtree_count(&self, node: NodeId) -> Option<usize> {
        self.is_alive(node).then(|| self.n(node.idx()).count)
    }

    /// Number of rows in the subtree rooted at `node`, nested rows included.
    pub fn subtree_total_count(&self, node: NodeId) -> Option<usize> {
        self.is_alive(node).then(|| self.n(node.idx()).total_count)
    }

    /// Total height of every row in `tree`, nested rows included.
    pub fn total_offset(&self, tree: TreeId) -> i64 {
        let t = self.tree_ix(tree);
        self.n(self.lv(t).root).offset
    }

    /// Number of rows directly in `tree`.
    pub fn len(&self, tree: TreeId) -> usize {
        let t = self.tree_ix(tree);
        self.n(self.lv(t).root).count
    }

    /// Returns `true` if `tree` has no rows.
    pub fn is_empty(&self, tree: TreeId) -> bool {
        self.len(tree) == 0
    }

    /// Number of rows in `tree`, nested rows included.
    pub fn total_count(&self, tree: TreeId) -> usize {
        let t = self.tree_ix(tree);
        self.n(self.lv(t).root).total_count
    }

    /// The root row of `tree`, if it has any rows.
    pub fn root_node(&self, tree: TreeId) -> Option<NodeId> {
        let t = self.tree_ix(tree);
        self.opt_id(self.lv(t).root)
    }

    /// The caller flags of a live row.
    pub fn flags(&self, node: NodeId) -> Option<RowFlags> {
        self.is_alive(node).then(|| self.n(node.idx()).flags)
    }

    /// Replace the caller flags of a row.
    ///
    /// # Panics
    ///
    /// Panics if `node` is stale.
    pub fn set_flags(&mut self, node: NodeId, flags: RowFlags) {
        let ix = self.node_ix(node);
        self.n_mut(ix).flags = flags;
    }

    /// The measurement state of a live row.
    pub fn validity(&self, node: NodeId) -> Option<Validity> {
        self.is_alive(node).then(|| self.n(node.idx()).validity)
    }

    // --- internals ---

    pub(crate) fn n(&self, ix: usize) -> &Node {
        if ix == NIL {
            return &NIL_NODE;
        }
        self.nodes[ix].as_ref().expect("dangling row slot")
    }

    pub(crate) fn n_mut(&mut self, ix: usize) -> &mut Node {
        debug_assert!(ix != NIL, "the sentinel is immutable");
        self.nodes[ix].as_mut().expect("dangling row slot")
    }

    pub(crate) fn lv(&self, t: usize) -> &Level {
        self.levels[t].as_ref().expect("dangling tree slot")
    }

    pub(crate) fn lv_mut(&mut self, t: usize) -> &mut Level {
        self.levels[t].as_mut().expect("dangling tree slot")
    }

    /// Slot of a live row; panics on stale handles.
    pub(crate) fn node_ix(&self, id: NodeId) -> usize {
        assert!(self.is_alive(id), "stale {id:?}");
        id.idx()
    }

    /// Slot of a live tree; panics on stale handles.
    pub(crate) fn tree_ix(&self, id: TreeId) -> usize {
        assert!(self.is_tree_alive(id), "stale {id:?}");
        id.idx()
    }

    /// Slot of a live row that must belong to level `t`.
    pub(crate) fn member_ix(&self, t: usize, id: NodeId) -> usize {
        let ix = self.node_ix(id);
        assert!(self.n(ix).tree == t, "{id:?} does not belong to the given tree");
        ix
    }

    pub(crate) fn node_id(&self, ix: usize) -> NodeId {
        NodeId::new(ix, self.n(ix).generation)
    }

    pub(crate) fn opt_id(&self, ix: usize) -> Option<NodeId> {
        (ix != NIL).then(|| self.node_id(ix))
    }

    pub(crate) fn tree_id(&self, t: usize) -> TreeId {
        TreeId::new(t, self.lv(t).generation)
    }

    pub(crate) fn alloc_node(&mut self, tree: usize, height: i64) -> usize {
        if let Some(ix) = self.free_list.pop() {
            let generation = self.generations[ix].saturating_add(1);
            self.generations[ix] = generation;
            self.nodes[ix] = Some(Node::new(generation, tree, height));
            ix
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, tree, height)));
            self.generations.push(generation);
            self.nodes.len() - 1
        }
    }

    pub(crate) fn free_node(&mut self, ix: usize) {
        self.nodes[ix] = None;
        self.free_list.push(ix);
    }

    fn alloc_level(&mut self) -> usize {
        if let Some(t) = self.level_free_list.pop() {
            let generation = self.level_generations[t].saturating_add(1);
            self.level_generations[t] = generation;
            self.levels[t] = Some(Level::new(generation));
            t
        } else {
            let generation = 1_u32;
            self.levels.push(Some(Level::new(generation)));
            self.level_generations.push(generation);
            self.levels.len() - 1
        }
    }

    /// Free level `t`, its rows, and every level nested below them.
    ///
    /// Rows are freed post-order, each row's nested level before the row.
    pub(crate) fn free_level(&mut self, t: usize) {
        let mut pending: SmallVec<[usize; 8]> = SmallVec::new();
        pending.push(t);
        while let Some(t) = pending.pop() {
            for ix in self.post_order(self.lv(t).root) {
                if let Some(c) = self.n(ix).children {
                    pending.push(c);
                }
                self.free_node(ix);
            }
            self.levels[t] = None;
            self.level_free_list.push(t);
        }
    }

    /// Slots of the subtree rooted at `root`, children before parents.
    pub(crate) fn post_order(&self, root: usize) -> Vec<usize> {
        let mut out = Vec::new();
        if root == NIL {
            return out;
        }
        // Reverse of a (node, right, left) pre-order is a (left, right, node) post-order.
        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(root);
        while let Some(ix) = stack.pop() {
            out.push(ix);
            let n = self.n(ix);
            if n.left != NIL {
                stack.push(n.left);
            }
            if n.right != NIL {
                stack.push(n.right);
            }
        }
        out.reverse();
        out
    }

    /// Whether level `child` is nested (transitively) below level `t`.
    pub(crate) fn level_contains(&self, t: usize, child: usize) -> bool {
        let mut cur = self.lv(child).parent;
        while let Some(link) = cur {
            if link.tree == t {
                return true;
            }
            cur = self.lv(link.tree).parent;
        }
        false
    }

    /// Slots of every live level without a parent.
    pub(crate) fn top_levels(&self) -> impl Iterator<Item = usize> + '_ {
        self.levels
            .iter()
            .enumerate()
            .filter_map(|(t, l)| match l {
                Some(l) if l.parent.is_none() => Some(t),
                _ => None,
            })
    }

    pub(crate) fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }
}

#[allow(
    clippy::cast_possible_wrap,
    reason = "Row counts never approach isize::MAX."
)]
pub(crate) const fn signed(n: usize) -> isize {
    n as isize
}

#[cfg(test)]
mod tests {
    use super::RowTree;

    #[test]
    fn new_tree_is_empty_and_alive() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        assert!(rows.is_tree_alive(top));
        assert!(rows.is_empty(top));
        assert_eq!(rows.total_offset(top), 0);
        assert_eq!(rows.root_node(top), None);

        let other = rows.new_tree();
        assert_ne!(top, other);
        assert!(rows.is_tree_alive(other));
        assert_eq!(rows.parent_of_tree(other), None);
    }

    #[test]
    fn liveness_remove_and_reuse() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let a = rows.insert_after(top, None, 10);
        assert!(rows.is_alive(a));
        rows.remove_node(top, a);
        assert!(!rows.is_alive(a));
        assert_eq!(rows.height(a), None);

        // The freed slot is reused with a bumped generation.
        let b = rows.insert_after(top, None, 5);
        assert_eq!(a.0, b.0);
        assert!(b.1 > a.1, "generation must increase on reuse");
        assert!(rows.is_alive(b));
        assert!(!rows.is_alive(a));
    }

    #[test]
    fn attach_and_detach_preserve_nested_rows() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let a = rows.insert_after(top, None, 10);
        let nested = rows.new_tree();
        let x = rows.insert_after(nested, None, 3);
        rows.insert_after(nested, Some(x), 4);

        rows.attach_children(top, a, nested);
        assert_eq!(rows.children(a), Some(nested));
        assert_eq!(rows.parent_of_tree(nested), Some((top, a)));
        assert_eq!(rows.total_offset(top), 17);
        assert_eq!(rows.total_count(top), 3);
        assert_eq!(rows.len(top), 1);

        // Collapsing keeps the nested rows around.
        assert_eq!(rows.detach_children(top, a), Some(nested));
        assert_eq!(rows.total_offset(top), 10);
        assert_eq!(rows.total_count(top), 1);
        assert_eq!(rows.total_offset(nested), 7);
        assert!(rows.is_alive(x));
        assert_eq!(rows.detach_children(top, a), None);

        // Expanding again restores them.
        rows.attach_children(top, a, nested);
        assert_eq!(rows.total_offset(top), 17);
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn free_tree_frees_nested_levels() {
        let mut rows = RowTree::new();
        let outer = rows.new_tree();
        let a = rows.insert_after(outer, None, 1);
        let inner = rows.new_tree();
        let b = rows.insert_after(inner, None, 2);
        rows.attach_children(outer, a, inner);

        rows.free_tree(outer);
        assert!(!rows.is_tree_alive(outer));
        assert!(!rows.is_tree_alive(inner));
        assert!(!rows.is_alive(a));
        assert!(!rows.is_alive(b));
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    #[should_panic(expected = "attaching a tree below itself")]
    fn attaching_an_ancestor_panics() {
        let mut rows = RowTree::new();
        let outer = rows.new_tree();
        let a = rows.insert_after(outer, None, 1);
        let inner = rows.new_tree();
        let b = rows.insert_after(inner, None, 1);
        rows.attach_children(outer, a, inner);
        rows.attach_children(inner, b, outer);
    }

    #[test]
    #[should_panic(expected = "does not belong to the given tree")]
    fn foreign_row_panics() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let other = rows.new_tree();
        let a = rows.insert_after(other, None, 1);
        rows.set_own_height(top, a, 3);
    }
}
