// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rotations and red-black fixups.
//!
//! Everything here works on a single level. Rotations only re-derive the
//! augmented fields of the two rotated rows; the aggregates of rows above the
//! rotation are unchanged by a rotation, and growth or shrinkage of the level
//! is propagated by the callers in `mutate`.

use crate::node::NIL;
use crate::tree::RowTree;
use crate::types::Color;

impl RowTree {
    /// Replace `old` by `new` in the child slot of `parent` (or as the root of
    /// level `t` when `parent` is the sentinel).
    pub(crate) fn replace_child(&mut self, t: usize, parent: usize, old: usize, new: usize) {
        if parent == NIL {
            self.lv_mut(t).root = new;
        } else if self.n(parent).left == old {
            self.n_mut(parent).left = new;
        } else {
            self.n_mut(parent).right = new;
        }
    }

    pub(crate) fn rotate_left(&mut self, t: usize, ix: usize) {
        let right = self.n(ix).right;
        debug_assert!(ix != NIL && right != NIL, "rotate_left needs a right child");

        let inner = self.n(right).left;
        self.n_mut(ix).right = inner;
        if inner != NIL {
            self.n_mut(inner).parent = ix;
        }

        let parent = self.n(ix).parent;
        self.n_mut(right).parent = parent;
        self.replace_child(t, parent, ix, right);

        self.n_mut(right).left = ix;
        self.n_mut(ix).parent = right;

        // `ix` is now below `right`: recombine bottom-up.
        self.recompute(ix);
        self.recompute(right);
    }

    pub(crate) fn rotate_right(&mut self, t: usize, ix: usize) {
        let left = self.n(ix).left;
        debug_assert!(ix != NIL && left != NIL, "rotate_right needs a left child");

        let inner = self.n(left).right;
        self.n_mut(ix).left = inner;
        if inner != NIL {
            self.n_mut(inner).parent = ix;
        }

        let parent = self.n(ix).parent;
        self.n_mut(left).parent = parent;
        self.replace_child(t, parent, ix, left);

        self.n_mut(left).right = ix;
        self.n_mut(ix).parent = left;

        self.recompute(ix);
        self.recompute(left);
    }

    fn is_red(&self, ix: usize) -> bool {
        self.n(ix).is_red()
    }

    fn set_color(&mut self, ix: usize, color: Color) {
        if ix != NIL {
            self.n_mut(ix).color = color;
        }
    }

    /// Restore the red-black properties after `ix` was linked in as a red leaf.
    pub(crate) fn insert_fixup(&mut self, t: usize, mut ix: usize) {
        while ix != self.lv(t).root && self.is_red(self.n(ix).parent) {
            let parent = self.n(ix).parent;
            let grandparent = self.n(parent).parent;
            if parent == self.n(grandparent).left {
                let uncle = self.n(grandparent).right;
                if self.is_red(uncle) {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    ix = grandparent;
                } else {
                    if ix == self.n(parent).right {
                        ix = parent;
                        self.rotate_left(t, ix);
                    }
                    let parent = self.n(ix).parent;
                    let grandparent = self.n(parent).parent;
                    self.set_color(parent, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    self.rotate_right(t, grandparent);
                }
            } else {
                let uncle = self.n(grandparent).left;
                if self.is_red(uncle) {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    ix = grandparent;
                } else {
                    if ix == self.n(parent).left {
                        ix = parent;
                        self.rotate_right(t, ix);
                    }
                    let parent = self.n(ix).parent;
                    let grandparent = self.n(parent).parent;
                    self.set_color(parent, Color::Black);
                    self.set_color(grandparent, Color::Red);
                    self.rotate_left(t, grandparent);
                }
            }
        }
        let root = self.lv(t).root;
        self.set_color(root, Color::Black);
    }

    /// Resolve the double-black left at `ix` (possibly the sentinel) below
    /// `parent` after a black row was spliced out.
    ///
    /// The sentinel has no parent link, so `parent` is tracked explicitly.
    pub(crate) fn delete_fixup(&mut self, t: usize, mut ix: usize, mut parent: usize) {
        while ix != self.lv(t).root && !self.is_red(ix) {
            if ix == self.n(parent).left {
                let mut sibling = self.n(parent).right;
                if self.is_red(sibling) {
                    self.set_color(sibling, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_left(t, parent);
                    sibling = self.n(parent).right;
                }
                let s = self.n(sibling);
                if !self.is_red(s.left) && !self.is_red(s.right) {
                    self.set_color(sibling, Color::Red);
                    ix = parent;
                } else {
                    if !self.is_red(s.right) {
                        let inner = s.left;
                        self.set_color(inner, Color::Black);
                        self.set_color(sibling, Color::Red);
                        self.rotate_right(t, sibling);
                        sibling = self.n(parent).right;
                    }
                    let color = self.n(parent).color;
                    self.set_color(sibling, color);
                    self.set_color(parent, Color::Black);
                    let outer = self.n(sibling).right;
                    self.set_color(outer, Color::Black);
                    self.rotate_left(t, parent);
                    ix = self.lv(t).root;
                }
            } else {
                let mut sibling = self.n(parent).left;
                if self.is_red(sibling) {
                    self.set_color(sibling, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_right(t, parent);
                    sibling = self.n(parent).left;
                }
                let s = self.n(sibling);
                if !self.is_red(s.right) && !self.is_red(s.left) {
                    self.set_color(sibling, Color::Red);
                    ix = parent;
                } else {
                    if !self.is_red(s.left) {
                        let inner = s.right;
                        self.set_color(inner, Color::Black);
                        self.set_color(sibling, Color::Red);
                        self.rotate_left(t, sibling);
                        sibling = self.n(parent).left;
                    }
                    let color = self.n(parent).color;
                    self.set_color(sibling, color);
                    self.set_color(parent, Color::Black);
                    let outer = self.n(sibling).left;
                    self.set_color(outer, Color::Black);
                    self.rotate_right(t, parent);
                    ix = self.lv(t).root;
                }
            }
            parent = self.n(ix).parent;
        }
        self.set_color(ix, Color::Black);
    }
}
