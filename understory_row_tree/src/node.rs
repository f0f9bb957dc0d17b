// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena records for rows and levels, and recomputation of augmented fields.

use crate::tree::RowTree;
use crate::types::{Color, RowFlags, Validity};

/// Reserved slot index of the shared sentinel leaf.
pub(crate) const NIL: usize = usize::MAX;

/// The sentinel: black, no payload, every aggregate zero. Never mutated.
pub(crate) static NIL_NODE: Node = Node {
    generation: 0,
    tree: NIL,
    color: Color::Black,
    left: NIL,
    right: NIL,
    parent: NIL,
    height: 0,
    offset: 0,
    count: 0,
    total_count: 0,
    parity: false,
    children: None,
    flags: RowFlags::empty(),
    validity: Validity::empty(),
};

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) generation: u32,
    /// Slot of the level this row belongs to. Rows never change level.
    pub(crate) tree: usize,
    pub(crate) color: Color,
    pub(crate) left: usize,
    pub(crate) right: usize,
    pub(crate) parent: usize,
    /// The row's own height.
    pub(crate) height: i64,
    /// `height + left.offset + right.offset + children.root.offset`.
    pub(crate) offset: i64,
    /// `1 + left.count + right.count`.
    pub(crate) count: usize,
    /// `1 + left.total_count + right.total_count + children.root.total_count`.
    pub(crate) total_count: usize,
    /// `total_count` modulo 2.
    pub(crate) parity: bool,
    /// Owned nested level, present while the row is expanded.
    pub(crate) children: Option<usize>,
    pub(crate) flags: RowFlags,
    pub(crate) validity: Validity,
}

impl Node {
    pub(crate) fn new(generation: u32, tree: usize, height: i64) -> Self {
        Self {
            generation,
            tree,
            color: Color::Red,
            left: NIL,
            right: NIL,
            parent: NIL,
            height,
            offset: height,
            count: 1,
            total_count: 1,
            parity: true,
            children: None,
            flags: RowFlags::empty(),
            validity: Validity::empty(),
        }
    }

    pub(crate) fn is_red(&self) -> bool {
        self.color == Color::Red
    }
}

/// Back-link from a nested level to the row that owns it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct ParentLink {
    pub(crate) tree: usize,
    pub(crate) node: usize,
}

/// One level of the hierarchy.
#[derive(Clone, Debug)]
pub(crate) struct Level {
    pub(crate) generation: u32,
    pub(crate) root: usize,
    pub(crate) parent: Option<ParentLink>,
}

impl Level {
    pub(crate) fn new(generation: u32) -> Self {
        Self {
            generation,
            root: NIL,
            parent: None,
        }
    }
}

impl RowTree {
    /// Root of the nested level owned by `ix`, or [`NIL`].
    pub(crate) fn children_root(&self, ix: usize) -> usize {
        match self.n(ix).children {
            Some(t) => self.lv(t).root,
            None => NIL,
        }
    }

    /// Re-derive every augmented field of `ix` from its own payload and its
    /// (already correct) left, right and nested children.
    pub(crate) fn recompute(&mut self, ix: usize) {
        let n = self.n(ix);
        let (l, r, c) = (self.n(n.left), self.n(n.right), self.n(self.children_root(ix)));

        let offset = n.height + l.offset + r.offset + c.offset;
        let count = 1 + l.count + r.count;
        let total_count = 1 + l.total_count + r.total_count + c.total_count;
        let parity = true ^ l.parity ^ r.parity ^ c.parity;

        let n = self.n_mut(ix);
        n.offset = offset;
        n.count = count;
        n.total_count = total_count;
        n.parity = parity;
        self.fixup_validation(ix);
    }

    /// Re-derive [`Validity::DESCENDANTS_INVALID`] for `ix`.
    pub(crate) fn fixup_validation(&mut self, ix: usize) {
        let n = self.n(ix);
        let dirty = n.validity.intersects(Validity::OWN)
            || self.n(n.left).validity.contains(Validity::DESCENDANTS_INVALID)
            || self.n(n.right).validity.contains(Validity::DESCENDANTS_INVALID)
            || self
                .n(self.children_root(ix))
                .validity
                .contains(Validity::DESCENDANTS_INVALID);
        self.n_mut(ix)
            .validity
            .set(Validity::DESCENDANTS_INVALID, dirty);
    }
}
