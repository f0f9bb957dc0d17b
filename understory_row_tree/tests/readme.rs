// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The README carries the crate docs, with intra-doc links flattened.

#[test]
fn readme_mirrors_crate_docs() {
    let lib = include_str!("../src/lib.rs");
    let readme = include_str!("../README.md");
    for line in lib.lines().filter_map(|l| l.strip_prefix("//!")) {
        let line = line.strip_prefix(' ').unwrap_or(line);
        let plain = line.replace("[`", "`").replace("`]", "`");
        assert!(readme.contains(&plain), "README.md is missing: {plain}");
    }
}
