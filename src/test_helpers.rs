//! Shared test utilities for the permute-layers test suite.
//!
//! Builders for small [`LayerTree`]s and on-disk fixture images.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut tree = canvas();
//! let hair = add_group(&mut tree, None, "Hair (prm)");
//! add_leaf(&mut tree, Some(hair), "Short");
//! add_leaf(&mut tree, Some(hair), "Long");
//! hide(&mut tree, hair, "Bald");
//!
//! assert!(find(&tree, "Hair (prm)/Long").is_some());
//! ```

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};

use crate::tree::{Attributes, BlendMode, LayerTree, LeafSource, NodeId};

/// Side length of the canvas built by [`canvas`].
pub const CANVAS_SIZE: u32 = 64;

// =========================================================================
// Tree builders
// =========================================================================

/// Empty 64x64 tree.
pub fn canvas() -> LayerTree {
    LayerTree::new(CANVAS_SIZE, CANVAS_SIZE)
}

/// Visible, opaque, normal attributes at canvas size.
pub fn attrs(name: &str) -> Attributes {
    Attributes::new(name, CANVAS_SIZE, CANVAS_SIZE)
}

/// Add a leaf whose pixels would come from `<name>.png`.
pub fn add_leaf(tree: &mut LayerTree, parent: Option<NodeId>, name: &str) -> NodeId {
    add_leaf_with(tree, parent, attrs(name))
}

pub fn add_leaf_with(tree: &mut LayerTree, parent: Option<NodeId>, attrs: Attributes) -> NodeId {
    let path = PathBuf::from(format!("{}.png", attrs.name));
    tree.add_leaf(parent, attrs, LeafSource { path, offset: (0, 0) })
}

/// Add a leaf at the given opacity.
pub fn add_faded_leaf(
    tree: &mut LayerTree,
    parent: Option<NodeId>,
    name: &str,
    opacity: f64,
) -> NodeId {
    let mut attrs = attrs(name);
    attrs.opacity = opacity;
    add_leaf_with(tree, parent, attrs)
}

/// Add an invisible leaf.
pub fn hide(tree: &mut LayerTree, parent: NodeId, name: &str) -> NodeId {
    let mut attrs = attrs(name);
    attrs.visible = false;
    add_leaf_with(tree, Some(parent), attrs)
}

pub fn add_group(tree: &mut LayerTree, parent: Option<NodeId>, name: &str) -> NodeId {
    tree.add_group(parent, attrs(name), None)
}

/// Add a group with a naming template attached.
pub fn add_templated_group(
    tree: &mut LayerTree,
    parent: Option<NodeId>,
    name: &str,
    template: &str,
) -> NodeId {
    tree.add_group(parent, attrs(name), Some(template.to_string()))
}

/// Add a group with its own opacity and blend mode.
pub fn add_styled_group(
    tree: &mut LayerTree,
    parent: Option<NodeId>,
    name: &str,
    opacity: f64,
    mode: BlendMode,
) -> NodeId {
    let mut attrs = attrs(name);
    attrs.opacity = opacity;
    attrs.blend_mode = mode;
    tree.add_group(parent, attrs, None)
}

// =========================================================================
// Lookups
// =========================================================================

/// Resolve a slash-separated path of names, e.g. `"Body/Eyes (prm)"`.
pub fn find(tree: &LayerTree, path: &str) -> Option<NodeId> {
    let mut candidates = tree.roots();
    let mut found = None;
    for segment in path.split('/') {
        let id = candidates
            .iter()
            .copied()
            .find(|id| tree.node(*id).name() == segment)?;
        candidates = tree.children(id);
        found = Some(id);
    }
    found
}

// =========================================================================
// Fixture images
// =========================================================================

/// Write a solid-color PNG into `dir` and return its path.
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: Rgba<u8>) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_pixel(width, height, color)
        .save(&path)
        .unwrap();
    path
}
