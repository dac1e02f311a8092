//! Read-only model of the layer hierarchy being permuted.
//!
//! A [`LayerTree`] is an arena of [`Node`]s addressed by [`NodeId`]. Every
//! node is either a leaf (pixels from an image file) or a group with ordered
//! children. Children are listed **top-to-bottom**, the way a layers panel
//! shows them; anything that builds a compositing stack must reverse them.
//!
//! ## Reserved name tags
//!
//! Two tags in a group's name control how the engine treats it:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `(prm)` | Combinatorial: the children are alternatives, not a fixed stack |
//! | `(hasbg)` | At least one alternative contributes a fixed sub-stack |
//!
//! Tags are read once, when the group is added to the tree, and stored as
//! explicit flags on [`Group`]. Nothing downstream inspects names for tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Name tag marking a combinatorial group.
pub const COMBINATORIAL_TAG: &str = "(prm)";
/// Name tag marking a combinatorial group whose alternatives carry a background.
pub const BACKGROUND_TAG: &str = "(hasbg)";

/// Index of a node inside the [`LayerTree`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a layer is combined with the layers beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Difference,
    Addition,
    Subtract,
}

impl BlendMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::Difference => "difference",
            BlendMode::Addition => "addition",
            BlendMode::Subtract => "subtract",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combine a parent's opacity with a child's, both on the 0–100 scale.
///
/// `compose_opacity(80.0, 50.0) == 40.0`
pub fn compose_opacity(parent: f64, child: f64) -> f64 {
    parent * child / 100.0
}

/// Visual attributes shared by leaves and groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub name: String,
    pub visible: bool,
    /// Carried through from the source document; the engine ignores it.
    pub linked: bool,
    /// 0–100
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub width: u32,
    pub height: u32,
}

impl Attributes {
    /// Visible, unlinked, fully opaque, normal blending.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            visible: true,
            linked: false,
            opacity: 100.0,
            blend_mode: BlendMode::Normal,
            width,
            height,
        }
    }
}

/// Where a leaf's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafSource {
    pub path: PathBuf,
    /// Position of the image's top-left corner on the canvas.
    pub offset: (i32, i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Top-to-bottom.
    pub children: Vec<NodeId>,
    pub combinatorial: bool,
    pub has_background: bool,
    /// Naming template attached through the settings editor, verbatim.
    pub naming_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf(LeafSource),
    Group(Group),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub attrs: Attributes,
    /// `None` for nodes directly under the root.
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.attrs.name
    }

    pub fn group(&self) -> Option<&Group> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.group().is_some()
    }

    pub fn is_combinatorial(&self) -> bool {
        self.group().is_some_and(|g| g.combinatorial)
    }

    pub fn has_background(&self) -> bool {
        self.group().is_some_and(|g| g.has_background)
    }

    pub fn naming_template(&self) -> Option<&str> {
        self.group().and_then(|g| g.naming_template.as_deref())
    }
}

/// The full hierarchy plus the canvas size it lives on.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerTree {
    width: u32,
    height: u32,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl LayerTree {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Append a leaf below the existing children of `parent` (or the root).
    pub fn add_leaf(
        &mut self,
        parent: Option<NodeId>,
        attrs: Attributes,
        source: LeafSource,
    ) -> NodeId {
        self.push(parent, attrs, NodeKind::Leaf(source))
    }

    /// Append a group below the existing children of `parent` (or the root).
    ///
    /// The combinatorial and has-background flags are derived from the
    /// reserved tags in `attrs.name`.
    pub fn add_group(
        &mut self,
        parent: Option<NodeId>,
        attrs: Attributes,
        naming_template: Option<String>,
    ) -> NodeId {
        let group = Group {
            children: Vec::new(),
            combinatorial: attrs.name.contains(COMBINATORIAL_TAG),
            has_background: attrs.name.contains(BACKGROUND_TAG),
            naming_template,
        };
        self.push(parent, attrs, NodeKind::Group(group))
    }

    fn push(&mut self, parent: Option<NodeId>, attrs: Attributes, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            attrs,
            parent,
            kind,
        });
        match parent {
            Some(parent_id) => match &mut self.nodes[parent_id.0].kind {
                NodeKind::Group(group) => group.children.push(id),
                NodeKind::Leaf(_) => {
                    // Leaves cannot hold children; re-home the node at the root.
                    self.nodes[id.0].parent = None;
                    self.roots.push(id);
                }
            },
            None => self.roots.push(id),
        }
        id
    }

    /// Look up a node. `id` must come from this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes, top-to-bottom.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Children of a group, top-to-bottom. Empty for leaves.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Group(group) => &group.children,
            NodeKind::Leaf(_) => &[],
        }
    }

    pub fn visible_roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots
            .iter()
            .copied()
            .filter(|id| self.node(*id).attrs.visible)
    }

    pub fn visible_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.node(*child).attrs.visible)
    }

    /// Depth-first walk in panel order, yielding `(id, depth)`.
    pub fn walk(&self) -> Vec<(NodeId, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut pending: Vec<(NodeId, usize)> =
            self.roots.iter().rev().map(|id| (*id, 0)).collect();
        while let Some((id, depth)) = pending.pop() {
            out.push((id, depth));
            pending.extend(self.children(id).iter().rev().map(|c| (*c, depth + 1)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn group_tags_are_read_from_the_name() {
        let mut tree = canvas();
        let plain = add_group(&mut tree, None, "Body");
        let prm = add_group(&mut tree, None, "Pose (prm)");
        let bg = add_group(&mut tree, None, "Pose (prm) (hasbg)");

        assert!(!tree.node(plain).is_combinatorial());
        assert!(tree.node(prm).is_combinatorial());
        assert!(!tree.node(prm).has_background());
        assert!(tree.node(bg).is_combinatorial());
        assert!(tree.node(bg).has_background());
    }

    #[test]
    fn leaves_never_carry_tags() {
        let mut tree = canvas();
        let leaf = add_leaf(&mut tree, None, "Sketch (prm)");
        assert!(!tree.node(leaf).is_group());
        assert!(!tree.node(leaf).is_combinatorial());
    }

    #[test]
    fn children_keep_panel_order() {
        let mut tree = canvas();
        let g = add_group(&mut tree, None, "Hair");
        let a = add_leaf(&mut tree, Some(g), "A");
        let b = add_leaf(&mut tree, Some(g), "B");
        let c = add_leaf(&mut tree, Some(g), "C");
        assert_eq!(tree.children(g), &[a, b, c]);
        assert_eq!(tree.node(b).parent, Some(g));
    }

    #[test]
    fn visible_children_skips_hidden() {
        let mut tree = canvas();
        let g = add_group(&mut tree, None, "Hair");
        let a = add_leaf(&mut tree, Some(g), "A");
        hide(&mut tree, g, "B");
        let c = add_leaf(&mut tree, Some(g), "C");
        assert_eq!(tree.visible_children(g).collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn walk_is_depth_first_in_panel_order() {
        let mut tree = canvas();
        let a = add_group(&mut tree, None, "A");
        let a1 = add_leaf(&mut tree, Some(a), "A1");
        let b = add_leaf(&mut tree, None, "B");
        assert_eq!(tree.walk(), vec![(a, 0), (a1, 1), (b, 0)]);
    }

    #[test]
    fn compose_opacity_scales_on_hundred() {
        assert_eq!(compose_opacity(80.0, 50.0), 40.0);
        assert_eq!(compose_opacity(100.0, 100.0), 100.0);
        assert_eq!(compose_opacity(0.0, 70.0), 0.0);
    }

    #[test]
    fn blend_mode_serializes_snake_case() {
        let json = serde_json::to_string(&BlendMode::Multiply).unwrap();
        assert_eq!(json, "\"multiply\"");
        let parsed: BlendMode = serde_json::from_str("\"difference\"").unwrap();
        assert_eq!(parsed, BlendMode::Difference);
    }
}
