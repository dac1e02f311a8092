//! Layer document: the on-disk description of a layered image.
//!
//! A document is a JSON file listing the canvas size and a tree of layers.
//! Entries with a `layers` array are groups; every other entry is a leaf
//! whose pixels come from an image file, resolved relative to the document.
//!
//! ```json
//! {
//!   "width": 512, "height": 512,
//!   "layers": [
//!     { "name": "Eyes (prm)",
//!       "metadata": { "permute-layer-groups-perm-format": "eyes-{0.name}" },
//!       "layers": [
//!         { "name": "Open",   "image": "eyes/open.png" },
//!         { "name": "Closed", "image": "eyes/closed.png", "offset": [12, 40] }
//!       ] },
//!     { "name": "Body", "image": "body.png", "opacity": 80.0, "mode": "multiply" }
//!   ]
//! }
//! ```
//!
//! Layers are listed top-to-bottom. Per-layer `metadata` is a free-form
//! string map; the engine only reads [`PERM_FORMAT_KEY`], translated into
//! [`Group::naming_template`](crate::tree::Group) by [`Document::to_tree`].

use crate::tree::{Attributes, BlendMode, LayerTree, LeafSource, NodeId};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata key holding a group's naming template.
pub const PERM_FORMAT_KEY: &str = "permute-layer-groups-perm-format";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Layer '{0}' has neither an image nor child layers")]
    MissingImage(String),
    #[error("Layer '{path}': {reason}")]
    InvalidLayer { path: String, reason: String },
    #[error("No layer at '{0}'")]
    UnknownLayer(String),
    #[error("'{0}' is not a group")]
    NotAGroup(String),
}

fn default_opacity() -> f64 {
    100.0
}

fn default_visible() -> bool {
    true
}

fn is_origin(offset: &(i32, i32)) -> bool {
    *offset == (0, 0)
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_full_opacity(value: &f64) -> bool {
    *value == 100.0
}

fn is_normal(mode: &BlendMode) -> bool {
    *mode == BlendMode::Normal
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    /// Top-to-bottom.
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerEntry {
    pub name: String,
    #[serde(default = "default_opacity", skip_serializing_if = "is_full_opacity")]
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "is_normal")]
    pub mode: BlendMode,
    #[serde(default = "default_visible", skip_serializing_if = "is_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub linked: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "is_origin")]
    pub offset: (i32, i32),
    /// Present (possibly empty) on groups, absent on leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<LayerEntry>>,
}

impl LayerEntry {
    pub fn is_group(&self) -> bool {
        self.layers.is_some()
    }

    fn children(&self) -> &[LayerEntry] {
        self.layers.as_deref().unwrap_or(&[])
    }
}

/// One group of a document, as listed by [`Document::groups`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub path: String,
    pub depth: usize,
    pub template: Option<String>,
}

/// Per-layer string metadata addressed by slash-separated name paths.
pub trait MetadataStore {
    fn read_metadata(&self, path: &str, key: &str) -> Result<Option<String>, DocumentError>;

    fn write_metadata(&mut self, path: &str, key: &str, value: &str)
    -> Result<(), DocumentError>;

    /// Remove `key`; clearing a key that is not set is not an error.
    fn clear_metadata(&mut self, path: &str, key: &str) -> Result<(), DocumentError>;
}

pub fn load_document(path: &Path) -> Result<Document, DocumentError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_document(document: &Document, path: &Path) -> Result<(), DocumentError> {
    let mut content = serde_json::to_string_pretty(document)?;
    content.push('\n');
    fs::write(path, content)?;
    Ok(())
}

impl Document {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
        }
    }

    /// Build the engine's view of this document.
    ///
    /// Leaf image paths are resolved against `base_dir`; leaf sizes come from
    /// the image headers, group sizes are the canvas size.
    pub fn to_tree(&self, base_dir: &Path) -> Result<LayerTree, DocumentError> {
        if self.width == 0 || self.height == 0 {
            return Err(DocumentError::InvalidLayer {
                path: String::new(),
                reason: format!("canvas size must be positive, got {}x{}", self.width, self.height),
            });
        }
        let mut tree = LayerTree::new(self.width, self.height);
        for entry in &self.layers {
            self.add_entry(&mut tree, None, "", entry, base_dir)?;
        }
        debug!("loaded {} layers", tree.len());
        Ok(tree)
    }

    fn add_entry(
        &self,
        tree: &mut LayerTree,
        parent: Option<NodeId>,
        parent_path: &str,
        entry: &LayerEntry,
        base_dir: &Path,
    ) -> Result<(), DocumentError> {
        let path = join_path(parent_path, &entry.name);
        if !(0.0..=100.0).contains(&entry.opacity) {
            return Err(DocumentError::InvalidLayer {
                path,
                reason: format!("opacity {} is outside 0-100", entry.opacity),
            });
        }

        let mut attrs = Attributes::new(entry.name.clone(), self.width, self.height);
        attrs.visible = entry.visible;
        attrs.linked = entry.linked;
        attrs.opacity = entry.opacity;
        attrs.blend_mode = entry.mode;

        match &entry.layers {
            Some(children) => {
                let template = entry.metadata.get(PERM_FORMAT_KEY).cloned();
                let id = tree.add_group(parent, attrs, template);
                for child in children {
                    self.add_entry(tree, Some(id), &path, child, base_dir)?;
                }
            }
            None => {
                let image = entry
                    .image
                    .as_ref()
                    .ok_or_else(|| DocumentError::MissingImage(path.clone()))?;
                let resolved = base_dir.join(image);
                let (width, height) = image::image_dimensions(&resolved).map_err(|source| {
                    DocumentError::Image {
                        path: resolved.clone(),
                        source,
                    }
                })?;
                attrs.width = width;
                attrs.height = height;
                tree.add_leaf(
                    parent,
                    attrs,
                    LeafSource {
                        path: resolved,
                        offset: entry.offset,
                    },
                );
            }
        }
        Ok(())
    }

    /// Every group in panel order with its naming template.
    pub fn groups(&self) -> Vec<GroupSummary> {
        fn collect(entries: &[LayerEntry], parent: &str, depth: usize, out: &mut Vec<GroupSummary>) {
            for entry in entries.iter().filter(|e| e.is_group()) {
                let path = join_path(parent, &entry.name);
                out.push(GroupSummary {
                    path: path.clone(),
                    depth,
                    template: entry.metadata.get(PERM_FORMAT_KEY).cloned(),
                });
                collect(entry.children(), &path, depth + 1, out);
            }
        }

        let mut out = Vec::new();
        collect(&self.layers, "", 0, &mut out);
        out
    }

    pub fn find(&self, path: &str) -> Option<&LayerEntry> {
        let mut candidates = self.layers.as_slice();
        let mut found = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let entry = candidates.iter().find(|e| e.name == segment)?;
            candidates = entry.children();
            found = Some(entry);
        }
        found
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut LayerEntry> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (last, parents) = segments.split_last()?;
        let mut candidates = &mut self.layers;
        for segment in parents {
            candidates = candidates
                .iter_mut()
                .find(|e| e.name == *segment)?
                .layers
                .as_mut()?;
        }
        candidates.iter_mut().find(|e| e.name == *last)
    }

    fn group_mut(&mut self, path: &str) -> Result<&mut LayerEntry, DocumentError> {
        let entry = self
            .find_mut(path)
            .ok_or_else(|| DocumentError::UnknownLayer(path.to_string()))?;
        if !entry.is_group() {
            return Err(DocumentError::NotAGroup(path.to_string()));
        }
        Ok(entry)
    }
}

impl MetadataStore for Document {
    fn read_metadata(&self, path: &str, key: &str) -> Result<Option<String>, DocumentError> {
        let entry = self
            .find(path)
            .ok_or_else(|| DocumentError::UnknownLayer(path.to_string()))?;
        Ok(entry.metadata.get(key).cloned())
    }

    /// Templates only make sense on groups, so writes to leaves are refused.
    fn write_metadata(
        &mut self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DocumentError> {
        let entry = self.group_mut(path)?;
        entry.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear_metadata(&mut self, path: &str, key: &str) -> Result<(), DocumentError> {
        let entry = self.group_mut(path)?;
        entry.metadata.remove(key);
        Ok(())
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
