//! Host trait and shared handle types.
//!
//! A host owns every canvas and layer; the engine only holds opaque
//! [`CanvasId`]/[`LayerId`] handles. Methods take `&self` so scratch guards
//! can borrow the host while the engine keeps issuing calls through it;
//! implementations keep their state behind interior mutability.

use crate::tree::{BlendMode, NodeId};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown canvas #{0}")]
    UnknownCanvas(u64),
    #[error("Unknown layer #{0}")]
    UnknownLayer(u64),
    #[error("Unknown source node #{0}")]
    UnknownNode(usize),
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// The output file could not be created or written.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// Something that can be copied onto a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drawable {
    /// A node of the source hierarchy; groups are copied as their composite.
    Node(NodeId),
    /// A layer the host created earlier (e.g. a result living on a dump canvas).
    Layer(LayerId),
}

/// Attributes of a host layer as it currently stands.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub width: u32,
    pub height: u32,
}

/// One file export.
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub canvas: CanvasId,
    pub drawable: LayerId,
    pub path: &'a Path,
    pub basename: &'a str,
    /// `false` only for the first export of a run: the host picks (or asks
    /// for) parameters then; later exports reuse whatever was chosen.
    pub reuse_last_params: bool,
}

/// Operations the permutation engine needs from an image-editing environment.
pub trait Host {
    fn new_canvas(&self, width: u32, height: u32) -> Result<CanvasId, HostError>;

    /// Delete a canvas together with every layer on it.
    fn delete_canvas(&self, canvas: CanvasId) -> Result<(), HostError>;

    fn disable_undo(&self, canvas: CanvasId) -> Result<(), HostError>;

    /// Copy `source` onto `target` at stacking `position` (0 = topmost).
    fn copy_drawable_into(
        &self,
        source: Drawable,
        target: CanvasId,
        position: usize,
    ) -> Result<LayerId, HostError>;

    /// Merge every layer of `canvas` into one, growing bounds as necessary.
    ///
    /// A canvas holding a single layer returns that layer untouched,
    /// attributes included.
    fn flatten_visible(&self, canvas: CanvasId) -> Result<LayerId, HostError>;

    /// Remove every layer from `canvas`, keeping the canvas itself.
    fn clear_canvas(&self, canvas: CanvasId) -> Result<(), HostError>;

    fn layer_info(&self, layer: LayerId) -> Result<LayerInfo, HostError>;

    fn set_name(&self, layer: LayerId, name: &str) -> Result<(), HostError>;

    fn set_blend_mode(&self, layer: LayerId, mode: BlendMode) -> Result<(), HostError>;

    /// `opacity` is on the 0–100 scale.
    fn set_opacity(&self, layer: LayerId, opacity: f64) -> Result<(), HostError>;

    fn export(&self, request: &ExportRequest<'_>) -> Result<(), HostError>;

    fn notify_user(&self, message: &str);

    fn undo_group_start(&self);

    fn undo_group_end(&self);
}
