//! Pure Rust host: canvases are stacks of RGBA buffers.
//!
//! | Operation | Implementation |
//! |---|---|
//! | Leaf pixels | `image::open` (decoded once per node, then cached) |
//! | Group pixels | children composited bottom-to-top with their own mode/opacity |
//! | Flatten | union of layer bounds, composited with [`blend`](super::blend) |
//! | Export | `image` encoders chosen from the file extension |
//!
//! Copies are named `"<source> copy"`, the way desktop editors name
//! duplicated layers.

use super::backend::{
    CanvasId, Drawable, ExportRequest, Host, HostError, LayerId, LayerInfo,
};
use super::blend::composite_onto;
use crate::tree::{BlendMode, LayerTree, NodeId, NodeKind};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError, ImageFormat, Rgba, RgbaImage};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Encoder settings chosen on the first export of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportParams {
    /// JPEG quality (1–100). Ignored by lossless formats.
    pub jpeg_quality: u8,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self { jpeg_quality: 90 }
    }
}

struct RasterLayer {
    name: String,
    opacity: f64,
    blend_mode: BlendMode,
    /// Canvas position of the buffer's top-left corner.
    offset: (i32, i32),
    pixels: RgbaImage,
}

struct Canvas {
    width: u32,
    height: u32,
    /// Topmost first.
    layers: Vec<LayerId>,
    undo_enabled: bool,
}

#[derive(Default)]
struct State {
    next_id: u64,
    canvases: HashMap<CanvasId, Canvas>,
    layers: HashMap<LayerId, RasterLayer>,
    decoded: HashMap<NodeId, RgbaImage>,
    last_params: Option<ExportParams>,
    undo_depth: usize,
    notifications: Vec<String>,
}

impl State {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn layer(&self, id: LayerId) -> Result<&RasterLayer, HostError> {
        self.layers.get(&id).ok_or(HostError::UnknownLayer(id.0))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut RasterLayer, HostError> {
        self.layers.get_mut(&id).ok_or(HostError::UnknownLayer(id.0))
    }

    fn canvas_mut(&mut self, id: CanvasId) -> Result<&mut Canvas, HostError> {
        self.canvases
            .get_mut(&id)
            .ok_or(HostError::UnknownCanvas(id.0))
    }
}

/// In-process host backed by the `image` crate.
pub struct RasterHost {
    tree: LayerTree,
    defaults: ExportParams,
    state: RefCell<State>,
}

impl RasterHost {
    pub fn new(tree: LayerTree, defaults: ExportParams) -> Self {
        Self {
            tree,
            defaults,
            state: RefCell::new(State::default()),
        }
    }

    pub fn tree(&self) -> &LayerTree {
        &self.tree
    }

    /// Messages passed to [`Host::notify_user`] so far.
    pub fn notifications(&self) -> Vec<String> {
        self.state.borrow().notifications.clone()
    }

    /// Canvases that have been created and not yet deleted.
    pub fn live_canvases(&self) -> usize {
        self.state.borrow().canvases.len()
    }

    pub fn undo_depth(&self) -> usize {
        self.state.borrow().undo_depth
    }

    /// Pixels and offset for a source node. Groups are rendered onto a
    /// full-canvas buffer.
    fn render_node(&self, id: NodeId) -> Result<(RgbaImage, (i32, i32)), HostError> {
        let node = self.tree.get(id).ok_or(HostError::UnknownNode(id.index()))?;
        match &node.kind {
            NodeKind::Leaf(source) => {
                if let Some(cached) = self.state.borrow().decoded.get(&id) {
                    return Ok((cached.clone(), source.offset));
                }
                debug!("decoding {}", source.path.display());
                let pixels = image::open(&source.path)
                    .map_err(|e| {
                        HostError::OperationFailed(format!(
                            "Failed to decode {}: {e}",
                            source.path.display()
                        ))
                    })?
                    .to_rgba8();
                self.state.borrow_mut().decoded.insert(id, pixels.clone());
                Ok((pixels, source.offset))
            }
            NodeKind::Group(_) => {
                let mut buffer = RgbaImage::new(self.tree.width(), self.tree.height());
                let children: Vec<NodeId> = self.tree.visible_children(id).collect();
                for child in children.into_iter().rev() {
                    let (pixels, offset) = self.render_node(child)?;
                    let attrs = &self.tree.node(child).attrs;
                    composite_onto(
                        &mut buffer,
                        (0, 0),
                        &pixels,
                        offset,
                        attrs.blend_mode,
                        attrs.opacity,
                    );
                }
                Ok((buffer, (0, 0)))
            }
        }
    }
}

fn extent(layer: &RasterLayer) -> (i32, i32, i32, i32) {
    (
        layer.offset.0,
        layer.offset.1,
        layer.offset.0 + layer.pixels.width() as i32,
        layer.offset.1 + layer.pixels.height() as i32,
    )
}

impl Host for RasterHost {
    fn new_canvas(&self, width: u32, height: u32) -> Result<CanvasId, HostError> {
        if width == 0 || height == 0 {
            return Err(HostError::OperationFailed(format!(
                "Canvas size must be positive, got {width}x{height}"
            )));
        }
        let mut state = self.state.borrow_mut();
        let id = CanvasId(state.alloc());
        state.canvases.insert(
            id,
            Canvas {
                width,
                height,
                layers: Vec::new(),
                undo_enabled: true,
            },
        );
        Ok(id)
    }

    fn delete_canvas(&self, canvas: CanvasId) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let removed = state
            .canvases
            .remove(&canvas)
            .ok_or(HostError::UnknownCanvas(canvas.0))?;
        for layer in removed.layers {
            state.layers.remove(&layer);
        }
        Ok(())
    }

    fn disable_undo(&self, canvas: CanvasId) -> Result<(), HostError> {
        self.state.borrow_mut().canvas_mut(canvas)?.undo_enabled = false;
        Ok(())
    }

    fn copy_drawable_into(
        &self,
        source: Drawable,
        target: CanvasId,
        position: usize,
    ) -> Result<LayerId, HostError> {
        let layer = match source {
            Drawable::Node(id) => {
                let (pixels, offset) = self.render_node(id)?;
                let attrs = &self.tree.node(id).attrs;
                RasterLayer {
                    name: format!("{} copy", attrs.name),
                    opacity: attrs.opacity,
                    blend_mode: attrs.blend_mode,
                    offset,
                    pixels,
                }
            }
            Drawable::Layer(id) => {
                let state = self.state.borrow();
                let original = state.layer(id)?;
                RasterLayer {
                    name: format!("{} copy", original.name),
                    opacity: original.opacity,
                    blend_mode: original.blend_mode,
                    offset: original.offset,
                    pixels: original.pixels.clone(),
                }
            }
        };

        let mut state = self.state.borrow_mut();
        let id = LayerId(state.alloc());
        let canvas = state.canvas_mut(target)?;
        let position = position.min(canvas.layers.len());
        canvas.layers.insert(position, id);
        state.layers.insert(id, layer);
        Ok(id)
    }

    fn flatten_visible(&self, canvas: CanvasId) -> Result<LayerId, HostError> {
        let mut state = self.state.borrow_mut();
        let layer_ids = state.canvas_mut(canvas)?.layers.clone();
        match layer_ids.as_slice() {
            [] => Err(HostError::OperationFailed(format!(
                "Canvas #{} has no layers to flatten",
                canvas.0
            ))),
            [single] => Ok(*single),
            _ => {
                let mut bounds = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
                for id in &layer_ids {
                    let (x0, y0, x1, y1) = extent(state.layer(*id)?);
                    bounds = (
                        bounds.0.min(x0),
                        bounds.1.min(y0),
                        bounds.2.max(x1),
                        bounds.3.max(y1),
                    );
                }
                let width = (bounds.2 - bounds.0).max(1) as u32;
                let height = (bounds.3 - bounds.1).max(1) as u32;
                let origin = (bounds.0, bounds.1);
                let mut merged = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

                let mut bottom_name = String::new();
                for id in layer_ids.iter().rev() {
                    let layer = state.layer(*id)?;
                    if bottom_name.is_empty() {
                        bottom_name = layer.name.clone();
                    }
                    composite_onto(
                        &mut merged,
                        origin,
                        &layer.pixels,
                        layer.offset,
                        layer.blend_mode,
                        layer.opacity,
                    );
                }
                for id in &layer_ids {
                    state.layers.remove(id);
                }

                let merged_id = LayerId(state.alloc());
                state.layers.insert(
                    merged_id,
                    RasterLayer {
                        name: bottom_name,
                        opacity: 100.0,
                        blend_mode: BlendMode::Normal,
                        offset: origin,
                        pixels: merged,
                    },
                );
                state.canvas_mut(canvas)?.layers = vec![merged_id];
                debug!(
                    "flattened {} layers on canvas #{} into {width}x{height}",
                    layer_ids.len(),
                    canvas.0
                );
                Ok(merged_id)
            }
        }
    }

    fn clear_canvas(&self, canvas: CanvasId) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let layers = std::mem::take(&mut state.canvas_mut(canvas)?.layers);
        for layer in layers {
            state.layers.remove(&layer);
        }
        Ok(())
    }

    fn layer_info(&self, layer: LayerId) -> Result<LayerInfo, HostError> {
        let state = self.state.borrow();
        let layer = state.layer(layer)?;
        Ok(LayerInfo {
            name: layer.name.clone(),
            opacity: layer.opacity,
            blend_mode: layer.blend_mode,
            width: layer.pixels.width(),
            height: layer.pixels.height(),
        })
    }

    fn set_name(&self, layer: LayerId, name: &str) -> Result<(), HostError> {
        self.state.borrow_mut().layer_mut(layer)?.name = name.to_string();
        Ok(())
    }

    fn set_blend_mode(&self, layer: LayerId, mode: BlendMode) -> Result<(), HostError> {
        self.state.borrow_mut().layer_mut(layer)?.blend_mode = mode;
        Ok(())
    }

    fn set_opacity(&self, layer: LayerId, opacity: f64) -> Result<(), HostError> {
        self.state.borrow_mut().layer_mut(layer)?.opacity = opacity.clamp(0.0, 100.0);
        Ok(())
    }

    fn export(&self, request: &ExportRequest<'_>) -> Result<(), HostError> {
        let format = ImageFormat::from_path(request.path).map_err(|_| {
            HostError::OperationFailed(format!(
                "Cannot tell the image format of {}",
                request.path.display()
            ))
        })?;

        let (image, params) = {
            let mut state = self.state.borrow_mut();
            let params = match (request.reuse_last_params, state.last_params) {
                (true, Some(last)) => last,
                _ => self.defaults,
            };
            state.last_params = Some(params);

            let canvas = state
                .canvases
                .get(&request.canvas)
                .ok_or(HostError::UnknownCanvas(request.canvas.0))?;
            let mut image = RgbaImage::new(canvas.width, canvas.height);
            let layer = state.layer(request.drawable)?;
            composite_onto(
                &mut image,
                (0, 0),
                &layer.pixels,
                layer.offset,
                layer.blend_mode,
                layer.opacity,
            );
            (image, params)
        };

        match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
                let file = File::create(request.path).map_err(|source| HostError::Write {
                    path: request.path.to_path_buf(),
                    source,
                })?;
                let mut encoder =
                    JpegEncoder::new_with_quality(BufWriter::new(file), params.jpeg_quality);
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| save_error(request.path, e))?;
            }
            _ => {
                image
                    .save_with_format(request.path, format)
                    .map_err(|e| save_error(request.path, e))?;
            }
        }
        info!("exported {}", request.basename);
        Ok(())
    }

    fn notify_user(&self, message: &str) {
        warn!("{message}");
        self.state
            .borrow_mut()
            .notifications
            .push(message.to_string());
    }

    fn undo_group_start(&self) {
        self.state.borrow_mut().undo_depth += 1;
    }

    fn undo_group_end(&self) {
        let mut state = self.state.borrow_mut();
        state.undo_depth = state.undo_depth.saturating_sub(1);
    }
}

/// I/O failures while saving are write errors; anything else is the encoder's.
fn save_error(path: &Path, error: ImageError) -> HostError {
    match error {
        ImageError::IoError(source) => HostError::Write {
            path: path.to_path_buf(),
            source,
        },
        other => HostError::OperationFailed(format!("Failed to save {}: {other}", path.display())),
    }
}
