//! The image-editing environment the engine composites through.
//!
//! | Piece | Role |
//! |---|---|
//! | [`Host`] | canvases, layer copies, flattening, attributes, export, notifications |
//! | [`Scratch`] / [`UndoGroup`] | scoped acquisition: release on every exit path |
//! | [`RasterHost`] | pure-Rust implementation on the `image` crate |
//! | `blend` | per-pixel blend-mode math used by [`RasterHost`] |
//!
//! The engine never touches pixels itself. It only asks the host to copy,
//! stack, flatten and save, which keeps [`expand`](crate::expand) and
//! [`permute`](crate::permute) testable against a recording mock.

pub mod backend;
mod blend;
pub mod raster;
pub mod scratch;

pub use backend::{
    CanvasId, Drawable, ExportRequest, Host, HostError, LayerId, LayerInfo,
};
pub use raster::{ExportParams, RasterHost};
pub use scratch::{Scratch, UndoGroup};
