//! Scoped ownership of host resources.
//!
//! [`Scratch`] owns one temporary canvas and deletes it when dropped, so a
//! `?` anywhere in the engine still releases every canvas allocated so far.
//! Returning a `Scratch` hands ownership to the caller; the creator has no
//! way to reach it afterwards.

use super::backend::{CanvasId, Host, HostError};
use log::{debug, warn};

/// A temporary canvas, deleted on drop.
pub struct Scratch<'h, H: Host + ?Sized> {
    host: &'h H,
    canvas: CanvasId,
    released: bool,
}

impl<'h, H: Host + ?Sized> Scratch<'h, H> {
    /// Allocate a canvas with undo disabled.
    pub fn new(host: &'h H, width: u32, height: u32) -> Result<Self, HostError> {
        let canvas = host.new_canvas(width, height)?;
        // Guard first, so a failing disable_undo still deletes the canvas.
        let scratch = Self {
            host,
            canvas,
            released: false,
        };
        host.disable_undo(canvas)?;
        debug!("allocated scratch canvas #{}", canvas.0);
        Ok(scratch)
    }

    pub fn canvas(&self) -> CanvasId {
        self.canvas
    }

    /// Delete the canvas now, surfacing any host error.
    pub fn release(mut self) -> Result<(), HostError> {
        self.released = true;
        debug!("releasing scratch canvas #{}", self.canvas.0);
        self.host.delete_canvas(self.canvas)
    }
}

impl<H: Host + ?Sized> Drop for Scratch<'_, H> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!("dropping scratch canvas #{}", self.canvas.0);
        if let Err(e) = self.host.delete_canvas(self.canvas) {
            warn!("failed to delete scratch canvas #{}: {e}", self.canvas.0);
        }
    }
}

/// Marks every host mutation made while it is alive as one undo step.
pub struct UndoGroup<'h, H: Host + ?Sized> {
    host: &'h H,
}

impl<'h, H: Host + ?Sized> UndoGroup<'h, H> {
    pub fn new(host: &'h H) -> Self {
        host.undo_group_start();
        Self { host }
    }
}

impl<H: Host + ?Sized> Drop for UndoGroup<'_, H> {
    fn drop(&mut self) {
        self.host.undo_group_end();
    }
}
