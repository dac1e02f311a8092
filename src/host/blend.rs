//! Pixel math for layer compositing.
//!
//! Separable blend modes following the W3C compositing model: the blend
//! function mixes colors where both layers are present, and source-over
//! alpha compositing handles coverage.

use crate::tree::BlendMode;
use image::{Rgba, RgbaImage};

fn blend_channel(mode: BlendMode, base: f32, top: f32) -> f32 {
    match mode {
        BlendMode::Normal => top,
        BlendMode::Multiply => base * top,
        BlendMode::Screen => base + top - base * top,
        BlendMode::Overlay => {
            if base <= 0.5 {
                2.0 * base * top
            } else {
                1.0 - 2.0 * (1.0 - base) * (1.0 - top)
            }
        }
        BlendMode::Darken => base.min(top),
        BlendMode::Lighten => base.max(top),
        BlendMode::Difference => (base - top).abs(),
        BlendMode::Addition => (base + top).min(1.0),
        BlendMode::Subtract => (base - top).max(0.0),
    }
}

/// Composite `top` over `base`. `opacity` is on the 0–100 scale.
pub(crate) fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f64) -> Rgba<u8> {
    let opacity = (opacity / 100.0).clamp(0.0, 1.0) as f32;
    let top_a = f32::from(top[3]) / 255.0 * opacity;
    if top_a <= 0.0 {
        return base;
    }
    let base_a = f32::from(base[3]) / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);

    let mut out = [0u8; 4];
    for c in 0..3 {
        let cb = f32::from(base[c]) / 255.0;
        let cs = f32::from(top[c]) / 255.0;
        let mixed = (1.0 - base_a) * cs + base_a * blend_channel(mode, cb, cs);
        let premultiplied = top_a * mixed + base_a * cb * (1.0 - top_a);
        let value = if out_a > 0.0 { premultiplied / out_a } else { 0.0 };
        out[c] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Composite `top` (placed at `top_offset` in canvas coordinates) onto
/// `base` (whose top-left sits at `base_offset`). Pixels outside `base` are
/// clipped.
pub(crate) fn composite_onto(
    base: &mut RgbaImage,
    base_offset: (i32, i32),
    top: &RgbaImage,
    top_offset: (i32, i32),
    mode: BlendMode,
    opacity: f64,
) {
    let dx = top_offset.0 - base_offset.0;
    let dy = top_offset.1 - base_offset.1;
    for (x, y, pixel) in top.enumerate_pixels() {
        let bx = x as i64 + dx as i64;
        let by = y as i64 + dy as i64;
        if bx < 0 || by < 0 || bx >= base.width() as i64 || by >= base.height() as i64 {
            continue;
        }
        let (bx, by) = (bx as u32, by as u32);
        let under = *base.get_pixel(bx, by);
        base.put_pixel(bx, by, blend_pixel(under, *pixel, mode, opacity));
    }
}
