//! # Permute Layers
//!
//! Exports every combination of a layered image's groups as flattened files.
//! A character sheet with three hairstyles, two outfits and four expressions
//! becomes twenty-four finished images with one command.
//!
//! # How a Document Is Read
//!
//! Layers are grouped, and group names carry two reserved tags:
//!
//! ```text
//! Expression (prm)            ← children are alternatives: pick one
//! ├── Smile
//! ├── Frown
//! └── Mouth (prm) (hasbg)     ← nested alternatives combined slot by slot
//! Outfit                      ← untagged: children stack together
//! ├── Jacket
//! └── Shirt
//! ```
//!
//! At the top level every visible layer is a slot. The driver takes the
//! Cartesian product of all slots, stacks each tuple bottom-to-top,
//! flattens it, and exports it under a name built from a filename template.
//!
//! ```text
//! document.json ─→ LayerTree ─→ slots ─→ product ─→ composite ─→ export
//!                                 ↑
//!                     expand: (prm) groups → composites
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`tree`] | Read-only arena of layers and groups; reserved tags parsed once |
//! | [`document`] | JSON layer document, per-group metadata, conversion to [`tree::LayerTree`] |
//! | [`template`] | Naming and filename templates: `{0.name}`, `{layer.name}`, `{counter:03}` |
//! | [`product`] | Lazy Cartesian product over slots |
//! | [`expand`] | Recursive expansion of one `(prm)` group into composites |
//! | [`permute`] | Top-level driver: slots, product, compositing, export |
//! | [`host`] | The [`host::Host`] trait, scoped scratch canvases, and the `image`-backed host |
//! | [`config`] | `permute.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Engine Never Touches Pixels
//!
//! [`expand`] and [`permute`] only ask a [`host::Host`] to copy, stack, flatten
//! and save. Tests drive them against a recording mock and assert on stacks,
//! opacities and paths; [`host::RasterHost`] does the actual compositing with
//! the `image` crate.
//!
//! ## Scratch Canvases Are Owned Values
//!
//! Every temporary canvas lives in a [`host::Scratch`] guard that deletes it
//! on drop. An expansion returns its dump canvas to the caller, and any `?`
//! on the way out still releases everything allocated so far.
//!
//! ## Tags Are Parsed Once
//!
//! `(prm)` and `(hasbg)` become flags on [`tree::Group`] when the tree is
//! built, and a group's naming template is read from the document's metadata
//! at the same time. Nothing downstream looks at names for control flow.

pub mod config;
pub mod document;
pub mod expand;
pub mod host;
pub mod output;
pub mod permute;
pub mod product;
pub mod template;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_helpers;
