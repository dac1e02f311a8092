//! Top-level driver: one exported file per combination of top-level slots.
//!
//! Each visible top-level layer becomes a slot:
//!
//! | Layer | Subgroup expansion on | Subgroup expansion off |
//! |---|---|---|
//! | group tagged `(prm)` | its [`expand`] results | its visible children |
//! | untagged group | the whole group as one fixed stack | its visible children |
//! | leaf | itself | itself |
//!
//! The driver walks the Cartesian product of the slots. For every tuple it
//! stacks the picks bottom-to-top on a fresh scratch canvas, flattens it,
//! expands the filename template with the picks, and exports. The first
//! export of a run lets the host choose save parameters; every later export
//! reuses them ([`ExportPolicy`]).

use crate::expand::{CompositeResult, count_alternatives, expand};
use crate::host::{Drawable, ExportRequest, Host, HostError, Scratch, UndoGroup};
use crate::product::{count_lengths, product};
use crate::template::{Fields, TemplateError, expand_filename};
use crate::tree::{LayerTree, NodeId, compose_opacity};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Message shown when there is nothing to combine.
pub const EMPTY_SELECTION_MESSAGE: &str =
    "Nothing to permute: no visible layers form a combination.";

#[derive(Error, Debug)]
pub enum PermuteError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Host error: {0}")]
    Host(#[from] HostError),
    #[error("Cannot write {path}: {source}")]
    Resource {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub export_dir: PathBuf,
    pub filename_template: String,
    pub expand_subgroups: bool,
}

/// One file written by [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub path: PathBuf,
    /// Names of the picks in slot order.
    pub picks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub exports: Vec<ExportRecord>,
}

/// "Ask once" export parameters: only the first export of a run may pick
/// new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPolicy {
    first_call: bool,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self { first_call: true }
    }
}

impl ExportPolicy {
    pub fn reuse_last_params(&self) -> bool {
        !self.first_call
    }

    /// Record a successful export.
    pub fn exported(&mut self) {
        self.first_call = false;
    }
}

/// One element of a top-level slot.
#[derive(Debug, Clone)]
enum Pick {
    /// A source node copied as-is.
    Node(NodeId),
    /// An untagged group whose visible children are stacked in place.
    Stack(NodeId),
    /// A result of expanding a `(prm)` group.
    Composite(CompositeResult),
}

impl Pick {
    fn fields<'a>(&'a self, tree: &'a LayerTree) -> &'a dyn Fields {
        match self {
            Pick::Node(id) | Pick::Stack(id) => &tree.node(*id).attrs,
            Pick::Composite(result) => result,
        }
    }

    fn name<'a>(&'a self, tree: &'a LayerTree) -> &'a str {
        match self {
            Pick::Node(id) | Pick::Stack(id) => tree.node(*id).name(),
            Pick::Composite(result) => &result.name,
        }
    }
}

/// Export every combination of `tree`'s top-level slots.
///
/// An empty product is reported through [`Host::notify_user`] and returns an
/// empty report. Every scratch canvas is deleted before this returns, on
/// success and on error.
pub fn run<H: Host + ?Sized>(
    host: &H,
    tree: &LayerTree,
    options: &RunOptions,
) -> Result<RunReport, PermuteError> {
    let _undo = UndoGroup::new(host);

    let mut dumps: Vec<Scratch<'_, H>> = Vec::new();
    let mut slots: Vec<Vec<Pick>> = Vec::new();
    for root in tree.visible_roots() {
        let node = tree.node(root);
        let slot = if !node.is_group() {
            vec![Pick::Node(root)]
        } else if !options.expand_subgroups {
            tree.visible_children(root).map(Pick::Node).collect()
        } else if node.is_combinatorial() {
            let expansion = expand(host, tree, root)?;
            dumps.push(expansion.dump);
            expansion.results.into_iter().map(Pick::Composite).collect()
        } else if tree.visible_children(root).next().is_none() {
            Vec::new()
        } else {
            vec![Pick::Stack(root)]
        };
        debug!("slot '{}': {} alternative(s)", node.name(), slot.len());
        slots.push(slot);
    }

    let total = crate::product::count(&slots);
    if total == 0 {
        host.notify_user(EMPTY_SELECTION_MESSAGE);
        return Ok(RunReport::default());
    }
    info!("exporting {total} combination(s)");

    let mut policy = ExportPolicy::default();
    let mut report = RunReport::default();
    for tuple in product(&slots) {
        let record = export_tuple(host, tree, &tuple, options, &mut policy)?;
        report.exports.push(record);
    }

    for dump in dumps {
        dump.release()?;
    }
    Ok(report)
}

fn export_tuple<H: Host + ?Sized>(
    host: &H,
    tree: &LayerTree,
    tuple: &[&Pick],
    options: &RunOptions,
    policy: &mut ExportPolicy,
) -> Result<ExportRecord, PermuteError> {
    let target = Scratch::new(host, tree.width(), tree.height())?;
    let canvas = target.canvas();

    for pick in tuple.iter().rev() {
        match pick {
            Pick::Node(id) => {
                let layer = host.copy_drawable_into(Drawable::Node(*id), canvas, 0)?;
                let node = tree.node(*id);
                if let Some(parent) = node.parent {
                    let parent = &tree.node(parent).attrs;
                    host.set_blend_mode(layer, parent.blend_mode)?;
                    host.set_opacity(layer, compose_opacity(parent.opacity, node.attrs.opacity))?;
                }
            }
            Pick::Stack(group) => {
                let group_attrs = &tree.node(*group).attrs;
                let children: Vec<NodeId> = tree.visible_children(*group).collect();
                for child in children.into_iter().rev() {
                    let layer = host.copy_drawable_into(Drawable::Node(child), canvas, 0)?;
                    host.set_blend_mode(layer, group_attrs.blend_mode)?;
                    host.set_opacity(
                        layer,
                        compose_opacity(group_attrs.opacity, tree.node(child).attrs.opacity),
                    )?;
                }
            }
            Pick::Composite(result) => {
                host.copy_drawable_into(Drawable::Layer(result.layer), canvas, 0)?;
            }
        }
    }
    let flat = host.flatten_visible(canvas)?;

    let picks: Vec<&dyn Fields> = tuple.iter().map(|pick| pick.fields(tree)).collect();
    let filename = expand_filename(&options.filename_template, &picks)?;
    let path = options.export_dir.join(&filename);
    create_parent_dirs(&path)?;
    let basename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());

    host.export(&ExportRequest {
        canvas,
        drawable: flat,
        path: &path,
        basename: &basename,
        reuse_last_params: policy.reuse_last_params(),
    })
    .map_err(|e| match e {
        HostError::Write { path, source } => PermuteError::Resource { path, source },
        other => PermuteError::Host(other),
    })?;
    policy.exported();
    info!("wrote {}", path.display());

    host.clear_canvas(canvas)?;
    target.release()?;

    Ok(ExportRecord {
        path,
        picks: tuple.iter().map(|pick| pick.name(tree).to_string()).collect(),
    })
}

fn create_parent_dirs(path: &Path) -> Result<(), PermuteError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| PermuteError::Resource {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Number of files [`run`] would write for `tree`, without a host.
pub fn count_tuples(tree: &LayerTree, expand_subgroups: bool) -> usize {
    count_lengths(tree.visible_roots().map(|root| {
        let node = tree.node(root);
        if !node.is_group() {
            1
        } else if !expand_subgroups {
            tree.visible_children(root).count()
        } else if node.is_combinatorial() {
            count_alternatives(tree, root)
        } else {
            usize::from(tree.visible_children(root).next().is_some())
        }
    }))
}
