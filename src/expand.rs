//! Combination expander.
//!
//! Resolves one combinatorial group into the flat list of composites it
//! stands for. Each visible child becomes a slot:
//!
//! - a child group tagged `(prm)` is expanded recursively and its results
//!   form one slot of alternatives;
//! - anything else (a leaf, or an untagged group used as a fixed stack) is a
//!   single-element slot.
//!
//! When no tagged child also carries `(hasbg)`, every slot is poured into a
//! single pool and each result is exactly one pick from it ("pick one of N").
//! Otherwise the result set is the full product across slots, one pick each.
//!
//! Every tuple is stacked bottom-to-top on a scratch canvas, flattened and
//! copied into a shared *dump* canvas. Recursive calls share the dump of the
//! outermost call; [`expand`] hands it to the caller inside the returned
//! [`Expansion`].

use crate::host::{CanvasId, Drawable, Host, LayerId, Scratch};
use crate::permute::PermuteError;
use crate::product::{count_lengths, product};
use crate::template::{FieldValue, Fields, NameCounter, resolve_name, strip_copy_suffix};
use crate::tree::{BlendMode, LayerTree, NodeId, compose_opacity};
use log::debug;

/// One synthesized alternative living on a dump canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    pub name: String,
    /// Opacity of the flattened layer: the element's own for a one-layer
    /// stack, 100 for a merged one.
    pub opacity: f64,
    pub blend_mode: BlendMode,
    pub width: u32,
    pub height: u32,
    /// Host layer holding the pixels.
    pub layer: LayerId,
    /// Group whose expansion produced this result.
    pub origin: NodeId,
}

impl Fields for CompositeResult {
    fn value(&self) -> FieldValue {
        FieldValue::Text(self.name.clone())
    }

    fn field(&self, attr: &str) -> Option<FieldValue> {
        Some(match attr {
            "name" => FieldValue::Text(self.name.clone()),
            "visible" => FieldValue::Bool(true),
            "linked" => FieldValue::Bool(false),
            "opacity" => FieldValue::Float(self.opacity),
            "mode" | "blend_mode" => FieldValue::Text(self.blend_mode.as_str().to_string()),
            "width" => FieldValue::Int(i64::from(self.width)),
            "height" => FieldValue::Int(i64::from(self.height)),
            _ => return None,
        })
    }
}

/// Results of one expansion plus the dump canvas holding their pixels.
///
/// Dropping the expansion deletes the dump, invalidating every
/// [`CompositeResult::layer`].
pub struct Expansion<'h, H: Host + ?Sized> {
    pub results: Vec<CompositeResult>,
    pub dump: Scratch<'h, H>,
}

#[derive(Debug, Clone)]
enum Element {
    Node(NodeId),
    Composite(CompositeResult),
}

/// Expand `group` into its composites.
pub fn expand<'h, H: Host + ?Sized>(
    host: &'h H,
    tree: &LayerTree,
    group: NodeId,
) -> Result<Expansion<'h, H>, PermuteError> {
    let dump = Scratch::new(host, tree.width(), tree.height())?;
    let results = expand_into(host, tree, group, dump.canvas())?;
    Ok(Expansion { results, dump })
}

/// Expand `group`, copying every result into `dump`.
///
/// The caller owns `dump`; this only allocates (and always releases) its
/// own compositing target.
pub fn expand_into<H: Host + ?Sized>(
    host: &H,
    tree: &LayerTree,
    group: NodeId,
    dump: CanvasId,
) -> Result<Vec<CompositeResult>, PermuteError> {
    let node = tree.node(group);
    let combinatorial = node.is_combinatorial();

    let mut slots: Vec<Vec<Element>> = Vec::new();
    let mut only_leaves = combinatorial;
    for child in tree.visible_children(group) {
        let child_node = tree.node(child);
        if combinatorial && child_node.is_combinatorial() {
            let results = expand_into(host, tree, child, dump)?;
            if child_node.has_background() {
                only_leaves = false;
            }
            slots.push(results.into_iter().map(Element::Composite).collect());
        } else {
            slots.push(vec![Element::Node(child)]);
        }
    }
    if only_leaves {
        slots = vec![slots.into_iter().flatten().collect()];
    }
    debug!(
        "expanding '{}': {} slot(s), only_leaves={only_leaves}",
        node.name(),
        slots.len()
    );

    let target = Scratch::new(host, tree.width(), tree.height())?;
    let mut counter = NameCounter::new();
    let mut results = Vec::new();

    for tuple in product(&slots) {
        // Inserting each element on top, bottom-most first.
        for element in tuple.iter().rev() {
            match element {
                Element::Node(id) => {
                    host.copy_drawable_into(Drawable::Node(*id), target.canvas(), 0)?;
                }
                Element::Composite(result) => {
                    let layer =
                        host.copy_drawable_into(Drawable::Layer(result.layer), target.canvas(), 0)?;
                    let subgroup = &tree.node(result.origin).attrs;
                    host.set_blend_mode(layer, subgroup.blend_mode)?;
                    host.set_opacity(layer, compose_opacity(subgroup.opacity, result.opacity))?;
                }
            }
        }

        let flat = host.flatten_visible(target.canvas())?;
        let copy = host.copy_drawable_into(Drawable::Layer(flat), dump, 0)?;

        let name = if !only_leaves || node.parent.is_some() {
            let picks: Vec<&dyn Fields> = tuple
                .iter()
                .map(|element| match element {
                    Element::Node(id) => &tree.node(*id).attrs as &dyn Fields,
                    Element::Composite(result) => result as &dyn Fields,
                })
                .collect();
            resolve_name(node.naming_template(), &picks, &node.attrs, &mut counter)?
        } else {
            strip_copy_suffix(&host.layer_info(copy)?.name).to_string()
        };
        host.set_name(copy, &name)?;

        let info = host.layer_info(copy)?;
        results.push(CompositeResult {
            name,
            opacity: info.opacity,
            blend_mode: info.blend_mode,
            width: info.width,
            height: info.height,
            layer: copy,
            origin: group,
        });
        host.clear_canvas(target.canvas())?;
    }

    target.release()?;
    debug!("'{}' expanded to {} result(s)", node.name(), results.len());
    Ok(results)
}

/// Number of results [`expand`] would produce for `group`, without a host.
pub fn count_alternatives(tree: &LayerTree, group: NodeId) -> usize {
    let node = tree.node(group);
    let combinatorial = node.is_combinatorial();

    let mut lengths = Vec::new();
    let mut only_leaves = combinatorial;
    for child in tree.visible_children(group) {
        let child_node = tree.node(child);
        if combinatorial && child_node.is_combinatorial() {
            lengths.push(count_alternatives(tree, child));
            if child_node.has_background() {
                only_leaves = false;
            }
        } else {
            lengths.push(1);
        }
    }
    if only_leaves {
        lengths.iter().sum()
    } else {
        count_lengths(lengths)
    }
}
