//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Layers
//! 001 Eyes (prm): pick one of 2
//!     Open
//!     Closed
//!     Wink (hidden)
//! 002 Body: fixed stack
//!     Skin 80% multiply
//!
//! 2 combinations (subgroup expansion on)
//! ```
//!
//! ## Run
//!
//! ```text
//! 001 Open + Body → Open/Body.png
//! 002 Closed + Body → Closed/Body.png
//!
//! Exported 2 files to permutations/
//! ```
//!
//! ## Templates
//!
//! ```text
//! Eyes (prm) = eyes-{counter}
//!     Lids (prm) (default)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::document::GroupSummary;
use crate::expand::count_alternatives;
use crate::permute::{RunReport, count_tuples};
use crate::template::strip_sentinel;
use crate::tree::{BlendMode, LayerTree, NodeId};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Opacity and blend mode, only where they differ from the defaults.
///
/// ```text
/// Skin 80% multiply
/// ```
fn style_suffix(opacity: f64, mode: BlendMode) -> String {
    let mut suffix = String::new();
    if opacity != 100.0 {
        suffix.push_str(&format!(" {opacity}%"));
    }
    if mode != BlendMode::Normal {
        suffix.push_str(&format!(" {mode}"));
    }
    suffix
}

/// How a top-level group contributes to the product.
fn group_role(tree: &LayerTree, id: NodeId, expand_subgroups: bool) -> String {
    let node = tree.node(id);
    if !expand_subgroups {
        let n = tree.visible_children(id).count();
        return plural(n, "alternative");
    }
    if !node.is_combinatorial() {
        return "fixed stack".to_string();
    }
    let n = count_alternatives(tree, id);
    let mixed = tree
        .visible_children(id)
        .any(|c| tree.node(c).is_combinatorial() && tree.node(c).has_background());
    if mixed {
        format!("{} across slots", plural(n, "combination"))
    } else {
        format!("pick one of {n}")
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the layer tree and the number of files a run would write.
pub fn format_check_output(tree: &LayerTree, expand_subgroups: bool) -> Vec<String> {
    let mut lines = vec!["Layers".to_string()];
    let mut top_index = 0;

    for (id, depth) in tree.walk() {
        let node = tree.node(id);
        let mut line = indent(depth);
        if depth == 0 {
            top_index += 1;
            line.push_str(&format_index(top_index));
            line.push(' ');
        }
        line.push_str(node.name());
        line.push_str(&style_suffix(node.attrs.opacity, node.attrs.blend_mode));
        if !node.attrs.visible {
            line.push_str(" (hidden)");
        } else if depth == 0 && node.is_group() {
            line.push_str(&format!(": {}", group_role(tree, id, expand_subgroups)));
        }
        lines.push(line);
    }

    let total = count_tuples(tree, expand_subgroups);
    let mode = if expand_subgroups { "on" } else { "off" };
    lines.push(String::new());
    lines.push(format!(
        "{} (subgroup expansion {mode})",
        plural(total, "combination")
    ));
    lines
}

pub fn print_check_output(tree: &LayerTree, expand_subgroups: bool) {
    for line in format_check_output(tree, expand_subgroups) {
        println!("{}", line);
    }
}

// ============================================================================
// Run
// ============================================================================

/// Format one line per exported file plus a summary.
///
/// Paths are shown relative to `export_dir` when possible.
pub fn format_run_output(report: &RunReport, export_dir: &Path) -> Vec<String> {
    let mut lines: Vec<String> = report
        .exports
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let shown = record
                .path
                .strip_prefix(export_dir)
                .unwrap_or(&record.path);
            format!(
                "{} {} → {}",
                format_index(i + 1),
                record.picks.join(" + "),
                shown.display()
            )
        })
        .collect();

    if report.exports.is_empty() {
        lines.push("Nothing exported".to_string());
    } else {
        lines.push(String::new());
        lines.push(format!(
            "Exported {} to {}/",
            plural(report.exports.len(), "file"),
            export_dir.display()
        ));
    }
    lines
}

pub fn print_run_output(report: &RunReport, export_dir: &Path) {
    for line in format_run_output(report, export_dir) {
        println!("{}", line);
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Format every group with its naming template, nested by depth.
pub fn format_template_list(groups: &[GroupSummary]) -> Vec<String> {
    if groups.is_empty() {
        return vec!["No groups".to_string()];
    }
    groups
        .iter()
        .map(|group| {
            let name = group.path.rsplit('/').next().unwrap_or(&group.path);
            match group.template.as_deref().map(strip_sentinel) {
                Some(template) if !template.is_empty() => {
                    format!("{}{} = {}", indent(group.depth), name, template)
                }
                _ => format!("{}{} (default)", indent(group.depth), name),
            }
        })
        .collect()
}

pub fn print_template_list(groups: &[GroupSummary]) {
    for line in format_template_list(groups) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permute::ExportRecord;
    use crate::test_helpers::*;
    use std::path::PathBuf;

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(123), "123");
    }

    #[test]
    fn style_suffix_omits_defaults() {
        assert_eq!(style_suffix(100.0, BlendMode::Normal), "");
        assert_eq!(style_suffix(80.0, BlendMode::Multiply), " 80% multiply");
        assert_eq!(style_suffix(100.0, BlendMode::Screen), " screen");
    }

    // =========================================================================
    // Check
    // =========================================================================

    fn sample_tree() -> LayerTree {
        let mut tree = canvas();
        let eyes = add_group(&mut tree, None, "Eyes (prm)");
        add_leaf(&mut tree, Some(eyes), "Open");
        add_leaf(&mut tree, Some(eyes), "Closed");
        hide(&mut tree, eyes, "Wink");
        let body = add_group(&mut tree, None, "Body");
        add_faded_leaf(&mut tree, Some(body), "Skin", 80.0);
        tree
    }

    #[test]
    fn check_output_with_expansion() {
        let lines = format_check_output(&sample_tree(), true);
        assert_eq!(
            lines,
            vec![
                "Layers",
                "001 Eyes (prm): pick one of 2",
                "    Open",
                "    Closed",
                "    Wink (hidden)",
                "002 Body: fixed stack",
                "    Skin 80%",
                "",
                "2 combinations (subgroup expansion on)",
            ]
        );
    }

    #[test]
    fn check_output_without_expansion() {
        let lines = format_check_output(&sample_tree(), false);
        assert_eq!(lines[1], "001 Eyes (prm): 2 alternatives");
        assert_eq!(lines[5], "002 Body: 1 alternative");
        assert_eq!(lines.last().unwrap(), "2 combinations (subgroup expansion off)");
    }

    #[test]
    fn check_output_reports_mixed_groups() {
        let mut tree = canvas();
        let pose = add_group(&mut tree, None, "Pose (prm)");
        let arms = add_group(&mut tree, Some(pose), "Arms (prm) (hasbg)");
        add_leaf(&mut tree, Some(arms), "Up");
        add_leaf(&mut tree, Some(arms), "Down");
        add_leaf(&mut tree, Some(pose), "Torso");

        let lines = format_check_output(&tree, true);
        assert_eq!(lines[1], "001 Pose (prm): 2 combinations across slots");
    }

    // =========================================================================
    // Run
    // =========================================================================

    #[test]
    fn run_output_lists_exports_relative_to_dir() {
        let report = RunReport {
            exports: vec![
                ExportRecord {
                    path: PathBuf::from("/out/H1/O1.png"),
                    picks: vec!["H1".into(), "O1".into()],
                },
                ExportRecord {
                    path: PathBuf::from("/out/H2/O1.png"),
                    picks: vec!["H2".into(), "O1".into()],
                },
            ],
        };
        let lines = format_run_output(&report, Path::new("/out"));
        assert_eq!(lines[0], "001 H1 + O1 → H1/O1.png");
        assert_eq!(lines[1], "002 H2 + O1 → H2/O1.png");
        assert_eq!(lines[3], "Exported 2 files to /out/");
    }

    #[test]
    fn run_output_empty() {
        let lines = format_run_output(&RunReport::default(), Path::new("out"));
        assert_eq!(lines, vec!["Nothing exported"]);
    }

    // =========================================================================
    // Templates
    // =========================================================================

    #[test]
    fn template_list_nests_and_strips_sentinel() {
        let groups = vec![
            GroupSummary {
                path: "Eyes (prm)".into(),
                depth: 0,
                template: Some("eyes-{counter}\0".into()),
            },
            GroupSummary {
                path: "Eyes (prm)/Lids (prm)".into(),
                depth: 1,
                template: None,
            },
        ];
        assert_eq!(
            format_template_list(&groups),
            vec!["Eyes (prm) = eyes-{counter}", "    Lids (prm) (default)"]
        );
    }

    #[test]
    fn template_list_empty() {
        assert_eq!(format_template_list(&[]), vec!["No groups"]);
    }
}
