//! Naming templates for composite results and exported files.
//!
//! Templates use brace placeholders:
//!
//! | Placeholder | Expands to |
//! |-------------|------------|
//! | `{0}`, `{1}`, `{}` | name of the pick at that position (0 is the first slot) |
//! | `{0.name}`, `{1.opacity}` | an attribute of the picked layer |
//! | `{layer.name}` | an attribute of the group being expanded (naming templates only) |
//! | `{counter}` | per-group result counter, starting at 0 (naming templates only) |
//! | `{{`, `}}` | literal braces |
//!
//! An optional format spec follows a colon: `{counter:03}`, `{0.opacity:.1f}`,
//! `{0.name:>8}`.
//!
//! Attributes: `name`, `visible`, `linked`, `opacity`, `mode` (alias
//! `blend_mode`), `width`, `height`.
//!
//! When a group has no template, [`resolve_name`] falls back to the group's
//! own name with the reserved tags removed, suffixed with `.{counter}`.

use crate::tree::{Attributes, BACKGROUND_TAG, COMBINATORIAL_TAG};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Trailing terminator some hosts leave on stored metadata strings.
pub const TEMPLATE_SENTINEL: char = '\0';

/// Suffix the host appends to duplicated layers.
const COPY_SUFFIX: &str = " copy";

static RESERVED_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        "{}|{}",
        regex::escape(COMBINATORIAL_TAG),
        regex::escape(BACKGROUND_TAG)
    );
    Regex::new(&pattern).expect("reserved tag pattern is valid")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template uses position {index} but only {available} layer(s) were picked")]
    MissingPosition { index: usize, available: usize },
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownName(String),
    #[error("'{target}' has no attribute '{attr}'")]
    UnknownAttribute { target: String, attr: String },
    #[error("unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
    #[error("invalid format spec '{0}'")]
    InvalidSpec(String),
    #[error("cannot mix automatic '{{}}' and numbered '{{0}}' placeholders")]
    MixedNumbering,
}

/// A single value a placeholder can render.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Bool(true) => f.write_str("True"),
            FieldValue::Bool(false) => f.write_str("False"),
        }
    }
}

/// Anything a template placeholder can point at.
pub trait Fields {
    /// Rendered for a bare placeholder such as `{0}`.
    fn value(&self) -> FieldValue;

    /// Rendered for `{0.attr}`; `None` when the attribute does not exist.
    fn field(&self, attr: &str) -> Option<FieldValue>;
}

impl Fields for Attributes {
    fn value(&self) -> FieldValue {
        FieldValue::Text(self.name.clone())
    }

    fn field(&self, attr: &str) -> Option<FieldValue> {
        Some(match attr {
            "name" => FieldValue::Text(self.name.clone()),
            "visible" => FieldValue::Bool(self.visible),
            "linked" => FieldValue::Bool(self.linked),
            "opacity" => FieldValue::Float(self.opacity),
            "mode" | "blend_mode" => FieldValue::Text(self.blend_mode.as_str().to_string()),
            "width" => FieldValue::Int(i64::from(self.width)),
            "height" => FieldValue::Int(i64::from(self.height)),
            _ => return None,
        })
    }
}

impl Fields for FieldValue {
    fn value(&self) -> FieldValue {
        self.clone()
    }

    fn field(&self, _attr: &str) -> Option<FieldValue> {
        None
    }
}

/// Per-group counter handed to [`resolve_name`].
///
/// Starts at 0 and advances once for every name produced from a template
/// or from the fallback rule.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NameCounter(usize);

impl NameCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(self) -> usize {
        self.0
    }
}

/// Remove one trailing [`TEMPLATE_SENTINEL`], if present.
pub fn strip_sentinel(template: &str) -> &str {
    template
        .strip_suffix(TEMPLATE_SENTINEL)
        .unwrap_or(template)
}

/// Group name with the reserved tags removed and whitespace collapsed.
///
/// `"Pose (prm) (hasbg)"` → `"Pose"`
pub fn fallback_base(group_name: &str) -> String {
    let without_tags = RESERVED_TAGS.replace_all(group_name, "");
    WHITESPACE_RUN
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

/// Strip the host's duplication suffix (`"Eyes copy copy"` → `"Eyes"`).
pub fn strip_copy_suffix(name: &str) -> &str {
    let mut stripped = name;
    while let Some(rest) = stripped.strip_suffix(COPY_SUFFIX) {
        stripped = rest;
    }
    stripped
}

/// Name one composite result of `layer`'s expansion.
///
/// With a template, positional placeholders resolve against `picks` and the
/// named `layer`/`counter` placeholders against the group and the counter.
/// Without one, the name is `"{fallback_base}.{counter}"`. The counter only
/// advances when a name is produced.
pub fn resolve_name(
    template: Option<&str>,
    picks: &[&dyn Fields],
    layer: &Attributes,
    counter: &mut NameCounter,
) -> Result<String, TemplateError> {
    let name = match template.map(strip_sentinel).filter(|t| !t.is_empty()) {
        Some(template) => {
            let count = FieldValue::Int(counter.0 as i64);
            let named: [(&str, &dyn Fields); 2] = [("layer", layer), ("counter", &count)];
            format_template(template, picks, &named)?
        }
        None => format!("{}.{}", fallback_base(&layer.name), counter.0),
    };
    counter.0 += 1;
    Ok(name)
}

/// Expand an export filename template against one selection.
///
/// Only positional placeholders are available here.
pub fn expand_filename(template: &str, picks: &[&dyn Fields]) -> Result<String, TemplateError> {
    format_template(template, picks, &[])
}

/// Substitute every placeholder in `template`.
pub fn format_template(
    template: &str,
    positional: &[&dyn Fields],
    named: &[(&str, &dyn Fields)],
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut numbering = Numbering::default();
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|(_, next)| *next == '{').is_some() {
                    out.push('{');
                    continue;
                }
                let mut body = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(TemplateError::UnbalancedBrace(offset)),
                        _ => body.push(inner),
                    }
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace(offset));
                }
                let rendered = render_placeholder(&body, positional, named, &mut numbering)?;
                out.push_str(&rendered);
            }
            '}' => {
                if chars.next_if(|(_, next)| *next == '}').is_none() {
                    return Err(TemplateError::UnbalancedBrace(offset));
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[derive(Debug, Default)]
struct Numbering {
    next_auto: usize,
    saw_auto: bool,
    saw_manual: bool,
}

impl Numbering {
    fn auto(&mut self) -> Result<usize, TemplateError> {
        if self.saw_manual {
            return Err(TemplateError::MixedNumbering);
        }
        self.saw_auto = true;
        let index = self.next_auto;
        self.next_auto += 1;
        Ok(index)
    }

    fn manual(&mut self, index: usize) -> Result<usize, TemplateError> {
        if self.saw_auto {
            return Err(TemplateError::MixedNumbering);
        }
        self.saw_manual = true;
        Ok(index)
    }
}

fn render_placeholder(
    body: &str,
    positional: &[&dyn Fields],
    named: &[(&str, &dyn Fields)],
    numbering: &mut Numbering,
) -> Result<String, TemplateError> {
    let (field, spec) = match body.split_once(':') {
        Some((field, spec)) => (field, spec),
        None => (body, ""),
    };
    let mut parts = field.split('.');
    let root = parts.next().unwrap_or_default();
    let attr = parts.next();
    if let Some(extra) = parts.next() {
        return Err(TemplateError::UnknownAttribute {
            target: format!("{root}.{}", attr.unwrap_or_default()),
            attr: extra.to_string(),
        });
    }

    let target: &dyn Fields = if root.is_empty() || root.bytes().all(|b| b.is_ascii_digit()) {
        let index = if root.is_empty() {
            numbering.auto()?
        } else {
            let index = root
                .parse::<usize>()
                .map_err(|_| TemplateError::UnknownName(root.to_string()))?;
            numbering.manual(index)?
        };
        *positional
            .get(index)
            .ok_or(TemplateError::MissingPosition {
                index,
                available: positional.len(),
            })?
    } else {
        named
            .iter()
            .find(|(name, _)| *name == root)
            .map(|(_, value)| *value)
            .ok_or_else(|| TemplateError::UnknownName(root.to_string()))?
    };

    let value = match attr {
        None => target.value(),
        Some(attr) => target
            .field(attr)
            .ok_or_else(|| TemplateError::UnknownAttribute {
                target: root.to_string(),
                attr: attr.to_string(),
            })?,
    };
    FormatSpec::parse(spec)?.apply(&value, spec)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left,
    Right,
    Center,
}

/// Upper bound for a format spec's width and precision.
const MAX_FORMAT_WIDTH: usize = 4096;

/// `[[fill]align][0][width][.precision][type]`
#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<Align>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, TemplateError> {
        let invalid = || TemplateError::InvalidSpec(spec.to_string());
        let mut parsed = FormatSpec::default();
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;

        match (chars.first(), chars.get(1).copied().and_then(align_of)) {
            (Some(fill), Some(align)) => {
                parsed.fill = Some(*fill);
                parsed.align = Some(align);
                i = 2;
            }
            (Some(first), None) => {
                if let Some(align) = align_of(*first) {
                    parsed.align = Some(align);
                    i = 1;
                }
            }
            (None, _) => {}
        }

        if chars.get(i) == Some(&'0') {
            parsed.zero = true;
            i += 1;
        }

        let width_start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i > width_start {
            let digits: String = chars[width_start..i].iter().collect();
            parsed.width = digits
                .parse()
                .ok()
                .filter(|w| *w <= MAX_FORMAT_WIDTH)
                .ok_or_else(invalid)?;
        }

        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if i == start {
                return Err(invalid());
            }
            let digits: String = chars[start..i].iter().collect();
            let precision = digits
                .parse()
                .ok()
                .filter(|p| *p <= MAX_FORMAT_WIDTH)
                .ok_or_else(invalid)?;
            parsed.precision = Some(precision);
        }

        if let Some(kind) = chars.get(i) {
            if !matches!(kind, 'd' | 'f' | 's') {
                return Err(invalid());
            }
            parsed.kind = Some(*kind);
            i += 1;
        }

        if i != chars.len() {
            return Err(invalid());
        }
        Ok(parsed)
    }

    fn apply(&self, value: &FieldValue, raw: &str) -> Result<String, TemplateError> {
        let invalid = || TemplateError::InvalidSpec(raw.to_string());
        let numeric = matches!(value, FieldValue::Int(_) | FieldValue::Float(_));

        let body = match (self.kind, value) {
            (Some('d'), FieldValue::Int(n)) => n.to_string(),
            (Some('d'), _) => return Err(invalid()),
            (Some('f'), FieldValue::Int(n)) => {
                format!("{:.*}", self.precision.unwrap_or(6), *n as f64)
            }
            (Some('f'), FieldValue::Float(x)) => format!("{:.*}", self.precision.unwrap_or(6), x),
            (Some('f'), _) => return Err(invalid()),
            (_, FieldValue::Float(x)) if self.precision.is_some() => {
                format!("{:.*}", self.precision.unwrap_or_default(), x)
            }
            (_, FieldValue::Text(s)) => match self.precision {
                Some(max) => s.chars().take(max).collect(),
                None => s.clone(),
            },
            (_, other) => other.to_string(),
        };

        let len = body.chars().count();
        if len >= self.width {
            return Ok(body);
        }
        let pad = self.width - len;

        if self.zero && numeric && self.align.is_none() {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", body.as_str()),
            };
            return Ok(format!("{sign}{}{digits}", "0".repeat(pad)));
        }

        let fill = self.fill.unwrap_or(if self.zero { '0' } else { ' ' });
        let align = self.align.unwrap_or(if numeric { Align::Right } else { Align::Left });
        let repeat = |n: usize| fill.to_string().repeat(n);
        Ok(match align {
            Align::Left => format!("{body}{}", repeat(pad)),
            Align::Right => format!("{}{body}", repeat(pad)),
            Align::Center => format!("{}{body}{}", repeat(pad / 2), repeat(pad - pad / 2)),
        })
    }
}
