//! Normalization of traced SVG markup.
//!
//! Tracers emit documents with fixed pixel dimensions, XML
//! declarations, generator comments, and pretty-printing whitespace.
//! [`canonicalize`] rewrites such a document into a compact,
//! responsive, single-line form and validates the result. The steps run
//! in a fixed order:
//!
//! 1. root `width` / `height` become `100%` (a `viewBox` is added from
//!    the original pixel size when the root has none)
//! 2. `preserveAspectRatio="xMidYMid meet"` is added to the root, and
//!    so is the SVG `xmlns` when the tracer left it out
//! 3. every `fill` / `stroke` value, `none` included, is replaced when
//!    a non-default color was requested
//! 4. comments, processing instructions, and `<!DOCTYPE>` are removed
//! 5. whitespace runs collapse to one space and inter-tag whitespace
//!    is dropped
//! 6. anything before the first `<` is dropped
//! 7. the document must start with `<svg`, declare `xmlns`, end its
//!    root element, and contain no `<script`
//!
//! Canonicalizing an already canonical document returns it unchanged.

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::types::{ConversionOptions, SvgColor};

/// Compile a pattern that is known to be valid.
#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static pattern is valid")
}

static ROOT_TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"<svg\b[^>]*>"));
static ROOT_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(\s)width\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static ROOT_HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(\s)height\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static ROOT_VIEW_BOX: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"\sviewBox\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static ASPECT_RATIO: LazyLock<Regex> = LazyLock::new(|| pattern(r"\spreserveAspectRatio\s*="));
static PAINT_ATTR: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(\s)(fill|stroke)\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static COMMENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<!--.*?-->"));
static PROCESSING_INSTRUCTION: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)<\?.*?\?>"));
static DOCTYPE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<!DOCTYPE[^>]*>"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s+"));
static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| pattern(r">\s+<"));
static LEADING_TEXT: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[^<]*"));
static SCRIPT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<script"));
static XMLNS: LazyLock<Regex> = LazyLock::new(|| pattern(r"\sxmlns\s*="));

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Why a document failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSvgError {
    /// The document does not start with an `<svg` root element.
    #[error("document does not start with an <svg> root element")]
    NotSvg,

    /// The root element has no `xmlns` declaration.
    #[error("<svg> root is missing an xmlns declaration")]
    MissingNamespace,

    /// The root element is never closed.
    #[error("<svg> root element is not terminated")]
    Unterminated,

    /// The document embeds a script element.
    #[error("document contains a <script> element")]
    ContainsScript,
}

/// A validated, canonical SVG document.
///
/// Only produced by [`canonicalize`], [`validate`], and [`recolor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SvgDocument(String);

impl SvgDocument {
    /// The markup.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size of the markup in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Length of the markup in characters.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// Always `false`; a valid document has at least a root element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the document and return the markup.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SvgDocument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SvgDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize raw tracer output.
///
/// # Errors
///
/// Returns [`InvalidSvgError`] if the normalized markup is not an SVG
/// document, lacks a namespace, is truncated, or contains a script.
pub fn canonicalize(raw: &str, options: &ConversionOptions) -> Result<SvgDocument, InvalidSvgError> {
    let mut svg = rewrite_root(raw).into_owned();
    if let Some(color) = options.recolor_target() {
        svg = replace_paint(&svg, color).into_owned();
    }
    let svg = strip_markup_noise(&svg);
    let svg = collapse_whitespace(&svg);
    let svg = LEADING_TEXT.replace(&svg, "");
    validate(&svg)
}

/// Validate markup without modifying it.
///
/// # Errors
///
/// See [`canonicalize`].
pub fn validate(svg: &str) -> Result<SvgDocument, InvalidSvgError> {
    if !svg.starts_with("<svg") {
        return Err(InvalidSvgError::NotSvg);
    }
    let root = ROOT_TAG.find(svg).ok_or(InvalidSvgError::Unterminated)?;
    if !XMLNS.is_match(root.as_str()) {
        return Err(InvalidSvgError::MissingNamespace);
    }
    let self_closed = root.as_str().ends_with("/>") && root.end() == svg.len();
    if !self_closed && !svg.ends_with("</svg>") {
        return Err(InvalidSvgError::Unterminated);
    }
    if SCRIPT.is_match(svg) {
        return Err(InvalidSvgError::ContainsScript);
    }
    Ok(SvgDocument(svg.to_owned()))
}

/// Replace every `fill` and `stroke` value with `color`.
#[must_use]
pub fn recolor(svg: &SvgDocument, color: &SvgColor) -> SvgDocument {
    SvgDocument(replace_paint(&svg.0, color).into_owned())
}

/// Pixel size of a document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgSize {
    /// Width in user units.
    pub width: f64,
    /// Height in user units.
    pub height: f64,
}

/// Read the root's numeric `width` / `height`, falling back to the
/// `viewBox` extent when either is missing or relative (`100%`).
#[must_use]
pub fn svg_dimensions(svg: &str) -> Option<SvgSize> {
    let root = ROOT_TAG.find(svg)?.as_str();
    let width = attribute(&ROOT_WIDTH, root, 2).and_then(parse_length);
    let height = attribute(&ROOT_HEIGHT, root, 2).and_then(parse_length);
    if let (Some(width), Some(height)) = (width, height) {
        return Some(SvgSize { width, height });
    }
    let view_box = attribute(&ROOT_VIEW_BOX, root, 1)?;
    let parts: Vec<f64> = view_box
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [_, _, w, h] => Some(SvgSize {
            width: *w,
            height: *h,
        }),
        _ => None,
    }
}

/// Value of the first attribute matching `re` in `tag`. `group` is the
/// double-quoted capture; the single-quoted one follows it.
fn attribute<'a>(re: &Regex, tag: &'a str, group: usize) -> Option<&'a str> {
    let caps = re.captures(tag)?;
    caps.get(group)
        .or_else(|| caps.get(group + 1))
        .map(|m| m.as_str())
}

/// Parse an absolute length such as `"640"` or `"640px"`.
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value);
    number.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// Steps 1 and 2: responsive sizing and namespace on the root element.
fn rewrite_root(raw: &str) -> Cow<'_, str> {
    let Some(root) = ROOT_TAG.find(raw) else {
        return Cow::Borrowed(raw);
    };
    let tag = root.as_str();
    let mut rewritten = tag.to_owned();

    if !ROOT_VIEW_BOX.is_match(tag) {
        let width = attribute(&ROOT_WIDTH, tag, 2).filter(|v| parse_length(v).is_some());
        let height = attribute(&ROOT_HEIGHT, tag, 2).filter(|v| parse_length(v).is_some());
        if let (Some(w), Some(h)) = (width, height) {
            let w = w.trim().trim_end_matches("px");
            let h = h.trim().trim_end_matches("px");
            rewritten = insert_attribute(&rewritten, &format!(r#"viewBox="0 0 {w} {h}""#));
        }
    }

    rewritten = set_attribute(&rewritten, &ROOT_HEIGHT, "height", "100%");
    rewritten = set_attribute(&rewritten, &ROOT_WIDTH, "width", "100%");

    if !ASPECT_RATIO.is_match(&rewritten) {
        rewritten = insert_attribute(&rewritten, r#"preserveAspectRatio="xMidYMid meet""#);
    }

    if !XMLNS.is_match(&rewritten) {
        rewritten = insert_attribute(&rewritten, &format!(r#"xmlns="{SVG_NAMESPACE}""#));
    }

    if rewritten == tag {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 64);
    out.push_str(&raw[..root.start()]);
    out.push_str(&rewritten);
    out.push_str(&raw[root.end()..]);
    Cow::Owned(out)
}

/// Replace the first match of `re` in `tag`, or insert the attribute.
fn set_attribute(tag: &str, re: &Regex, name: &str, value: &str) -> String {
    if re.is_match(tag) {
        re.replacen(tag, 1, |caps: &Captures<'_>| format!(r#"{}{name}="{value}""#, &caps[1]))
            .into_owned()
    } else {
        insert_attribute(tag, &format!(r#"{name}="{value}""#))
    }
}

/// Insert `attribute` directly after `<svg`.
fn insert_attribute(tag: &str, attribute: &str) -> String {
    let rest = tag.strip_prefix("<svg").unwrap_or(tag);
    format!("<svg {attribute}{rest}")
}

/// Step 3.
fn replace_paint<'a>(svg: &'a str, color: &SvgColor) -> Cow<'a, str> {
    PAINT_ATTR.replace_all(svg, |caps: &Captures<'_>| {
        format!(r#"{}{}="{}""#, &caps[1], &caps[2], color.as_str())
    })
}

/// Step 4.
fn strip_markup_noise(svg: &str) -> String {
    let svg = COMMENT.replace_all(svg, "");
    let svg = PROCESSING_INSTRUCTION.replace_all(&svg, "");
    DOCTYPE.replace_all(&svg, "").into_owned()
}

/// Step 5.
fn collapse_whitespace(svg: &str) -> String {
    let svg = WHITESPACE.replace_all(svg, " ");
    let svg = BETWEEN_TAGS.replace_all(&svg, "><");
    svg.trim().to_owned()
}
