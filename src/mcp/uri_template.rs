//! Structural matching of URIs against `{variable}` templates.
//!
//! Resource dispatch tries exact-URI registrations first and falls back to
//! scanning registered templates; this module implements that structural
//! match. A template is a sequence of literal chunks and `{variable}`
//! placeholders. Each placeholder captures the shortest non-empty span up to
//! the next literal chunk; a trailing placeholder captures the rest of the
//! URI.

use std::collections::HashMap;

/// Match `uri` against `template`, returning captured variables on success.
///
/// Returns `None` when the URI does not structurally fit the template or a
/// placeholder would capture an empty span.
#[must_use]
pub fn match_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let parts = parse(template)?;
    let mut vars = HashMap::new();
    let mut rest = uri;
    let mut idx = 0;

    while idx < parts.len() {
        match &parts[idx] {
            Part::Literal(lit) => {
                rest = rest.strip_prefix(lit.as_str())?;
                idx += 1;
            }
            Part::Variable(name) => {
                // Anchor the capture at the next literal, or consume the
                // remainder for a trailing placeholder.
                let capture_end = match parts.get(idx + 1) {
                    Some(Part::Literal(next_lit)) => rest.find(next_lit.as_str())?,
                    Some(Part::Variable(_)) | None => rest.len(),
                };
                if capture_end == 0 {
                    return None;
                }
                vars.insert(name.clone(), rest[..capture_end].to_owned());
                rest = &rest[capture_end..];
                idx += 1;
            }
        }
    }

    rest.is_empty().then_some(vars)
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// One parsed template part.
enum Part {
    Literal(String),
    Variable(String),
}

/// Split a template into literal and `{variable}` parts.
///
/// Returns `None` for malformed templates: unbalanced braces, empty variable
/// names, or two placeholders back to back (the first would have no anchor).
fn parse(template: &str) -> Option<Vec<Part>> {
    let mut parts = Vec::new();
    let mut rest = template;

    while !rest.is_empty() {
        match rest.find('{') {
            None => {
                if rest.contains('}') {
                    return None;
                }
                parts.push(Part::Literal(rest.to_owned()));
                rest = "";
            }
            Some(open) => {
                if open > 0 {
                    parts.push(Part::Literal(rest[..open].to_owned()));
                }
                let after_open = &rest[open + 1..];
                let close = after_open.find('}')?;
                let name = &after_open[..close];
                if name.is_empty() || name.contains('{') {
                    return None;
                }
                if matches!(parts.last(), Some(Part::Variable(_))) {
                    return None;
                }
                parts.push(Part::Variable(name.to_owned()));
                rest = &after_open[close + 1..];
            }
        }
    }

    Some(parts)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
