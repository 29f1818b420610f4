//! Accessibility rubric over the root document
//!
//! A fixed set of checks evaluated against raw HTML. Score is the
//! fraction of checks that pass; 0.8 or better passes overall. The
//! checks are deliberately string-level; the rubric needs to be
//! cheap and deterministic, not a full DOM audit.

use warden_common::{AccessibilityCheck, AccessibilityRule};

const PASS_THRESHOLD: f64 = 0.8;

/// Evaluate the rubric over an HTML document.
pub fn evaluate(html: &str) -> AccessibilityCheck {
    let lower = html.to_ascii_lowercase();

    let checks = vec![
        rule("title", has_title(&lower)),
        rule("meta-description", lower.contains("name=\"description\"")),
        rule("top-level-heading", lower.contains("<h1")),
        rule(
            "navigation-landmark",
            lower.contains("<nav") || lower.contains("role=\"navigation\""),
        ),
        rule(
            "main-landmark",
            lower.contains("<main") || lower.contains("role=\"main\""),
        ),
        rule("skip-link", has_skip_link(&lower)),
        rule("language-attribute", has_lang_attribute(&lower)),
        rule("image-alt-text", images_have_alt(&lower)),
        rule("heading-hierarchy", headings_are_monotonic(&lower)),
        rule("button-labels", buttons_have_labels(&lower)),
    ];

    let passed = checks.iter().filter(|c| c.passed).count();
    let score = passed as f64 / checks.len() as f64;
    AccessibilityCheck {
        score,
        passed: score >= PASS_THRESHOLD,
        checks,
    }
}

fn rule(name: &str, passed: bool) -> AccessibilityRule {
    AccessibilityRule {
        name: name.to_string(),
        passed,
    }
}

fn has_title(html: &str) -> bool {
    match html.find("<title") {
        Some(start) => {
            let rest = &html[start..];
            match (rest.find('>'), rest.find("</title>")) {
                (Some(open), Some(close)) if open + 1 <= close => {
                    !rest[open + 1..close].trim().is_empty()
                }
                _ => false,
            }
        }
        None => false,
    }
}

fn has_skip_link(html: &str) -> bool {
    html.contains("skip-link")
        || html.contains("skip to main")
        || html.contains("href=\"#main")
}

fn has_lang_attribute(html: &str) -> bool {
    match html.find("<html") {
        Some(start) => {
            let rest = &html[start..];
            match rest.find('>') {
                Some(end) => rest[..end].contains(" lang="),
                None => false,
            }
        }
        None => false,
    }
}

/// Every `<img` tag must carry an alt attribute. No images passes.
fn images_have_alt(html: &str) -> bool {
    tags(html, "<img").all(|tag| tag.contains("alt="))
}

/// Every `<button` tag must carry an aria-label. No buttons passes.
fn buttons_have_labels(html: &str) -> bool {
    tags(html, "<button").all(|tag| tag.contains("aria-label"))
}

/// Heading levels in document order must start at h1 and never skip
/// a level downward (h1 -> h3 fails, h3 -> h1 is fine).
fn headings_are_monotonic(html: &str) -> bool {
    let mut levels = Vec::new();
    let mut cursor = 0;
    while let Some(found) = html[cursor..].find("<h") {
        let at = cursor + found;
        let next = html.as_bytes().get(at + 2).copied();
        if let Some(digit @ b'1'..=b'6') = next {
            levels.push((digit - b'0') as u32);
        }
        cursor = at + 2;
    }

    if levels.is_empty() {
        return true;
    }
    if levels[0] != 1 {
        return false;
    }
    levels.windows(2).all(|pair| pair[1] <= pair[0] + 1)
}

/// Iterate raw tag bodies (`<img ... >`) for a given opener.
fn tags<'a>(html: &'a str, opener: &'a str) -> impl Iterator<Item = &'a str> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let found = html[cursor..].find(opener)?;
        let start = cursor + found;
        let end = html[start..].find('>').map(|e| start + e)?;
        cursor = end + 1;
        Some(&html[start..end])
    })
}
