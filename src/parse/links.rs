use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::document::LinkKind;

static WIKI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[\[([^\]\|]+)(?:\|([^\]]+))?\]\]").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(!?)\[([^\]]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).unwrap());
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:https?|ftp)://[^\s<>()\[\]]+").unwrap());
static ATTACH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@attach\(([^)]+)\)").unwrap());
static STANDALONE_EMBED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:!\[[^\]]*\]\([^)]+\)|!\[\[[^\]]+\]\]|@attach\([^)]+\))$").unwrap()
});
static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]+:").unwrap());

/// A link found on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineLink {
    pub target: String,
    pub label: Option<String>,
    pub kind: LinkKind,
    pub external: bool,
}

/// An attachment reference found on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAttachment {
    pub target: String,
    pub external: bool,
}

/// Links and attachments on one line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineRefs {
    pub links: Vec<LineLink>,
    pub attachments: Vec<LineAttachment>,
}

/// True for targets carrying a URL scheme (`https:`, `mailto:`, …)
pub fn is_external(target: &str) -> bool {
    SCHEME_RE.is_match(target)
}

/// The whole (trimmed) line is a single embed
pub fn is_attachment_line(trimmed: &str) -> bool {
    STANDALONE_EMBED_RE.is_match(trimmed)
}

/// Find structured links, inline URLs, and attachment references in a line
pub fn scan_line(line: &str) -> LineRefs {
    let mut refs = LineRefs::default();
    let mut claimed: Vec<Range<usize>> = Vec::new();

    for caps in WIKI_RE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        claimed.push(whole.range());
        let target = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        if target.is_empty() {
            continue;
        }
        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            refs.attachments.push(LineAttachment {
                external: is_external(&target),
                target,
            });
        } else {
            refs.links.push(LineLink {
                external: is_external(&target),
                label: caps.get(3).map(|m| m.as_str().trim().to_string()),
                target,
                kind: LinkKind::Structured,
            });
        }
    }

    for caps in MD_LINK_RE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if overlaps(&claimed, &whole.range()) {
            continue;
        }
        claimed.push(whole.range());
        let target = caps.get(3).map_or("", |m| m.as_str()).to_string();
        // In-page anchors are not links between documents
        if target.is_empty() || target.starts_with('#') {
            continue;
        }
        let label = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|l| !l.is_empty());
        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            refs.attachments.push(LineAttachment {
                external: is_external(&target),
                target,
            });
        } else {
            refs.links.push(LineLink {
                external: is_external(&target),
                label,
                target,
                kind: LinkKind::Structured,
            });
        }
    }

    for m in URL_RE.find_iter(line) {
        if overlaps(&claimed, &m.range()) {
            continue;
        }
        let target = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '\'', '"']);
        refs.links.push(LineLink {
            target: target.to_string(),
            label: None,
            kind: LinkKind::Inline,
            external: true,
        });
    }

    for caps in ATTACH_RE.captures_iter(line) {
        if let Some(m) = caps.get(1) {
            let target = m.as_str().trim().to_string();
            refs.attachments.push(LineAttachment {
                external: is_external(&target),
                target,
            });
        }
    }

    refs
}

fn overlaps(claimed: &[Range<usize>], r: &Range<usize>) -> bool {
    claimed.iter().any(|c| c.start < r.end && r.start < c.end)
}

/// A local attachment target inside the managed attachment directory
pub fn is_managed_attachment(target: &str, attachments_dir: &str) -> bool {
    if attachments_dir.is_empty() || is_external(target) {
        return false;
    }
    target
        .split(['/', '\\'])
        .any(|component| component == attachments_dir)
}
