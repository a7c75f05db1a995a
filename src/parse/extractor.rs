use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;

use crate::model::document::{Attachment, Document, Extraction, Link};
use crate::model::item::Item;
use crate::parse::dates::date_from_file_name;
use crate::parse::frontmatter::{FrontMatter, split_front_matter};
use crate::parse::identity::{IdentityContext, item_id, normalize};
use crate::parse::inline::{extract_tags, parse_inline};
use crate::parse::line::{Classifier, Line, indent_width};
use crate::parse::links::{is_managed_attachment, scan_line};

/// Inputs the extractor needs besides the text itself
#[derive(Debug, Clone)]
pub struct ExtractOptions<'a> {
    /// Notebook the document belongs to (part of item identity)
    pub notebook: &'a str,
    /// Reference date for relative due dates
    pub today: NaiveDate,
    /// Managed attachment directory name
    pub attachments_dir: &'a str,
}

/// The content signature of an item body: normalized text without tokens.
///
/// Token recognition does not depend on the reference date, so any date
/// yields the same signature.
pub fn item_signature(body: &str) -> String {
    normalize(&parse_inline(body, NaiveDate::default()).text)
}

/// Extract document metadata, items, links, and attachments from `raw`.
///
/// Never fails: unrecognized lines are plain text.
pub fn extract(path: &str, raw: &str, opts: &ExtractOptions<'_>) -> Extraction {
    let lines: Vec<&str> = raw.lines().collect();
    let (front, body_start) = split_front_matter(&lines).unwrap_or((FrontMatter::default(), 0));

    let mut first_h1: Option<String> = None;
    let mut doc_tags: Vec<String> = front.tags.clone();
    let mut headings: Vec<(usize, String)> = Vec::new();
    // (indent, item index) of the open ancestors
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut occurrences: HashMap<(Option<String>, Option<String>, String), usize> = HashMap::new();
    let mut last_item: Option<usize> = None;

    let mut items: Vec<Item> = Vec::new();
    let mut links: Vec<Link> = Vec::new();
    let mut attachments: Vec<Attachment> = Vec::new();

    let mut classifier = Classifier::new();

    for (idx, line) in lines.iter().enumerate().skip(body_start) {
        let line_no = idx + 1;
        let owner = match classifier.classify(line) {
            Line::Blank => continue,
            Line::Code(_) => {
                stack.clear();
                continue;
            }
            Line::Heading { level, text } => {
                if level == 1 && first_h1.is_none() {
                    first_h1 = Some(text.to_string());
                }
                while headings.last().is_some_and(|(l, _)| *l >= level) {
                    headings.pop();
                }
                headings.push((level, text.to_string()));
                doc_tags.extend(extract_tags(text));
                stack.clear();
                last_item = None;
                None
            }
            Line::Item(item_line) => {
                let meta = parse_inline(item_line.body, opts.today);
                while stack.last().is_some_and(|(indent, _)| *indent >= item_line.indent) {
                    stack.pop();
                }
                let parent = stack.last().map(|(_, i)| *i);
                let parent_id = parent.map(|p| items[p].id.clone());
                let section = headings.last().map(|(_, t)| t.clone());
                let signature = normalize(&meta.text);

                let key = (section.clone(), parent_id.clone(), signature.clone());
                let seen = occurrences.entry(key).or_insert(0);
                let occurrence = *seen;
                *seen += 1;

                let id = item_id(
                    IdentityContext {
                        notebook: opts.notebook,
                        path,
                        section: section.as_deref(),
                        parent_id: parent_id.as_deref(),
                    },
                    &signature,
                    occurrence,
                );

                let index = items.len();
                items.push(Item {
                    id,
                    text: meta.text,
                    raw: line.to_string(),
                    status: item_line.status,
                    due: meta.due,
                    priority: meta.priority,
                    tags: meta.tags,
                    parent,
                    parent_id,
                    detail: None,
                    section,
                    line: line_no,
                    indent: item_line.indent,
                });
                stack.push((item_line.indent, index));
                last_item = Some(index);
                Some(index)
            }
            Line::Detail(text) => {
                if let Some(i) = last_item {
                    let detail = items[i].detail.get_or_insert_with(String::new);
                    if !detail.is_empty() {
                        detail.push('\n');
                    }
                    detail.push_str(text);
                }
                last_item
            }
            Line::Attachment(text) | Line::Plain(text) => {
                // Prose ends every open item at or deeper than its indent
                let indent = indent_width(line);
                while stack.last().is_some_and(|(i, _)| *i >= indent) {
                    stack.pop();
                }
                doc_tags.extend(extract_tags(text));
                None
            }
        };

        let refs = scan_line(line);
        for link in refs.links {
            links.push(Link {
                target: link.target,
                label: link.label,
                kind: link.kind,
                external: link.external,
                line: line_no,
            });
        }
        for att in refs.attachments {
            attachments.push(Attachment {
                copied: is_managed_attachment(&att.target, opts.attachments_dir),
                target: att.target,
                item: owner,
                external: att.external,
                line: line_no,
            });
        }
    }

    doc_tags.sort();
    doc_tags.dedup();

    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    let title = front
        .title
        .or(first_h1)
        .unwrap_or_else(|| {
            Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(path)
                .to_string()
        });
    let date = front.date.or_else(|| date_from_file_name(file_name));

    Extraction {
        document: Document {
            path: path.to_string(),
            title,
            date,
            tags: doc_tags,
            content: raw.to_string(),
        },
        items,
        links,
        attachments,
    }
}
