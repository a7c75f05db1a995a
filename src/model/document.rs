use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::item::Item;

/// Metadata for one plaintext file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Path relative to its root, `/`-separated
    pub path: String,
    pub title: String,
    /// Explicit date (front matter `date:` or a `YYYY-MM-DD` file name prefix)
    pub date: Option<NaiveDate>,
    /// Tags (without the `#` prefix), sorted and deduplicated
    pub tags: Vec<String>,
    /// Full text, used for full-text search
    pub content: String,
}

/// Whether a link is written as a structured link or an inline reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// `[[target]]` or `[text](target)`
    Structured,
    /// Bare `https://…` URL in running text
    Inline,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Structured => "structured",
            LinkKind::Inline => "inline",
        }
    }

    pub fn parse_kind(s: &str) -> Option<LinkKind> {
        match s {
            "structured" => Some(LinkKind::Structured),
            "inline" => Some(LinkKind::Inline),
            _ => None,
        }
    }
}

/// An outgoing link, always recorded from its source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub target: String,
    pub label: Option<String>,
    pub kind: LinkKind,
    pub external: bool,
    /// 1-based source line
    pub line: usize,
}

/// A referenced file or URL attached to a document or an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub target: String,
    /// Index into the extraction's item list when owned by an item
    #[serde(skip)]
    pub item: Option<usize>,
    pub external: bool,
    /// The file already lives in the managed attachment directory
    pub copied: bool,
    pub line: usize,
}

/// Everything extracted from one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub document: Document,
    pub items: Vec<Item>,
    pub links: Vec<Link>,
    pub attachments: Vec<Attachment>,
}

impl Extraction {
    /// Indices of all descendants of the item at `idx`, in document order
    pub fn descendants(&self, idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for (i, item) in self.items.iter().enumerate().skip(idx + 1) {
            let mut parent = item.parent;
            while let Some(p) = parent {
                if p == idx {
                    out.push(i);
                    break;
                }
                parent = self.items[p].parent;
            }
        }
        out
    }
}

/// Addresses a document by notebook and relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocRef {
    pub notebook: String,
    pub path: String,
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.notebook, self.path)
    }
}

/// A document as read back from the index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub notebook: String,
    pub path: String,
    pub root: String,
    pub abs_path: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub mtime_ns: i64,
    pub size: i64,
    pub excluded: bool,
    pub read_only: bool,
}

impl DocumentRecord {
    pub fn doc_ref(&self) -> DocRef {
        DocRef {
            notebook: self.notebook.clone(),
            path: self.path.clone(),
        }
    }
}
