pub mod dates;
pub mod extractor;
pub mod frontmatter;
pub mod identity;
pub mod inline;
pub mod line;
pub mod links;

pub use extractor::{ExtractOptions, extract, item_signature};
pub use identity::normalize;
pub use line::{Classifier, Line, parse_item_line, set_marker};
