use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Item checkbox state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
}

impl ItemStatus {
    /// The character written inside the checkbox `[ ]`
    pub fn marker_char(self) -> char {
        match self {
            ItemStatus::Pending => ' ',
            ItemStatus::InProgress => '>',
            ItemStatus::Completed => 'x',
        }
    }

    /// Parse a checkbox character into a state. `/` and `X` are accepted
    /// spellings of in-progress and completed.
    pub fn from_marker_char(c: char) -> Option<ItemStatus> {
        match c {
            ' ' => Some(ItemStatus::Pending),
            '>' | '/' => Some(ItemStatus::InProgress),
            'x' | 'X' => Some(ItemStatus::Completed),
            _ => None,
        }
    }

    /// Toggle: completed → pending, anything else → completed
    pub fn toggled(self) -> ItemStatus {
        match self {
            ItemStatus::Completed => ItemStatus::Pending,
            ItemStatus::Pending | ItemStatus::InProgress => ItemStatus::Completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
        }
    }

    pub fn parse_status(s: &str) -> Option<ItemStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "todo" | "open" => Some(ItemStatus::Pending),
            "in_progress" | "in-progress" | "active" | "started" => Some(ItemStatus::InProgress),
            "completed" | "done" | "closed" => Some(ItemStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank stored in the index (1 = high)
    pub fn rank(self) -> i64 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Priority> {
        match rank {
            1 => Some(Priority::High),
            2 => Some(Priority::Medium),
            3 => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse_priority(s: &str) -> Option<Priority> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" | "1" => Some(Priority::High),
            "medium" | "med" | "m" | "2" => Some(Priority::Medium),
            "low" | "l" | "3" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// A checkbox item extracted from a document.
///
/// Items live in a flat list per extraction; `parent` indexes into that list
/// and `parent_id` carries the parent's stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier (content-derived, see `parse::identity`)
    pub id: String,
    /// Display text with inline tokens removed
    pub text: String,
    /// The unmodified source line
    pub raw: String,
    pub status: ItemStatus,
    pub due: Option<NaiveDate>,
    pub priority: Option<Priority>,
    /// Tags (without the `#` prefix)
    pub tags: Vec<String>,
    /// Index of the parent item within the same extraction
    #[serde(skip)]
    pub parent: Option<usize>,
    pub parent_id: Option<String>,
    /// Indented non-item lines following the item, verbatim
    pub detail: Option<String>,
    /// Nearest preceding heading text
    pub section: Option<String>,
    /// 1-based line number in the source (a hint, not identity)
    pub line: usize,
    /// Indentation width in columns (tabs count as 4)
    pub indent: usize,
}

impl Item {
    pub fn is_completed(&self) -> bool {
        self.status == ItemStatus::Completed
    }
}

/// An item as read back from the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    pub id: String,
    pub document_id: i64,
    pub notebook: String,
    pub path: String,
    pub text: String,
    pub raw: String,
    pub status: ItemStatus,
    pub due: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
    pub parent_id: Option<String>,
    pub detail: Option<String>,
    pub section: Option<String>,
    pub line: usize,
    pub indent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_chars_round_trip() {
        for status in [
            ItemStatus::Pending,
            ItemStatus::InProgress,
            ItemStatus::Completed,
        ] {
            assert_eq!(ItemStatus::from_marker_char(status.marker_char()), Some(status));
        }
        assert_eq!(ItemStatus::from_marker_char('/'), Some(ItemStatus::InProgress));
        assert_eq!(ItemStatus::from_marker_char('X'), Some(ItemStatus::Completed));
        assert_eq!(ItemStatus::from_marker_char('?'), None);
    }

    #[test]
    fn toggle_transitions() {
        assert_eq!(ItemStatus::Pending.toggled(), ItemStatus::Completed);
        assert_eq!(ItemStatus::InProgress.toggled(), ItemStatus::Completed);
        assert_eq!(ItemStatus::Completed.toggled(), ItemStatus::Pending);
    }

    #[test]
    fn priority_rank_round_trip() {
        for p in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(Priority::from_rank(p.rank()), Some(p));
        }
        assert_eq!(Priority::parse_priority("Med"), Some(Priority::Medium));
        assert_eq!(Priority::parse_priority("urgent"), None);
    }
}
