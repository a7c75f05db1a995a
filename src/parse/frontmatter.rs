use chrono::NaiveDate;
use serde_yaml::Value;

/// Fields read from a leading `---` YAML block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

/// Split a leading front matter block off `lines`.
///
/// Returns the parsed fields and the number of lines the block occupies
/// (including both delimiters), or `None` when the text has no complete
/// block. Malformed YAML still consumes the block but yields no fields.
pub fn split_front_matter(lines: &[&str]) -> Option<(FrontMatter, usize)> {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return None;
    }
    let close = lines
        .iter()
        .skip(1)
        .position(|l| matches!(l.trim_end(), "---" | "..."))?
        + 1;
    let yaml = lines[1..close].join("\n");
    let front = match serde_yaml::from_str::<Value>(&yaml) {
        Ok(Value::Mapping(map)) => {
            let get = |key: &str| map.get(key);
            FrontMatter {
                title: get("title").and_then(scalar_string),
                date: get("date")
                    .and_then(scalar_string)
                    .and_then(|s| s.get(..10).map(str::to_string))
                    .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                tags: get("tags").map(tag_list).unwrap_or_default(),
            }
        }
        _ => FrontMatter::default(),
    };
    Some((front, close + 1))
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tag_list(v: &Value) -> Vec<String> {
    let raw: Vec<String> = match v {
        Value::Sequence(seq) => seq.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split([',', ' '])
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    let mut tags: Vec<String> = Vec::new();
    for t in raw {
        let t = t.trim().trim_start_matches('#').to_string();
        if !t.is_empty() && !tags.contains(&t) {
            tags.push(t);
        }
    }
    tags
}
