use sha2::{Digest, Sha256};

/// Lowercased text with whitespace collapsed; the content signature used for
/// identity and relocation.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where an item sits, independent of its line number
#[derive(Debug, Clone, Copy)]
pub struct IdentityContext<'a> {
    pub notebook: &'a str,
    pub path: &'a str,
    pub section: Option<&'a str>,
    pub parent_id: Option<&'a str>,
}

/// Stable item identifier: 16 hex chars of SHA-256 over the item's context,
/// its normalized text, and its occurrence among identical siblings.
///
/// Status, due date, priority, and tags are not inputs, so editing them keeps
/// the identifier.
pub fn item_id(ctx: IdentityContext<'_>, signature: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    for part in [
        ctx.notebook,
        ctx.path,
        ctx.section.unwrap_or(""),
        ctx.parent_id.unwrap_or(""),
        signature,
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(occurrence.to_le_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
