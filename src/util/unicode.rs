use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Display width in terminal cells. Tabs count as 4 cells.
pub fn display_width(s: &str) -> usize {
    s.graphemes(true).map(grapheme_width).sum()
}

/// Cut `s` to at most `max_cells` cells, ending in `…` when anything was
/// dropped. Never splits a grapheme cluster.
pub fn truncate_to_width(s: &str, max_cells: usize) -> String {
    if max_cells == 0 {
        return String::new();
    }
    if display_width(s) <= max_cells {
        return s.to_string();
    }
    let budget = max_cells - 1;
    let mut width = 0;
    let mut out = String::new();
    for g in s.graphemes(true) {
        let w = grapheme_width(g);
        if width + w > budget {
            break;
        }
        width += w;
        out.push_str(g);
    }
    out.push('\u{2026}');
    out
}

/// Left-align `s` in a column `cells` wide
pub fn pad_to_width(s: &str, cells: usize) -> String {
    let pad = cells.saturating_sub(display_width(s));
    format!("{}{}", s, " ".repeat(pad))
}

fn grapheme_width(g: &str) -> usize {
    if g == "\t" {
        return 4;
    }
    UnicodeWidthStr::width(g)
}
