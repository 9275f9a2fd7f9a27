//! Presentation helpers. Everything here is a pure function of its input.

use crate::snippet::Snippet;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::fmt::Write as _;

const COMPACT_SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];

/// Format a count with a magnitude suffix and at most one decimal:
/// `950`, `1.2K`, `3M`.
pub fn format_compact(n: u64) -> String {
    let mut exp = 0;
    let mut scaled = n as f64;
    while scaled >= 1000.0 && exp < COMPACT_SUFFIXES.len() - 1 {
        scaled /= 1000.0;
        exp += 1;
    }

    let mut rounded = (scaled * 10.0).round() / 10.0;
    // 999.96K rounds up into the next unit.
    if rounded >= 1000.0 && exp < COMPACT_SUFFIXES.len() - 1 {
        rounded = (rounded / 1000.0 * 10.0).round() / 10.0;
        exp += 1;
    }

    if rounded.fract() == 0.0 {
        format!("{:.0}{}", rounded, COMPACT_SUFFIXES[exp])
    } else {
        format!("{:.1}{}", rounded, COMPACT_SUFFIXES[exp])
    }
}

/// One row of the admin management table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnippetRow {
    pub id: String,
    pub title: String,
    pub language: String,
    pub author: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

impl From<&Snippet> for SnippetRow {
    fn from(snippet: &Snippet) -> Self {
        Self {
            id: snippet.id.to_string(),
            title: snippet.title.clone(),
            language: snippet.language.clone(),
            author: snippet.author.clone(),
            date: snippet.date.0.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Render snippets as a table.
pub fn snippet_table(snippets: &[Snippet]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Id", "Title", "Language", "Category", "Author", "Date"]);

    for snippet in snippets {
        let row = SnippetRow::from(snippet);
        let category = match &snippet.plugin_type {
            Some(plugin_type) => format!("{} ({})", snippet.category, plugin_type),
            None => snippet.category.to_string(),
        };
        table.add_row(vec![row.id, row.title, row.language, category, row.author, row.date]);
    }
    table
}

/// Full text of one snippet for the detail view.
pub fn render_detail(snippet: &Snippet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", snippet.title);
    let _ = writeln!(out, "{}", "=".repeat(snippet.title.chars().count().max(1)));
    let _ = writeln!(out, "{}", snippet.description);
    let _ = writeln!(out);

    let mut tags = vec![snippet.language.clone(), snippet.category.to_string()];
    if let Some(plugin_type) = &snippet.plugin_type {
        tags.push(plugin_type.to_string());
    }
    let _ = writeln!(out, "[{}]", tags.join("] ["));
    let _ = writeln!(out, "By: {}  {}", snippet.author, SnippetRow::from(snippet).date);
    if let Some(watermark) = &snippet.watermark {
        let _ = writeln!(out, "Watermark: {watermark}");
    }
    let _ = writeln!(out);
    out.push_str(&snippet.code);
    if !snippet.code.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Counts for the analytics tab.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub snippets: usize,
    pub scraping_snippets: usize,
    pub users: usize,
    pub visitors: u64,
}

impl DashboardStats {
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Metric", "Value"])
            .add_row(vec!["Snippets".to_string(), self.snippets.to_string()])
            .add_row(vec!["Scraping snippets".to_string(), self.scraping_snippets.to_string()])
            .add_row(vec!["Users".to_string(), self.users.to_string()])
            .add_row(vec!["Visitors".to_string(), format_compact(self.visitors)]);
        table
    }
}
