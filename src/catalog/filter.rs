//! Client-side filtering of a catalog snapshot.

use crate::snippet::{Category, PluginType, Snippet};
use std::fmt;

/// Sentinel that disables a filter.
pub const ALL: &str = "All";

/// Category predicate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: &Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => wanted == category,
        }
    }

    fn is_plugin(&self) -> bool {
        matches!(self, CategoryFilter::Only(c) if c.is_plugin())
    }
}

impl From<&str> for CategoryFilter {
    fn from(s: &str) -> Self {
        if s == ALL {
            CategoryFilter::All
        } else {
            CategoryFilter::Only(Category::from(s))
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str(ALL),
            CategoryFilter::Only(c) => c.fmt(f),
        }
    }
}

/// Plugin-subtype predicate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PluginFilter {
    #[default]
    All,
    Only(PluginType),
}

impl PluginFilter {
    pub fn matches(&self, plugin_type: Option<&PluginType>) -> bool {
        match self {
            PluginFilter::All => true,
            PluginFilter::Only(wanted) => plugin_type == Some(wanted),
        }
    }
}

impl From<&str> for PluginFilter {
    fn from(s: &str) -> Self {
        if s == ALL {
            PluginFilter::All
        } else {
            PluginFilter::Only(PluginType::from(s))
        }
    }
}

impl fmt::Display for PluginFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginFilter::All => f.write_str(ALL),
            PluginFilter::Only(p) => p.fmt(f),
        }
    }
}

/// Search text plus category and plugin-subtype predicates.
///
/// - search: case-insensitive substring of the title
/// - category: exact match unless `All`
/// - plugin subtype: only consulted when the category filter is the plugin
///   category
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SnippetFilter {
    pub search: String,
    pub category: CategoryFilter,
    pub plugin_type: PluginFilter,
}

impl SnippetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<CategoryFilter>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_plugin_type(mut self, plugin_type: impl Into<PluginFilter>) -> Self {
        self.plugin_type = plugin_type.into();
        self
    }

    pub fn matches(&self, snippet: &Snippet) -> bool {
        let needle = self.search.to_lowercase();
        self.matches_lowered(snippet, &needle)
    }

    /// Filter a snapshot, preserving its order.
    pub fn apply(&self, snippets: &[Snippet]) -> Vec<Snippet> {
        let needle = self.search.to_lowercase();
        snippets
            .iter()
            .filter(|s| self.matches_lowered(s, &needle))
            .cloned()
            .collect()
    }

    fn matches_lowered(&self, snippet: &Snippet, needle: &str) -> bool {
        if !needle.is_empty() && !snippet.title.to_lowercase().contains(needle) {
            return false;
        }
        if !self.category.matches(&snippet.category) {
            return false;
        }
        if self.category.is_plugin() && !self.plugin_type.matches(snippet.plugin_type.as_ref()) {
            return false;
        }
        true
    }
}

/// Filter `snapshot` by title search, category and plugin subtype.
pub fn filter(
    snapshot: &[Snippet],
    search: &str,
    category: &CategoryFilter,
    plugin_type: &PluginFilter,
) -> Vec<Snippet> {
    SnippetFilter {
        search: search.to_string(),
        category: category.clone(),
        plugin_type: plugin_type.clone(),
    }
    .apply(snapshot)
}
