//! Snippet model and its mapping onto store documents.

use crate::error::{Result, StoreError};
use crate::types::{Document, DocumentId, Fields, OrderBy, QuerySpec, Timestamp, SCRAPING_SNIPPETS, SNIPPETS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field every catalog query is ordered by.
pub const ORDER_FIELD: &str = "date";

/// Category tag of a snippet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Case,
    Plugins,
    WebScraping,
    ApiScraping,
    DataExtraction,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Case => "CASE",
            Category::Plugins => "PLUGINS",
            Category::WebScraping => "Web Scraping",
            Category::ApiScraping => "API Scraping",
            Category::DataExtraction => "Data Extraction",
            Category::Other(s) => s,
        }
    }

    /// Whether this is the category that carries a plugin subtype.
    pub fn is_plugin(&self) -> bool {
        matches!(self, Category::Plugins)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s {
            "CASE" => Category::Case,
            "PLUGINS" => Category::Plugins,
            "Web Scraping" => Category::WebScraping,
            "API Scraping" => Category::ApiScraping,
            "Data Extraction" => Category::DataExtraction,
            other => Category::Other(other.to_string()),
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::from(s.as_str())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module format of a plugin snippet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PluginType {
    Esm,
    Cjs,
    Other(String),
}

impl PluginType {
    pub fn as_str(&self) -> &str {
        match self {
            PluginType::Esm => "ESM",
            PluginType::Cjs => "CJS",
            PluginType::Other(s) => s,
        }
    }
}

impl Default for PluginType {
    fn default() -> Self {
        PluginType::Esm
    }
}

impl From<&str> for PluginType {
    fn from(s: &str) -> Self {
        match s {
            "ESM" => PluginType::Esm,
            "CJS" => PluginType::Cjs,
            other => PluginType::Other(other.to_string()),
        }
    }
}

impl From<String> for PluginType {
    fn from(s: String) -> Self {
        PluginType::from(s.as_str())
    }
}

impl From<PluginType> for String {
    fn from(p: PluginType) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which snippet collection a catalog or upload targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Snippets,
    Scraping,
}

impl CollectionKind {
    pub fn collection(&self) -> &'static str {
        match self {
            CollectionKind::Snippets => SNIPPETS,
            CollectionKind::Scraping => SCRAPING_SNIPPETS,
        }
    }

    /// Resolve the `type` query parameter of a detail route.
    pub fn from_type_param(param: Option<&str>) -> Self {
        match param {
            Some("scraping") => CollectionKind::Scraping,
            _ => CollectionKind::Snippets,
        }
    }

    /// Categories offered by the list filter, without the "All" sentinel.
    pub fn categories(&self) -> Vec<Category> {
        match self {
            CollectionKind::Snippets => vec![Category::Case, Category::Plugins],
            CollectionKind::Scraping => vec![
                Category::WebScraping,
                Category::ApiScraping,
                Category::DataExtraction,
            ],
        }
    }

    /// The live query: newest first.
    pub fn query(&self) -> QuerySpec {
        QuerySpec::ordered(self.collection(), OrderBy::desc(ORDER_FIELD))
    }
}

/// A stored code sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Snippet {
    pub id: DocumentId,
    pub title: String,
    pub description: String,
    pub code: String,
    pub language: String,
    pub category: Category,
    /// Only present when `category` is [`Category::Plugins`].
    pub plugin_type: Option<PluginType>,
    pub author: String,
    pub date: Timestamp,
    pub watermark: Option<String>,
}

/// Wire shape of a snippet document.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnippetFields {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    language: String,
    category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plugin_type: Option<String>,
    #[serde(default)]
    author: String,
    date: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    watermark: Option<String>,
}

impl Snippet {
    /// Decode a snippet from a store document.
    ///
    /// A plugin subtype on a non-plugin category is discarded, as are empty
    /// optional strings.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let fields: SnippetFields =
            serde_json::from_value(serde_json::Value::Object(doc.fields.clone())).map_err(|e| {
                StoreError::Deserialization(format!("snippet {}: {}", doc.id, e))
            })?;

        let plugin_type = if fields.category.is_plugin() {
            non_empty(fields.plugin_type).map(PluginType::from)
        } else {
            None
        };

        Ok(Self {
            id: doc.id.clone(),
            title: fields.title,
            description: fields.description,
            code: fields.code,
            language: fields.language,
            category: fields.category,
            plugin_type,
            author: fields.author,
            date: fields.date,
            watermark: non_empty(fields.watermark),
        })
    }
}

/// A snippet before the store assigns its id.
#[derive(Clone, Debug, PartialEq)]
pub struct SnippetInput {
    pub title: String,
    pub description: String,
    pub code: String,
    pub language: String,
    pub category: Category,
    pub plugin_type: Option<PluginType>,
    pub author: String,
    pub date: Timestamp,
    pub watermark: Option<String>,
}

impl SnippetInput {
    /// Encode as document fields.
    pub fn to_fields(&self) -> Result<Fields> {
        let fields = SnippetFields {
            title: self.title.clone(),
            description: self.description.clone(),
            code: self.code.clone(),
            language: self.language.clone(),
            category: self.category.clone(),
            plugin_type: self.plugin_type.clone().map(String::from),
            author: self.author.clone(),
            date: self.date,
            watermark: self.watermark.clone(),
        };

        match serde_json::to_value(fields)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(StoreError::Serialization(format!(
                "snippet encoded as {other}, expected an object"
            ))),
        }
    }

    /// The snippet as it will read back once stored under `id`.
    pub fn into_snippet(self, id: DocumentId) -> Snippet {
        Snippet {
            id,
            title: self.title,
            description: self.description,
            code: self.code,
            language: self.language,
            category: self.category,
            plugin_type: self.plugin_type,
            author: self.author,
            date: self.date,
            watermark: self.watermark,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
