//! Admin mutation workflow: validated uploads and deletes.
//!
//! Mutations go straight to the store. The catalogs pick them up through
//! their subscriptions; nothing is spliced into a local snapshot here.

use crate::config::AdminConfig;
use crate::error::{AdminError, ValidationError};
use crate::snippet::{Category, CollectionKind, PluginType, SnippetInput};
use crate::store::{DocumentStore, SnippetCollection};
use crate::types::{DocumentId, Timestamp};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A signed-in admin. Required by every mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminSession {
    email: String,
}

impl AdminSession {
    /// Open a session for an allow-listed email.
    pub fn sign_in(email: &str, config: &AdminConfig) -> Result<Self, AdminError> {
        if !config.is_admin(email) {
            warn!(email, "admin sign-in rejected");
            return Err(AdminError::Unauthenticated);
        }
        Ok(Self {
            email: email.trim().to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// The upload form.
#[derive(Clone, Debug, PartialEq)]
pub struct SnippetForm {
    pub title: String,
    pub description: String,
    pub code: String,
    pub language: String,
    pub category: Category,
    pub plugin_type: Option<PluginType>,
    pub watermark: String,
}

impl Default for SnippetForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            code: String::new(),
            language: "JavaScript".to_string(),
            category: Category::Case,
            plugin_type: None,
            watermark: String::new(),
        }
    }
}

impl SnippetForm {
    /// Change category; choosing the plugin category preselects ESM.
    pub fn set_category(&mut self, category: Category) {
        self.plugin_type = category.is_plugin().then(PluginType::default);
        self.category = category;
    }

    /// Fill the code field from a JavaScript file.
    pub fn load_code_file(&mut self, path: &Path) -> Result<(), ValidationError> {
        let is_js = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("js"));
        if !is_js {
            return Err(ValidationError::UnsupportedFile(path.display().to_string()));
        }

        self.code = std::fs::read_to_string(path).map_err(|e| ValidationError::UnreadableFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Title, description and code must be non-blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        if self.code.trim().is_empty() {
            return Err(ValidationError::MissingField("code"));
        }
        Ok(())
    }

    /// Build the stored record. The plugin subtype is kept only for the
    /// plugin category (defaulting to ESM there).
    fn to_input(&self, author: &str, date: Timestamp) -> SnippetInput {
        let plugin_type = if self.category.is_plugin() {
            Some(self.plugin_type.clone().unwrap_or_default())
        } else {
            None
        };
        let watermark = self.watermark.trim();

        SnippetInput {
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            code: self.code.clone(),
            language: self.language.clone(),
            category: self.category.clone(),
            plugin_type,
            author: author.to_string(),
            date,
            watermark: (!watermark.is_empty()).then(|| watermark.to_string()),
        }
    }
}

/// Submits creates and deletes against the snippet collections.
pub struct AdminWorkflow {
    snippets: SnippetCollection,
    scraping: SnippetCollection,
    /// Last creation timestamp issued.
    last_issued: Mutex<Option<Timestamp>>,
}

impl AdminWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            snippets: SnippetCollection::new(Arc::clone(&store), CollectionKind::Snippets),
            scraping: SnippetCollection::new(store, CollectionKind::Scraping),
            last_issued: Mutex::new(None),
        }
    }

    fn collection(&self, kind: CollectionKind) -> &SnippetCollection {
        match kind {
            CollectionKind::Snippets => &self.snippets,
            CollectionKind::Scraping => &self.scraping,
        }
    }

    /// A creation timestamp strictly later than any issued before.
    fn next_timestamp(&self) -> Timestamp {
        let mut last = self.last_issued.lock();
        let mut now = Timestamp::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = Timestamp::from_millis(prev.millis() + 1);
            }
        }
        *last = Some(now);
        now
    }

    /// Validate and store a new snippet; returns the store-assigned id.
    pub fn submit_create(
        &self,
        session: Option<&AdminSession>,
        kind: CollectionKind,
        form: &SnippetForm,
    ) -> Result<DocumentId, AdminError> {
        let session = session.ok_or(AdminError::Unauthenticated)?;
        form.validate()?;

        let input = form.to_input(session.email(), self.next_timestamp());
        let collection = self.collection(kind);
        let id = collection.create(&input).map_err(|e| {
            warn!(collection = collection.name(), error = %e, "snippet upload failed");
            e
        })?;

        info!(collection = collection.name(), %id, author = session.email(), "snippet uploaded");
        Ok(id)
    }

    /// Delete a snippet by id.
    pub fn submit_delete(
        &self,
        session: Option<&AdminSession>,
        kind: CollectionKind,
        id: &DocumentId,
    ) -> Result<(), AdminError> {
        let session = session.ok_or(AdminError::Unauthenticated)?;

        let collection = self.collection(kind);
        collection.delete(id).map_err(|e| {
            warn!(collection = collection.name(), %id, error = %e, "snippet delete failed");
            e
        })?;

        info!(collection = collection.name(), %id, author = session.email(), "snippet deleted");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A transient message for the dashboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn success(message: &str) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.to_string(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn from_create(result: &Result<DocumentId, AdminError>) -> Self {
        match result {
            Ok(_) => Self::success("Code snippet uploaded successfully!"),
            Err(AdminError::Store(_)) => Self::error("Failed to upload code snippet"),
            Err(e) => Self::error(e.to_string()),
        }
    }

    pub fn from_delete(result: &Result<(), AdminError>) -> Self {
        match result {
            Ok(()) => Self::success("Code snippet deleted successfully!"),
            Err(AdminError::Store(_)) => Self::error("Failed to delete code snippet"),
            Err(e) => Self::error(e.to_string()),
        }
    }
}
