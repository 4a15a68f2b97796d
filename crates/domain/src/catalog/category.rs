//! Catalog categories.

use chrono::{DateTime, Utc};
use common::CategoryId;
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationErrors, check_text};

/// A node in the category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Builds a new category from validated input.
    pub fn from_draft(draft: CategoryDraft) -> Self {
        let now = Utc::now();
        Self {
            id: CategoryId::new(),
            name: draft.name,
            description: draft.description,
            parent_id: draft.parent_id,
            image_url: draft.image_url,
            active: draft.active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the editable fields.
    pub fn apply(&mut self, draft: CategoryDraft) {
        self.name = draft.name;
        self.description = draft.description;
        self.parent_id = draft.parent_id;
        self.image_url = draft.image_url;
        self.active = draft.active;
        self.updated_at = Utc::now();
    }
}

/// Full set of editable category fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub image_url: Option<String>,
    pub active: bool,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent_id: None,
            image_url: None,
            active: true,
        }
    }

    pub fn with_parent(mut self, parent_id: CategoryId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks field shapes. Parent existence and cycles need the store and
    /// are checked by the catalog service.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_text(&mut errors, "name", &self.name, 255);
        if let Some(url) = &self.image_url
            && !is_http_url(url)
        {
            errors.add("image_url", "Enter a valid URL.");
        }
        errors.into_result()
    }
}

impl From<&Category> for CategoryDraft {
    fn from(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            description: category.description.clone(),
            parent_id: category.parent_id,
            image_url: category.image_url.clone(),
            active: category.active,
        }
    }
}

/// Partial category update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<CategoryId>>,
    pub image_url: Option<Option<String>>,
    pub active: Option<bool>,
}

impl CategoryPatch {
    pub fn apply_to(self, draft: &mut CategoryDraft) {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(description) = self.description {
            draft.description = description;
        }
        if let Some(parent_id) = self.parent_id {
            draft.parent_id = parent_id;
        }
        if let Some(image_url) = self.image_url {
            draft.image_url = image_url;
        }
        if let Some(active) = self.active {
            draft.active = active;
        }
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/') && !host.contains(char::is_whitespace))
}
