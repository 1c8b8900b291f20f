//! Learning module model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A preparedness lesson written in markdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub title: String,
    pub summary: String,
    /// Markdown source
    pub content: String,
    /// Rendered, sanitised HTML
    pub content_html: String,
    pub category: String,
    /// Awarded once on first completion
    pub points: i64,
    pub is_published: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Module {
    /// Whether `user_id` may edit this module given their admin status
    pub fn can_edit(&self, user_id: i64, is_super_admin: bool) -> bool {
        is_super_admin || self.created_by == Some(user_id)
    }
}

/// Input for creating a module
#[derive(Debug, Clone, Deserialize)]
pub struct CreateModuleInput {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub is_published: bool,
}

fn default_category() -> String {
    "general".to_string()
}

/// Input for updating a module; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateModuleInput {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub points: Option<i64>,
    pub is_published: Option<bool>,
}

impl UpdateModuleInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.summary.is_some()
            || self.content.is_some()
            || self.category.is_some()
            || self.points.is_some()
            || self.is_published.is_some()
    }
}

/// Result of marking a module complete
#[derive(Debug, Clone, Serialize)]
pub struct ModuleCompletion {
    pub module_id: i64,
    pub points_awarded: i64,
    /// False when the user had already completed the module
    pub first_completion: bool,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_edit() {
        let now = Utc::now();
        let module = Module {
            id: 1,
            title: "Typhoon basics".to_string(),
            summary: String::new(),
            content: "# Signals".to_string(),
            content_html: String::new(),
            category: "typhoon".to_string(),
            points: 20,
            is_published: true,
            created_by: Some(3),
            created_at: now,
            updated_at: now,
        };
        assert!(module.can_edit(3, false));
        assert!(!module.can_edit(4, false));
        assert!(module.can_edit(4, true));
    }

    #[test]
    fn test_update_input_has_changes() {
        assert!(!UpdateModuleInput::default().has_changes());
        let input = UpdateModuleInput {
            is_published: Some(false),
            ..Default::default()
        };
        assert!(input.has_changes());
    }
}
