//! Learning module service
//!
//! LGU staff and super admins write modules in Markdown; the HTML is
//! rendered on save. Citizens only ever see published modules and earn a
//! module's points the first time they complete it.

use crate::cache::{CacheLayer, SharedCache, LEADERBOARD_PATTERN};
use crate::db::repositories::ModuleRepository;
use crate::models::{
    CreateModuleInput, ListParams, Module, ModuleCompletion, PagedResult, UpdateModuleInput, User,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::markdown::MarkdownRenderer;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_MODULE_POINTS: i64 = 1000;

pub struct ModuleService {
    repo: Arc<dyn ModuleRepository>,
    renderer: MarkdownRenderer,
    cache: SharedCache,
}

impl ModuleService {
    pub fn new(repo: Arc<dyn ModuleRepository>, cache: SharedCache) -> Self {
        Self {
            repo,
            renderer: MarkdownRenderer::new(),
            cache,
        }
    }

    pub async fn create_module(&self, author: &User, input: CreateModuleInput) -> ServiceResult<Module> {
        require_staff(author)?;
        let title = validate_title(&input.title)?;
        validate_points(input.points)?;
        if input.content.trim().is_empty() {
            return Err(ServiceError::validation("Module content cannot be empty"));
        }

        let now = Utc::now();
        let module = Module {
            id: 0,
            title,
            summary: input.summary.trim().to_string(),
            content_html: self.renderer.render(&input.content),
            content: input.content,
            category: normalize_category(&input.category),
            points: input.points,
            is_published: input.is_published,
            created_by: Some(author.id),
            created_at: now,
            updated_at: now,
        };
        let module = self.repo.create(&module).await.context("Failed to create module")?;
        tracing::info!(module_id = module.id, by = author.id, "Module created");
        Ok(module)
    }

    /// Drafts are visible to staff only
    pub async fn get_module(&self, id: i64, viewer: &User) -> ServiceResult<Module> {
        let module = self.find(id).await?;
        if !module.is_published && !viewer.is_staff() {
            return Err(ServiceError::not_found("Module"));
        }
        Ok(module)
    }

    pub async fn list_modules(&self, viewer: &User, params: ListParams) -> ServiceResult<PagedResult<Module>> {
        let (modules, total) = self
            .repo
            .list(viewer.is_staff(), &params)
            .await
            .context("Failed to list modules")?;
        Ok(PagedResult::new(modules, total, &params))
    }

    /// Creator or super admin
    pub async fn update_module(&self, editor: &User, id: i64, input: UpdateModuleInput) -> ServiceResult<Module> {
        require_staff(editor)?;
        let mut module = self.find(id).await?;
        if !module.can_edit(editor.id, editor.is_super_admin()) {
            return Err(ServiceError::forbidden("Only the author can edit this module"));
        }
        if !input.has_changes() {
            return Ok(module);
        }

        if let Some(title) = input.title {
            module.title = validate_title(&title)?;
        }
        if let Some(summary) = input.summary {
            module.summary = summary.trim().to_string();
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(ServiceError::validation("Module content cannot be empty"));
            }
            module.content_html = self.renderer.render(&content);
            module.content = content;
        }
        if let Some(category) = input.category {
            module.category = normalize_category(&category);
        }
        if let Some(points) = input.points {
            validate_points(points)?;
            module.points = points;
        }
        if let Some(published) = input.is_published {
            module.is_published = published;
        }
        module.updated_at = Utc::now();

        let module = self.repo.update(&module).await.context("Failed to update module")?;
        Ok(module)
    }

    pub async fn delete_module(&self, editor: &User, id: i64) -> ServiceResult<()> {
        require_staff(editor)?;
        let module = self.find(id).await?;
        if !module.can_edit(editor.id, editor.is_super_admin()) {
            return Err(ServiceError::forbidden("Only the author can delete this module"));
        }
        self.repo.delete(id).await.context("Failed to delete module")?;
        tracing::info!(module_id = id, by = editor.id, "Module deleted");
        Ok(())
    }

    /// Take a module off the citizen list; used by moderation
    pub(crate) async fn unpublish(&self, id: i64) -> ServiceResult<()> {
        if !self
            .repo
            .set_published(id, false)
            .await
            .context("Failed to unpublish module")?
        {
            return Err(ServiceError::not_found("Module"));
        }
        Ok(())
    }

    pub(crate) async fn find(&self, id: i64) -> ServiceResult<Module> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get module")?
            .ok_or_else(|| ServiceError::not_found("Module"))
    }

    /// Mark a published module complete; points are paid on the first call only
    pub async fn complete_module(&self, user: &User, id: i64) -> ServiceResult<ModuleCompletion> {
        let module = self.find(id).await?;
        if !module.is_published {
            return Err(ServiceError::not_found("Module"));
        }

        let completion = self
            .repo
            .complete(user.id, module.id, module.points)
            .await
            .context("Failed to record completion")?;

        if completion.points_awarded > 0 {
            if let Err(e) = self.cache.delete_pattern(LEADERBOARD_PATTERN).await {
                tracing::warn!(error = %e, "Failed to invalidate leaderboard cache");
            }
        }
        Ok(completion)
    }

    pub async fn completed_modules(&self, user: &User) -> ServiceResult<Vec<i64>> {
        let ids = self
            .repo
            .completed_by(user.id)
            .await
            .context("Failed to list completions")?;
        Ok(ids)
    }
}

fn require_staff(user: &User) -> ServiceResult<()> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("LGU privileges required"))
    }
}

fn validate_title(title: &str) -> ServiceResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::validation("Title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

fn validate_points(points: i64) -> ServiceResult<()> {
    if !(0..=MAX_MODULE_POINTS).contains(&points) {
        return Err(ServiceError::Validation(format!(
            "Points must be between 0 and {}",
            MAX_MODULE_POINTS
        )));
    }
    Ok(())
}

fn normalize_category(category: &str) -> String {
    let category = category.trim().to_lowercase();
    if category.is_empty() {
        "general".to_string()
    } else {
        category
    }
}
