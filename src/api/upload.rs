//! Multipart upload helpers
//!
//! Post and avatar endpoints accept `multipart/form-data`. Image fields are
//! checked against the upload config (type and size) before anything is
//! sent to the image host.

use axum::extract::multipart::{Field, Multipart};
use std::collections::HashMap;

use crate::api::middleware::ApiError;
use crate::config::UploadConfig;
use crate::services::ImageUpload;

/// Parsed multipart form: at most one image plus text fields
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<ImageUpload>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Read a form whose image field is called `image_field`.
///
/// Unknown text fields are kept; a second image is rejected.
pub async fn read_form(
    multipart: &mut Multipart,
    image_field: &str,
    config: &UploadConfig,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == image_field {
            if form.image.is_some() {
                return Err(ApiError::validation_error("Only one image may be uploaded"));
            }
            form.image = Some(read_image(field, config).await?);
        } else if !name.is_empty() {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::validation_error(format!("Invalid field '{}': {}", name, e)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

async fn read_image(field: Field<'_>, config: &UploadConfig) -> Result<ImageUpload, ApiError> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    if !config.is_type_allowed(&content_type) {
        return Err(ApiError::validation_error(format!(
            "Invalid file type: {}. Allowed types: {:?}",
            content_type, config.allowed_types
        )));
    }

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

    if data.is_empty() {
        return Err(ApiError::validation_error("Uploaded file is empty"));
    }
    if data.len() as u64 > config.max_file_size {
        return Err(ApiError::validation_error(format!(
            "File too large. Maximum size: {} bytes ({} MB)",
            config.max_file_size,
            config.max_file_size / 1024 / 1024
        )));
    }

    Ok(ImageUpload {
        data: data.to_vec(),
        content_type,
    })
}

/// Parse `item_ids` sent either as a JSON array or a comma separated list
pub fn parse_item_ids(raw: &str) -> Result<Vec<i64>, ApiError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw)
            .map_err(|_| ApiError::validation_error("item_ids must be a list of numbers"));
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ApiError::validation_error("item_ids must be a list of numbers"))
        })
        .collect()
}
