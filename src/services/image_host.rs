//! Image hosting
//!
//! Post photos and avatars go to an [`ImageHost`]: a local directory served
//! under `/uploads`, or Cloudinary's signed upload API. Both hand back a
//! public URL and an opaque id used later for deletion.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use data_encoding::{BASE64, HEXLOWER};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use crate::config::{ImageHostConfig, ImageHostDriver, UploadConfig};

/// A stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImage {
    pub url: String,
    pub public_id: String,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Store `data` and return where it can be fetched
    async fn upload(&self, data: &[u8], content_type: &str) -> Result<HostedImage>;

    /// Remove a previously stored image; unknown ids are not an error
    async fn delete(&self, public_id: &str) -> Result<()>;
}

pub type DynImageHost = Arc<dyn ImageHost>;

/// Build the host selected in configuration
pub fn create_image_host(config: &ImageHostConfig) -> Result<DynImageHost> {
    match config.driver {
        ImageHostDriver::Local => Ok(Arc::new(LocalImageHost::new(
            config.path.clone(),
            config.public_base.clone(),
        ))),
        ImageHostDriver::Cloudinary => Ok(Arc::new(CloudinaryImageHost::from_config(config)?)),
    }
}

// ============================================================================
// Local directory
// ============================================================================

pub struct LocalImageHost {
    dir: PathBuf,
    public_base: String,
}

impl LocalImageHost {
    pub fn new(dir: PathBuf, public_base: String) -> Self {
        Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageHost for LocalImageHost {
    async fn upload(&self, data: &[u8], content_type: &str) -> Result<HostedImage> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", self.dir.display()))?;

        let filename = format!("{}.{}", Uuid::new_v4(), UploadConfig::get_extension(content_type));
        fs::write(self.dir.join(&filename), data)
            .await
            .context("Failed to save image")?;

        Ok(HostedImage {
            url: format!("{}/{}", self.public_base, filename),
            public_id: filename,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        // ids are bare file names; anything else never came from us
        if public_id.contains('/') || public_id.contains('\\') || public_id.starts_with('.') {
            return Err(anyhow!("Invalid image id: {}", public_id));
        }
        match fs::remove_file(self.dir.join(public_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete image"),
        }
    }
}

// ============================================================================
// Cloudinary
// ============================================================================

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

pub struct CloudinaryImageHost {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

impl CloudinaryImageHost {
    pub fn from_config(config: &ImageHostConfig) -> Result<Self> {
        let required = |value: &Option<String>, key: &str| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("images.{} is required for the cloudinary driver", key))
        };

        Ok(Self {
            client: reqwest::Client::new(),
            cloud_name: required(&config.cloud_name, "cloud_name")?,
            api_key: required(&config.api_key, "api_key")?,
            api_secret: required(&config.api_secret, "api_secret")?,
            folder: config.folder.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", CLOUDINARY_API, self.cloud_name, action)
    }

    /// Signed form for an API call; `params` must not include the file
    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        params.push(("timestamp", chrono::Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.api_secret);
        params.push(("api_key", self.api_key.clone()));
        params.push(("signature_algorithm", "sha256".to_string()));
        params.push(("signature", signature));
        params
    }

    async fn post(&self, action: &str, form: Vec<(&'static str, String)>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint(action))
            .form(&form)
            .send()
            .await
            .with_context(|| format!("Image host {} request failed", action))?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_else(|_| status.to_string());
        Err(anyhow!("Image host rejected {}: {}", action, message))
    }
}

/// Cloudinary request signature: sorted `key=value` pairs joined by `&`,
/// followed by the secret, hashed with SHA-256.
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut pairs: Vec<_> = params.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

#[async_trait]
impl ImageHost for CloudinaryImageHost {
    async fn upload(&self, data: &[u8], content_type: &str) -> Result<HostedImage> {
        let mut form = self.signed_form(vec![("folder", self.folder.clone())]);
        form.push((
            "file",
            format!("data:{};base64,{}", content_type, BASE64.encode(data)),
        ));

        let uploaded: UploadResponse = self
            .post("upload", form)
            .await?
            .json()
            .await
            .context("Invalid upload response from image host")?;

        tracing::debug!(public_id = %uploaded.public_id, "Image uploaded");
        Ok(HostedImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let form = self.signed_form(vec![("public_id", public_id.to_string())]);
        self.post("destroy", form).await?;
        Ok(())
    }
}

/// Delete an image, logging instead of failing
pub async fn delete_quietly(host: &dyn ImageHost, public_id: Option<&str>) {
    if let Some(id) = public_id {
        if let Err(e) = host.delete(id).await {
            tracing::warn!(public_id = id, error = %e, "Failed to delete hosted image");
        }
    }
}
