//! Moderation reports
//!
//! Content reports point at a post, module or user. Question reports point
//! at a single quiz question. Both move from `PENDING` to either
//! `RESOLVED` or `DISMISSED` exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl Default for ReportStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "PENDING"),
            ReportStatus::Resolved => write!(f, "RESOLVED"),
            ReportStatus::Dismissed => write!(f, "DISMISSED"),
        }
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RESOLVED" => Ok(Self::Resolved),
            "DISMISSED" => Ok(Self::Dismissed),
            _ => Err(anyhow::anyhow!("Invalid report status: {}", s)),
        }
    }
}

/// What a content report points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTarget {
    Post,
    Module,
    User,
}

impl fmt::Display for ReportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportTarget::Post => write!(f, "post"),
            ReportTarget::Module => write!(f, "module"),
            ReportTarget::User => write!(f, "user"),
        }
    }
}

impl FromStr for ReportTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "module" => Ok(Self::Module),
            "user" => Ok(Self::User),
            _ => Err(anyhow::anyhow!("Invalid report target: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentReport {
    pub id: i64,
    pub reporter_id: i64,
    pub target_type: ReportTarget,
    pub target_id: i64,
    pub reason: String,
    pub details: Option<String>,
    pub status: ReportStatus,
    /// Province and city of the reported content's owner; drive LGU scoping
    pub province: String,
    pub city: String,
    pub resolved_by: Option<i64>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReport {
    pub id: i64,
    pub reporter_id: i64,
    pub question_id: i64,
    pub quiz_id: i64,
    pub reason: String,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub resolved_by: Option<i64>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContentReportInput {
    pub target_type: ReportTarget,
    pub target_id: i64,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestionReportInput {
    pub question_id: i64,
    pub reason: String,
    pub details: Option<String>,
}

/// Staff decision on a pending report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveReportInput {
    pub note: Option<String>,
    /// Act on the target: delete a post, unpublish a module, ban a user
    #[serde(default)]
    pub remove_content: bool,
}
