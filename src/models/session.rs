//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login session; `id` doubles as the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Pending password reset code for an email address
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
