//! User model
//!
//! Citizens, LGU moderators and super admins share one table. LGU authority
//! is scoped to the account's own city.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Email address (unique, login identifier)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub location: Location,
    /// Preparedness points earned so far
    pub points: i64,
    pub avatar_url: Option<String>,
    /// Image-host identifier of the avatar, used for cleanup
    #[serde(skip_serializing)]
    pub avatar_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user with zero points.
    ///
    /// The password must already be hashed.
    pub fn new(
        name: String,
        email: String,
        password_hash: String,
        role: UserRole,
        location: Location,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            email,
            password_hash,
            role,
            status: UserStatus::Active,
            location,
            points: 0,
            avatar_url: None,
            avatar_public_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    /// LGU moderators and super admins
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Lgu | UserRole::SuperAdmin)
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    /// The slice of the population this account may moderate or analyse.
    pub fn scope(&self) -> LocationScope {
        match self.role {
            UserRole::SuperAdmin => LocationScope::All,
            UserRole::Lgu => LocationScope::City {
                province: self.location.province.clone(),
                city: self.location.city.clone(),
            },
            UserRole::Citizen => LocationScope::None,
        }
    }
}

/// Province / city / barangay of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub province: String,
    pub city: String,
    pub barangay: String,
}

impl Location {
    pub fn new(
        province: impl Into<String>,
        city: impl Into<String>,
        barangay: impl Into<String>,
    ) -> Self {
        Self {
            province: province.into(),
            city: city.into(),
            barangay: barangay.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.province.trim().is_empty() && !self.city.trim().is_empty()
    }
}

/// Moderation reach of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationScope {
    /// Super admin: everything
    All,
    /// LGU: one city
    City { province: String, city: String },
    /// Citizens moderate nothing
    None,
}

impl LocationScope {
    /// Whether content owned by someone in `location` falls inside this scope
    pub fn covers(&self, location: &Location) -> bool {
        match self {
            LocationScope::All => true,
            LocationScope::City { province, city } => {
                province.eq_ignore_ascii_case(&location.province)
                    && city.eq_ignore_ascii_case(&location.city)
            }
            LocationScope::None => false,
        }
    }

    /// City filter to apply to scoped queries (`None` means unfiltered)
    pub fn city_filter(&self) -> Option<(&str, &str)> {
        match self {
            LocationScope::City { province, city } => Some((province.as_str(), city.as_str())),
            _ => None,
        }
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Citizen,
    /// Local Government Unit moderator
    Lgu,
    SuperAdmin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Citizen
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Citizen => write!(f, "citizen"),
            UserRole::Lgu => write!(f, "lgu"),
            UserRole::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "citizen" => Ok(UserRole::Citizen),
            "lgu" => Ok(UserRole::Lgu),
            "super_admin" | "superadmin" => Ok(UserRole::SuperAdmin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    /// Cannot log in
    Banned,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Banned => write!(f, "banned"),
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "banned" => Ok(UserStatus::Banned),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

/// Profile fields a user may change about themselves
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub barangay: Option<String>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListFilter {
    pub role: Option<UserRole>,
    pub province: Option<String>,
    pub city: Option<String>,
    /// Substring match on name or email
    pub search: Option<String>,
}
