//! LGU and super admin dashboards

use crate::db::repositories::AnalyticsRepository;
use crate::models::{AdminDashboard, LguDashboard, User};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use std::sync::Arc;

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepository>) -> Self {
        Self { repo }
    }

    /// Readiness of the caller's own city
    pub async fn lgu_dashboard(&self, user: &User) -> ServiceResult<LguDashboard> {
        if !user.is_staff() {
            return Err(ServiceError::forbidden("LGU privileges required"));
        }
        let province = user.location.province.clone();
        let city = user.location.city.clone();
        let overview = self
            .repo
            .overview(Some((&province, &city)))
            .await
            .context("Failed to build city overview")?;
        Ok(LguDashboard {
            province,
            city,
            overview,
        })
    }

    pub async fn admin_dashboard(&self, user: &User) -> ServiceResult<AdminDashboard> {
        if !user.is_super_admin() {
            return Err(ServiceError::forbidden("Super admin privileges required"));
        }
        let overview = self
            .repo
            .overview(None)
            .await
            .context("Failed to build overview")?;
        let cities = self
            .repo
            .city_breakdown()
            .await
            .context("Failed to build city breakdown")?;
        let counts = self.repo.user_counts().await.context("Failed to count users")?;

        Ok(AdminDashboard {
            overview,
            user_count: counts.total,
            lgu_count: counts.lgu,
            banned_count: counts.banned,
            cities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Location, UserRole};

    async fn setup() -> (Arc<dyn UserRepository>, AnalyticsService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        (
            SqlxUserRepository::boxed(pool.clone()),
            AnalyticsService::new(SqlxAnalyticsRepository::boxed(pool)),
        )
    }

    async fn user(users: &Arc<dyn UserRepository>, email: &str, role: UserRole, city: &str) -> User {
        users
            .create(&User::new(
                email.to_string(),
                email.to_string(),
                "hash".to_string(),
                role,
                Location::new("Iloilo", city, ""),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lgu_dashboard_is_city_scoped() {
        let (users, service) = setup().await;
        let lgu = user(&users, "lgu@x.ph", UserRole::Lgu, "Passi").await;
        user(&users, "a@x.ph", UserRole::Citizen, "Passi").await;
        user(&users, "b@x.ph", UserRole::Citizen, "Oton").await;

        let dashboard = service.lgu_dashboard(&lgu).await.unwrap();
        assert_eq!(dashboard.city, "Passi");
        assert_eq!(dashboard.overview.citizen_count, 1);
        assert_eq!(dashboard.overview.readiness.low, 1);
    }

    #[tokio::test]
    async fn test_dashboards_require_roles() {
        let (users, service) = setup().await;
        let citizen = user(&users, "c@x.ph", UserRole::Citizen, "Passi").await;
        let lgu = user(&users, "lgu@x.ph", UserRole::Lgu, "Passi").await;

        assert!(matches!(
            service.lgu_dashboard(&citizen).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.admin_dashboard(&lgu).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_dashboard_counts() {
        let (users, service) = setup().await;
        let admin = user(&users, "root@x.ph", UserRole::SuperAdmin, "Iloilo City").await;
        user(&users, "lgu@x.ph", UserRole::Lgu, "Passi").await;
        user(&users, "a@x.ph", UserRole::Citizen, "Passi").await;
        user(&users, "b@x.ph", UserRole::Citizen, "Oton").await;

        let dashboard = service.admin_dashboard(&admin).await.unwrap();
        assert_eq!(dashboard.user_count, 4);
        assert_eq!(dashboard.lgu_count, 1);
        assert_eq!(dashboard.banned_count, 0);
        assert_eq!(dashboard.overview.citizen_count, 2);
        assert_eq!(dashboard.cities.len(), 2);
    }
}
