//! Database migrations
//!
//! Migrations are embedded as SQL strings and applied in version order at
//! startup. Applied versions are tracked in the `_migrations` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::DynDatabasePool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements, separated by `;`
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'citizen',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                province VARCHAR(100) NOT NULL DEFAULT '',
                city VARCHAR(100) NOT NULL DEFAULT '',
                barangay VARCHAR(100) NOT NULL DEFAULT '',
                points INTEGER NOT NULL DEFAULT 0,
                avatar_url TEXT,
                avatar_public_id TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_city ON users(province, city);
            CREATE INDEX IF NOT EXISTS idx_users_points ON users(points DESC);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_password_resets",
        up: r#"
            CREATE TABLE IF NOT EXISTS password_resets (
                email VARCHAR(255) PRIMARY KEY,
                code VARCHAR(10) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_go_bag",
        up: r#"
            CREATE TABLE IF NOT EXISTS go_bag_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                category VARCHAR(30) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                is_essential BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS go_bag_entries (
                user_id INTEGER NOT NULL,
                item_id INTEGER NOT NULL,
                packed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, item_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (item_id) REFERENCES go_bag_items(id) ON DELETE CASCADE
            );
            INSERT OR IGNORE INTO go_bag_items (name, category, description, is_essential) VALUES
                ('Drinking water (3 days)', 'water', 'At least 4 liters per person per day', 1),
                ('Ready-to-eat food', 'food', 'Canned goods, biscuits, and a manual can opener', 1),
                ('First aid kit', 'first_aid', 'Bandages, antiseptic, and personal medicines', 1),
                ('Flashlight', 'tools', 'With spare batteries', 1),
                ('Battery-powered radio', 'tools', 'For official announcements', 0),
                ('Whistle', 'tools', 'To signal for help', 0),
                ('Copies of important documents', 'documents', 'IDs and titles in a waterproof pouch', 1),
                ('Cash in small bills', 'documents', 'ATMs may be offline', 0),
                ('Hygiene kit', 'hygiene', 'Soap, toothbrush, sanitary pads, alcohol', 0),
                ('Face masks', 'hygiene', 'For smoke, ash, and crowded shelters', 0),
                ('Change of clothes', 'clothing', 'Include a raincoat', 0),
                ('Emergency blanket', 'clothing', 'Thermal or regular blanket', 0),
                ('Power bank', 'tools', 'Fully charged', 0),
                ('Multi-purpose knife', 'tools', 'Or a basic tool set', 0);
        "#,
    },
    Migration {
        version: 5,
        name: "create_posts_and_ratings",
        up: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                image_url TEXT NOT NULL,
                image_public_id TEXT NOT NULL,
                caption TEXT NOT NULL DEFAULT '',
                rater_count INTEGER NOT NULL DEFAULT 0,
                verified_item_count INTEGER NOT NULL DEFAULT 0,
                awarded_item_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
            CREATE TABLE IF NOT EXISTS post_items (
                post_id INTEGER NOT NULL,
                item_id INTEGER NOT NULL,
                item_name VARCHAR(100) NOT NULL,
                vote_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (post_id, item_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                confirmed_item_ids TEXT NOT NULL DEFAULT '[]',
                points_awarded INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (post_id, user_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_modules",
        up: r#"
            CREATE TABLE IF NOT EXISTS modules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                content_html TEXT NOT NULL DEFAULT '',
                category VARCHAR(50) NOT NULL DEFAULT 'general',
                points INTEGER NOT NULL DEFAULT 0,
                is_published BOOLEAN NOT NULL DEFAULT 0,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS module_completions (
                user_id INTEGER NOT NULL,
                module_id INTEGER NOT NULL,
                points_awarded INTEGER NOT NULL DEFAULT 0,
                completed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, module_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 7,
        name: "create_quizzes",
        up: r#"
            CREATE TABLE IF NOT EXISTS quizzes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module_id INTEGER,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                points_per_question INTEGER NOT NULL DEFAULT 5,
                is_published BOOLEAN NOT NULL DEFAULT 0,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE SET NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS quiz_questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                quiz_id INTEGER NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                prompt TEXT NOT NULL,
                choices TEXT NOT NULL,
                correct_index INTEGER NOT NULL,
                explanation TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_quiz_questions_quiz ON quiz_questions(quiz_id, position);
            CREATE TABLE IF NOT EXISTS quiz_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                quiz_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                answers TEXT NOT NULL,
                score INTEGER NOT NULL,
                total INTEGER NOT NULL,
                points_awarded INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_quiz_attempts_user ON quiz_attempts(user_id, quiz_id);
        "#,
    },
    Migration {
        version: 8,
        name: "create_reports",
        up: r#"
            CREATE TABLE IF NOT EXISTS content_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id INTEGER NOT NULL,
                target_type VARCHAR(20) NOT NULL,
                target_id INTEGER NOT NULL,
                reason VARCHAR(100) NOT NULL,
                details TEXT,
                status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
                city VARCHAR(100) NOT NULL DEFAULT '',
                resolved_by INTEGER,
                resolution_note TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (reporter_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (resolved_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_content_reports_status ON content_reports(status, city);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_content_reports_pending
                ON content_reports(reporter_id, target_type, target_id) WHERE status = 'PENDING';
            CREATE TABLE IF NOT EXISTS question_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id INTEGER NOT NULL,
                question_id INTEGER NOT NULL,
                quiz_id INTEGER NOT NULL,
                reason VARCHAR(100) NOT NULL,
                details TEXT,
                status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
                resolved_by INTEGER,
                resolution_note TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (reporter_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (question_id) REFERENCES quiz_questions(id) ON DELETE CASCADE,
                FOREIGN KEY (resolved_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_question_reports_status ON question_reports(status);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_question_reports_pending
                ON question_reports(reporter_id, question_id) WHERE status = 'PENDING';
        "#,
    },
    Migration {
        version: 9,
        name: "add_content_report_province",
        up: r#"
            ALTER TABLE content_reports ADD COLUMN province VARCHAR(100) NOT NULL DEFAULT '';
            DROP INDEX IF EXISTS idx_content_reports_status;
            CREATE INDEX IF NOT EXISTS idx_content_reports_status
                ON content_reports(status, province, city);
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool.sqlite()).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool.sqlite(), migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply a single migration inside a transaction
async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool.sqlite()).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
        let applied = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);

        let again = run_migrations(&pool).await.expect("Second run failed");
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_catalog_is_seeded() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM go_bag_items WHERE is_essential = 1")
            .fetch_one(pool.sqlite())
            .await
            .unwrap();
        let essentials: i64 = row.get("n");
        assert!(essentials >= 5);
    }

    #[tokio::test]
    async fn test_rating_uniqueness_constraint() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let db = pool.sqlite();

        sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ('a', 'a@x.ph', 'h'), ('b', 'b@x.ph', 'h')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO posts (user_id, image_url, image_public_id) VALUES (1, 'u', 'p')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO ratings (post_id, user_id) VALUES (1, 2)")
            .execute(db)
            .await
            .unwrap();

        let duplicate = sqlx::query("INSERT INTO ratings (post_id, user_id) VALUES (1, 2)")
            .execute(db)
            .await;
        let err = duplicate.expect_err("duplicate rating must fail");
        assert!(err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false));
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n  -- note\n;\nINSERT INTO a VALUES (1);  ";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "INSERT INTO a VALUES (1)"]);
    }
}
