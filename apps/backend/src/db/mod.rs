//! Database Module
//!
//! Connection-independent schema management: migrations are embedded at
//! compile time and applied idempotently at startup.

use sqlx::SqlitePool;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "000_migrations_table",
        include_str!("migrations/000_migrations_table.sql"),
    ),
    (
        "001_create_problems",
        include_str!("migrations/001_create_problems.sql"),
    ),
    (
        "002_create_cards",
        include_str!("migrations/002_create_cards.sql"),
    ),
    (
        "003_create_review_logs",
        include_str!("migrations/003_create_review_logs.sql"),
    ),
    (
        "004_create_feedback",
        include_str!("migrations/004_create_feedback.sql"),
    ),
    (
        "005_create_fsrs_params",
        include_str!("migrations/005_create_fsrs_params.sql"),
    ),
];

/// Run all pending migrations.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    tracing::info!("Running database migrations...");

    let (_, migrations_sql) = MIGRATIONS[0];
    sqlx::query(migrations_sql).execute(pool).await?;

    let applied: Vec<String> = sqlx::query_scalar("SELECT name FROM _migrations")
        .fetch_all(pool)
        .await
        .unwrap_or_default();

    let mut applied_count = 0;
    for (name, sql) in MIGRATIONS.iter().skip(1) {
        if applied.contains(&name.to_string()) {
            tracing::debug!("Migration {} already applied, skipping", name);
            continue;
        }

        tracing::info!("Applying migration: {}", name);

        // Migration files may contain multiple statements.
        for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(pool).await?;
        }

        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(*name)
            .execute(pool)
            .await?;

        applied_count += 1;
    }

    if applied_count > 0 {
        tracing::info!("Applied {} new migration(s)", applied_count);
    } else {
        tracing::info!("Database schema is up to date");
    }

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        for table in ["problems", "cards", "review_logs", "recommendation_feedback", "fsrs_params"] {
            let exists: Option<i32> = sqlx::query_scalar(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_optional(&pool)
            .await
            .unwrap();
            assert!(exists.is_some(), "missing table {}", table);
        }
    }
}
