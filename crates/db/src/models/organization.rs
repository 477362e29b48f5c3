use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// Tenant root. Teams, agents and repositories all hang off an organization.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub async fn create(pool: &SqlitePool, name: &str, slug: &str) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO organizations (id, name, slug, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $4)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM organizations WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await
    }
}
