use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// A git working tree registered with a team. `local_path` is a directory
/// the core is allowed to run git in.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub local_path: String,
    pub default_branch: String,
    #[sqlx(json)]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    pub async fn create(
        pool: &SqlitePool,
        team_id: Uuid,
        name: &str,
        local_path: &str,
        default_branch: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO repositories (id, team_id, name, local_path, default_branch, config, created_at)
               VALUES ($1, $2, $3, $4, $5, '{}', $6)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(name)
        .bind(local_path)
        .bind(default_branch)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM repositories WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_team(pool: &SqlitePool, team_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM repositories WHERE team_id = $1 ORDER BY created_at",
        )
        .bind(team_id)
        .fetch_all(pool)
        .await
    }
}
