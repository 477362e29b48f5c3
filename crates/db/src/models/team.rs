use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use uuid::Uuid;

/// One rule every agent prompt for the team must carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Convention {
    pub key: String,
    pub content: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Team-level configuration. The keys the core reads are modelled
/// explicitly; anything else a deployment stores rides along in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conventions: Vec<Convention>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TeamConfig {
    pub fn active_conventions(&self) -> Vec<Convention> {
        self.conventions
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub slug: String,
    #[sqlx(json)]
    pub config: TeamConfig,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub async fn create(
        pool: &SqlitePool,
        org_id: Uuid,
        name: &str,
        slug: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO teams (id, org_id, name, slug, config, created_at)
               VALUES ($1, $2, $3, $4, '{}', $5)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(name)
        .bind(slug)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM teams WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_org(pool: &SqlitePool, org_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM teams WHERE org_id = $1 ORDER BY created_at")
            .bind(org_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update_config(
        pool: &SqlitePool,
        id: Uuid,
        config: &TeamConfig,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>("UPDATE teams SET config = $1 WHERE id = $2 RETURNING *")
            .bind(Json(config))
            .bind(id)
            .fetch_one(pool)
            .await
    }
}
