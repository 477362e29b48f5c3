use sqlx::SqlitePool;

use openclaw_db::models::Event;

/// Append-only event log. Every state change in the system is recorded here;
/// the mutable tables are projections. Appends take any executor so they can
/// join the transaction of the mutation they describe.
pub struct EventStore;

impl EventStore {
    pub async fn append<'e, E>(
        ex: E,
        stream_id: &str,
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<Event, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        Self::append_with_metadata(ex, stream_id, event_type, data, serde_json::json!({})).await
    }

    pub async fn append_with_metadata<'e, E>(
        ex: E,
        stream_id: &str,
        event_type: &str,
        data: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<Event, sqlx::Error>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Event>(
            r#"INSERT INTO events (stream_id, type, data, metadata, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(stream_id)
        .bind(event_type)
        .bind(sqlx::types::Json(data))
        .bind(sqlx::types::Json(metadata))
        .bind(chrono::Utc::now())
        .fetch_one(ex)
        .await
    }

    /// Events for one stream in append order, optionally after a position.
    pub async fn read_stream(
        pool: &SqlitePool,
        stream_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            r#"SELECT * FROM events
               WHERE stream_id = $1 AND id > $2
               ORDER BY id
               LIMIT $3"#,
        )
        .bind(stream_id)
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Cross-stream read for external observers and projections.
    pub async fn read_all(
        pool: &SqlitePool,
        after_id: i64,
        event_types: Option<&[String]>,
        limit: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        match event_types {
            None => {
                sqlx::query_as::<_, Event>(
                    "SELECT * FROM events WHERE id > $1 ORDER BY id LIMIT $2",
                )
                .bind(after_id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            Some(types) => {
                // Parameters numbered in textual order; sqlite assigns
                // indices by first occurrence.
                let placeholders = (0..types.len())
                    .map(|i| format!("${}", i + 2))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT * FROM events WHERE id > $1 AND type IN ({placeholders}) ORDER BY id LIMIT ${}",
                    types.len() + 2
                );
                let mut query = sqlx::query_as::<_, Event>(&sql).bind(after_id);
                for t in types {
                    query = query.bind(t);
                }
                query = query.bind(limit);
                query.fetch_all(pool).await
            }
        }
    }
}
