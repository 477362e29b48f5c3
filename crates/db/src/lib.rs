pub mod models;

use std::{path::Path, str::FromStr};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

/// Shared handle to the SQLite database. Cheap to clone; all services take a
/// reference to the inner pool.
#[derive(Clone)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    /// Open (creating if necessary) the database at `database_url` and run
    /// the embedded migrations.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Convenience for tests and local tooling: a database file inside `dir`.
    pub async fn new_in_dir(dir: &Path) -> Result<Self, sqlx::Error> {
        let path = dir.join("openclaw.sqlite");
        let url = format!("sqlite://{}", path.display());
        Self::new(&url).await
    }
}
