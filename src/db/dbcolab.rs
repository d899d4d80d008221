use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::{error, info};

use crate::models::{CodeFile, CodeFileUpdate, UserRecord};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS code_files (
        id BIGSERIAL PRIMARY KEY,
        filename TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        owner_id BIGINT NOT NULL REFERENCES users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS code_files_owner_idx ON code_files(owner_id);

    CREATE TABLE IF NOT EXISTS collaborations (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        file_id BIGINT NOT NULL REFERENCES code_files(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, file_id)
    );
"#;

// Every file read goes through this projection so collaborator ids come back with the row.
const FILE_SELECT_SQL: &str = r#"
    SELECT
        f.id,
        f.filename,
        f.content,
        f.owner_id,
        COALESCE(
            array_agg(c.user_id ORDER BY c.user_id) FILTER (WHERE c.user_id IS NOT NULL),
            '{}'
        ) AS collaborator_ids,
        f.created_at,
        f.updated_at
    FROM code_files f
        LEFT JOIN collaborations c ON c.file_id = f.id
"#;

/// Database connection pool
pub struct DbColab {
    pool: PgPool,
}

impl DbColab {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the tables if they are missing
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        info!("Database schema verified");
        Ok(())
    }

    /// Round-trip to the database
    pub async fn ping(&self) -> Result<(), SqlxError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, SqlxError> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, hashed_password, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, SqlxError> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, hashed_password, is_active, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert a user. Returns `None` when the email is already taken.
    pub async fn insert_user(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> Result<Option<UserRecord>, SqlxError> {
        let query_sql = r#"
            INSERT INTO users(email, hashed_password)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, hashed_password, is_active, created_at;
        "#;
        sqlx::query_as::<_, UserRecord>(query_sql)
            .bind(email)
            .bind(hashed_password)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_code_file(&self, file_id: i64) -> Result<Option<CodeFile>, SqlxError> {
        let query_sql = format!("{} WHERE f.id = $1 GROUP BY f.id", FILE_SELECT_SQL);
        sqlx::query_as::<_, CodeFile>(&query_sql)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_owned_files(
        &self,
        owner_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<CodeFile>, SqlxError> {
        let query_sql = format!(
            "{} WHERE f.owner_id = $1 GROUP BY f.id ORDER BY f.id OFFSET $2 LIMIT $3",
            FILE_SELECT_SQL
        );
        sqlx::query_as::<_, CodeFile>(&query_sql)
            .bind(owner_id)
            .bind(skip)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn insert_code_file(&self, owner_id: i64, filename: &str) -> Result<CodeFile, SqlxError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO code_files(filename, content, owner_id) VALUES ($1, '', $2) RETURNING id",
        )
        .bind(filename)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        info!("Code file {} created for user {}", id, owner_id);
        self.get_code_file(id).await?.ok_or(SqlxError::RowNotFound)
    }

    pub async fn update_code_file(
        &self,
        file_id: i64,
        update: &CodeFileUpdate,
    ) -> Result<Option<CodeFile>, SqlxError> {
        let query_sql = r#"
            UPDATE code_files
            SET filename = COALESCE($1, filename),
                content = COALESCE($2, content),
                updated_at = NOW()
            WHERE id = $3
            RETURNING id;
        "#;
        let updated: Option<i64> = sqlx::query_scalar(query_sql)
            .bind(update.filename.as_deref())
            .bind(update.content.as_deref())
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(id) => self.get_code_file(id).await,
            None => Ok(None),
        }
    }

    pub async fn delete_code_file(&self, file_id: i64) -> Result<bool, SqlxError> {
        let result = sqlx::query("DELETE FROM code_files WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Read, transform and write back the content of a file in one transaction.
    ///
    /// The row lock taken by `FOR UPDATE` serializes concurrent edits of the same file,
    /// so every edit sees the content left by the previous one.
    pub async fn edit_code_file_content<F>(
        &self,
        file_id: i64,
        edit: F,
    ) -> Result<Option<String>, SqlxError>
    where
        F: FnOnce(&str) -> String + Send,
    {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool for file {}: {}. Pool state: {} idle, {} total",
                    file_id,
                    e,
                    self.pool.num_idle(),
                    self.pool.size()
                );
                return Err(e);
            }
        };

        let current: Option<String> =
            sqlx::query_scalar("SELECT content FROM code_files WHERE id = $1 FOR UPDATE")
                .bind(file_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        let updated = edit(&current);
        sqlx::query("UPDATE code_files SET content = $1, updated_at = NOW() WHERE id = $2")
            .bind(&updated)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    pub async fn add_collaborator(&self, file_id: i64, user_id: i64) -> Result<Option<CodeFile>, SqlxError> {
        let query_sql = r#"
            INSERT INTO collaborations(user_id, file_id)
            SELECT $1, id FROM code_files WHERE id = $2
            ON CONFLICT DO NOTHING;
        "#;
        sqlx::query(query_sql)
            .bind(user_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        self.get_code_file(file_id).await
    }

    /// Remove a collaborator. Returns `None` when the user was not a collaborator of the file.
    pub async fn remove_collaborator(&self, file_id: i64, user_id: i64) -> Result<Option<CodeFile>, SqlxError> {
        let result = sqlx::query("DELETE FROM collaborations WHERE user_id = $1 AND file_id = $2")
            .bind(user_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_code_file(file_id).await
    }
}
