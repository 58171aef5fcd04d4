use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::debug;

use super::{page_offset, User, UserPatch, UserRow, UserStore};
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, role, created_at, updated_at";

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

fn map_write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            AppError::DuplicateEmail
        }
        sqlx::Error::RowNotFound => AppError::NotFound,
        _ => AppError::Database(e),
    }
}

fn to_user(row: UserRow) -> Result<User, AppError> {
    Ok(User::try_from(row)?)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_user).transpose()
    }

    async fn insert(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, display_name)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)?;
        to_user(row)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, AppError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        if let Some(email) = patch.email {
            set.push("email = ").push_bind_unseparated(email);
        }
        if let Some(hash) = patch.password_hash {
            set.push("password_hash = ").push_bind_unseparated(hash);
        }
        if let Some(name) = patch.display_name {
            set.push("display_name = ").push_bind_unseparated(name);
        }
        if let Some(role) = patch.role {
            set.push("role = ").push_bind_unseparated(role.as_str());
        }
        set.push("updated_at = ")
            .push_bind_unseparated(OffsetDateTime::now_utc());
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_one(&self.db)
            .await
            .map_err(map_write_error)?;
        debug!(user_id = id, "user row updated");
        to_user(row)
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, page: i64, page_size: i64) -> Result<(Vec<User>, i64), AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        let offset = page_offset(page, page_size);
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let users = rows.into_iter().map(to_user).collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db).await.is_ok()
    }
}
