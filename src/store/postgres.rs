use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{CredentialStore, LogStore, StoreError};
use crate::models::{Identity, IdentityChanges, LogFilter, NewIdentity, RequestLog};

const IDENTITY_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, refresh_token, created_at, updated_at";

/// `LIKE` pattern matching `term` anywhere, with `%`, `_` and `\` in the term
/// taken literally. Use with `ESCAPE '\'`.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, role, refresh_token) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            IDENTITY_COLUMNS
        );
        let row = sqlx::query_as::<_, Identity>(&sql)
            .bind(identity.id)
            .bind(identity.email)
            .bind(identity.password_hash)
            .bind(identity.first_name)
            .bind(identity.last_name)
            .bind(identity.role)
            .bind(identity.refresh_token)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", IDENTITY_COLUMNS);
        let row = sqlx::query_as::<_, Identity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", IDENTITY_COLUMNS);
        let row = sqlx::query_as::<_, Identity>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        // Under READ COMMITTED a concurrent writer re-evaluates the WHERE clause
        // after the first commit, so only one of two racing swaps matches.
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $3, updated_at = now() \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(replacement)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET refresh_token = NULL, updated_at = now() \
             WHERE id = $1 AND refresh_token IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_refresh_token_if(&self, id: Uuid, expected: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, updated_at = now() \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at", IDENTITY_COLUMNS);
        let rows = sqlx::query_as::<_, Identity>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: IdentityChanges,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!(
            "UPDATE users SET \
                email = COALESCE($2, email), \
                first_name = COALESCE($3, first_name), \
                last_name = COALESCE($4, last_name), \
                role = COALESCE($5, role), \
                updated_at = now() \
             WHERE id = $1 RETURNING {}",
            IDENTITY_COLUMNS
        );
        let row = sqlx::query_as::<_, Identity>(&sql)
            .bind(id)
            .bind(changes.email)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.role)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn record(&self, entry: RequestLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO request_logs \
             (id, timestamp, level, message, path, method, status_code, user_id, user_role, duration_ms, error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(entry.level)
        .bind(entry.message)
        .bind(entry.path)
        .bind(entry.method)
        .bind(entry.status_code)
        .bind(entry.user_id)
        .bind(entry.user_role)
        .bind(entry.duration_ms)
        .bind(entry.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, filter: &LogFilter) -> Result<Vec<RequestLog>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, timestamp, level, message, path, method, status_code, user_id, user_role, duration_ms, error \
             FROM request_logs WHERE timestamp BETWEEN ",
        );
        builder.push_bind(filter.start);
        builder.push(" AND ");
        builder.push_bind(filter.end);

        if let Some(level) = filter.level {
            builder.push(" AND level = ").push_bind(level);
        }
        if let Some(status_code) = filter.status_code {
            builder.push(" AND status_code = ").push_bind(status_code);
        }
        if let Some(path) = &filter.path {
            builder
                .push(" AND path LIKE ")
                .push_bind(contains_pattern(path))
                .push(" ESCAPE '\\'");
        }
        if let Some(method) = &filter.method {
            builder.push(" AND method = ").push_bind(method.clone());
        }
        builder.push(" ORDER BY timestamp DESC");

        let rows = builder
            .build_query_as::<RequestLog>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
