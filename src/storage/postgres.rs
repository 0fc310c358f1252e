//! Postgres adapters for the user directory and refresh-token store.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::{
    directory::{Account, LockoutUpdate, Role, UserDirectory},
    store::{NewRefreshSession, RefreshSession, RefreshTokenStore},
};

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, role::text AS role, is_active, \
     mfa_enabled, failed_login_attempts, locked_until, last_login_at, password_changed_at";

const SESSION_COLUMNS: &str =
    "id, user_id, token_hash, token_family, version, is_revoked, created_at, expires_at";

fn account_from_row(row: &PgRow) -> Result<Account> {
    let role: String = row.try_get("role")?;
    let failed: i32 = row.try_get("failed_login_attempts")?;
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        secret_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>().map_err(|e| anyhow!(e))?,
        is_active: row.try_get("is_active")?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        failed_login_attempts: failed_attempts(failed)?,
        locked_until: row.try_get("locked_until")?,
        last_login_at: row.try_get("last_login_at")?,
        password_changed_at: row.try_get("password_changed_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<RefreshSession> {
    let version: i32 = row.try_get("version")?;
    Ok(RefreshSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token_hash: row.try_get("token_hash")?,
        token_family: row.try_get("token_family")?,
        version: u32::try_from(version).context("negative refresh token version")?,
        is_revoked: row.try_get("is_revoked")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn failed_attempts(raw: i32) -> Result<u32> {
    u32::try_from(raw).with_context(|| format!("negative failed_login_attempts counter: {raw}"))
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).context("value out of range for INTEGER column")
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, query: &str, bind: Bind<'_>) -> Result<Option<Account>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let q = sqlx::query(query);
        let q = match bind {
            Bind::Email(email) => q.bind(email),
            Bind::Id(id) => q.bind(id),
        };
        let row = q
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;
        row.as_ref().map(account_from_row).transpose()
    }
}

enum Bind<'a> {
    Email(&'a str),
    Id(Uuid),
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1");
        self.find_one(&query, Bind::Email(email)).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1");
        self.find_one(&query, Bind::Id(id)).await
    }

    async fn update_lockout_state(
        &self,
        id: Uuid,
        expected_failed_attempts: u32,
        update: &LockoutUpdate,
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET failed_login_attempts = $3,
                locked_until = $4,
                last_login_at = COALESCE($5, last_login_at),
                updated_at = NOW()
            WHERE id = $1
              AND failed_login_attempts = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(to_i32(expected_failed_attempts)?)
            .bind(to_i32(update.failed_login_attempts)?)
            .bind(update.locked_until)
            .bind(update.last_login_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update lockout state")?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_session<'e, E>(executor: E, session: &NewRefreshSession) -> Result<RefreshSession>
where
    E: sqlx::PgExecutor<'e>,
{
    let query = format!(
        "INSERT INTO refresh_tokens (user_id, token_hash, token_family, version, expires_at) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.token_family)
        .bind(to_i32(session.version)?)
        .bind(session.expires_at)
        .fetch_one(executor)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    session_from_row(&row)
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, session: NewRefreshSession) -> Result<RefreshSession> {
        insert_session(&self.pool, &session).await
    }

    async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<RefreshSession>> {
        Ok(self.list_active_for_user(user_id).await?.into_iter().next())
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM refresh_tokens \
             WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2 \
             ORDER BY created_at DESC"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list refresh tokens")?;
        rows.iter().map(session_from_row).collect()
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<RefreshSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM refresh_tokens WHERE token_hash = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token")?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        let query = r"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND is_revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE user_id = $1 AND is_revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke user refresh tokens")?;
        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        successor: NewRefreshSession,
    ) -> Result<Option<RefreshSession>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin rotation transaction")?;

        let query = r"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND is_revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to revoke rotated refresh token")?;

        if result.rows_affected() != 1 {
            let _ = tx.rollback().await;
            return Ok(None);
        }

        let inserted = insert_session(&mut *tx, &successor).await?;
        tx.commit().await.context("commit rotation transaction")?;
        Ok(Some(inserted))
    }
}

/// Health probe used by `/health`.
pub async fn ping(pool: &PgPool) -> Result<DateTime<Utc>> {
    let query = "SELECT NOW() AS now";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("database ping failed")?;
    Ok(row.try_get("now")?)
}
