use async_trait::async_trait;
use std::fmt;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info};

use crate::error::{UserError, UserResult};
use crate::users::repo_types::{NewUser, User, UserCondition};

/// Persistence boundary for the User aggregate.
///
/// `update` and `delete` run their read-check-write sequence as one atomic
/// unit against the current row.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Storage assigns `id`, `version = 0` and timestamps.
    async fn create(&self, user: NewUser) -> UserResult<User>;

    async fn find_by_id(&self, id: i64) -> UserResult<User>;

    async fn find_by_username(&self, username: &str) -> UserResult<User>;

    /// All live users whose populated condition fields are equal.
    async fn find_by_condition(&self, condition: &UserCondition) -> UserResult<Vec<User>>;

    async fn find_all(&self) -> UserResult<Vec<User>>;

    /// Persist every field of `user` if `user.version` still matches the
    /// stored version. Returns the row with its version incremented by one.
    async fn update(&self, user: &User) -> UserResult<User>;

    /// Soft delete under the same version check as `update`.
    async fn delete(&self, id: i64, version: i64) -> UserResult<()>;

    /// Advisory only: storage failures read as `false`.
    async fn exists(&self, id: i64) -> bool;
}

/// Postgres-backed repository. Concurrency control relies on row locks
/// (`SELECT ... FOR UPDATE`) and on the partial unique indexes from
/// `migrations/`.
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the live row and compare versions. Must run inside `tx`.
    async fn lock_and_check(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        id: i64,
        version: i64,
    ) -> UserResult<()> {
        let stored = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT version
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| storage_failure(e, "lock user", id))?;

        match stored {
            None => {
                info!(id, "user not found");
                Err(UserError::NotFound)
            }
            Some(current) if current != version => {
                info!(id, version, current, "user version mismatch");
                Err(UserError::VersionMismatch)
            }
            Some(_) => Ok(()),
        }
    }
}

/// Converts a driver error and logs it when it is not a domain outcome.
/// `key` identifies the row or filter the operation targeted.
fn storage_failure(e: sqlx::Error, op: &str, key: impl fmt::Display) -> UserError {
    let err = UserError::from(e);
    if let UserError::Storage(msg) = &err {
        error!(error = %msg, %key, "failed to {op}");
    }
    err
}

fn log_duplicate(err: &UserError, user_name: &str, email: &str) {
    match err {
        UserError::UsernameAlreadyExists => info!(username = %user_name, "username already exists"),
        UserError::EmailAlreadyExists => info!(email = %email, "email already exists"),
        _ => {}
    }
}

/// Appends `AND column = $n` for every populated field of `condition`.
fn push_condition<'a>(qb: &mut QueryBuilder<'a, Postgres>, condition: &UserCondition) {
    for (column, value) in condition.populated() {
        qb.push(" AND ")
            .push(column)
            .push(" = ")
            .push_bind(value.to_owned());
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> UserResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, email, first_name, last_name, profile_image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, password_hash, email, first_name, last_name,
                      profile_image, version, created_at, updated_at, deleted_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.profile_image)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = storage_failure(e, "create user", &user.username);
            log_duplicate(&err, &user.username, &user.email);
            err
        })
    }

    async fn find_by_id(&self, id: i64) -> UserResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, email, first_name, last_name,
                   profile_image, version, created_at, updated_at, deleted_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_failure(e, "find user", id))?
        .ok_or_else(|| {
            info!(id, "user not found");
            UserError::NotFound
        })
    }

    async fn find_by_username(&self, username: &str) -> UserResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, email, first_name, last_name,
                   profile_image, version, created_at, updated_at, deleted_at
            FROM users
            WHERE username = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_failure(e, "find user", username))?
        .ok_or_else(|| {
            info!(%username, "user not found");
            UserError::NotFound
        })
    }

    async fn find_by_condition(&self, condition: &UserCondition) -> UserResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, username, password_hash, email, first_name, last_name, \
             profile_image, version, created_at, updated_at, deleted_at \
             FROM users WHERE deleted_at IS NULL",
        );
        push_condition(&mut qb, condition);
        qb.push(" ORDER BY id");

        qb.build_query_as::<User>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_failure(e, "find users", format_args!("{condition:?}")))
    }

    async fn find_all(&self) -> UserResult<Vec<User>> {
        self.find_by_condition(&UserCondition::default()).await
    }

    async fn update(&self, user: &User) -> UserResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_failure(e, "begin update", user.id))?;

        Self::lock_and_check(&mut tx, user.id, user.version).await?;

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $2, password_hash = $3, email = $4, first_name = $5,
                last_name = $6, profile_image = $7, version = version + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING id, username, password_hash, email, first_name, last_name,
                      profile_image, version, created_at, updated_at, deleted_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.profile_image)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            let err = storage_failure(e, "update user", user.id);
            log_duplicate(&err, &user.username, &user.email);
            err
        })?;

        tx.commit()
            .await
            .map_err(|e| storage_failure(e, "commit update", user.id))?;

        Ok(updated)
    }

    async fn delete(&self, id: i64, version: i64) -> UserResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_failure(e, "begin delete", id))?;

        Self::lock_and_check(&mut tx, id, version).await?;

        sqlx::query(
            r#"
            UPDATE users
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_failure(e, "delete user", id))?;

        tx.commit()
            .await
            .map_err(|e| storage_failure(e, "commit delete", id))?;

        Ok(())
    }

    async fn exists(&self, id: i64) -> bool {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match found {
            Ok(row) => row.is_some(),
            Err(e) => {
                storage_failure(e, "find user", id);
                false
            }
        }
    }
}
