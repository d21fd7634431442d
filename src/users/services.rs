use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::error::{UserError, UserResult};
use crate::users::password::PasswordHasher;
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, User, UserCondition};

/// Input for [`UserUsecase::create`]. The password is plaintext and is
/// expected to have passed the password policy already.
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_image: String,
}

/// Partial update. `None` and empty strings leave the stored field as is.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
}

impl UpdateUser {
    fn apply_to(self, user: &mut User) {
        merge(&mut user.username, self.username);
        merge(&mut user.email, self.email);
        merge(&mut user.first_name, self.first_name);
        merge(&mut user.last_name, self.last_name);
        if let Some(image) = self.profile_image.filter(|v| !v.is_empty()) {
            user.profile_image = Some(image);
        }
    }
}

fn merge(field: &mut String, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *field = v;
    }
}

#[async_trait]
pub trait UserUsecase: Send + Sync {
    async fn create(&self, input: CreateUser) -> UserResult<User>;

    async fn get_by_id(&self, id: i64) -> UserResult<User>;

    async fn search(&self, condition: &UserCondition) -> UserResult<Vec<User>>;

    async fn get_all(&self) -> UserResult<Vec<User>>;

    /// Merge `changes` into the stored user and write it back, checked
    /// against the caller's `version`.
    async fn update(&self, id: i64, version: i64, changes: UpdateUser) -> UserResult<User>;

    /// Replace the password hash, checked against the version observed when
    /// the user is loaded.
    async fn update_password(&self, username: &str, password: &str) -> UserResult<()>;

    async fn delete(&self, id: i64, version: i64) -> UserResult<()>;
}

/// Service layer for the User aggregate.
#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { repository, hasher }
    }

    /// Hash on the blocking pool so Argon2 does not stall the async workers.
    async fn hash_password(&self, plain: &str) -> UserResult<String> {
        let hasher = Arc::clone(&self.hasher);
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| UserError::PasswordHash(e.to_string()))?
            .map_err(|e| {
                error!(error = %e, "failed to hash password");
                e
            })
    }
}

#[async_trait]
impl UserUsecase for UserService {
    #[instrument(skip(self, input), fields(username = %input.username))]
    async fn create(&self, input: CreateUser) -> UserResult<User> {
        let password_hash = self.hash_password(&input.password).await?;

        let user = NewUser {
            username: input.username,
            password_hash,
            email: input.email,
            first_name: input.first_name,
            last_name: input.last_name,
            profile_image: Some(input.profile_image).filter(|v| !v.is_empty()),
        };

        let created = self.repository.create(user).await?;
        info!(id = created.id, "user created");
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> UserResult<User> {
        self.repository.find_by_id(id).await
    }

    async fn search(&self, condition: &UserCondition) -> UserResult<Vec<User>> {
        self.repository.find_by_condition(condition).await
    }

    async fn get_all(&self) -> UserResult<Vec<User>> {
        self.repository.find_all().await
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: i64, version: i64, changes: UpdateUser) -> UserResult<User> {
        let mut user = self.repository.find_by_id(id).await?;
        changes.apply_to(&mut user);
        user.version = version;

        let updated = self.repository.update(&user).await?;
        info!(version = updated.version, "user updated");
        Ok(updated)
    }

    #[instrument(skip(self, password))]
    async fn update_password(&self, username: &str, password: &str) -> UserResult<()> {
        let mut user = self.repository.find_by_username(username).await?;

        user.password_hash = self.hash_password(password).await?;

        self.repository.update(&user).await?;
        info!(id = user.id, "password updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64, version: i64) -> UserResult<()> {
        self.repository.delete(id, version).await?;
        info!("user deleted");
        Ok(())
    }
}
