use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{UserError, UserResult};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, User, UserCondition};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, User>,
    next_id: i64,
}

impl Table {
    fn live(&self, id: i64) -> Option<&User> {
        self.rows.get(&id).filter(|u| u.deleted_at.is_none())
    }

    /// Uniqueness among live rows other than `except`.
    fn check_unique(&self, except: Option<i64>, username: &str, email: &str) -> UserResult<()> {
        let others = self
            .rows
            .values()
            .filter(|u| u.deleted_at.is_none() && Some(u.id) != except);

        for other in others {
            if other.username == username {
                info!(%username, "username already exists");
                return Err(UserError::UsernameAlreadyExists);
            }
            if other.email == email {
                info!(%email, "email already exists");
                return Err(UserError::EmailAlreadyExists);
            }
        }
        Ok(())
    }

    fn check_version(&self, id: i64, version: i64) -> UserResult<()> {
        let stored = self.live(id).ok_or_else(|| {
            info!(id, "user not found");
            UserError::NotFound
        })?;
        if stored.version != version {
            info!(id, version, current = stored.version, "user version mismatch");
            return Err(UserError::VersionMismatch);
        }
        Ok(())
    }
}

/// In-memory implementation of [`UserRepository`].
///
/// A single write lock spans each read-check-write sequence, which gives the
/// same per-row serialisation the Postgres implementation gets from
/// `SELECT ... FOR UPDATE`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserRepository {
    table: Arc<RwLock<Table>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> UserResult<User> {
        let mut table = self.table.write().await;
        table.check_unique(None, &user.username, &user.email)?;

        table.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: table.next_id,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            profile_image: user.profile_image,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> UserResult<User> {
        let table = self.table.read().await;
        table.live(id).cloned().ok_or_else(|| {
            info!(id, "user not found");
            UserError::NotFound
        })
    }

    async fn find_by_username(&self, username: &str) -> UserResult<User> {
        let table = self.table.read().await;
        table
            .rows
            .values()
            .find(|u| u.deleted_at.is_none() && u.username == username)
            .cloned()
            .ok_or_else(|| {
                info!(%username, "user not found");
                UserError::NotFound
            })
    }

    async fn find_by_condition(&self, condition: &UserCondition) -> UserResult<Vec<User>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|u| u.deleted_at.is_none() && condition.matches(u))
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> UserResult<Vec<User>> {
        self.find_by_condition(&UserCondition::default()).await
    }

    async fn update(&self, user: &User) -> UserResult<User> {
        let mut table = self.table.write().await;
        table.check_version(user.id, user.version)?;
        table.check_unique(Some(user.id), &user.username, &user.email)?;

        let Some(row) = table.rows.get_mut(&user.id) else {
            return Err(UserError::NotFound);
        };
        row.username = user.username.clone();
        row.password_hash = user.password_hash.clone();
        row.email = user.email.clone();
        row.first_name = user.first_name.clone();
        row.last_name = user.last_name.clone();
        row.profile_image = user.profile_image.clone();
        row.version += 1;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn delete(&self, id: i64, version: i64) -> UserResult<()> {
        let mut table = self.table.write().await;
        table.check_version(id, version)?;

        if let Some(row) = table.rows.get_mut(&id) {
            let now = OffsetDateTime::now_utc();
            row.deleted_at = Some(now);
            row.updated_at = now;
        }
        Ok(())
    }

    async fn exists(&self, id: i64) -> bool {
        self.table.read().await.live(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            password_hash: "hash".into(),
            email: email.into(),
            first_name: "First".into(),
            last_name: "Last".into(),
            profile_image: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_version_zero() {
        let repo = InMemoryUserRepository::new();
        let a = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        let b = repo.create(new_user("bob", "b@x.com")).await.unwrap();

        assert_eq!(a.version, 0);
        assert_ne!(a.id, b.id);
        assert_eq!(repo.find_by_id(a.id).await.unwrap(), a);
        assert_eq!(repo.find_by_username("bob").await.unwrap(), b);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("alice", "a@x.com")).await.unwrap();

        let err = repo.create(new_user("alice", "other@x.com")).await.unwrap_err();
        assert_eq!(err, UserError::UsernameAlreadyExists);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("alice", "a@x.com")).await.unwrap();

        let err = repo.create(new_user("bob", "a@x.com")).await.unwrap_err();
        assert_eq!(err, UserError::EmailAlreadyExists);
    }

    #[tokio::test]
    async fn find_by_username_is_exact() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("alice", "a@x.com")).await.unwrap();

        assert_eq!(
            repo.find_by_username("Alice").await.unwrap_err(),
            UserError::NotFound
        );
    }

    #[tokio::test]
    async fn update_increments_version() {
        let repo = InMemoryUserRepository::new();
        let mut user = repo.create(new_user("alice", "a@x.com")).await.unwrap();

        for expected in 1..=3 {
            user.first_name = format!("First{expected}");
            user = repo.update(&user).await.unwrap();
            assert_eq!(user.version, expected);
        }
        assert_eq!(repo.find_by_id(user.id).await.unwrap().version, 3);
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_changes() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("alice", "a@x.com")).await.unwrap();

        let mut fresh = user.clone();
        fresh.first_name = "Fresh".into();
        repo.update(&fresh).await.unwrap();

        let mut stale = user.clone();
        stale.first_name = "Stale".into();
        assert_eq!(repo.update(&stale).await.unwrap_err(), UserError::VersionMismatch);

        let stored = repo.find_by_id(user.id).await.unwrap();
        assert_eq!(stored.first_name, "Fresh");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn update_of_missing_user_is_not_found() {
        let repo = InMemoryUserRepository::new();
        let mut user = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        user.id = 42;

        assert_eq!(repo.update(&user).await.unwrap_err(), UserError::NotFound);
    }

    #[tokio::test]
    async fn update_into_taken_email_is_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("alice", "a@x.com")).await.unwrap();
        let mut bob = repo.create(new_user("bob", "b@x.com")).await.unwrap();

        bob.email = "a@x.com".into();
        assert_eq!(repo.update(&bob).await.unwrap_err(), UserError::EmailAlreadyExists);
        assert_eq!(repo.find_by_id(bob.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn update_into_taken_username_is_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("alice", "a@x.com")).await.unwrap();
        let mut bob = repo.create(new_user("bob", "b@x.com")).await.unwrap();

        bob.username = "alice".into();
        assert_eq!(
            repo.update(&bob).await.unwrap_err(),
            UserError::UsernameAlreadyExists
        );
        assert_eq!(repo.find_by_username("bob").await.unwrap().version, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_renames_to_same_username_have_one_winner() {
        let repo = InMemoryUserRepository::new();
        let mut alice = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        let mut bob = repo.create(new_user("bob", "b@x.com")).await.unwrap();
        alice.username = "carol".into();
        bob.username = "carol".into();

        let (first, second) = tokio::join!(
            tokio::spawn({
                let repo = repo.clone();
                async move { repo.update(&alice).await }
            }),
            tokio::spawn({
                let repo = repo.clone();
                async move { repo.update(&bob).await }
            }),
        );
        let results = [first.unwrap(), second.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(UserError::UsernameAlreadyExists)))
                .count(),
            1
        );
        let winner = repo.find_by_username("carol").await.unwrap();
        assert_eq!(winner.version, 1);
        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_updates_with_same_version_have_one_winner() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("alice", "a@x.com")).await.unwrap();

        let mut handles = Vec::new();
        for name in ["A", "B"] {
            let repo = repo.clone();
            let mut candidate = user.clone();
            candidate.first_name = name.into();
            handles.push(tokio::spawn(async move { repo.update(&candidate).await }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(UserError::VersionMismatch)))
                .count(),
            1
        );
        assert_eq!(repo.find_by_id(user.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn soft_deleted_user_is_invisible() {
        let repo = InMemoryUserRepository::new();
        let alice = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        repo.create(new_user("bob", "b@x.com")).await.unwrap();

        assert!(repo.exists(alice.id).await);
        repo.delete(alice.id, alice.version).await.unwrap();

        assert!(!repo.exists(alice.id).await);
        assert_eq!(repo.find_by_id(alice.id).await.unwrap_err(), UserError::NotFound);
        assert_eq!(
            repo.find_by_username("alice").await.unwrap_err(),
            UserError::NotFound
        );
        let by_name = UserCondition {
            username: Some("alice".into()),
            ..Default::default()
        };
        assert!(repo.find_by_condition(&by_name).await.unwrap().is_empty());
        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].username, "bob");

        assert_eq!(repo.delete(alice.id, 0).await.unwrap_err(), UserError::NotFound);
        assert_eq!(repo.delete(alice.id, 7).await.unwrap_err(), UserError::NotFound);
        assert_eq!(repo.update(&alice).await.unwrap_err(), UserError::NotFound);
    }

    #[tokio::test]
    async fn delete_with_stale_version_is_rejected() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        repo.update(&user).await.unwrap();

        assert_eq!(repo.delete(user.id, 0).await.unwrap_err(), UserError::VersionMismatch);
        assert!(repo.exists(user.id).await);
    }

    #[tokio::test]
    async fn deleted_username_can_be_reused() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        repo.delete(user.id, 0).await.unwrap();

        let again = repo.create(new_user("alice", "a@x.com")).await.unwrap();
        assert_ne!(again.id, user.id);
    }

    #[tokio::test]
    async fn condition_search_filters_by_equality() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("alice", "a@x.com")).await.unwrap();
        let mut bob = new_user("bob", "b@x.com");
        bob.last_name = "Builder".into();
        repo.create(bob).await.unwrap();

        let builders = UserCondition {
            last_name: Some("Builder".into()),
            ..Default::default()
        };
        let found = repo.find_by_condition(&builders).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "bob");

        let none = UserCondition {
            email: Some("b@x".into()),
            ..Default::default()
        };
        assert!(repo.find_by_condition(&none).await.unwrap().is_empty());
        assert_eq!(
            repo.find_by_condition(&UserCondition::default()).await.unwrap().len(),
            2
        );
    }
}
