use std::sync::Arc;

use crate::config::{AppConfig, StorageBackend};
use crate::db;
use crate::users::{
    Argon2Hasher, InMemoryUserRepository, PgUserRepository, UserRepository, UserService,
    UserUsecase,
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserUsecase>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let repository: Arc<dyn UserRepository> = match (&config.storage, &config.database) {
            (StorageBackend::Postgres, Some(database)) => {
                let pool = db::connect(database).await?;
                Arc::new(PgUserRepository::new(pool))
            }
            (StorageBackend::Postgres, None) => {
                anyhow::bail!("postgres storage selected without database settings")
            }
            (StorageBackend::Memory, _) => {
                tracing::warn!("using in-memory storage; data is lost on restart");
                Arc::new(InMemoryUserRepository::new())
            }
        };

        let users = Arc::new(UserService::new(repository, Arc::new(Argon2Hasher)));
        Ok(Self::from_parts(users))
    }

    pub fn from_parts(users: Arc<dyn UserUsecase>) -> Self {
        Self { users }
    }
}
