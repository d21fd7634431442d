use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validator;

pub use memory::InMemoryUserRepository;
pub use password::{Argon2Hasher, PasswordHasher};
pub use repo::{PgUserRepository, UserRepository};
pub use repo_types::{NewUser, User, UserCondition};
pub use services::{CreateUser, UpdateUser, UserService, UserUsecase};

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
