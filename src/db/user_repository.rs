use async_trait::async_trait;

use crate::models::user::User;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error>;
    async fn is_username_taken(&self, username: &str) -> Result<bool, sqlx::Error>;
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, sqlx::Error>;
}
