#[cfg(test)]
pub mod mock_db;
pub mod postgres_user_repository;
pub mod postgres_workflow_repository;
pub mod user_repository;
pub mod workflow_repository;
