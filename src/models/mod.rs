pub mod execution;
pub mod user;
pub mod workflow;
