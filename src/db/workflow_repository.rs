use async_trait::async_trait;
use uuid::Uuid;

use crate::models::execution::{Execution, NewExecution};
use crate::models::workflow::{Workflow, WorkflowEdge, WorkflowNode};
use crate::utils::pagination::PageRequest;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create_workflow(
        &self,
        user_id: Uuid,
        name: &str,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<Workflow, sqlx::Error>;

    async fn list_workflows_by_user(&self, user_id: Uuid) -> Result<Vec<Workflow>, sqlx::Error>;

    async fn find_workflow_by_id(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<Option<Workflow>, sqlx::Error>;

    async fn update_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        name: &str,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<Option<Workflow>, sqlx::Error>;

    async fn rename_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        name: &str,
    ) -> Result<Option<Workflow>, sqlx::Error>;

    async fn delete_workflow(&self, user_id: Uuid, workflow_id: Uuid)
        -> Result<bool, sqlx::Error>;

    // Execution history
    async fn insert_execution(&self, execution: NewExecution) -> Result<Execution, sqlx::Error>;

    /// Newest first. Returns the page (or everything when `page` is `None`)
    /// and the total number of executions for the workflow.
    async fn list_executions(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Execution>, u64), sqlx::Error>;

    async fn find_execution(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        execution_id: Uuid,
    ) -> Result<Option<Execution>, sqlx::Error>;
}
