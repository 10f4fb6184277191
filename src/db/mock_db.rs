//! In-memory repositories backing route tests.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::user_repository::UserRepository;
use super::workflow_repository::WorkflowRepository;
use crate::models::execution::{Execution, NewExecution};
use crate::models::user::User;
use crate::models::workflow::{Workflow, WorkflowEdge, WorkflowNode};
use crate::utils::pagination::PageRequest;

#[derive(Default)]
pub struct MockDb {
    pub users: Mutex<Vec<User>>,
    pub should_fail: bool,
}

impl MockDb {
    pub fn with_user(username: &str, password_hash: &str) -> Self {
        let db = Self::default();
        db.users.lock().unwrap().push(User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
        db
    }

    fn fail_if_requested(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MockDb {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        self.fail_if_requested()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn is_username_taken(&self, username: &str) -> Result<bool, sqlx::Error> {
        Ok(self.find_user_by_username(username).await?.is_some())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, sqlx::Error> {
        self.fail_if_requested()?;
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    pub workflows: Mutex<Vec<Workflow>>,
    pub executions: Mutex<Vec<Execution>>,
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_workflow(
        &self,
        user_id: Uuid,
        name: &str,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<Workflow, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            nodes: nodes.to_vec(),
            edges: edges.to_vec(),
            created_at: now,
            updated_at: now,
        };
        self.workflows.lock().unwrap().push(workflow.clone());
        Ok(workflow)
    }

    async fn list_workflows_by_user(&self, user_id: Uuid) -> Result<Vec<Workflow>, sqlx::Error> {
        let mut found: Vec<Workflow> = self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn find_workflow_by_id(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.user_id == user_id && w.id == workflow_id)
            .cloned())
    }

    async fn update_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        name: &str,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let mut workflows = self.workflows.lock().unwrap();
        let Some(workflow) = workflows
            .iter_mut()
            .find(|w| w.user_id == user_id && w.id == workflow_id)
        else {
            return Ok(None);
        };
        workflow.name = name.to_string();
        workflow.nodes = nodes.to_vec();
        workflow.edges = edges.to_vec();
        workflow.updated_at = OffsetDateTime::now_utc();
        Ok(Some(workflow.clone()))
    }

    async fn rename_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        name: &str,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let mut workflows = self.workflows.lock().unwrap();
        let Some(workflow) = workflows
            .iter_mut()
            .find(|w| w.user_id == user_id && w.id == workflow_id)
        else {
            return Ok(None);
        };
        workflow.name = name.to_string();
        workflow.updated_at = OffsetDateTime::now_utc();
        Ok(Some(workflow.clone()))
    }

    async fn delete_workflow(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let mut workflows = self.workflows.lock().unwrap();
        let before = workflows.len();
        workflows.retain(|w| !(w.user_id == user_id && w.id == workflow_id));
        let removed = workflows.len() != before;
        if removed {
            self.executions
                .lock()
                .unwrap()
                .retain(|e| e.workflow_id != workflow_id);
        }
        Ok(removed)
    }

    async fn insert_execution(&self, execution: NewExecution) -> Result<Execution, sqlx::Error> {
        let stored = Execution {
            id: execution.id,
            workflow_id: execution.workflow_id,
            user_id: execution.user_id,
            timestamp: execution.timestamp,
            input: execution.input,
            output: execution.output,
            status: execution.status.as_str().to_string(),
            duration: Some(execution.duration_ms),
            error: execution.error,
            logs: execution.logs,
        };
        self.executions.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_executions(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Execution>, u64), sqlx::Error> {
        let mut found: Vec<Execution> = self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id && e.workflow_id == workflow_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = found.len() as u64;
        let items = match page {
            Some(page) => page.slice(&found),
            None => found,
        };
        Ok((items, total))
    }

    async fn find_execution(
        &self,
        user_id: Uuid,
        workflow_id: Uuid,
        execution_id: Uuid,
    ) -> Result<Option<Execution>, sqlx::Error> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.user_id == user_id && e.workflow_id == workflow_id && e.id == execution_id)
            .cloned())
    }
}
